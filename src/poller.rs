//! Tracking a CI workflow run until it reaches a terminal state.
//!
//! The poller owns its loop: [`RunPoller::wait_for_completion`] only returns
//! once a run has completed, the wait has timed out, or the operator has
//! cancelled. Callers never observe an in-flight run.

use std::fmt::Display;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::instrument;

use crate::clients::github::GithubApi;
use crate::clients::github::RepoCoordinate;
use crate::error::Error;
use crate::error::Result;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60 * 60);

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// `waiting`, `requested`, `pending` and anything newer.
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunConclusion {
    Success,
    Failure,
    Cancelled,
    #[serde(other)]
    Other,
}

/// One workflow run record as reported by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: RunStatus,
    pub conclusion: Option<RunConclusion>,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Poller state. Every `Completed` state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Queued,
    InProgress,
    Completed(RunConclusion),
}

/// Which run to track.
pub struct RunTarget<'a> {
    pub repo: &'a RepoCoordinate,
    pub workflow: &'a str,
    pub branch: &'a str,
    /// Only runs created at or after this are candidates.
    pub since: DateTime<Utc>,
}

pub struct RunPoller {
    pub interval: Duration,
    /// `None` waits forever.
    pub max_wait: Option<Duration>,
}

// -----------------------------------------------------------------------------
// Impls

impl WorkflowRun {
    pub fn state(&self) -> RunState {
        match self.status {
            RunStatus::Queued | RunStatus::Pending => RunState::Queued,
            RunStatus::InProgress => RunState::InProgress,
            RunStatus::Completed => {
                RunState::Completed(self.conclusion.unwrap_or(RunConclusion::Other))
            }
        }
    }
}

impl RunState {
    /// State for an observation; a run that has not registered yet counts
    /// as queued.
    pub fn of(run: Option<&WorkflowRun>) -> Self {
        run.map_or(Self::Queued, WorkflowRun::state)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl Display for RunConclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Other => f.write_str("other"),
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::InProgress => f.write_str("in_progress"),
            Self::Completed(conclusion) => write!(f, "completed ({})", conclusion),
        }
    }
}

impl Default for RunPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: Some(DEFAULT_MAX_WAIT),
        }
    }
}

impl RunPoller {
    /// Read the tracked run once.
    ///
    /// Until a run has been observed this is the latest dispatched run on
    /// the branch. Once `pinned` is set, that run is read by id so a newer
    /// run on the same branch is never mistaken for it.
    pub async fn poll<A: GithubApi>(
        &self,
        api: &A,
        target: &RunTarget<'_>,
        pinned: Option<u64>,
    ) -> Result<Option<WorkflowRun>> {
        match pinned {
            Some(id) => api.get_workflow_run(target.repo, id).await.map(Some),
            None => {
                api.latest_workflow_run(target.repo, target.workflow, target.branch, target.since)
                    .await
            }
        }
    }

    /// Poll until the run completes and return the completed run.
    ///
    /// The first run observed is the one tracked to the end. `on_pending` is
    /// called for every non-terminal observation with the time elapsed since
    /// polling began.
    #[instrument(skip_all, fields(workflow = %target.workflow, branch = %target.branch))]
    pub async fn wait_for_completion<A, F>(
        &self,
        api: &A,
        target: &RunTarget<'_>,
        cancel: &CancellationToken,
        mut on_pending: F,
    ) -> Result<WorkflowRun>
    where
        A: GithubApi,
        F: FnMut(RunState, Duration),
    {
        let started = Instant::now();
        let mut pinned = None;
        loop {
            let run = self.poll(api, target, pinned).await?;
            let state = RunState::of(run.as_ref());
            let elapsed = started.elapsed();
            debug!(%state, elapsed = elapsed.as_secs(), "observed run");

            if let Some(run) = run {
                if state.is_terminal() {
                    return Ok(run);
                }
                if pinned.is_none() {
                    debug!(id = run.id, "tracking run");
                    pinned = Some(run.id);
                }
            }
            on_pending(state, elapsed);

            let mut pause = self.interval;
            if let Some(max_wait) = self.max_wait {
                if elapsed >= max_wait {
                    return Err(Error::PollTimeout(max_wait));
                }
                pause = pause.min(max_wait - elapsed);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

/// Format a duration as `mm:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
