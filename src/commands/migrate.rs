use std::path::Path;

use chrono::TimeDelta;
use chrono::Utc;
use colored::Colorize;
use log::warn;
use secrecy::SecretString;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;

use crate::App;
use crate::clients::github::GithubApi;
use crate::clients::process::ProcessRunner;
use crate::migration::MigrationState;
use crate::migration::Plan;
use crate::migration::apply_patches;
use crate::patch_set::PatchSet;
use crate::poller::RunConclusion;
use crate::poller::RunPoller;
use crate::poller::RunTarget;
use crate::poller::format_elapsed;

/// Allowance for a local clock ahead of GitHub's when matching the run
/// created by `gh workflow run`.
const TRIGGER_CLOCK_SKEW_SECS: i64 = 30;

/// How a migration run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The repository already tracks the newest release.
    UpToDate { tag: String },
    PullRequestOpened { url: String },
    /// The run succeeded but `gh pr create` did not.
    PullRequestFailed { branch: String },
    /// The run completed without success; no pull request was opened.
    RunFailed {
        branch: String,
        conclusion: RunConclusion,
    },
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::UpToDate { .. } | Self::PullRequestOpened { .. })
    }
}

impl<R: ProcessRunner, A: GithubApi> App<R, A> {
    /// Migrate the repository from `current_tag` to the newest upstream
    /// release.
    ///
    /// 1. Resolve the newest published release; stop if already on it.
    /// 2. Build the patch set from the release commit and its parents, and
    ///    download every patch.
    /// 3. Create the migration branch and apply the patches in order.
    /// 4. Push the branch and trigger the CI workflow on it.
    /// 5. Wait for the run to complete and open a pull request if it
    ///    succeeded.
    ///
    /// A `token` is stored as a repository secret before anything else.
    #[instrument(skip_all, fields(current_tag = %current_tag))]
    pub async fn cmd_migrate(
        &self,
        current_tag: &str,
        token: Option<&SecretString>,
        stdout: &mut impl std::io::Write,
    ) -> anyhow::Result<MigrationOutcome> {
        self.preflight()?;

        if let Some(token) = token {
            let name = &self.config.secret_name;
            match self.gh.set_secret(name, token).await {
                Ok(()) => writeln!(stdout, "Stored token as repository secret {}", name)?,
                Err(e) => warn!("Failed to store repository secret {}: {}", name, e),
            }
        }

        let consumer = self.consumer_repo().await?;
        let upstream = &self.config.upstream;
        writeln!(stdout, "Fetching releases of {}", upstream)?;
        let releases = self.api.list_releases(upstream).await?;

        let mut state = match Plan::new(
            upstream,
            &releases,
            current_tag,
            &self.config.branch_prefix,
        )? {
            Plan::UpToDate { tag } => {
                writeln!(stdout, "Already on the latest release {}", tag.green())?;
                return Ok(MigrationOutcome::UpToDate { tag });
            }
            Plan::Migrate(state) => state,
        };
        self.check_cancelled()?;
        writeln!(
            stdout,
            "Migrating {} from {} to {} on branch {}",
            consumer,
            state.current_tag,
            state.target_tag.green(),
            state.branch_name.cyan()
        )?;

        let commit = self.api.get_commit(upstream, &state.target_tag).await?;
        state.patch_set = PatchSet::build(&commit, &state.target_tag, &self.config.patch_dir);
        writeln!(stdout, "Downloading {} patches", state.patch_set.len())?;
        if let Err(e) = state.patch_set.download(&self.api).await {
            state.patch_set.remove_files().await;
            return Err(e.into());
        }

        if let Err(e) = self.check_cancelled() {
            state.patch_set.remove_files().await;
            return Err(e.into());
        }

        let snapshot = self.git.head().await?;
        if let Err(e) = self.git.create_branch(&state.branch_name).await {
            state.patch_set.remove_files().await;
            return Err(e.into());
        }
        apply_patches(
            &self.git,
            &state.patch_set,
            &snapshot,
            self.config.reset_on_failure,
        )
        .await?;
        writeln!(stdout, "Applied {} patches", state.patch_set.len())?;

        if self.config.install_workflow {
            self.install_workflow(&state).await?;
            writeln!(
                stdout,
                "Installed workflow {} from {}",
                self.config.workflow, state.target_tag
            )?;
        }

        self.check_cancelled()?;
        self.git.push_upstream(&state.branch_name).await?;
        writeln!(stdout, "Pushed branch {}", state.branch_name.cyan())?;
        let removed = state.patch_set.remove_files().await;
        info!(removed, "removed patch files");

        self.check_cancelled()?;
        let triggered_at = Utc::now() - TimeDelta::seconds(TRIGGER_CLOCK_SKEW_SECS);
        self.gh
            .workflow_run(&self.config.workflow, &state.branch_name)
            .await?;
        writeln!(stdout, "Triggered workflow {}", self.config.workflow)?;

        let poller = RunPoller {
            interval: self.config.poll_interval,
            max_wait: self.config.max_wait,
        };
        let target = RunTarget {
            repo: &consumer,
            workflow: &self.config.workflow,
            branch: &state.branch_name,
            since: triggered_at,
        };
        let run = poller
            .wait_for_completion(&self.api, &target, &self.cancel, |run_state, elapsed| {
                if let Err(e) = writeln!(
                    stdout,
                    "Current status -> {}, time elapsed {}",
                    run_state.to_string().yellow(),
                    format_elapsed(elapsed)
                ) {
                    debug!("Failed to write run progress: {}", e);
                }
            })
            .await?;

        let conclusion = run.conclusion.unwrap_or(RunConclusion::Other);
        if conclusion != RunConclusion::Success {
            writeln!(
                stdout,
                "Workflow run finished: {}; not opening a pull request",
                conclusion.to_string().red()
            )?;
            if let Some(url) = &run.html_url {
                writeln!(stdout, "{}", url.dimmed())?;
            }
            return Ok(MigrationOutcome::RunFailed {
                branch: state.branch_name,
                conclusion,
            });
        }
        writeln!(stdout, "Workflow run finished: {}", conclusion.to_string().green())?;

        self.git.pull().await?;
        match self
            .gh
            .pr_create(&self.config.pr_title, &self.config.pr_body)
            .await
        {
            Ok(url) => {
                writeln!(stdout, "Created pull request: {}", url)?;
                Ok(MigrationOutcome::PullRequestOpened { url })
            }
            Err(e) => {
                error!("Failed to create pull request: {}", e);
                writeln!(
                    stdout,
                    "Branch {} is pushed; open a pull request for it manually",
                    state.branch_name
                )?;
                Ok(MigrationOutcome::PullRequestFailed {
                    branch: state.branch_name,
                })
            }
        }
    }

    /// Copy the upstream CI workflow onto the migration branch as one commit.
    async fn install_workflow(&self, state: &MigrationState) -> crate::error::Result<()> {
        let dest = Path::new(".github/workflows").join(&self.config.workflow);
        self.api
            .download_workflow_template(&self.config.upstream, &self.config.workflow, &dest)
            .await?;
        self.git.add(&dest).await?;
        self.git
            .commit(&format!(
                "Add {} from {}",
                self.config.workflow, state.target_tag
            ))
            .await
    }
}
