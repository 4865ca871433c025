use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::clients::gh::GhClient;
use crate::clients::git::GitClient;
use crate::clients::github::GithubApi;
use crate::clients::github::RepoCoordinate;
use crate::clients::process::ProcessRunner;
use crate::config::Config;
use crate::error::Error;
use crate::error::Result;

pub struct App<R, A> {
    pub config: Config,
    pub git: GitClient<R>,
    pub gh: GhClient<R>,
    pub api: A,
    /// Interrupts a migration between stages and while waiting on the run.
    pub cancel: CancellationToken,
}

impl<R: ProcessRunner, A: GithubApi> App<R, A> {
    pub fn new(config: Config, runner: R, api: A) -> Self {
        let runner = Rc::new(runner);
        Self {
            config,
            git: GitClient::new(runner.clone()),
            gh: GhClient::new(runner),
            api,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Shared helper methods for App
impl<R: ProcessRunner, A: GithubApi> App<R, A> {
    /// Fail with `ToolNotInstalled` unless both git and gh are on PATH.
    pub(crate) fn preflight(&self) -> Result<()> {
        self.git.ensure_installed()?;
        self.gh.ensure_installed()
    }

    /// The repository being migrated, from its `origin` remote.
    pub(crate) async fn consumer_repo(&self) -> Result<RepoCoordinate> {
        let url = self.git.remote_url().await?;
        RepoCoordinate::from_remote_url(&url)
    }

    /// Fail with `Cancelled` once the operator has interrupted the run.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
