use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;

use crate::clients::git::GitClient;
use crate::clients::github::DEFAULT_API_BASE;
use crate::clients::github::DEFAULT_RAW_BASE;
use crate::clients::github::RepoCoordinate;
use crate::clients::http::DEFAULT_TIMEOUT;
use crate::clients::process::ProcessRunner;
use crate::poller::DEFAULT_MAX_WAIT;
use crate::poller::DEFAULT_POLL_INTERVAL;

const UPSTREAM_KEY: &str = "stackup.upstream";
const WORKFLOW_KEY: &str = "stackup.workflow";
const BRANCH_PREFIX_KEY: &str = "stackup.branchPrefix";

pub const DEFAULT_WORKFLOW: &str = "stack-init.yml";
pub const DEFAULT_SECRET_NAME: &str = "GIT_TOKEN";
pub const DEFAULT_PR_TITLE: &str = "Migration-patch";
pub const DEFAULT_PR_BODY: &str = "PR to migrate to latest stack version";

#[derive(Debug, Clone)]
pub struct Config {
    /// The stack template repository releases are taken from.
    pub upstream: RepoCoordinate,
    /// CI workflow file name, triggered after the branch is pushed.
    pub workflow: String,
    /// Repository secret the token is stored under.
    pub secret_name: String,
    pub branch_prefix: String,
    pub poll_interval: Duration,
    /// `None` waits for the run forever.
    pub max_wait: Option<Duration>,
    pub http_timeout: Duration,
    pub reset_on_failure: bool,
    /// Also copy the upstream workflow template onto the migration branch.
    pub install_workflow: bool,
    pub api_base: String,
    pub raw_base: String,
    /// Where downloaded patches are written.
    pub patch_dir: PathBuf,
    pub pr_title: String,
    pub pr_body: String,
}

impl Config {
    /// Create a config with explicit upstream and default everything else.
    pub fn new(upstream: RepoCoordinate) -> Self {
        Self {
            upstream,
            workflow: DEFAULT_WORKFLOW.to_string(),
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            branch_prefix: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: Some(DEFAULT_MAX_WAIT),
            http_timeout: DEFAULT_TIMEOUT,
            reset_on_failure: false,
            install_workflow: false,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
            patch_dir: PathBuf::from("."),
            pr_title: DEFAULT_PR_TITLE.to_string(),
            pr_body: DEFAULT_PR_BODY.to_string(),
        }
    }

    /// Default config for tests
    pub fn default_for_tests() -> Self {
        Self::new(RepoCoordinate::new("acme", "stack"))
    }

    /// Load config from .git/config.
    ///
    /// `upstream` takes precedence over the stored upstream.
    pub async fn load<R: ProcessRunner>(
        git: &GitClient<R>,
        upstream: Option<RepoCoordinate>,
    ) -> Result<Self> {
        let upstream = match upstream {
            Some(upstream) => upstream,
            None => git
                .get_config(UPSTREAM_KEY)
                .await?
                .context("No upstream configured. Run 'stackup init' or pass --upstream.")?
                .parse()
                .with_context(|| format!("Invalid {} in .git/config", UPSTREAM_KEY))?,
        };

        let mut config = Self::new(upstream);
        if let Some(workflow) = git.get_config(WORKFLOW_KEY).await? {
            config.workflow = workflow;
        }
        if let Some(prefix) = git.get_config(BRANCH_PREFIX_KEY).await? {
            config.branch_prefix = prefix;
        }
        Ok(config)
    }

    /// Save the persistent settings to .git/config
    pub async fn save<R: ProcessRunner>(&self, git: &GitClient<R>) -> Result<()> {
        git.set_config(UPSTREAM_KEY, &self.upstream.to_string())
            .await
            .context("Failed to save config to .git/config")?;
        git.set_config(WORKFLOW_KEY, &self.workflow).await?;
        if !self.branch_prefix.is_empty() {
            git.set_config(BRANCH_PREFIX_KEY, &self.branch_prefix)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::clients::process::MockProcessRunner;
    use crate::clients::process::Tool;
    use crate::error::Error;

    fn missing(args: Vec<String>) -> Error {
        Error::ExternalCommand {
            tool: Tool::Git,
            args,
            stderr: String::new(),
            reason: "exit status: 1".to_string(),
        }
    }

    #[test]
    fn test_default_for_tests() {
        let config = Config::default_for_tests();
        assert_eq!(config.upstream.to_string(), "acme/stack");
        assert_eq!(config.workflow, DEFAULT_WORKFLOW);
        assert_eq!(config.branch_prefix, "");
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_load_from_git_config() {
        let mut runner = MockProcessRunner::new();
        runner.expect_run().returning(|_, args| match args[2].as_str() {
            "stackup.upstream" => Ok(b"acme/stack\n".to_vec()),
            "stackup.workflow" => Ok(b"ci.yml\n".to_vec()),
            _ => Err(missing(args)),
        });

        let git = GitClient::new(Rc::new(runner));
        let config = Config::load(&git, None).await.unwrap();
        assert_eq!(config.upstream, RepoCoordinate::new("acme", "stack"));
        assert_eq!(config.workflow, "ci.yml");
        assert_eq!(config.branch_prefix, "");
    }

    #[tokio::test]
    async fn test_load_prefers_explicit_upstream() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|_, args| args[2] == "stackup.upstream")
            .never();
        runner
            .expect_run()
            .returning(|_, args| Err(missing(args)));

        let git = GitClient::new(Rc::new(runner));
        let config = Config::load(&git, Some(RepoCoordinate::new("other", "stack")))
            .await
            .unwrap();
        assert_eq!(config.upstream.owner, "other");
        assert_eq!(config.workflow, DEFAULT_WORKFLOW);
    }

    #[tokio::test]
    async fn test_load_without_upstream_fails() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .returning(|_, args| Err(missing(args)));

        let git = GitClient::new(Rc::new(runner));
        let err = Config::load(&git, None).await.unwrap_err();
        assert!(err.to_string().contains("stackup init"));
    }
}
