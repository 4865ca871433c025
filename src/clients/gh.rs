use std::rc::Rc;

use secrecy::ExposeSecret;
use secrecy::SecretString;
use tracing::instrument;

use super::process::ProcessRunner;
use super::process::Tool;
use crate::error::Result;

/// Client for the GitHub CLI, scoped to the consumer repository.
pub struct GhClient<R> {
    runner: Rc<R>,
}

impl<R: ProcessRunner> GhClient<R> {
    pub fn new(runner: Rc<R>) -> Self {
        Self { runner }
    }

    pub fn ensure_installed(&self) -> Result<()> {
        self.runner.locate(Tool::Gh).map(|_| ())
    }

    async fn gh(&self, args: &[&str]) -> Result<String> {
        let args = args.iter().map(|s| s.to_string()).collect();
        let stdout = self.runner.run(Tool::Gh, args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Store `value` as a repository secret.
    #[instrument(skip(self, value))]
    pub async fn set_secret(&self, name: &str, value: &SecretString) -> Result<()> {
        self.gh(&["secret", "set", name, "-b", value.expose_secret()])
            .await?;
        Ok(())
    }

    /// Start a workflow run against `branch`.
    #[instrument(skip(self))]
    pub async fn workflow_run(&self, workflow: &str, branch: &str) -> Result<()> {
        self.gh(&["workflow", "run", workflow, "--ref", branch])
            .await?;
        Ok(())
    }

    /// Create a pull request from the current branch and return its URL.
    #[instrument(skip(self, body))]
    pub async fn pr_create(&self, title: &str, body: &str) -> Result<String> {
        self.gh(&["pr", "create", "--title", title, "--body", body])
            .await
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::clients::process::MockProcessRunner;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_workflow_run_targets_branch() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .with(
                eq(Tool::Gh),
                eq(args(&["workflow", "run", "stack-init.yml", "--ref", "v3"])),
            )
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let gh = GhClient::new(Rc::new(runner));
        gh.workflow_run("stack-init.yml", "v3").await.unwrap();
    }

    #[tokio::test]
    async fn test_pr_create_returns_url() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|tool, args| *tool == Tool::Gh && args[..2] == ["pr", "create"])
            .returning(|_, _| Ok(b"https://github.com/acme/app/pull/7\n".to_vec()));

        let gh = GhClient::new(Rc::new(runner));
        let url = gh.pr_create("Migration-patch", "body").await.unwrap();
        assert_eq!(url, "https://github.com/acme/app/pull/7");
    }

    #[tokio::test]
    async fn test_set_secret_passes_value() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .with(
                eq(Tool::Gh),
                eq(args(&["secret", "set", "GIT_TOKEN", "-b", "tok"])),
            )
            .times(1)
            .returning(|_, _| Ok(Vec::new()));

        let gh = GhClient::new(Rc::new(runner));
        gh.set_secret("GIT_TOKEN", &SecretString::from("tok".to_string()))
            .await
            .unwrap();
    }
}
