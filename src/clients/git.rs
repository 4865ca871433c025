use std::path::Path;
use std::rc::Rc;

use tracing::instrument;

use super::process::ProcessRunner;
use super::process::Tool;
use crate::error::Error;
use crate::error::Result;

// -----------------------------------------------------------------------------
// Types

/// Git client for the consumer repository.
pub struct GitClient<R> {
    runner: Rc<R>,
}

// -----------------------------------------------------------------------------
// GitClient impl

impl<R: ProcessRunner> GitClient<R> {
    pub fn new(runner: Rc<R>) -> Self {
        Self { runner }
    }

    pub fn ensure_installed(&self) -> Result<()> {
        self.runner.locate(Tool::Git).map(|_| ())
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let args = args.iter().map(|s| s.to_string()).collect();
        let stdout = self.runner.run(Tool::Git, args).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    pub async fn remote_url(&self) -> Result<String> {
        self.git(&["config", "--get", "remote.origin.url"]).await
    }

    /// Read a git config value, returning `None` if it is unset.
    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        match self.git(&["config", "--get", key]).await {
            Ok(value) if value.is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            // `git config --get` exits 1 for a missing key
            Err(Error::ExternalCommand { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.git(&["config", key, value]).await?;
        Ok(())
    }

    /// True if no tracked file has uncommitted changes.
    pub async fn is_clean(&self) -> Result<bool> {
        let status = self
            .git(&["status", "--porcelain", "--untracked-files=no"])
            .await?;
        Ok(status.is_empty())
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", branch);
        match self.git(&["rev-parse", "--verify", "--quiet", &refname]).await {
            Ok(_) => Ok(true),
            Err(Error::ExternalCommand { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check out a new branch from HEAD.
    ///
    /// Refuses to run on a dirty working tree or to reuse an existing branch.
    #[instrument(skip(self))]
    pub async fn create_branch(&self, branch: &str) -> Result<()> {
        if !self.is_clean().await? {
            return Err(Error::DirtyWorkingTree);
        }
        if self.branch_exists(branch).await? {
            return Err(Error::BranchExists(branch.to_string()));
        }
        self.git(&["checkout", "-b", branch]).await?;
        Ok(())
    }

    pub async fn head(&self) -> Result<String> {
        self.git(&["rev-parse", "HEAD"]).await
    }

    /// Apply a mailbox patch, keeping its author and message.
    pub async fn apply_patch(&self, patch: &Path) -> Result<()> {
        self.git(&["am", &patch.to_string_lossy()]).await?;
        Ok(())
    }

    pub async fn abort_apply(&self) -> Result<()> {
        self.git(&["am", "--abort"]).await?;
        Ok(())
    }

    pub async fn reset_hard(&self, commit: &str) -> Result<()> {
        self.git(&["reset", "--hard", commit]).await?;
        Ok(())
    }

    pub async fn add(&self, path: &Path) -> Result<()> {
        self.git(&["add", &path.to_string_lossy()]).await?;
        Ok(())
    }

    pub async fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "-m", message]).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn push_upstream(&self, branch: &str) -> Result<()> {
        self.git(&["push", "--set-upstream", "origin", branch])
            .await?;
        Ok(())
    }

    pub async fn pull(&self) -> Result<()> {
        self.git(&["pull"]).await?;
        Ok(())
    }
}
