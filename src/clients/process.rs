use std::fmt::Display;
use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

use crate::error::Error;
use crate::error::Result;

// -----------------------------------------------------------------------------
// Types

/// External executables the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Git,
    Gh,
}

impl Tool {
    pub fn program(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Gh => "gh",
        }
    }

    /// Install hint shown when the executable is missing from PATH.
    pub fn install_guidance(&self) -> &'static str {
        match self {
            Self::Git if cfg!(windows) => "Git for Windows",
            Self::Git => "git",
            Self::Gh => "the GitHub CLI (https://cli.github.com)",
        }
    }
}

impl Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.program())
    }
}

/// Runs external commands on behalf of the pipeline.
///
/// This is the only place `git` and `gh` are spawned. Clients take it as a
/// capability so tests can script command results.
#[cfg_attr(test, automock)]
#[async_trait(?Send)]
pub trait ProcessRunner {
    /// Resolve the executable for `tool`, failing with
    /// [`Error::ToolNotInstalled`] if it is not on PATH.
    fn locate(&self, tool: Tool) -> Result<PathBuf>;

    /// Run `tool` with `args` and return its stdout.
    async fn run(&self, tool: Tool, args: Vec<String>) -> Result<Vec<u8>>;
}

// -----------------------------------------------------------------------------
// RealProcessRunner

/// Spawns real processes in a fixed working directory.
#[derive(Debug, Clone)]
pub struct RealProcessRunner {
    path: PathBuf,
    echo: bool,
}

impl RealProcessRunner {
    pub fn new(path: PathBuf) -> Self {
        Self { path, echo: false }
    }

    /// Echo each command (tool name only, not its full path) to stderr
    /// before running it.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

#[async_trait(?Send)]
impl ProcessRunner for RealProcessRunner {
    fn locate(&self, tool: Tool) -> Result<PathBuf> {
        which::which(tool.program()).map_err(|_| Error::ToolNotInstalled {
            tool,
            guidance: tool.install_guidance().to_string(),
        })
    }

    async fn run(&self, tool: Tool, args: Vec<String>) -> Result<Vec<u8>> {
        let exe = self.locate(tool)?;
        let shown = display_command(tool, &args);
        if self.echo {
            eprintln!("[{}]", shown);
        }
        debug!(command = %shown, "running");

        let output = Command::new(&exe)
            .current_dir(&self.path)
            .args(&args)
            .output()
            .await
            .map_err(|e| Error::ExternalCommand {
                tool,
                args: args.clone(),
                stderr: String::new(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::ExternalCommand {
                tool,
                args,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                reason: output.status.to_string(),
            });
        }

        Ok(output.stdout)
    }
}

/// Render a command line for diagnostics, hiding secret values.
pub fn display_command(tool: Tool, args: &[String]) -> String {
    let is_secret = args.first().map(String::as_str) == Some("secret");
    let mut shown = vec![tool.program().to_string()];
    let mut redact_next = false;
    for arg in args {
        if redact_next {
            shown.push("***".to_string());
            redact_next = false;
            continue;
        }
        redact_next = is_secret && (arg == "-b" || arg == "--body");
        shown.push(arg.clone());
    }
    shown.join(" ")
}
