use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::clients::process::Tool;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the migration pipeline.
///
/// Every variant aborts the stage that raised it. Nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to find {tool} executable in PATH; please install {guidance} before retrying")]
    ToolNotInstalled { tool: Tool, guidance: String },

    #[error("{}{} {}: {}", stderr_prefix(.stderr), .tool, .args.join(" "), .reason)]
    ExternalCommand {
        tool: Tool,
        args: Vec<String>,
        stderr: String,
        reason: String,
    },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "patch {} ({}) failed to apply; patches before it remain applied on the branch",
        .index,
        .patch.display()
    )]
    PartialApply {
        index: usize,
        patch: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("branch {0} already exists")]
    BranchExists(String),

    #[error("working tree has uncommitted changes; commit or stash them first")]
    DirtyWorkingTree,

    #[error("no published releases found for {0}")]
    NoReleases(String),

    #[error("release {tag} is not published by {repo}")]
    UnknownRelease { repo: String, tag: String },

    #[error("cannot parse repository from {0:?}")]
    InvalidRemote(String),

    #[error("workflow run did not complete within {}s", .0.as_secs())]
    PollTimeout(Duration),

    #[error("cancelled while waiting for the workflow run")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn stderr_prefix(stderr: &str) -> String {
    if stderr.is_empty() || stderr.ends_with('\n') {
        stderr.to_string()
    } else {
        format!("{stderr}\n")
    }
}
