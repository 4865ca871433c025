use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use tracing::instrument;

use crate::clients::git::GitClient;
use crate::clients::github::Release;
use crate::clients::github::RepoCoordinate;
use crate::clients::process::ProcessRunner;
use crate::error::Error;
use crate::error::Result;
use crate::patch_set::PatchSet;

/// Characters git refuses in branch names, plus whitespace.
static INVALID_REF_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s~^:?*\[\\]+|\.\.+|@\{").unwrap());

// -----------------------------------------------------------------------------
// Types

/// State of one migration run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    pub current_tag: String,
    pub target_tag: String,
    pub branch_name: String,
    pub patch_set: PatchSet,
}

/// What a run should do given the published releases.
#[derive(Debug, PartialEq, Eq)]
pub enum Plan {
    UpToDate { tag: String },
    Migrate(MigrationState),
}

// -----------------------------------------------------------------------------
// Planning

/// The release to migrate to: the newest published one.
///
/// `releases` must already be ordered newest first.
pub fn select_target(releases: &[Release]) -> Option<&Release> {
    releases.iter().find(|r| r.published_at.is_some())
}

/// Migration branch for `tag`.
pub fn branch_name(prefix: &str, tag: &str) -> String {
    let name = format!("{}{}", prefix, tag);
    INVALID_REF_CHARS.replace_all(&name, "-").into_owned()
}

impl Plan {
    pub fn new(
        upstream: &RepoCoordinate,
        releases: &[Release],
        current_tag: &str,
        branch_prefix: &str,
    ) -> Result<Self> {
        let target =
            select_target(releases).ok_or_else(|| Error::NoReleases(upstream.to_string()))?;

        if !releases.iter().any(|r| r.tag == current_tag) {
            return Err(Error::UnknownRelease {
                repo: upstream.to_string(),
                tag: current_tag.to_string(),
            });
        }

        if target.tag == current_tag {
            return Ok(Self::UpToDate {
                tag: current_tag.to_string(),
            });
        }

        Ok(Self::Migrate(MigrationState {
            current_tag: current_tag.to_string(),
            target_tag: target.tag.clone(),
            branch_name: branch_name(branch_prefix, &target.tag),
            patch_set: PatchSet::default(),
        }))
    }
}

// -----------------------------------------------------------------------------
// Applying

/// Apply every patch in order with `git am`.
///
/// Stops at the first failure. Patches before it stay applied unless
/// `reset_on_failure` is set, in which case the branch is reset to
/// `snapshot` first.
#[instrument(skip(git, patch_set), fields(patches = patch_set.len()))]
pub async fn apply_patches<R: ProcessRunner>(
    git: &GitClient<R>,
    patch_set: &PatchSet,
    snapshot: &str,
    reset_on_failure: bool,
) -> Result<()> {
    for entry in patch_set.entries() {
        let Err(e) = git.apply_patch(&entry.local_path).await else {
            continue;
        };

        if reset_on_failure {
            if let Err(abort) = git.abort_apply().await {
                warn!("git am --abort failed: {}", abort);
            }
            if let Err(reset) = git.reset_hard(snapshot).await {
                warn!("Failed to reset branch to {}: {}", snapshot, reset);
            }
        }

        return Err(Error::PartialApply {
            index: entry.sequence_index,
            patch: entry.local_path.clone(),
            source: Box::new(e),
        });
    }
    Ok(())
}
