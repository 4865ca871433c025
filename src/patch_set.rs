use std::path::Path;
use std::path::PathBuf;
use std::sync::LazyLock;

use futures_util::future::try_join_all;
use log::warn;
use regex::Regex;
use tracing::instrument;

use crate::clients::github::CommitRef;
use crate::clients::github::GithubApi;
use crate::error::Result;

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\\:\s]+|\.\.+").unwrap());

// -----------------------------------------------------------------------------
// Types

/// One patch in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSetEntry {
    /// Position in application order; 0 is applied first.
    pub sequence_index: usize,
    pub source_url: String,
    pub local_path: PathBuf,
}

/// The patches that move a repository to a release, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    entries: Vec<PatchSetEntry>,
}

// -----------------------------------------------------------------------------
// PatchSet impl

impl PatchSet {
    /// Build the patch set for a release commit.
    ///
    /// The API lists the tag commit followed by its parents, newest first.
    /// Only first-degree parents are taken. The list is reversed so the last
    /// parent is applied first and the tag commit's own patch is applied
    /// last.
    pub fn build(commit: &CommitRef, target_tag: &str, dir: &Path) -> Self {
        let newest_first = std::iter::once(&commit.patch_url)
            .chain(commit.parents.iter().map(|p| &p.patch_url));

        let entries = newest_first
            .rev()
            .enumerate()
            .map(|(sequence_index, url)| PatchSetEntry {
                sequence_index,
                source_url: url.clone(),
                local_path: dir.join(patch_file_name(target_tag, sequence_index)),
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[PatchSetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn local_paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.local_path.as_path()).collect()
    }

    /// Download every patch. Downloads run concurrently; the first failure
    /// cancels the rest and is returned.
    #[instrument(skip_all, fields(patches = self.entries.len()))]
    pub async fn download<A: GithubApi>(&self, api: &A) -> Result<()> {
        try_join_all(
            self.entries
                .iter()
                .map(|entry| api.download_patch(&entry.source_url, &entry.local_path)),
        )
        .await?;
        Ok(())
    }

    /// Remove the downloaded patch files. Failures are only logged.
    pub async fn remove_files(&self) -> usize {
        let mut removed = 0;
        for path in self.local_paths() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        removed
    }
}

/// File name for the patch at `sequence_index` of `tag`.
///
/// Path separators and `..` in the tag are replaced so the file always
/// lands directly in the patch directory.
pub fn patch_file_name(tag: &str, sequence_index: usize) -> String {
    let stem = UNSAFE_FILE_CHARS.replace_all(tag, "-");
    format!("{}-{}.patch", stem, sequence_index)
}
