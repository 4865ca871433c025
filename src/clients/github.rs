use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tracing::instrument;

use super::http::HttpClient;
use crate::error::Error;
use crate::error::Result;
use crate::poller::WorkflowRun;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

// -----------------------------------------------------------------------------
// Types

/// An `owner/repo` pair on GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinate {
    pub owner: String,
    pub repo: String,
}

/// A published release of the stack template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    #[serde(rename = "tag_name")]
    pub tag: String,
    pub created_at: DateTime<Utc>,
    /// `None` for drafts.
    pub published_at: Option<DateTime<Utc>>,
}

/// A commit and its immediate parents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitRef {
    pub sha: String,
    /// Web URL of the commit; appending `.patch` yields its mailbox patch.
    #[serde(rename = "html_url")]
    pub patch_url: String,
    pub parents: Vec<ParentRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParentRef {
    pub sha: String,
    #[serde(rename = "html_url")]
    pub patch_url: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowRuns {
    workflow_runs: Vec<WorkflowRun>,
}

/// Read-only GitHub operations used by the pipeline.
#[cfg_attr(test, automock)]
#[async_trait(?Send)]
pub trait GithubApi {
    /// Releases of `repo`, newest published first.
    async fn list_releases(&self, repo: &RepoCoordinate) -> Result<Vec<Release>>;

    /// The commit `reference` points at, with its first-degree parents.
    async fn get_commit(&self, repo: &RepoCoordinate, reference: &str) -> Result<CommitRef>;

    /// The most recent dispatched run of `workflow` on `branch` created at
    /// or after `since`, if one has registered.
    async fn latest_workflow_run(
        &self,
        repo: &RepoCoordinate,
        workflow: &str,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<WorkflowRun>>;

    /// A workflow run by id.
    async fn get_workflow_run(&self, repo: &RepoCoordinate, id: u64) -> Result<WorkflowRun>;

    /// Download `{source_url}.patch` to `dest`.
    async fn download_patch(&self, source_url: &str, dest: &Path) -> Result<()>;

    /// Download the CI workflow template `workflow` from the default branch
    /// of `repo` to `dest`.
    async fn download_workflow_template(
        &self,
        repo: &RepoCoordinate,
        workflow: &str,
        dest: &Path,
    ) -> Result<()>;
}

// -----------------------------------------------------------------------------
// RepoCoordinate impl

impl RepoCoordinate {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parse a git remote URL.
    ///
    /// Accepts `git@host:owner/repo.git`, `ssh://git@host/owner/repo.git`
    /// and `https://host/owner/repo(.git)`.
    pub fn from_remote_url(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        let path = match trimmed.split_once("://") {
            // Drop the authority, keep the path
            Some((_, rest)) => rest.split_once('/').map(|(_, path)| path),
            // scp-like syntax
            None => trimmed.split_once(':').map(|(_, path)| path),
        };
        let path = path.ok_or_else(|| Error::InvalidRemote(url.to_string()))?;

        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        path.parse()
            .map_err(|_| Error::InvalidRemote(url.to_string()))
    }
}

impl FromStr for RepoCoordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut split = s.split('/');
        match (split.next(), split.next(), split.next()) {
            (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
                Ok(Self::new(owner, repo))
            }
            _ => Err(Error::InvalidRemote(s.to_string())),
        }
    }
}

impl Display for RepoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Order releases newest published first. Drafts go last.
pub fn sort_releases(releases: &mut [Release]) {
    releases.sort_by(|a, b| b.published_at.cmp(&a.published_at));
}

// -----------------------------------------------------------------------------
// RealGithubApi

/// GitHub REST implementation.
pub struct RealGithubApi {
    http: HttpClient,
    api_base: String,
    raw_base: String,
}

impl RealGithubApi {
    pub fn new(http: HttpClient, api_base: &str, raw_base: &str) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
        }
    }

    fn repo_url(&self, repo: &RepoCoordinate) -> String {
        format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.repo)
    }
}

#[async_trait(?Send)]
impl GithubApi for RealGithubApi {
    #[instrument(skip_all, fields(repo = %repo))]
    async fn list_releases(&self, repo: &RepoCoordinate) -> Result<Vec<Release>> {
        let url = format!("{}/releases", self.repo_url(repo));
        let mut releases: Vec<Release> = self.http.get_json(&url, &[]).await?;
        sort_releases(&mut releases);
        Ok(releases)
    }

    #[instrument(skip_all, fields(repo = %repo, reference = %reference))]
    async fn get_commit(&self, repo: &RepoCoordinate, reference: &str) -> Result<CommitRef> {
        let url = format!("{}/commits/{}", self.repo_url(repo), reference);
        self.http.get_json(&url, &[]).await
    }

    #[instrument(skip_all, fields(repo = %repo, workflow = %workflow, branch = %branch))]
    async fn latest_workflow_run(
        &self,
        repo: &RepoCoordinate,
        workflow: &str,
        branch: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<WorkflowRun>> {
        let url = format!("{}/actions/workflows/{}/runs", self.repo_url(repo), workflow);
        let created = format!(">={}", since.to_rfc3339_opts(SecondsFormat::Secs, true));
        let query = [
            ("branch", branch),
            ("event", "workflow_dispatch"),
            ("created", created.as_str()),
            ("per_page", "1"),
        ];
        let runs: WorkflowRuns = self.http.get_json(&url, &query).await?;
        Ok(runs.workflow_runs.into_iter().next())
    }

    #[instrument(skip_all, fields(repo = %repo, id = id))]
    async fn get_workflow_run(&self, repo: &RepoCoordinate, id: u64) -> Result<WorkflowRun> {
        let url = format!("{}/actions/runs/{}", self.repo_url(repo), id);
        self.http.get_json(&url, &[]).await
    }

    #[instrument(skip_all, fields(source_url = %source_url))]
    async fn download_patch(&self, source_url: &str, dest: &Path) -> Result<()> {
        let url = format!("{}.patch", source_url);
        self.http.download(&url, dest).await
    }

    #[instrument(skip_all, fields(repo = %repo, workflow = %workflow))]
    async fn download_workflow_template(
        &self,
        repo: &RepoCoordinate,
        workflow: &str,
        dest: &Path,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/{}/main/.github/workflows/{}",
            self.raw_base, repo.owner, repo.repo, workflow
        );
        self.http.download(&url, dest).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;
    use crate::clients::http::DEFAULT_TIMEOUT;
    use crate::clients::http::test_server::serve_once;
    use crate::poller::RunStatus;

    fn api(base: &str) -> RealGithubApi {
        let http = HttpClient::new(None, DEFAULT_TIMEOUT).unwrap();
        RealGithubApi::new(http, base, base)
    }

    #[tokio::test]
    async fn test_latest_run_query_encodes_branch() {
        let (base, request) =
            serve_once("200 OK", r#"{"total_count": 0, "workflow_runs": []}"#).await;
        let since = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let run = api(&base)
            .latest_workflow_run(
                &RepoCoordinate::new("acme", "app"),
                "ci.yml",
                "v1.0.0+build.1",
                since,
            )
            .await
            .unwrap();
        assert_eq!(run, None);

        let request = request.await.unwrap();
        let request_line = request.lines().next().unwrap();
        assert_eq!(
            request_line,
            "GET /repos/acme/app/actions/workflows/ci.yml/runs?branch=v1.0.0%2Bbuild.1\
             &event=workflow_dispatch&created=%3E%3D2024-05-01T12%3A00%3A00Z&per_page=1 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_get_workflow_run_by_id() {
        let (base, request) = serve_once(
            "200 OK",
            r#"{"id": 17, "status": "completed", "conclusion": "success", "html_url": "https://github.com/acme/app/actions/runs/17"}"#,
        )
        .await;

        let run = api(&base)
            .get_workflow_run(&RepoCoordinate::new("acme", "app"), 17)
            .await
            .unwrap();
        assert_eq!(run.id, 17);
        assert_eq!(run.status, RunStatus::Completed);

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /repos/acme/app/actions/runs/17 "), "{request}");
    }

    #[test]
    fn test_parse_owner_repo() {
        let repo: RepoCoordinate = "acme/stack".parse().unwrap();
        assert_eq!(repo, RepoCoordinate::new("acme", "stack"));
        assert_eq!(repo.to_string(), "acme/stack");
    }

    #[test]
    fn test_parse_owner_repo_rejects_garbage() {
        assert!("acme".parse::<RepoCoordinate>().is_err());
        assert!("acme/".parse::<RepoCoordinate>().is_err());
        assert!("a/b/c".parse::<RepoCoordinate>().is_err());
    }

    #[test]
    fn test_from_remote_url() {
        let expected = RepoCoordinate::new("acme", "app");
        for url in [
            "git@github.com:acme/app.git",
            "git@github.com:acme/app",
            "https://github.com/acme/app.git",
            "https://github.com/acme/app\n",
            "ssh://git@github.com/acme/app.git",
        ] {
            assert_eq!(RepoCoordinate::from_remote_url(url).unwrap(), expected, "{url}");
        }
    }

    #[test]
    fn test_from_remote_url_keeps_trailing_git_letters() {
        // Only the literal ".git" suffix is stripped
        let repo = RepoCoordinate::from_remote_url("https://github.com/acme/widget").unwrap();
        assert_eq!(repo.repo, "widget");
    }

    #[test]
    fn test_from_remote_url_rejects_local_path() {
        let err = RepoCoordinate::from_remote_url("/srv/repos/app").unwrap_err();
        assert!(matches!(err, Error::InvalidRemote(_)));
    }

    #[test]
    fn test_decode_commit() {
        let json = r#"{
            "sha": "c0ffee",
            "node_id": "x",
            "html_url": "https://github.com/acme/stack/commit/c0ffee",
            "parents": [
                {"sha": "p1", "url": "https://api.github.com/repos/acme/stack/commits/p1",
                 "html_url": "https://github.com/acme/stack/commit/p1"}
            ]
        }"#;
        let commit: CommitRef = serde_json::from_str(json).unwrap();
        assert_eq!(commit.sha, "c0ffee");
        assert_eq!(commit.patch_url, "https://github.com/acme/stack/commit/c0ffee");
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.parents[0].patch_url, "https://github.com/acme/stack/commit/p1");
    }

    #[test]
    fn test_sort_releases_newest_first_drafts_last() {
        let json = r#"[
            {"tag_name": "v1", "created_at": "2024-01-01T00:00:00Z", "published_at": "2024-01-02T00:00:00Z"},
            {"tag_name": "draft", "created_at": "2024-04-01T00:00:00Z", "published_at": null},
            {"tag_name": "v3", "created_at": "2024-03-01T00:00:00Z", "published_at": "2024-03-02T00:00:00Z"},
            {"tag_name": "v2", "created_at": "2024-02-01T00:00:00Z", "published_at": "2024-02-02T00:00:00Z"}
        ]"#;
        let mut releases: Vec<Release> = serde_json::from_str(json).unwrap();
        sort_releases(&mut releases);
        let tags: Vec<_> = releases.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, ["v3", "v2", "v1", "draft"]);
    }
}
