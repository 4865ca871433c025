use colored::Colorize;

use crate::App;
use crate::clients::github::GithubApi;
use crate::clients::process::ProcessRunner;
use crate::migration::select_target;

impl<R: ProcessRunner, A: GithubApi> App<R, A> {
    /// List upstream releases newest first, marking the migration target.
    pub async fn cmd_releases(&self, stdout: &mut impl std::io::Write) -> anyhow::Result<()> {
        let releases = self.api.list_releases(&self.config.upstream).await?;
        if releases.is_empty() {
            writeln!(stdout, "{} has no releases", self.config.upstream)?;
            return Ok(());
        }

        let target = select_target(&releases).map(|r| r.tag.as_str());
        let width = releases.iter().map(|r| r.tag.len()).max().unwrap_or(0);
        for release in &releases {
            let date = match release.published_at {
                Some(at) => at.format("%Y-%m-%d").to_string(),
                None => "draft".dimmed().to_string(),
            };
            let line = format!("{:<width$}  {}", release.tag, date, width = width);
            if Some(release.tag.as_str()) == target {
                writeln!(stdout, "{}  {}", line, "latest".green())?;
            } else {
                writeln!(stdout, "{}", line)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use chrono::Utc;

    use crate::App;
    use crate::Config;
    use crate::clients::github::MockGithubApi;
    use crate::clients::github::Release;
    use crate::clients::process::MockProcessRunner;

    fn release(tag: &str, day: Option<u32>) -> Release {
        let at = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        Release {
            tag: tag.to_string(),
            created_at: at(day.unwrap_or(1)),
            published_at: day.map(at),
        }
    }

    #[tokio::test]
    async fn test_releases_marks_latest() {
        let mut api = MockGithubApi::new();
        api.expect_list_releases().times(1).returning(|_| {
            Ok(vec![
                release("v10", Some(10)),
                release("v9", Some(9)),
                release("v11-rc", None),
            ])
        });
        let app = App::new(Config::default_for_tests(), MockProcessRunner::new(), api);

        let mut out = Vec::new();
        app.cmd_releases(&mut out).await.unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r"
        v10     2024-01-10  latest
        v9      2024-01-09
        v11-rc  draft
        ");
    }

    #[tokio::test]
    async fn test_releases_empty() {
        let mut api = MockGithubApi::new();
        api.expect_list_releases().returning(|_| Ok(Vec::new()));
        let app = App::new(Config::default_for_tests(), MockProcessRunner::new(), api);

        let mut out = Vec::new();
        app.cmd_releases(&mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "acme/stack has no releases\n");
    }
}
