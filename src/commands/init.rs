use anyhow::Result;
use dialoguer::Input;

use crate::clients::git::GitClient;
use crate::clients::github::RepoCoordinate;
use crate::clients::process::ProcessRunner;
use crate::config::Config;
use crate::config::DEFAULT_WORKFLOW;

/// Values given on the command line. Anything missing is prompted for.
#[derive(Debug, Default)]
pub struct InitOptions {
    pub upstream: Option<RepoCoordinate>,
    pub workflow: Option<String>,
    pub branch_prefix: Option<String>,
}

/// Store the upstream, workflow and branch prefix in .git/config.
///
/// Runs before an [`crate::App`] can be built, since the app needs an
/// upstream.
pub async fn cmd_init<R: ProcessRunner>(
    git: &GitClient<R>,
    options: InitOptions,
    stdout: &mut impl std::io::Write,
) -> Result<Config> {
    git.ensure_installed()?;
    let current = Config::load(git, None).await.ok();

    let upstream = match options.upstream {
        Some(upstream) => upstream,
        None => {
            let mut input = Input::<String>::new()
                .with_prompt("Stack template repository (owner/repo)")
                .validate_with(|s: &String| -> Result<(), String> {
                    s.parse::<RepoCoordinate>()
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                });
            if let Some(current) = &current {
                input = input.default(current.upstream.to_string());
            }
            input.interact_text()?.parse()?
        }
    };

    let workflow = match options.workflow {
        Some(workflow) => workflow,
        None => Input::<String>::new()
            .with_prompt("CI workflow file")
            .default(
                current
                    .as_ref()
                    .map_or(DEFAULT_WORKFLOW.to_string(), |c| c.workflow.clone()),
            )
            .interact_text()?,
    };

    let branch_prefix = match options.branch_prefix {
        Some(prefix) => prefix,
        None => Input::<String>::new()
            .with_prompt("Migration branch prefix")
            .allow_empty(true)
            .default(
                current
                    .as_ref()
                    .map(|c| c.branch_prefix.clone())
                    .unwrap_or_default(),
            )
            .interact_text()?,
    };

    let mut config = Config::new(upstream);
    config.workflow = workflow;
    config.branch_prefix = branch_prefix;
    config.save(git).await?;

    writeln!(stdout, "Configuration saved to .git/config")?;
    Ok(config)
}
