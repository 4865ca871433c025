use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use anyhow::bail;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use dialoguer::Password;
use secrecy::SecretString;
use stackup::App;
use stackup::Config;
use stackup::clients::git::GitClient;
use stackup::clients::github::RealGithubApi;
use stackup::clients::github::RepoCoordinate;
use stackup::clients::http::HttpClient;
use stackup::clients::process::RealProcessRunner;
use stackup::commands::init::InitOptions;
use stackup::commands::init::cmd_init;
use stackup::commands::migrate::MigrationOutcome;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Parser)]
#[command(name = "stackup")]
#[command(about = "Migrate a repository to the latest release of its stack template", long_about = None)]
pub struct Cli {
    /// Echo every git and gh command before running it
    #[arg(
        long,
        global = true,
        env = "DEBUG",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct UpstreamArgs {
    /// Stack template repository as owner/repo (overrides .git/config)
    #[arg(long)]
    pub upstream: Option<RepoCoordinate>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Store the upstream repository and workflow in .git/config
    Init {
        #[command(flatten)]
        upstream: UpstreamArgs,
        /// CI workflow file name
        #[arg(long)]
        workflow: Option<String>,
        /// Prefix for migration branch names
        #[arg(long)]
        branch_prefix: Option<String>,
    },
    /// List upstream releases, newest first
    Releases {
        #[command(flatten)]
        upstream: UpstreamArgs,
    },
    /// Migrate to the newest upstream release and open a pull request
    Migrate {
        /// Release tag the repository is on now
        #[arg(long)]
        current: String,
        #[command(flatten)]
        upstream: UpstreamArgs,
        /// CI workflow file name (overrides .git/config)
        #[arg(long)]
        workflow: Option<String>,
        /// GitHub token, stored as a repository secret for the workflow
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Prefix for the migration branch name (overrides .git/config)
        #[arg(long)]
        branch_prefix: Option<String>,
        /// Seconds between workflow run status reads
        #[arg(long, default_value_t = 20)]
        poll_interval_secs: u64,
        /// Give up waiting on the run after this many seconds; 0 waits forever
        #[arg(long, default_value_t = 3600)]
        max_wait_secs: u64,
        /// Reset the branch to where it started if a patch fails to apply
        #[arg(long)]
        reset_on_failure: bool,
        /// Also commit the upstream workflow template onto the branch
        #[arg(long)]
        install_workflow: bool,
    },
}

fn setup_logging() -> Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}

/// Token from the command line or environment, else prompt for one.
fn resolve_token(token: Option<String>) -> Result<SecretString> {
    let token = match token {
        Some(token) => token,
        None => Password::new()
            .with_prompt("GitHub token (stored as a repository secret)")
            .interact()?,
    };
    Ok(SecretString::from(token))
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;
    let cli = Cli::parse();

    let cwd = std::env::current_dir()?;
    let runner = RealProcessRunner::new(cwd).with_echo(cli.debug);

    match cli.command {
        Commands::Init {
            upstream,
            workflow,
            branch_prefix,
        } => {
            let git = GitClient::new(Rc::new(runner));
            let options = InitOptions {
                upstream: upstream.upstream,
                workflow,
                branch_prefix,
            };
            cmd_init(&git, options, &mut std::io::stdout()).await?;
        }
        Commands::Releases { upstream } => {
            let git = GitClient::new(Rc::new(runner.clone()));
            let config = Config::load(&git, upstream.upstream).await?;
            let http = HttpClient::new(None, config.http_timeout)?;
            let api = RealGithubApi::new(http, &config.api_base, &config.raw_base);
            App::new(config, runner, api)
                .cmd_releases(&mut std::io::stdout())
                .await?;
        }
        Commands::Migrate {
            current,
            upstream,
            workflow,
            token,
            branch_prefix,
            poll_interval_secs,
            max_wait_secs,
            reset_on_failure,
            install_workflow,
        } => {
            let token = resolve_token(token)?;

            let git = GitClient::new(Rc::new(runner.clone()));
            let mut config = Config::load(&git, upstream.upstream).await?;
            if let Some(workflow) = workflow {
                config.workflow = workflow;
            }
            if let Some(prefix) = branch_prefix {
                config.branch_prefix = prefix;
            }
            config.poll_interval = Duration::from_secs(poll_interval_secs);
            config.max_wait = (max_wait_secs > 0).then(|| Duration::from_secs(max_wait_secs));
            config.reset_on_failure = reset_on_failure;
            config.install_workflow = install_workflow;

            let http = HttpClient::new(Some(token.clone()), config.http_timeout)?;
            let api = RealGithubApi::new(http, &config.api_base, &config.raw_base);

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let app = App::new(config, runner, api).with_cancellation(cancel);
            let outcome = app
                .cmd_migrate(&current, Some(&token), &mut std::io::stdout())
                .await?;
            match outcome {
                MigrationOutcome::RunFailed { branch, conclusion } => {
                    bail!("Workflow run on {} finished with {}", branch, conclusion)
                }
                MigrationOutcome::PullRequestFailed { branch } => {
                    bail!("Could not open a pull request for {}", branch)
                }
                MigrationOutcome::UpToDate { .. } | MigrationOutcome::PullRequestOpened { .. } => {}
            }
        }
    }

    Ok(())
}
