//! # upr CLI interface
//!
//! Command parsing and orchestration only. Settings are merged and validated by
//! [`crate::load_config`], GitHub is reached through [`crate::github`], and all pipeline logic
//! lives in `upr-core`.
//!
//! Every flag can also be set through an `UPR_<FLAG>` environment variable or a key of the same
//! name in the YAML config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use upr_core::contract::ObjectStore;
use upr_core::expiry::ExpiryPolicy;
use upr_core::pipeline;
use upr_core::store::LazyStore;

use crate::github::GitHubClient;
use crate::load_config::{comment_config, status_config, Settings, UsageError};

/// Post commit statuses and pull request comments on GitHub from CI.
#[derive(Parser, Debug)]
#[command(
    name = "upr",
    version,
    about = "Manipulate pull requests on GitHub",
    long_about = "A command line tool to manipulate pull requests on GitHub.\n\n\
                  Designed to be run from CI to update the status of a commit or to comment \
                  on its pull requests, optionally uploading build artifacts."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Config file (default is ./config.yaml)
    #[arg(long, global = true, env = "UPR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Commit you are working with
    #[arg(short = 'c', long, global = true, env = "UPR_COMMIT")]
    pub commit: Option<String>,

    /// Required: GitHub access token
    #[arg(long, global = true, env = "UPR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Required: owner of the repo you are working with
    #[arg(long, global = true, env = "UPR_OWNER")]
    pub owner: Option<String>,

    /// Required: name of the repo you are working with
    #[arg(long, global = true, env = "UPR_REPO")]
    pub repo: Option<String>,

    /// GitHub API base URL (default is https://api.github.com)
    #[arg(long = "api-url", global = true, env = "UPR_API_URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Comment on the pull requests of a commit, optionally uploading files
    Comment(CommentArgs),
    /// Add or update the status of a commit
    Status(StatusArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct CommentArgs {
    /// Required unless 'commit' is set: pull request number to comment on
    #[arg(short = 'n', long = "pr_num", env = "UPR_PR_NUM")]
    pub pr_num: Option<String>,

    /// Required: file which holds the comment text
    #[arg(short = 'f', long = "comment_file", env = "UPR_COMMENT_FILE")]
    pub comment_file: Option<String>,

    /// The title of the comment
    #[arg(short = 't', long, env = "UPR_TITLE")]
    pub title: Option<String>,

    /// Comma separated list of files or directories to be recursively uploaded
    #[arg(short = 'u', long, env = "UPR_UPLOADS")]
    pub uploads: Option<String>,

    /// Required if 'uploads' is set: object store api (s3 | swift)
    #[arg(long = "uploads_api", env = "UPR_UPLOADS_API")]
    pub uploads_api: Option<String>,

    /// Required if 'uploads' is set: object store url endpoint
    #[arg(long = "uploads_endpoint", env = "UPR_UPLOADS_ENDPOINT")]
    pub uploads_endpoint: Option<String>,

    /// s3: required region; swift: optional catalog region
    #[arg(long = "uploads_region", env = "UPR_UPLOADS_REGION")]
    pub uploads_region: Option<String>,

    /// s3: access key id (falls back to the AWS credential chain); swift: 'tenant:username'
    #[arg(long = "uploads_identity", env = "UPR_UPLOADS_IDENTITY")]
    pub uploads_identity: Option<String>,

    /// s3: secret access key (falls back to the AWS credential chain); swift: password
    #[arg(
        long = "uploads_secret",
        env = "UPR_UPLOADS_SECRET",
        hide_env_values = true
    )]
    pub uploads_secret: Option<String>,

    /// Required if 'uploads' is set: bucket to upload the files to (will be made public)
    #[arg(short = 'b', long = "uploads_bucket", env = "UPR_UPLOADS_BUCKET")]
    pub uploads_bucket: Option<String>,

    /// Number of days to keep the uploaded files before they are removed (0 keeps them)
    #[arg(short = 'e', long = "uploads_expire", env = "UPR_UPLOADS_EXPIRE")]
    pub uploads_expire: Option<String>,

    /// Number of files to be uploaded concurrently [default: 4]
    #[arg(long = "uploads_concurrency", env = "UPR_UPLOADS_CONCURRENCY")]
    pub uploads_concurrency: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct StatusArgs {
    /// Required: commit state (pending | success | failure | error)
    #[arg(short = 's', long, env = "UPR_STATE")]
    pub state: Option<String>,

    /// A short description of the status
    #[arg(short = 'd', long, env = "UPR_DESC")]
    pub desc: Option<String>,

    /// Required: the contextual identifier for this status
    #[arg(short = 'x', long, env = "UPR_CONTEXT")]
    pub context: Option<String>,

    /// A reference url for more information about this status
    #[arg(short = 'u', long, env = "UPR_URL")]
    pub url: Option<String>,
}

impl GlobalArgs {
    fn settings(&self) -> Settings {
        Settings {
            commit: self.commit.clone(),
            token: self.token.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            api_url: self.api_url.clone(),
            ..Settings::default()
        }
    }
}

impl CommentArgs {
    fn settings(&self, global: &GlobalArgs) -> Settings {
        Settings {
            pr_num: self.pr_num.clone(),
            comment_file: self.comment_file.clone(),
            title: self.title.clone(),
            uploads: self.uploads.clone(),
            uploads_api: self.uploads_api.clone(),
            uploads_endpoint: self.uploads_endpoint.clone(),
            uploads_region: self.uploads_region.clone(),
            uploads_identity: self.uploads_identity.clone(),
            uploads_secret: self.uploads_secret.clone(),
            uploads_bucket: self.uploads_bucket.clone(),
            uploads_expire: self.uploads_expire.clone(),
            uploads_concurrency: self.uploads_concurrency.clone(),
            ..global.settings()
        }
    }
}

impl StatusArgs {
    fn settings(&self, global: &GlobalArgs) -> Settings {
        Settings {
            state: self.state.clone(),
            desc: self.desc.clone(),
            context: self.context.clone(),
            url: self.url.clone(),
            ..global.settings()
        }
    }
}

/// Print the usage problems followed by the subcommand help.
fn report_usage(subcommand: &str, usage: &UsageError) {
    println!("\n{usage}");
    let mut command = Cli::command();
    if let Some(sub) = command.find_subcommand_mut(subcommand) {
        let _ = sub.print_help();
    }
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let file = Settings::load(cli.global.config.as_deref())?;

    match cli.command {
        Commands::Comment(args) => {
            let settings = file.overlay(args.settings(&cli.global));
            let invocation = comment_config(&settings).map_err(|usage| {
                report_usage("comment", &usage);
                usage
            })?;
            let config = invocation.config;
            config.trace_loaded();
            tracing::info!(command = "comment", "Starting comment");

            let github = GitHubClient::new(&invocation.github)?;
            // Connecting waits until a pull request and files to upload are known.
            let (store, expires_at): (Option<Arc<dyn ObjectStore>>, _) = match &config.backend {
                Some(backend) => {
                    let expires_at = ExpiryPolicy::new(backend.expire_days).expires_from_now();
                    let store = LazyStore::new(backend.clone(), expires_at);
                    (Some(Arc::new(store)), expires_at)
                }
                None => (None, None),
            };

            match pipeline::publish_comment(&config, &github, store, expires_at).await {
                Ok(outcome) => {
                    tracing::info!(command = "comment", ?outcome, "Finished commenting on pull request(s)");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "comment", error = %e, "Commenting failed");
                    Err(e.into())
                }
            }
        }
        Commands::Status(args) => {
            let settings = file.overlay(args.settings(&cli.global));
            let invocation = status_config(&settings).map_err(|usage| {
                report_usage("status", &usage);
                usage
            })?;
            invocation.config.trace_loaded();

            let github = GitHubClient::new(&invocation.github)?;
            match pipeline::publish_status(&invocation.config, &github).await {
                Ok(()) => {
                    tracing::info!(command = "status", "Successfully updated the status");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "status", error = %e, "Updating the status failed");
                    Err(e.into())
                }
            }
        }
    }
}
