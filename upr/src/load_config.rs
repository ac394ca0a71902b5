//! `load_config`: merges the optional YAML file with flags and environment, then validates the
//! result into the typed configs of `upr-core`.
//!
//! The file is flat: every key is named like its flag (`token`, `owner`, `uploads_bucket`, ...).
//! Flags and `UPR_*` environment variables override the file; empty values count as unset.
//!
//! Validation never stops at the first problem. Every missing key and every invalid value is
//! collected into one [`UsageError`] so the user can fix them all at once.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{error, info};
use upr_core::config::{
    BackendConfig, BackendKind, CommentConfig, CommitState, RepoRef, StatusConfig,
    DEFAULT_CONCURRENCY,
};
use upr_core::expiry::MAX_EXPIRE_DAYS;

use crate::github::{GitHubConfig, DEFAULT_API_URL};

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Raw, unvalidated settings. Numbers are kept as text until validation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(deserialize_with = "scalar")]
    pub commit: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub token: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub owner: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub repo: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub api_url: Option<String>,

    #[serde(deserialize_with = "scalar")]
    pub pr_num: Option<String>,
    #[serde(deserialize_with = "scalar", alias = "file")]
    pub comment_file: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub title: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_api: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_endpoint: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_region: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_identity: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_secret: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_bucket: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_expire: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub uploads_concurrency: Option<String>,

    #[serde(deserialize_with = "scalar")]
    pub state: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub desc: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub context: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub url: Option<String>,
}

/// Accept any YAML scalar as text so `pr_num: 3` and `pr_num: "3"` read the same.
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<serde_yaml::Value>::deserialize(deserializer)? {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a single value, got {other:?}"
        ))),
    }
}

fn set(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

macro_rules! overlay_fields {
    ($base:ident, $top:ident, $($field:ident),+ $(,)?) => {
        Settings {
            $($field: if set(&$top.$field).is_some() { $top.$field } else { $base.$field },)+
        }
    };
}

impl Settings {
    /// Read the settings file at `explicit`, or `./config.yaml` when it exists.
    ///
    /// An explicitly named file must exist; the implicit one is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Settings> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Settings::default());
                }
                default
            }
        };
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let content = fs::read_to_string(path).map_err(|e| {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            anyhow::anyhow!("Failed to read config file {:?}: {}", path, e)
        })?;
        let settings: Settings = serde_yaml::from_str::<Option<Settings>>(&content)
            .map_err(|e| {
                error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
                e
            })
            .with_context(|| format!("Failed to parse config file {path:?}"))?
            .unwrap_or_default();
        info!(config_path = ?path, "Using config file");
        Ok(settings)
    }

    /// Values set in `top` win over the ones in `self`.
    pub fn overlay(self, top: Settings) -> Settings {
        let base = self;
        overlay_fields!(
            base,
            top,
            commit,
            token,
            owner,
            repo,
            api_url,
            pr_num,
            comment_file,
            title,
            uploads,
            uploads_api,
            uploads_endpoint,
            uploads_region,
            uploads_identity,
            uploads_secret,
            uploads_bucket,
            uploads_expire,
            uploads_concurrency,
            state,
            desc,
            context,
            url,
        )
    }
}

/// Every missing key and invalid value found while validating [`Settings`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Error)]
pub struct UsageError {
    pub missing: Vec<String>,
    pub invalid: Vec<String>,
}

impl UsageError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }

    fn missing(&mut self, key: &str) {
        self.missing.push(key.to_string());
    }

    fn invalid(&mut self, message: impl Into<String>) {
        self.invalid.push(message.into());
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, UsageError> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.missing.is_empty() {
            writeln!(f, "MISSING REQUIRED FLAGS: {}", self.missing.join(", "))?;
        }
        for message in &self.invalid {
            writeln!(f, "ERROR: {message}")?;
        }
        Ok(())
    }
}

/// A validated invocation: GitHub access plus the subcommand config.
#[derive(Debug, Clone)]
pub struct Invocation<T> {
    pub github: GitHubConfig,
    pub config: T,
}

struct Common {
    github: GitHubConfig,
    repo: RepoRef,
}

fn common(settings: &Settings, usage: &mut UsageError) -> Common {
    let mut required = |key: &str, value: &Option<String>| match set(value) {
        Some(v) => v.to_string(),
        None => {
            usage.missing(key);
            String::new()
        }
    };
    let token = required("token", &settings.token);
    let owner = required("owner", &settings.owner);
    let repo = required("repo", &settings.repo);
    Common {
        github: GitHubConfig {
            token,
            api_url: set(&settings.api_url).unwrap_or(DEFAULT_API_URL).to_string(),
        },
        repo: RepoRef { owner, repo },
    }
}

fn joined<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn number<T: std::str::FromStr>(
    key: &str,
    value: &Option<String>,
    usage: &mut UsageError,
    what: &str,
) -> Option<T> {
    let raw = set(value)?;
    match raw.parse::<T>() {
        Ok(n) => Some(n),
        Err(_) => {
            usage.invalid(format!("The '{key}' flag must be {what}"));
            None
        }
    }
}

/// Validate the settings of `upr comment`.
pub fn comment_config(settings: &Settings) -> Result<Invocation<CommentConfig>, UsageError> {
    let mut usage = UsageError::default();
    let common = common(settings, &mut usage);

    let pr_num = number::<u64>("pr_num", &settings.pr_num, &mut usage, "a positive integer")
        .filter(|n| {
            if *n == 0 {
                usage.invalid("The 'pr_num' flag must be a positive integer");
            }
            *n > 0
        });
    let commit = set(&settings.commit).map(str::to_string);
    if commit.is_none() && set(&settings.pr_num).is_none() {
        usage.missing("(commit || pr_num)");
    }
    let comment_file = match set(&settings.comment_file) {
        Some(path) => PathBuf::from(path),
        None => {
            usage.missing("comment_file");
            PathBuf::new()
        }
    };

    let uploads = set(&settings.uploads).map(str::to_string);
    let backend = match uploads {
        Some(_) => backend_config(settings, &mut usage),
        None => None,
    };

    let title = set(&settings.title).map(str::to_string);
    usage.into_result(|| Invocation {
        github: common.github,
        config: CommentConfig {
            repo: common.repo,
            commit,
            pr_num,
            title,
            comment_file,
            uploads,
            backend,
        },
    })
}

fn backend_config(settings: &Settings, usage: &mut UsageError) -> Option<BackendConfig> {
    let api = set(&settings.uploads_api);
    let endpoint = set(&settings.uploads_endpoint);
    let bucket = set(&settings.uploads_bucket);
    let region = set(&settings.uploads_region).map(str::to_string);
    let identity = set(&settings.uploads_identity).map(str::to_string);
    let secret = set(&settings.uploads_secret).map(str::to_string);

    if api.is_none() {
        usage.missing("uploads_api");
    }
    if endpoint.is_none() {
        usage.missing("uploads_endpoint");
    }
    if bucket.is_none() {
        usage.missing("uploads_bucket");
    }

    let kind = api.unwrap_or_default().parse::<BackendKind>().ok();
    match kind {
        None => usage.invalid(format!(
            "The 'uploads_api' flag must be one of: {}",
            joined(&BackendKind::ALL)
        )),
        Some(BackendKind::Swift) => {
            if identity.is_none() {
                usage.missing("uploads_identity");
            }
            if secret.is_none() {
                usage.missing("uploads_secret");
            }
            if identity.as_deref().is_some_and(|id| !id.contains(':')) {
                usage.invalid(format!(
                    "The 'uploads_identity' flag for '{}' is formatted as 'tenant:username'",
                    BackendKind::Swift
                ));
            }
        }
        Some(BackendKind::S3) => {
            if region.is_none() {
                usage.missing("uploads_region");
                usage.invalid(format!(
                    "The 'uploads_region' flag is required when using the '{}' api for 'uploads'",
                    BackendKind::S3
                ));
            }
        }
    }

    let expire_days = match number::<u32>(
        "uploads_expire",
        &settings.uploads_expire,
        usage,
        "a non-negative number of days",
    ) {
        Some(days) if days > MAX_EXPIRE_DAYS => {
            usage.invalid(format!(
                "The 'uploads_expire' flag must be at most {MAX_EXPIRE_DAYS} days"
            ));
            0
        }
        Some(days) => days,
        None => 0,
    };
    let concurrency = match number::<usize>(
        "uploads_concurrency",
        &settings.uploads_concurrency,
        usage,
        "a positive integer",
    ) {
        Some(0) => {
            usage.invalid("The 'uploads_concurrency' flag must be a positive integer");
            DEFAULT_CONCURRENCY
        }
        Some(n) => n,
        None => DEFAULT_CONCURRENCY,
    };

    Some(BackendConfig {
        kind: kind?,
        endpoint: endpoint?.to_string(),
        region,
        identity,
        secret,
        bucket: bucket?.to_string(),
        expire_days,
        concurrency,
    })
}

/// Validate the settings of `upr status`.
pub fn status_config(settings: &Settings) -> Result<Invocation<StatusConfig>, UsageError> {
    let mut usage = UsageError::default();
    let common = common(settings, &mut usage);

    let commit = set(&settings.commit).map(str::to_string);
    if commit.is_none() {
        usage.missing("commit");
    }
    let state_raw = set(&settings.state);
    if state_raw.is_none() {
        usage.missing("state");
    }
    let context = set(&settings.context).map(str::to_string);
    if context.is_none() {
        usage.missing("context");
    }
    let state = state_raw.and_then(|raw| match raw.parse::<CommitState>() {
        Ok(state) => Some(state),
        Err(_) => {
            usage.invalid(format!(
                "The 'state' flag must be one of: {}",
                joined(&CommitState::ALL)
            ));
            None
        }
    });

    let description = set(&settings.desc).map(str::to_string);
    let target_url = set(&settings.url).map(str::to_string);
    match (commit, state, context) {
        (Some(commit), Some(state), Some(context)) if usage.is_empty() => Ok(Invocation {
            github: common.github,
            config: StatusConfig {
                repo: common.repo,
                commit,
                state,
                description,
                context,
                target_url,
            },
        }),
        _ => Err(usage),
    }
}
