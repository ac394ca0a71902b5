use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, info};

use crate::contract::StoreError;

/// Number of parallel upload workers when none is configured.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Repository coordinates on the source-hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// The two object store integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    S3,
    Swift,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::S3, BackendKind::Swift];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::S3 => "s3",
            BackendKind::Swift => "swift",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(BackendKind::S3),
            "swift" => Ok(BackendKind::Swift),
            other => Err(format!("unknown uploads api '{other}'")),
        }
    }
}

/// Resolved object store settings. Validated before any network call.
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: String,
    /// Required for S3; selects the catalog region for Swift when set.
    pub region: Option<String>,
    /// S3 access key id, or `tenant:username` for Swift.
    pub identity: Option<String>,
    pub secret: Option<String>,
    pub bucket: String,
    /// Days to keep uploads; 0 keeps them forever.
    pub expire_days: u32,
    pub concurrency: usize,
}

impl BackendConfig {
    /// Split a Swift identity of the form `tenant:username`.
    pub fn swift_identity(&self) -> Result<(String, String), StoreError> {
        let identity = self.identity.as_deref().unwrap_or_default();
        match identity.split_once(':') {
            Some((tenant, username)) if !username.is_empty() => {
                Ok((tenant.to_string(), username.to_string()))
            }
            _ => Err(StoreError::Config(format!(
                "the 'uploads_identity' flag for '{}' is formatted as 'tenant:username'",
                BackendKind::Swift
            ))),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            api = %self.kind,
            endpoint = %self.endpoint,
            bucket = %self.bucket,
            expire_days = self.expire_days,
            concurrency = self.concurrency,
            "Loaded uploads backend config"
        );
    }
}

// Keeps the secret out of logs.
impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("identity", &self.identity)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("bucket", &self.bucket)
            .field("expire_days", &self.expire_days)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

/// Everything `upr comment` needs.
#[derive(Debug, Clone)]
pub struct CommentConfig {
    pub repo: RepoRef,
    pub commit: Option<String>,
    pub pr_num: Option<u64>,
    pub title: Option<String>,
    pub comment_file: PathBuf,
    /// Comma separated list of files or directories to upload.
    pub uploads: Option<String>,
    /// Present exactly when `uploads` is.
    pub backend: Option<BackendConfig>,
}

impl CommentConfig {
    pub fn trace_loaded(&self) {
        info!(
            owner = %self.repo.owner,
            repo = %self.repo.repo,
            commit = self.commit.as_deref().unwrap_or("-"),
            pr_num = ?self.pr_num,
            comment_file = %self.comment_file.display(),
            uploads = self.uploads.is_some(),
            "Loaded comment config"
        );
        if let Some(backend) = &self.backend {
            backend.trace_loaded();
        }
        debug!(?self, "Comment config loaded (full debug)");
    }
}

/// Commit status states accepted by the hosting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Pending,
    Success,
    Failure,
    Error,
}

impl CommitState {
    pub const ALL: [CommitState; 4] = [
        CommitState::Pending,
        CommitState::Success,
        CommitState::Failure,
        CommitState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        CommitState::ALL
            .into_iter()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| format!("unknown state '{s}'"))
    }
}

/// Everything `upr status` needs.
#[derive(Debug, Clone)]
pub struct StatusConfig {
    pub repo: RepoRef,
    pub commit: String,
    pub state: CommitState,
    pub description: Option<String>,
    pub context: String,
    pub target_url: Option<String>,
}

impl StatusConfig {
    pub fn trace_loaded(&self) {
        info!(
            owner = %self.repo.owner,
            repo = %self.repo.repo,
            commit = %self.commit,
            state = %self.state,
            context = %self.context,
            "Loaded status config"
        );
    }
}
