//! # contract: seams between the pipeline and the outside world
//!
//! The pipeline talks to two external systems:
//! - an object store holding uploaded artifacts ([`ObjectStore`], implemented by the
//!   S3 and Swift backends in [`crate::store`]);
//! - the source-hosting service that owns pull requests, comments and commit
//!   statuses ([`SourceHost`], implemented by the GitHub client in the `upr` crate).
//!
//! Both traits are annotated for `mockall` so the scheduler, resolver and pipelines can be
//! exercised deterministically in tests. Enable the default `test-export-mocks` feature to
//! get `MockObjectStore` / `MockSourceHost` from outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Object store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("bucket '{bucket}': {message}")]
    Bucket { bucket: String, message: String },

    #[error("upload of '{key}' failed: {message}")]
    Upload { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability set shared by every object store backend.
///
/// A backend is bound to one bucket (and one expiry instant, if any) when it is
/// constructed, so the capabilities take no bucket argument.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket unless it already exists. Calling it on an existing bucket is a no-op.
    async fn ensure_bucket(&self) -> StoreResult<()>;

    /// Make every object in the bucket publicly readable.
    async fn make_public(&self) -> StoreResult<()>;

    /// Arrange for objects written under the expiring prefix to be purged at the expiry instant.
    async fn configure_expiry(&self) -> StoreResult<()>;

    /// Upload `body` under `key` and return the public URL of the stored object.
    ///
    /// The file handle is consumed and released once the attempt finishes.
    async fn put_object(&self, key: &str, body: tokio::fs::File) -> StoreResult<String>;
}

/// Source-hosting API failures.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// An open pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub title: Option<String>,
}

/// A commit listed on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Commit {
    pub sha: String,
}

/// Body of a commit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitStatus {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

/// The subset of the source-hosting API the pipelines use.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// List every open pull request in the repository.
    async fn list_pull_requests(&self, owner: &str, repo: &str)
        -> Result<Vec<PullRequest>, HostError>;

    /// List the commits of pull request `number`.
    async fn list_commits(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Commit>, HostError>;

    /// Add a comment to the issue thread of pull request `number`.
    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), HostError>;

    /// Create a status on `commit`.
    async fn create_commit_status(
        &self,
        owner: &str,
        repo: &str,
        commit: &str,
        status: &CommitStatus,
    ) -> Result<(), HostError>;
}
