//! The two top-level flows: posting a pull request comment (with optional uploads) and
//! setting a commit status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::collect;
use crate::comment::{self, CommentError, CommentMeta};
use crate::config::{CommentConfig, StatusConfig};
use crate::contract::{CommitStatus, HostError, ObjectStore, SourceHost, StoreError};
use crate::resolve::resolve_pull_requests;
use crate::schedule::{self, ScheduleReport};
use crate::store;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("uploads were requested but no object store was configured")]
    MissingStore,

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Comment(#[from] CommentError),
}

/// What `publish_comment` did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommentOutcome {
    /// Pull requests that received the comment, ascending.
    pub posted_to: Vec<u64>,
    /// Upload counters, when uploads ran.
    pub uploads: Option<ScheduleReport>,
}

/// Resolve the target pull requests, upload any requested files and post the rendered
/// comment to every target.
///
/// Finding no pull request is not an error: a notice is logged and nothing is uploaded.
pub async fn publish_comment<H>(
    config: &CommentConfig,
    host: &H,
    store: Option<Arc<dyn ObjectStore>>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<CommentOutcome, PipelineError>
where
    H: SourceHost + ?Sized,
{
    let targets =
        resolve_pull_requests(host, &config.repo, config.commit.as_deref(), config.pr_num).await?;
    if targets.is_empty() {
        warn!(
            commit = config.commit.as_deref().unwrap_or("-"),
            "No pull requests found for this commit, nothing to comment on"
        );
        return Ok(CommentOutcome::default());
    }

    let summary = comment::read_summary(&config.comment_file)?;

    let mut report = None;
    let mut uploads = collect::UploadGroup::new();
    if let Some(raw) = config.uploads.as_deref() {
        let (Some(backend), Some(store)) = (config.backend.as_ref(), store) else {
            error!("Uploads requested without an object store");
            return Err(PipelineError::MissingStore);
        };
        uploads = collect::collect(raw);
        if uploads.is_empty() {
            warn!(uploads = raw, "No files found to upload");
        } else {
            store::prepare_bucket(store.as_ref(), &backend.bucket, expires_at.is_some()).await?;
            report = Some(schedule::run(&mut uploads, store, backend.concurrency).await);
        }
    }

    let meta = CommentMeta {
        commit_id: config.commit.clone(),
        title: config.title.clone(),
        summary,
    };
    let body = comment::assemble(&meta, &uploads, expires_at.filter(|_| report.is_some()))?;

    let mut posted_to = Vec::with_capacity(targets.len());
    for number in targets {
        host.create_issue_comment(&config.repo.owner, &config.repo.repo, number, &body)
            .await
            .map_err(|e| {
                error!(pr = number, error = %e, "Failed to post comment");
                e
            })?;
        info!(pr = number, "Added comment to pull request");
        posted_to.push(number);
    }

    Ok(CommentOutcome {
        posted_to,
        uploads: report,
    })
}

/// Create the configured status on the configured commit.
pub async fn publish_status<H>(config: &StatusConfig, host: &H) -> Result<(), PipelineError>
where
    H: SourceHost + ?Sized,
{
    let status = CommitStatus {
        state: config.state.as_str().to_string(),
        description: config.description.clone(),
        context: config.context.clone(),
        target_url: config.target_url.clone(),
    };
    host.create_commit_status(&config.repo.owner, &config.repo.repo, &config.commit, &status)
        .await
        .map_err(|e| {
            error!(commit = %config.commit, error = %e, "Failed to create commit status");
            e
        })?;
    info!(
        commit = %config.commit,
        state = %config.state,
        context = %config.context,
        "Updated commit status"
    );
    Ok(())
}
