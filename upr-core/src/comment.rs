//! Comment assembly: merges the summary, commit metadata and upload results into the
//! `pr_comment` template.

use std::path::{Path, PathBuf};

use askama::Template;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error};

use crate::collect::UploadGroup;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("reading comment_file '{path}': {source}")]
    ReadSummary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("executing template: {0}")]
    Render(#[from] askama::Error),
}

/// Metadata written into the comment only when explicitly supplied.
#[derive(Debug, Clone, Default)]
pub struct CommentMeta {
    pub commit_id: Option<String>,
    pub title: Option<String>,
    pub summary: String,
}

/// Data handed to the `pr_comment` template.
#[derive(Template)]
#[template(path = "pr_comment.md", escape = "none")]
pub struct CommentPayload<'a> {
    pub commit_id: Option<&'a str>,
    pub title: Option<&'a str>,
    pub summary: &'a str,
    pub uploads: &'a UploadGroup,
    pub uploads_expire: Option<DateTime<Utc>>,
}

/// Read the whole comment file; it becomes the summary verbatim.
pub fn read_summary(path: &Path) -> Result<String, CommentError> {
    std::fs::read_to_string(path).map_err(|source| {
        error!(path = %path.display(), error = %source, "Failed to read comment_file");
        CommentError::ReadSummary {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Render the comment body.
pub fn assemble(
    meta: &CommentMeta,
    uploads: &UploadGroup,
    expires_at: Option<DateTime<Utc>>,
) -> Result<String, CommentError> {
    let payload = CommentPayload {
        commit_id: meta.commit_id.as_deref(),
        title: meta.title.as_deref(),
        summary: &meta.summary,
        uploads,
        uploads_expire: expires_at,
    };
    let body = payload.render().map_err(|e| {
        error!(error = %e, "Failed to render comment template");
        e
    })?;
    debug!(bytes = body.len(), "Rendered comment body");
    Ok(body)
}
