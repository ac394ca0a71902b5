//! Upload scheduler: a fixed pool of workers draining one shared queue.
//!
//! Workers receive owned jobs (`ItemId`, key, path) rather than references into the
//! [`UploadGroup`]; each result travels back tagged with its handle and is written into the
//! arena once every worker has finished. A failed item is logged and left without a URL; it
//! never stops the other uploads.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::collect::{ItemId, UploadGroup};
use crate::contract::ObjectStore;

/// Outcome counters of one scheduler run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Items handed to `put_object`, successfully or not.
    pub attempted: usize,
    pub uploaded: usize,
    /// Items that could not be opened or uploaded.
    pub failed: usize,
    /// Items skipped because their key is empty.
    pub skipped: usize,
}

#[derive(Debug)]
struct UploadJob {
    id: ItemId,
    key: String,
    path: PathBuf,
}

enum JobResult {
    Uploaded(ItemId, String),
    /// The file was handed to the store, which rejected it.
    Rejected,
    /// The file could not be opened.
    Unreadable,
}

/// Upload every item of `group` through `store` with `concurrency` parallel workers.
///
/// Returns only after all workers have drained the queue; by then every successful item
/// carries its URL.
pub async fn run(
    group: &mut UploadGroup,
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
) -> ScheduleReport {
    let mut report = ScheduleReport::default();
    let (job_tx, job_rx) = mpsc::unbounded_channel::<UploadJob>();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<JobResult>();

    for (id, item) in group.iter() {
        if item.key.is_empty() {
            debug!(path = %item.path.display(), "Skipping item with empty object key");
            report.skipped += 1;
            continue;
        }
        // The receiver is alive until the workers below exit.
        let _ = job_tx.send(UploadJob {
            id,
            key: item.key.clone(),
            path: item.path.clone(),
        });
    }
    drop(job_tx);

    let workers = concurrency.max(1);
    info!(
        files = group.len(),
        workers, "Starting upload... This can take a while."
    );

    let queue = Arc::new(Mutex::new(job_rx));
    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&store);
            let done = done_tx.clone();
            tokio::spawn(async move {
                loop {
                    let job = queue.lock().await.recv().await;
                    let Some(job) = job else { break };
                    let _ = done.send(upload_one(worker, store.as_ref(), job).await);
                }
            })
        })
        .collect();
    drop(done_tx);

    for joined in join_all(handles).await {
        if let Err(e) = joined {
            error!(error = %e, "Upload worker terminated abnormally");
        }
    }

    while let Some(result) = done_rx.recv().await {
        match result {
            JobResult::Uploaded(id, url) => {
                report.attempted += 1;
                report.uploaded += 1;
                group.set_url(id, url);
            }
            JobResult::Rejected => {
                report.attempted += 1;
                report.failed += 1;
            }
            JobResult::Unreadable => report.failed += 1,
        }
    }

    info!(
        uploaded = report.uploaded,
        failed = report.failed,
        skipped = report.skipped,
        "Upload finished"
    );
    report
}

async fn upload_one(worker: usize, store: &dyn ObjectStore, job: UploadJob) -> JobResult {
    debug!(worker, key = %job.key, "  started");
    let file = match tokio::fs::File::open(&job.path).await {
        Ok(file) => file,
        Err(e) => {
            error!(path = %job.path.display(), error = %e, "Problem opening file");
            return JobResult::Unreadable;
        }
    };

    match store.put_object(&job.key, file).await {
        Ok(url) => {
            info!(key = %job.key, url = %url, " uploaded");
            JobResult::Uploaded(job.id, url)
        }
        Err(e) => {
            error!(key = %job.key, error = %e, "Problem uploading object");
            JobResult::Rejected
        }
    }
}
