use std::collections::BTreeSet;

use tracing::{debug, error, info};

use crate::config::RepoRef;
use crate::contract::{HostError, SourceHost};

/// Find the pull requests a comment should be posted to.
///
/// Every open pull request containing `commit` (exact SHA match) is selected, plus `direct` when
/// given. The set is ordered and holds each number once. Without a commit no pull requests are
/// listed at all.
pub async fn resolve_pull_requests<H>(
    host: &H,
    repo: &RepoRef,
    commit: Option<&str>,
    direct: Option<u64>,
) -> Result<BTreeSet<u64>, HostError>
where
    H: SourceHost + ?Sized,
{
    let mut targets = BTreeSet::new();

    if let Some(commit) = commit {
        let pulls = host
            .list_pull_requests(&repo.owner, &repo.repo)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list pull requests");
                e
            })?;
        debug!(open = pulls.len(), "Listed open pull requests");

        for pull in pulls {
            let commits = host
                .list_commits(&repo.owner, &repo.repo, pull.number)
                .await
                .map_err(|e| {
                    error!(pr = pull.number, error = %e, "Failed to list pull request commits");
                    e
                })?;
            if commits.iter().any(|c| c.sha == commit) {
                debug!(pr = pull.number, commit, "Commit found in pull request");
                targets.insert(pull.number);
            }
        }
    }

    if let Some(number) = direct {
        targets.insert(number);
    }

    info!(pull_requests = ?targets, "Resolved target pull requests");
    Ok(targets)
}
