use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::{
    error::FetchError,
    github::{CheckConclusion, CheckRun, CheckRunStatus, CombinedStatus, CommitState, Forge},
    types::{AccountConfig, ChecksStatus, PullRequestRecord},
};

/// Reduces a commit's check runs to a single status.
pub fn rollup_check_runs(runs: &[CheckRun]) -> ChecksStatus {
    let failed = runs.iter().any(|run| {
        matches!(
            run.conclusion,
            Some(
                CheckConclusion::Failure
                    | CheckConclusion::TimedOut
                    | CheckConclusion::Cancelled
                    | CheckConclusion::ActionRequired
                    | CheckConclusion::StartupFailure
            )
        )
    });
    if failed {
        return ChecksStatus::Failure;
    }

    if runs
        .iter()
        .any(|run| run.status != CheckRunStatus::Completed)
    {
        return ChecksStatus::Pending;
    }

    if runs
        .iter()
        .any(|run| run.conclusion == Some(CheckConclusion::Success))
    {
        ChecksStatus::Success
    } else {
        ChecksStatus::None
    }
}

/// Maps the legacy combined commit status.
pub fn rollup_commit_status(status: &CombinedStatus) -> ChecksStatus {
    match status.state {
        CommitState::Failure | CommitState::Error => ChecksStatus::Failure,
        CommitState::Pending if status.total_count > 0 => ChecksStatus::Pending,
        CommitState::Success => ChecksStatus::Success,
        _ => ChecksStatus::None,
    }
}

/// Looks up the CI state of pull request head commits.
pub struct ChecksResolver<F: ?Sized> {
    forge: Arc<F>,
    max_concurrent: usize,
}

impl<F: Forge + ?Sized> ChecksResolver<F> {
    pub fn new(forge: Arc<F>, max_concurrent: usize) -> Self {
        Self {
            forge,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Never fails: lookup errors degrade to `ChecksStatus::None`.
    pub async fn resolve(&self, account: &AccountConfig, record: &PullRequestRecord) -> ChecksStatus {
        let Some(sha) = record.head_sha.as_deref() else {
            return ChecksStatus::None;
        };

        match self.lookup(account, &record.repo, sha).await {
            Ok(status) => status,
            Err(e) => {
                debug!(
                    account = %account.label,
                    repo = %record.repo,
                    number = record.number,
                    error = %e,
                    "checks lookup failed"
                );
                ChecksStatus::None
            }
        }
    }

    async fn lookup(
        &self,
        account: &AccountConfig,
        repo: &str,
        sha: &str,
    ) -> Result<ChecksStatus, FetchError> {
        let runs = self.forge.check_runs(account, repo, sha).await?;
        if !runs.is_empty() {
            return Ok(rollup_check_runs(&runs));
        }

        let combined = self.forge.commit_status(account, repo, sha).await?;
        Ok(rollup_commit_status(&combined))
    }

    /// Resolves checks for every record concurrently, keeping input order.
    pub async fn annotate(
        &self,
        records: Vec<(&AccountConfig, PullRequestRecord)>,
    ) -> Vec<PullRequestRecord> {
        let lookups: Vec<_> = records
            .into_iter()
            .map(|(account, mut record)| async move {
                record.checks_status = self.resolve(account, &record).await;
                record
            })
            .collect();

        stream::iter(lookups)
            .buffered(self.max_concurrent)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(status: CheckRunStatus, conclusion: Option<CheckConclusion>) -> CheckRun {
        CheckRun {
            name: "ci".to_string(),
            status,
            conclusion,
        }
    }

    #[test]
    fn test_any_failure_wins() {
        let runs = vec![
            run(CheckRunStatus::Completed, Some(CheckConclusion::Success)),
            run(CheckRunStatus::InProgress, None),
            run(CheckRunStatus::Completed, Some(CheckConclusion::TimedOut)),
        ];
        assert_eq!(rollup_check_runs(&runs), ChecksStatus::Failure);
    }

    #[test]
    fn test_in_progress_without_failure_is_pending() {
        let runs = vec![
            run(CheckRunStatus::Completed, Some(CheckConclusion::Success)),
            run(CheckRunStatus::Queued, None),
        ];
        assert_eq!(rollup_check_runs(&runs), ChecksStatus::Pending);
    }

    #[test]
    fn test_all_completed_success() {
        let runs = vec![
            run(CheckRunStatus::Completed, Some(CheckConclusion::Success)),
            run(CheckRunStatus::Completed, Some(CheckConclusion::Skipped)),
        ];
        assert_eq!(rollup_check_runs(&runs), ChecksStatus::Success);
    }

    #[test]
    fn test_only_neutral_or_empty_is_none() {
        assert_eq!(rollup_check_runs(&[]), ChecksStatus::None);
        let runs = vec![run(CheckRunStatus::Completed, Some(CheckConclusion::Neutral))];
        assert_eq!(rollup_check_runs(&runs), ChecksStatus::None);
    }

    #[test]
    fn test_commit_status_mapping() {
        let status = |state, total_count| CombinedStatus { state, total_count };
        assert_eq!(
            rollup_commit_status(&status(CommitState::Error, 1)),
            ChecksStatus::Failure
        );
        assert_eq!(
            rollup_commit_status(&status(CommitState::Pending, 2)),
            ChecksStatus::Pending
        );
        // GitHub reports "pending" for commits with no statuses at all.
        assert_eq!(
            rollup_commit_status(&status(CommitState::Pending, 0)),
            ChecksStatus::None
        );
        assert_eq!(
            rollup_commit_status(&status(CommitState::Success, 3)),
            ChecksStatus::Success
        );
    }
}
