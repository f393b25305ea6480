use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};

use crate::{
    checks::ChecksResolver,
    classify,
    error::GatherError,
    github::Forge,
    query::QueryExecutor,
    scheduler::SnapshotSource,
    types::{AccountConfig, PartialFailure, PullRequestRecord, Snapshot},
};

/// Fans queries out across accounts and produces one ordered snapshot.
pub struct Aggregator<F: ?Sized> {
    executor: QueryExecutor<F>,
    checks: ChecksResolver<F>,
}

impl<F: Forge + ?Sized> Aggregator<F> {
    pub fn new(forge: Arc<F>, max_concurrent_checks: usize) -> Self {
        Self {
            executor: QueryExecutor::new(Arc::clone(&forge)),
            checks: ChecksResolver::new(forge, max_concurrent_checks),
        }
    }

    /// Runs every (account, query) pair concurrently.
    ///
    /// Failed pairs are reported in `partial_failures`. Only when every pair
    /// fails is an error returned.
    pub async fn gather(&self, accounts: &[AccountConfig]) -> Result<Snapshot, GatherError> {
        let pairs: Vec<_> = accounts
            .iter()
            .enumerate()
            .flat_map(|(idx, account)| account.queries.iter().map(move |q| (idx, account, q)))
            .collect();

        let results = join_all(
            pairs
                .iter()
                .map(|(_, account, query)| self.executor.execute(account, query)),
        )
        .await;

        let mut failures = Vec::new();
        let mut owners = Vec::new();
        let mut fetched = Vec::new();
        for ((idx, account, query), result) in pairs.iter().zip(results) {
            match result {
                Ok(records) => {
                    for record in records {
                        owners.push(*idx);
                        fetched.push((*account, record));
                    }
                }
                Err(error) => {
                    warn!(
                        account = %account.label,
                        query = %query.label,
                        error = %error,
                        retryable = error.is_retryable(),
                        "query failed"
                    );
                    failures.push(PartialFailure {
                        account_label: account.label.clone(),
                        query_label: query.label.clone(),
                        error,
                    });
                }
            }
        }

        if !pairs.is_empty() && failures.len() == pairs.len() {
            return Err(GatherError::AllFailed { failures });
        }

        let mut records = self.checks.annotate(fetched).await;

        let mut viewers = vec![None; accounts.len()];
        for (record, idx) in records.iter_mut().zip(owners) {
            if viewers[idx].is_none() {
                viewers[idx] = self.executor.viewer(&accounts[idx]).await.ok();
            }
            classify::apply(record, viewers[idx].as_deref().unwrap_or_default());
        }

        sort_records(&mut records);

        info!(
            count = records.len(),
            failed = failures.len(),
            "gather complete"
        );

        Ok(Snapshot {
            records,
            fetched_at: Utc::now(),
            partial_failures: failures,
        })
    }
}

/// Tier first, then newest first. Stable, so ties keep configuration order.
pub fn sort_records(records: &mut [PullRequestRecord]) {
    records.sort_by(|a, b| {
        a.priority_tier
            .cmp(&b.priority_tier)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// The configured accounts bound to an aggregator, as driven by the scheduler.
pub struct AccountsSource<F: ?Sized> {
    aggregator: Aggregator<F>,
    accounts: Vec<AccountConfig>,
}

impl<F: Forge + ?Sized> AccountsSource<F> {
    pub fn new(aggregator: Aggregator<F>, accounts: Vec<AccountConfig>) -> Self {
        Self {
            aggregator,
            accounts,
        }
    }
}

#[async_trait]
impl<F: Forge + ?Sized + 'static> SnapshotSource for AccountsSource<F> {
    async fn gather(&self) -> Result<Snapshot, GatherError> {
        self.aggregator.gather(&self.accounts).await
    }
}
