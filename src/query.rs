use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::try_join_all;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::{
    error::FetchError,
    github::{Forge, PullRequestItem},
    types::{
        AccountConfig, ChecksStatus, PriorityTier, PullRequestRecord, QueryKind, QuerySpec, Scope,
    },
};

/// Upper bound on result pages followed for one search.
pub const MAX_SEARCH_PAGES: usize = 10;

/// Ensures the query only matches open pull requests unless it says otherwise.
pub fn normalize_query(query: &str) -> String {
    let mut final_query = query.trim().to_string();
    let terms: Vec<&str> = query.split_whitespace().collect();

    if !terms.iter().any(|t| t.eq_ignore_ascii_case("is:pr")) {
        final_query = format!("{} is:pr", final_query).trim().to_string();
    }

    let has_state = terms.iter().any(|t| {
        let t = t.to_ascii_lowercase();
        t == "is:open" || t == "is:closed" || t == "is:merged" || t.starts_with("state:")
    });
    if !has_state {
        final_query = format!("{} is:open", final_query);
    }

    final_query
}

/// Expands a query into the searches needed to honour the account's scope:
/// one per configured repository, or the query itself for `Scope::All`.
pub fn scoped_queries(scope: &Scope, query: &str) -> Vec<String> {
    let base = normalize_query(query);
    match scope {
        Scope::All => vec![base],
        Scope::Specific(repos) => repos
            .iter()
            .map(|repo| format!("{} repo:{}", base, repo))
            .collect(),
    }
}

/// Runs saved searches for accounts and turns the results into records.
///
/// The viewer login of each account is probed once and reused for the
/// lifetime of the executor; a failed probe is retried on the next call.
pub struct QueryExecutor<F: ?Sized> {
    forge: Arc<F>,
    viewers: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl<F: Forge + ?Sized> QueryExecutor<F> {
    pub fn new(forge: Arc<F>) -> Self {
        Self {
            forge,
            viewers: Mutex::new(HashMap::new()),
        }
    }

    /// Login of the account's own user.
    pub async fn viewer(&self, account: &AccountConfig) -> Result<String, FetchError> {
        account.token()?;

        let cell = {
            let mut viewers = self.viewers.lock().await;
            Arc::clone(viewers.entry(account.id.clone()).or_default())
        };

        cell.get_or_try_init(|| self.forge.viewer(account))
            .await
            .cloned()
    }

    /// Fetches every pull request matching `query` on `account`.
    ///
    /// Records come back without checks or priority; those are filled in by
    /// the checks resolver and the classifier.
    pub async fn execute(
        &self,
        account: &AccountConfig,
        query: &QuerySpec,
    ) -> Result<Vec<PullRequestRecord>, FetchError> {
        let viewer = self.viewer(account).await?;
        let kind = query.kind();

        let searches = scoped_queries(&account.scope, &query.query);
        let pages = try_join_all(
            searches
                .iter()
                .map(|search_query| self.search_all(account, search_query)),
        )
        .await?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for item in pages.into_iter().flatten() {
            if !account.scope.allows(&item.repo) {
                continue;
            }
            if !seen.insert(item.url.clone()) {
                continue;
            }
            records.push(into_record(item, account, query, kind, &viewer));
        }

        debug!(
            account = %account.label,
            query = %query.label,
            searches = searches.len(),
            count = records.len(),
            "query executed"
        );

        Ok(records)
    }

    async fn search_all(
        &self,
        account: &AccountConfig,
        search_query: &str,
    ) -> Result<Vec<PullRequestItem>, FetchError> {
        let mut items = Vec::new();
        let mut after_cursor: Option<String> = None;

        for _ in 0..MAX_SEARCH_PAGES {
            let page = self
                .forge
                .search(account, search_query, after_cursor.as_deref())
                .await?;
            items.extend(page.items);

            if !page.has_next_page {
                break;
            }
            after_cursor = page.end_cursor;
            if after_cursor.is_none() {
                break;
            }
        }

        Ok(items)
    }
}

fn into_record(
    item: PullRequestItem,
    account: &AccountConfig,
    query: &QuerySpec,
    kind: QueryKind,
    viewer: &str,
) -> PullRequestRecord {
    let is_author_self = !viewer.is_empty() && item.author.eq_ignore_ascii_case(viewer);

    PullRequestRecord {
        account_label: account.label.clone(),
        query_label: query.label.clone(),
        query_kind: kind,
        repo: item.repo,
        number: item.number,
        title: item.title,
        url: item.url,
        author: item.author,
        created_at: item.created_at,
        is_draft: item.is_draft,
        review_decision: item.review_decision,
        is_author_self,
        assignees: item.assignees,
        head_sha: item.head_sha,
        checks_status: ChecksStatus::None,
        priority_tier: PriorityTier::Watching,
        priority_reason: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn test_normalize_adds_pr_and_open() {
        assert_eq!(normalize_query("mentions:@me"), "mentions:@me is:pr is:open");
        assert_eq!(normalize_query("is:pr author:@me"), "is:pr author:@me is:open");
    }

    #[test]
    fn test_normalize_respects_explicit_state() {
        assert_eq!(normalize_query("is:pr is:closed"), "is:pr is:closed");
        assert_eq!(normalize_query("is:pr state:open"), "is:pr state:open");
        assert_eq!(normalize_query("is:pr is:merged"), "is:pr is:merged");
        assert_eq!(
            normalize_query("is:pr is:open review-requested:@me"),
            "is:pr is:open review-requested:@me"
        );
    }

    #[test]
    fn test_scope_all_is_single_search() {
        assert_eq!(
            scoped_queries(&Scope::All, "is:pr is:open"),
            vec!["is:pr is:open".to_string()]
        );
    }

    #[test]
    fn test_scope_specific_is_one_search_per_repo() {
        let repos: BTreeSet<String> = ["org/b", "org/a"].iter().map(|r| r.to_string()).collect();
        assert_eq!(
            scoped_queries(&Scope::Specific(repos), "is:pr is:open author:@me"),
            vec![
                "is:pr is:open author:@me repo:org/a".to_string(),
                "is:pr is:open author:@me repo:org/b".to_string(),
            ]
        );
    }
}
