use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    StatusCode,
    header::{ACCEPT, HeaderMap, USER_AGENT},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Deserialize, de::DeserializeOwned};
use tokio::time;
use tracing::debug;

use crate::{
    error::FetchError,
    graphql::{GraphQLResponse, create_search_request, into_search_page},
    types::{AccountConfig, ReviewDecision},
};

const USER_AGENT_HEADER: &str = concat!("prdash/", env!("CARGO_PKG_VERSION"));
const ACCEPT_HEADER: &str = "application/vnd.github+json";
const MAX_ERROR_BODY: usize = 200;

/// A pull request as returned by search, before it is tied to an account
/// and query.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestItem {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub is_draft: bool,
    pub review_decision: ReviewDecision,
    pub head_sha: Option<String>,
    pub assignees: Vec<String>,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    pub items: Vec<PullRequestItem>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckRunStatus {
    Queued,
    InProgress,
    Completed,
    Waiting,
    Requested,
    Pending,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
    StartupFailure,
    Stale,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckRun {
    pub name: String,
    pub status: CheckRunStatus,
    pub conclusion: Option<CheckConclusion>,
}

#[derive(Debug, Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<CheckRun>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Success,
    Pending,
    Failure,
    Error,
    #[serde(other)]
    Unknown,
}

/// Legacy commit status rollup (`/commits/{sha}/status`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CombinedStatus {
    pub state: CommitState,
    #[serde(default)]
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
struct ViewerResponse {
    login: String,
}

/// Read-only access to a GitHub host on behalf of one account.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Login of the user the account's token belongs to.
    async fn viewer(&self, account: &AccountConfig) -> Result<String, FetchError>;

    /// One page of pull request search results.
    async fn search(
        &self,
        account: &AccountConfig,
        query: &str,
        after: Option<&str>,
    ) -> Result<SearchPage, FetchError>;

    async fn check_runs(
        &self,
        account: &AccountConfig,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CheckRun>, FetchError>;

    async fn commit_status(
        &self,
        account: &AccountConfig,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, FetchError>;
}

/// HTTP implementation of [`Forge`] shared by every configured account.
#[derive(Clone)]
pub struct GitHub {
    client: ClientWithMiddleware,
    timeout: Duration,
}

impl GitHub {
    /// `timeout` bounds each call as a whole, retries included.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let base_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(200), Duration::from_secs(2))
            .build_with_max_retries(2);

        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client, timeout })
    }

    fn get(&self, account: &AccountConfig, url: &str) -> Result<RequestBuilder, FetchError> {
        let token = account.token()?;
        Ok(self
            .client
            .get(url)
            .header(USER_AGENT, USER_AGENT_HEADER)
            .header(ACCEPT, ACCEPT_HEADER)
            .bearer_auth(token.expose()))
    }

    fn post(&self, account: &AccountConfig, url: &str) -> Result<RequestBuilder, FetchError> {
        let token = account.token()?;
        Ok(self
            .client
            .post(url)
            .header(USER_AGENT, USER_AGENT_HEADER)
            .header(ACCEPT, ACCEPT_HEADER)
            .bearer_auth(token.expose()))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        within(self.timeout, Self::fetch_json(request)).await
    }

    async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &headers, &body));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Network(e.to_string())
            } else {
                FetchError::InvalidResponse(e.to_string())
            }
        })
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn viewer(&self, account: &AccountConfig) -> Result<String, FetchError> {
        let url = format!("{}/user", account.api_base_url);
        let viewer: ViewerResponse = self.send_json(self.get(account, &url)?).await?;
        debug!(account = %account.label, login = %viewer.login, "resolved viewer");
        Ok(viewer.login)
    }

    async fn search(
        &self,
        account: &AccountConfig,
        query: &str,
        after: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        let url = graphql_endpoint(&account.api_base_url);
        let body = create_search_request(query, after);
        let response: GraphQLResponse = self
            .send_json(self.post(account, &url)?.json(&body))
            .await?;
        into_search_page(response)
    }

    async fn check_runs(
        &self,
        account: &AccountConfig,
        repo: &str,
        sha: &str,
    ) -> Result<Vec<CheckRun>, FetchError> {
        let url = format!(
            "{}/repos/{}/commits/{}/check-runs",
            account.api_base_url, repo, sha
        );
        let request = self.get(account, &url)?.query(&[("per_page", "100")]);
        let response: CheckRunsResponse = self.send_json(request).await?;
        Ok(response.check_runs)
    }

    async fn commit_status(
        &self,
        account: &AccountConfig,
        repo: &str,
        sha: &str,
    ) -> Result<CombinedStatus, FetchError> {
        let url = format!(
            "{}/repos/{}/commits/{}/status",
            account.api_base_url, repo, sha
        );
        self.send_json(self.get(account, &url)?).await
    }
}

/// GraphQL endpoint for a REST API base.
///
/// github.com serves both from `api.github.com`; Enterprise Server serves
/// REST under `/api/v3` and GraphQL under `/api/graphql`.
async fn within<T>(
    budget: Duration,
    call: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    time::timeout(budget, call).await.map_err(|_| {
        FetchError::Network(format!("request timed out after {}s", budget.as_secs()))
    })?
}

pub fn graphql_endpoint(api_base: &str) -> String {
    let base = api_base.trim_end_matches('/');
    match base.strip_suffix("/v3") {
        Some(prefix) if prefix.ends_with("/api") => format!("{}/graphql", prefix),
        _ => format!("{}/graphql", base),
    }
}

/// Maps a non-2xx response onto the fetch error taxonomy.
pub fn error_for_status(status: StatusCode, headers: &HeaderMap, body: &str) -> FetchError {
    match status {
        StatusCode::UNAUTHORIZED => FetchError::AuthFailure,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::RateLimited(rate_limit_reset(headers))
        }
        other => FetchError::ApiError(other.as_u16(), summarize_body(body)),
    }
}

fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn summarize_body(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let text = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string());

    if text.chars().count() > MAX_ERROR_BODY {
        let truncated: String = text.chars().take(MAX_ERROR_BODY).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}
