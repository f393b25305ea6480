use std::{collections::BTreeSet, fmt, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::FetchError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_QUERY_LABEL: &str = "Review Requested";
pub const DEFAULT_QUERY: &str = "is:pr is:open review-requested:@me";

/// Personal access token for one account. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Which repositories an account's queries may surface.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    Specific(BTreeSet<String>),
}

impl Scope {
    pub fn allows(&self, repo: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Specific(repos) => repos.iter().any(|r| r.eq_ignore_ascii_case(repo)),
        }
    }
}

/// What a query is asking for, inferred from its search qualifiers and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    ReviewRequested,
    Assigned,
    Authored,
    Other,
}

static REVIEW_REQUESTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|\s)(user-)?review-requested:@me(\s|$)").expect("valid regex")
});
static ASSIGNEE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|\s)assignee:@me(\s|$)").expect("valid regex"));
static AUTHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|\s)author:@me(\s|$)").expect("valid regex"));

impl QueryKind {
    pub fn infer(label: &str, query: &str) -> Self {
        let label = label.to_lowercase();

        if REVIEW_REQUESTED_RE.is_match(query) || label.contains("review requested") {
            QueryKind::ReviewRequested
        } else if ASSIGNEE_RE.is_match(query) || label.contains("assigned") {
            QueryKind::Assigned
        } else if AUTHOR_RE.is_match(query) || label == "my prs" || label.contains("my pull") {
            QueryKind::Authored
        } else {
            QueryKind::Other
        }
    }
}

/// A named GitHub search expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub label: String,
    pub query: String,
}

impl QuerySpec {
    pub fn new(label: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            query: query.into(),
        }
    }

    pub fn kind(&self) -> QueryKind {
        QueryKind::infer(&self.label, &self.query)
    }
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_LABEL, DEFAULT_QUERY)
    }
}

/// One configured GitHub identity on one API host.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub id: String,
    pub label: String,
    pub api_base_url: String,
    /// Name of the environment variable the token was read from.
    pub token_env_var: String,
    pub token: Option<Token>,
    pub scope: Scope,
    pub queries: Vec<QuerySpec>,
}

impl AccountConfig {
    pub fn token(&self) -> Result<&Token, FetchError> {
        self.token
            .as_ref()
            .ok_or_else(|| FetchError::MissingToken(self.token_env_var.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewDecision {
    #[default]
    None,
    Approved,
    ChangesRequested,
    ReviewRequired,
}

impl ReviewDecision {
    /// Maps the GraphQL `reviewDecision` value. Anything unrecognised is neutral.
    pub fn from_graphql(value: Option<&str>) -> Self {
        match value {
            Some("APPROVED") => ReviewDecision::Approved,
            Some("CHANGES_REQUESTED") => ReviewDecision::ChangesRequested,
            Some("REVIEW_REQUIRED") => ReviewDecision::ReviewRequired,
            _ => ReviewDecision::None,
        }
    }
}

/// Rolled-up CI state of a pull request's head commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksStatus {
    #[default]
    None,
    Success,
    Failure,
    Pending,
}

impl ChecksStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            ChecksStatus::None => "-",
            ChecksStatus::Success => "✓",
            ChecksStatus::Failure => "✗",
            ChecksStatus::Pending => "●",
        }
    }
}

/// Priority bucket. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
    #[default]
    Watching,
}

impl PriorityTier {
    pub fn rank(&self) -> u8 {
        match self {
            PriorityTier::High => 0,
            PriorityTier::Medium => 1,
            PriorityTier::Low => 2,
            PriorityTier::Watching => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::High => "High",
            PriorityTier::Medium => "Medium",
            PriorityTier::Low => "Low",
            PriorityTier::Watching => "Watching",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pull request surfaced by one query on one account.
///
/// Rows are identified by `(account_label, query_label, url)`; the same pull
/// request matched by two queries yields two rows.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequestRecord {
    pub account_label: String,
    pub query_label: String,
    pub query_kind: QueryKind,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub is_draft: bool,
    pub review_decision: ReviewDecision,
    pub is_author_self: bool,
    pub assignees: Vec<String>,
    pub head_sha: Option<String>,
    pub checks_status: ChecksStatus,
    pub priority_tier: PriorityTier,
    pub priority_reason: String,
}

impl PullRequestRecord {
    pub fn identity(&self) -> (&str, &str, &str) {
        (&self.account_label, &self.query_label, &self.url)
    }

    pub fn is_assigned_to(&self, login: &str) -> bool {
        !login.is_empty() && self.assignees.iter().any(|a| a.eq_ignore_ascii_case(login))
    }
}

/// A single (account, query) fetch that failed during a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFailure {
    pub account_label: String,
    pub query_label: String,
    pub error: FetchError,
}

impl PartialFailure {
    pub fn error_message(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {}: {}",
            self.account_label,
            self.query_label,
            self.error_message()
        )
    }
}

/// The fully classified, ordered result of one refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub records: Vec<PullRequestRecord>,
    pub fetched_at: DateTime<Utc>,
    pub partial_failures: Vec<PartialFailure>,
}

impl Snapshot {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            records: Vec::new(),
            fetched_at,
            partial_failures: Vec::new(),
        }
    }
}
