//! prdash: a read-only dashboard of GitHub pull requests across accounts.
//!
//! Runs saved searches against one or more GitHub hosts, resolves the CI
//! state of every result, classifies each pull request into a priority tier
//! and produces a single ordered snapshot. A scheduler refreshes the
//! snapshot periodically and on demand.

pub mod aggregate;
pub mod checks;
pub mod classify;
pub mod config;
pub mod error;
pub mod github;
pub mod graphql;
pub mod query;
pub mod scheduler;
pub mod secrets;
pub mod types;

pub use aggregate::{AccountsSource, Aggregator};
pub use checks::ChecksResolver;
pub use classify::classify;
pub use config::Settings;
pub use error::{ConfigError, FetchError, GatherError};
pub use github::{Forge, GitHub};
pub use query::QueryExecutor;
pub use scheduler::{DashboardState, RefreshPhase, Scheduler, SnapshotSource, Trigger};
pub use secrets::{EnvSecrets, SecretsProvider};
pub use types::{
    AccountConfig, ChecksStatus, PartialFailure, PriorityTier, PullRequestRecord, QueryKind,
    QuerySpec, ReviewDecision, Scope, Snapshot, Token,
};
