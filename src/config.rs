use std::{
    collections::{BTreeSet, HashSet},
    path::Path,
    time::Duration,
};

use serde::Deserialize;
use tracing::warn;

use crate::{
    error::ConfigError,
    secrets::SecretsProvider,
    types::{AccountConfig, DEFAULT_API_BASE, QuerySpec, Scope},
};

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 16;

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    general: GeneralSection,
    #[serde(default)]
    accounts: Vec<AccountSection>,
}

#[derive(Debug, Deserialize)]
struct GeneralSection {
    #[serde(default = "default_refresh_interval")]
    refresh_interval_seconds: u64,
    #[serde(default = "default_request_timeout")]
    request_timeout_seconds: u64,
    #[serde(default = "default_max_concurrent_checks")]
    max_concurrent_checks: usize,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECS,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
        }
    }
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_concurrent_checks() -> usize {
    DEFAULT_MAX_CONCURRENT_CHECKS
}

#[derive(Debug, Deserialize)]
struct AccountSection {
    #[serde(default)]
    id: String,
    label: Option<String>,
    #[serde(default = "default_api_base", alias = "api_base_url")]
    api_base: String,
    #[serde(default)]
    token_env_var: String,
    #[serde(default)]
    filters: FiltersSection,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

#[derive(Debug, Deserialize, Default)]
struct FiltersSection {
    #[serde(default)]
    scope: ScopeName,
    #[serde(default)]
    repos: Vec<String>,
    queries: Option<Vec<QuerySection>>,
}

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
enum ScopeName {
    #[default]
    All,
    Specific,
}

#[derive(Debug, Deserialize)]
struct QuerySection {
    #[serde(default = "default_query_label")]
    label: String,
    #[serde(default = "default_query_string")]
    query: String,
}

fn default_query_label() -> String {
    "PRs".to_string()
}

fn default_query_string() -> String {
    "is:pr is:open".to_string()
}

/// A problem with one account that caused it to be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub account: String,
    pub message: String,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.account, self.message)
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub accounts: Vec<AccountConfig>,
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_checks: usize,
    pub warnings: Vec<ConfigWarning>,
}

impl Settings {
    pub fn load(path: &Path, secrets: &dyn SecretsProvider) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content, secrets)
    }

    pub fn from_toml(content: &str, secrets: &dyn SecretsProvider) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;

        if file.general.refresh_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_seconds must be at least 1".to_string(),
            ));
        }
        if file.general.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_seconds must be at least 1".to_string(),
            ));
        }

        let mut accounts = Vec::with_capacity(file.accounts.len());
        let mut warnings = Vec::new();
        let mut seen_ids = HashSet::new();

        for (index, section) in file.accounts.into_iter().enumerate() {
            let name = if section.id.trim().is_empty() {
                format!("accounts[{}]", index)
            } else {
                section.id.clone()
            };

            match build_account(section, secrets) {
                Ok(account) => {
                    if !seen_ids.insert(account.id.clone()) {
                        warnings.push(ConfigWarning {
                            account: name,
                            message: "duplicate account id; skipped".to_string(),
                        });
                        continue;
                    }
                    if account.token.is_none() {
                        warn!(
                            account = %account.id,
                            var = %account.token_env_var,
                            "token not set; account will report no data"
                        );
                    }
                    accounts.push(account);
                }
                Err(message) => {
                    warn!(account = %name, %message, "skipping invalid account");
                    warnings.push(ConfigWarning {
                        account: name,
                        message,
                    });
                }
            }
        }

        if accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }

        Ok(Settings {
            accounts,
            refresh_interval: Duration::from_secs(file.general.refresh_interval_seconds),
            request_timeout: Duration::from_secs(file.general.request_timeout_seconds),
            max_concurrent_checks: file.general.max_concurrent_checks.max(1),
            warnings,
        })
    }
}

fn build_account(
    section: AccountSection,
    secrets: &dyn SecretsProvider,
) -> Result<AccountConfig, String> {
    let id = section.id.trim().to_string();
    if id.is_empty() {
        return Err("missing account id".to_string());
    }

    let api_base_url = section.api_base.trim().trim_end_matches('/').to_string();
    if api_base_url.is_empty() {
        return Err("api_base must not be empty".to_string());
    }
    url::Url::parse(&api_base_url)
        .map_err(|e| format!("invalid api_base '{}': {}", api_base_url, e))?;

    let scope = match section.filters.scope {
        ScopeName::All => Scope::All,
        ScopeName::Specific => {
            let mut repos = BTreeSet::new();
            for repo in &section.filters.repos {
                let repo = repo.trim();
                if !is_repo_name(repo) {
                    return Err(format!(
                        "repository must be in format 'owner/repo', got: '{}'",
                        repo
                    ));
                }
                repos.insert(repo.to_string());
            }
            if repos.is_empty() {
                return Err("scope \"specific\" requires at least one repo".to_string());
            }
            Scope::Specific(repos)
        }
    };

    let queries = match section.filters.queries {
        Some(queries) if !queries.is_empty() => queries
            .into_iter()
            .map(|q| QuerySpec::new(q.label, q.query))
            .collect(),
        _ => vec![QuerySpec::default()],
    };

    let token = secrets.resolve(&section.token_env_var).ok();

    Ok(AccountConfig {
        label: section
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| id.clone()),
        id,
        api_base_url,
        token_env_var: section.token_env_var,
        token,
        scope,
        queries,
    })
}

fn is_repo_name(repo: &str) -> bool {
    let parts: Vec<&str> = repo.split('/').collect();
    parts.len() == 2 && parts.iter().all(|p| !p.is_empty() && !p.contains(char::is_whitespace))
}
