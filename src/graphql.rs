use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::FetchError,
    github::{PullRequestItem, SearchPage},
    types::ReviewDecision,
};

const SEARCH_DOCUMENT: &str = r#"
    query($query: String!, $after: String) {
        search(query: $query, type: ISSUE, first: 100, after: $after) {
            nodes {
                __typename
                ... on PullRequest {
                    number
                    title
                    url
                    createdAt
                    isDraft
                    reviewDecision
                    headRefOid
                    author {
                        login
                    }
                    repository {
                        nameWithOwner
                    }
                    assignees(first: 20) {
                        nodes {
                            login
                        }
                    }
                }
            }
            pageInfo {
                hasNextPage
                endCursor
            }
        }
    }
"#;

pub fn create_search_request(search_query: &str, after: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "query": SEARCH_DOCUMENT,
        "variables": {
            "query": search_query,
            "after": after,
        }
    })
}

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse {
    pub data: Option<SearchData>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchData {
    pub search: SearchResults,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub nodes: Vec<SearchNode>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Issue search also returns issues; only pull requests are kept.
#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
pub enum SearchNode {
    PullRequest(Box<GraphQLPullRequest>),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLPullRequest {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_draft: bool,
    pub review_decision: Option<String>,
    pub head_ref_oid: Option<String>,
    pub author: Option<GraphQLActor>,
    pub repository: GraphQLRepository,
    pub assignees: Option<GraphQLActorConnection>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLActor {
    pub login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRepository {
    pub name_with_owner: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLActorConnection {
    pub nodes: Vec<GraphQLActor>,
}

/// Converts a GraphQL pull request into the fixed-shape item the executor consumes.
pub fn convert_graphql_pr(pr: GraphQLPullRequest) -> PullRequestItem {
    PullRequestItem {
        repo: pr.repository.name_with_owner,
        number: pr.number,
        title: pr.title,
        url: pr.url,
        // Deleted accounts come back as a null author.
        author: pr
            .author
            .map(|a| a.login)
            .unwrap_or_else(|| "ghost".to_string()),
        created_at: pr.created_at,
        is_draft: pr.is_draft,
        review_decision: ReviewDecision::from_graphql(pr.review_decision.as_deref()),
        head_sha: pr.head_ref_oid.filter(|sha| !sha.is_empty()),
        assignees: pr
            .assignees
            .map(|c| c.nodes.into_iter().map(|a| a.login).collect())
            .unwrap_or_default(),
    }
}

/// Turns a decoded GraphQL response into one page of items, surfacing
/// in-band errors.
pub fn into_search_page(response: GraphQLResponse) -> Result<SearchPage, FetchError> {
    if let Some(first) = response.errors.first() {
        if response
            .errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("RATE_LIMITED"))
        {
            return Err(FetchError::RateLimited(None));
        }
        return Err(FetchError::ApiError(200, first.message.clone()));
    }

    let search = response
        .data
        .ok_or_else(|| FetchError::InvalidResponse("GraphQL response has no data".to_string()))?
        .search;

    let items = search
        .nodes
        .into_iter()
        .filter_map(|node| match node {
            SearchNode::PullRequest(pr) => Some(convert_graphql_pr(*pr)),
            SearchNode::Other => None,
        })
        .collect();

    Ok(SearchPage {
        items,
        has_next_page: search.page_info.has_next_page,
        end_cursor: search.page_info.end_cursor,
    })
}
