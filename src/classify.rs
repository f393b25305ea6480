//! Priority classification of pull request records.
//!
//! Rules are evaluated top to bottom and the first match wins. The result
//! depends only on the record and the viewer login.

use crate::types::{ChecksStatus, PriorityTier, PullRequestRecord, QueryKind, ReviewDecision};

pub const REASON_CHECKS_FAILING: &str = "Checks Failing";
pub const REASON_REVIEW_REQUESTED: &str = "Review Requested";
pub const REASON_ASSIGNED: &str = "Assigned";
pub const REASON_CHANGES_REQUESTED: &str = "Changes Requested";
pub const REASON_APPROVED: &str = "Approved — Ready to Merge";
pub const REASON_AWAITING_REVIEW: &str = "Awaiting Review";
pub const REASON_WATCHING: &str = "Mentioned/Watching";

pub fn classify(record: &PullRequestRecord, viewer: &str) -> (PriorityTier, &'static str) {
    let own = record.is_author_self;

    if own && record.checks_status == ChecksStatus::Failure {
        return (PriorityTier::High, REASON_CHECKS_FAILING);
    }

    if record.query_kind == QueryKind::ReviewRequested
        || (!own && record.review_decision == ReviewDecision::ReviewRequired)
    {
        return (PriorityTier::High, REASON_REVIEW_REQUESTED);
    }

    if record.query_kind == QueryKind::Assigned || (!own && record.is_assigned_to(viewer)) {
        return (PriorityTier::High, REASON_ASSIGNED);
    }

    if own {
        return match record.review_decision {
            ReviewDecision::ChangesRequested => (PriorityTier::Medium, REASON_CHANGES_REQUESTED),
            ReviewDecision::Approved => (PriorityTier::Low, REASON_APPROVED),
            _ => (PriorityTier::Low, REASON_AWAITING_REVIEW),
        };
    }

    (PriorityTier::Watching, REASON_WATCHING)
}

/// Classifies `record` in place.
pub fn apply(record: &mut PullRequestRecord, viewer: &str) {
    let (tier, reason) = classify(record, viewer);
    record.priority_tier = tier;
    record.priority_reason = reason.to_string();
}
