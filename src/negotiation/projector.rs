//! Read-only thread view assembly
//!
//! A projection is a pure function over the stored request and proposal
//! rows; the denormalized request columns never feed into it.

use serde::Serialize;
use uuid::Uuid;

use super::proposal::{Proposal, ProposalStatus};
use super::request::WorkRequest;

/// A rendered negotiation thread for one request
#[derive(Debug, Clone, Serialize)]
pub struct ThreadProjection {
    /// The owning request
    pub request: WorkRequest,
    /// All proposals, ordered by round
    pub proposals: Vec<Proposal>,
    /// The single pending proposal, if the thread has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_proposal: Option<Proposal>,
    /// Highest round number (0 for an empty thread)
    pub round_count: i64,
    /// Whether any proposal has been accepted
    pub is_active_engagement: bool,
}

impl ThreadProjection {
    /// Assemble the projection from stored rows
    pub fn project(request: WorkRequest, mut proposals: Vec<Proposal>) -> Self {
        proposals.sort_by_key(|p| p.round);

        let active_proposal = proposals
            .iter()
            .find(|p| p.status == ProposalStatus::Pending)
            .cloned();
        let round_count = proposals.last().map(|p| p.round).unwrap_or(0);
        let is_active_engagement = proposals
            .iter()
            .any(|p| p.status == ProposalStatus::Accepted);

        Self {
            request,
            proposals,
            active_proposal,
            round_count,
            is_active_engagement,
        }
    }

    /// Whether `actor_id` may accept, reject, or counter the active proposal
    pub fn actionable_by(&self, actor_id: Uuid) -> bool {
        match &self.active_proposal {
            Some(active) => active.from_actor_id != actor_id,
            None => false,
        }
    }

    /// The most recent proposal regardless of status
    pub fn latest_proposal(&self) -> Option<&Proposal> {
        self.proposals.last()
    }
}
