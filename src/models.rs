//! Wire models for the HTTP interface

use serde::Deserialize;
use uuid::Uuid;

use crate::negotiation::Terms;

/// Request to create a new work request, optionally opening negotiation
/// with round-1 terms in the same call
#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub title: String,
    pub description: Option<String>,
    pub organizer_id: Uuid,
    /// Present when the request is directed at a specific provider
    pub provider_id: Option<Uuid>,
    pub terms: Option<Terms>,
}

/// Request to place the round-1 opening proposal
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub organizer_id: Uuid,
    pub terms: Terms,
}

/// Request to counter an existing proposal with changed terms
#[derive(Debug, Deserialize)]
pub struct CounterBody {
    pub actor_id: Uuid,
    pub base_proposal_id: Uuid,
    /// Only the changed fields; everything else carries forward
    #[serde(default)]
    pub changes: Terms,
}

/// Request to accept or reject the active proposal
#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub actor_id: Uuid,
    pub proposal_id: Uuid,
}

/// Request to cancel a work request
#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub actor_id: Uuid,
}

/// Query parameters for the thread projection
#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub actor_id: Option<Uuid>,
}
