//! Work requests and their lifecycle statuses
//!
//! A work request is the unit a negotiation thread hangs off of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a work request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Opening proposal is on the table, awaiting a response
    Pending,
    /// At least one counter-offer has been made
    Negotiating,
    /// A proposal was accepted; the engagement is live
    Agreed,
    /// The opening proposal was rejected outright
    Declined,
    /// Delivery has started (driven by the delivery surface)
    InProgress,
    /// Delivery finished (driven by the delivery surface)
    Completed,
    /// The organizer withdrew the request
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Negotiating => "negotiating",
            RequestStatus::Agreed => "agreed",
            RequestStatus::Declined => "declined",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Check if negotiation is closed for this status.
    ///
    /// `agreed` counts: once a proposal is accepted no further negotiation
    /// actions are legal, even though delivery is still ahead.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending | RequestStatus::Negotiating)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "negotiating" => Ok(RequestStatus::Negotiating),
            "agreed" => Ok(RequestStatus::Agreed),
            "declined" => Ok(RequestStatus::Declined),
            "in_progress" => Ok(RequestStatus::InProgress),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Derived engagement state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    /// No engagement exists (fresh, declined, or cancelled)
    None,
    /// Parties are exchanging counter-offers
    Negotiating,
    /// A proposal was accepted; the parties are engaged
    Active,
}

impl EngagementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementStatus::None => "none",
            EngagementStatus::Negotiating => "negotiating",
            EngagementStatus::Active => "active",
        }
    }
}

impl std::str::FromStr for EngagementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EngagementStatus::None),
            "negotiating" => Ok(EngagementStatus::Negotiating),
            "active" => Ok(EngagementStatus::Active),
            _ => Err(format!("Invalid engagement status: {}", s)),
        }
    }
}

/// A work request between an organizer and a (possibly not yet known) provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest {
    /// Unique identifier
    pub id: Uuid,
    /// Short title of the requested work
    pub title: String,
    /// Longer description of the requested work
    pub description: String,
    /// The party requesting the work
    pub organizer_id: Uuid,
    /// The party fulfilling the work; set on acceptance if not earlier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<Uuid>,
    /// Current status
    pub status: RequestStatus,
    /// Derived engagement state, kept in sync by the engine
    pub engagement_status: EngagementStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl WorkRequest {
    /// Create a new request with no proposals yet
    pub fn new(title: impl Into<String>, description: impl Into<String>, organizer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            organizer_id,
            provider_id: None,
            status: RequestStatus::Pending,
            engagement_status: EngagementStatus::None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Direct the request at a specific provider from the start
    pub fn with_provider(mut self, provider_id: Uuid) -> Self {
        self.provider_id = Some(provider_id);
        self
    }

    /// The other party of the request, from `actor_id`'s point of view
    pub fn counterparty_of(&self, actor_id: Uuid) -> Option<Uuid> {
        if actor_id == self.organizer_id {
            self.provider_id
        } else {
            Some(self.organizer_id)
        }
    }

    /// Check whether `actor_id` is one of the request's known parties
    pub fn is_party(&self, actor_id: Uuid) -> bool {
        actor_id == self.organizer_id || self.provider_id == Some(actor_id)
    }
}
