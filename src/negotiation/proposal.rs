//! Proposals and negotiated terms
//!
//! A proposal is one round of an offer/counter-offer thread. Terms are a
//! snapshot: a counter-offer carries forward any field it does not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// On the table, awaiting the counterparty's decision
    Pending,
    /// Accepted; the whole request is agreed
    Accepted,
    /// Rejected by the counterparty
    Rejected,
    /// Replaced by a later counter-offer
    Superseded,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::Superseded => "superseded",
        }
    }

    /// A pending proposal is the only one a party can still act on
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl std::str::FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "accepted" => Ok(ProposalStatus::Accepted),
            "rejected" => Ok(ProposalStatus::Rejected),
            "superseded" => Ok(ProposalStatus::Superseded),
            _ => Err(format!("Invalid proposal status: {}", s)),
        }
    }
}

/// Negotiated terms carried by a proposal
///
/// All fields are optional; the engine never interprets the reference
/// fields, it only stores them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Terms {
    /// Offered price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_amount: Option<f64>,
    /// Free-text timeline ("4 weeks", "by March")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    /// Opaque reference to an external scope document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_ref: Option<String>,
    /// Opaque reference to an external terms document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_ref: Option<String>,
}

impl Terms {
    /// Merge these terms over a base snapshot.
    ///
    /// Fields left unspecified here inherit the base's value; this is the
    /// counter-offer diff semantic. There is no way to clear a field.
    pub fn merged_over(&self, base: &Terms) -> Terms {
        Terms {
            quote_amount: self.quote_amount.or(base.quote_amount),
            timeline: self.timeline.clone().or_else(|| base.timeline.clone()),
            scope_ref: self.scope_ref.clone().or_else(|| base.scope_ref.clone()),
            terms_ref: self.terms_ref.clone().or_else(|| base.terms_ref.clone()),
        }
    }

    /// Validate the snapshot: non-negative finite quote, non-blank references.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(amount) = self.quote_amount {
            if !amount.is_finite() {
                return Err("quote_amount must be a finite number".to_string());
            }
            if amount < 0.0 {
                return Err(format!("quote_amount must be non-negative, got {}", amount));
            }
        }
        for (name, value) in [("scope_ref", &self.scope_ref), ("terms_ref", &self.terms_ref)] {
            if let Some(value) = value {
                if value.trim().is_empty() {
                    return Err(format!("{} must not be blank", name));
                }
            }
        }
        Ok(())
    }
}

/// One round of a negotiation thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique identifier
    pub id: Uuid,
    /// The request this proposal belongs to
    pub request_id: Uuid,
    /// The party that put these terms on the table
    pub from_actor_id: Uuid,
    /// 1-based position within the thread
    pub round: i64,
    /// The proposal this one counters, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_proposal_id: Option<Uuid>,
    /// Terms snapshot
    #[serde(flatten)]
    pub terms: Terms,
    /// Current status
    pub status: ProposalStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    /// Create the round-1 opening proposal for a request
    pub fn opening(request_id: Uuid, from_actor_id: Uuid, terms: Terms) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_id,
            from_actor_id,
            round: 1,
            parent_proposal_id: None,
            terms,
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a counter-offer forked from `base`.
    ///
    /// The changed terms are merged over the base snapshot so unspecified
    /// fields carry forward.
    pub fn counter_to(base: &Proposal, from_actor_id: Uuid, changes: &Terms) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_id: base.request_id,
            from_actor_id,
            round: base.round + 1,
            parent_proposal_id: Some(base.id),
            terms: changes.merged_over(&base.terms),
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
