//! Offer/counter-offer negotiation for work engagements
//!
//! This module implements the negotiation protocol: a strict state machine
//! governing how a request's proposal thread evolves, who may act at each
//! step, and how acceptance or rejection resolves the whole request.

pub mod engine;
pub mod projector;
pub mod proposal;
pub mod request;

pub use engine::{NegotiationEngine, NegotiationError, NegotiationEvent};
pub use projector::ThreadProjection;
pub use proposal::{Proposal, ProposalStatus, Terms};
pub use request::{EngagementStatus, RequestStatus, WorkRequest};
