//! Negotiation engine
//!
//! The engine is the only writer of negotiation state. Each operation loads
//! the thread, checks the protocol preconditions against that snapshot, and
//! applies the result through one of the store's guarded transactions. A
//! guard that fails (someone else committed first) surfaces as `Conflict`;
//! the caller refetches the projection and decides again.

use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::store::Store;

use super::projector::ThreadProjection;
use super::proposal::{Proposal, ProposalStatus, Terms};
use super::request::{RequestStatus, WorkRequest};

/// Protocol failures, all expected and surfaced to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// Submit called on a request that already has an opening proposal
    #[error("request already has an opening proposal")]
    AlreadyInitiated,

    /// The targeted proposal is not the one currently on the table
    #[error("proposal {0} is not the active proposal")]
    NotActionable(Uuid),

    /// A party tried to act on its own still-open offer
    #[error("a party may not act on its own proposal")]
    SelfAction,

    /// The request already reached a terminal status
    #[error("negotiation is closed (request is {0})")]
    ThreadClosed(RequestStatus),

    /// A concurrent action won the optimistic check
    #[error("a concurrent action resolved this proposal first; refetch the thread")]
    Conflict,

    /// Negative quote or malformed references
    #[error("invalid terms: {0}")]
    InvalidTerms(String),
}

/// Events emitted after every committed transition
#[derive(Debug, Clone)]
pub enum NegotiationEvent {
    /// An opening proposal was placed on the table
    ProposalSubmitted {
        request_id: Uuid,
        proposal_id: Uuid,
        from_actor_id: Uuid,
    },
    /// A counter-offer replaced (or resumed after) an earlier proposal
    CounterOffered {
        request_id: Uuid,
        proposal_id: Uuid,
        base_proposal_id: Uuid,
        from_actor_id: Uuid,
        round: i64,
    },
    /// A proposal was accepted; the request is agreed
    ProposalAccepted {
        request_id: Uuid,
        proposal_id: Uuid,
        accepted_by: Uuid,
        provider_id: Uuid,
    },
    /// A proposal was rejected
    ProposalRejected {
        request_id: Uuid,
        proposal_id: Uuid,
        rejected_by: Uuid,
        request_declined: bool,
    },
    /// The organizer withdrew the request
    RequestCancelled {
        request_id: Uuid,
        cancelled_by: Uuid,
    },
    /// Delivery started on an agreed request
    DeliveryStarted { request_id: Uuid },
    /// Delivery finished
    DeliveryCompleted { request_id: Uuid },
}

/// Stateless decision logic over the request/proposal stores
#[derive(Clone)]
pub struct NegotiationEngine {
    store: Store,
    event_tx: broadcast::Sender<NegotiationEvent>,
}

impl NegotiationEngine {
    pub fn new(store: Store) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { store, event_tx }
    }

    /// Subscribe to negotiation events
    pub fn subscribe(&self) -> broadcast::Receiver<NegotiationEvent> {
        self.event_tx.subscribe()
    }

    /// The `GetProjection` query: the full thread view for a request
    pub async fn projection(&self, request_id: Uuid) -> Result<ThreadProjection> {
        let request = self.store.get_request(request_id).await?;
        let proposals = self.store.proposals_for_request(request_id).await?;
        Ok(ThreadProjection::project(request, proposals))
    }

    /// Place the round-1 opening proposal on the table
    pub async fn submit(
        &self,
        request_id: Uuid,
        organizer_id: Uuid,
        terms: Terms,
    ) -> Result<ThreadProjection> {
        terms.validate().map_err(NegotiationError::InvalidTerms)?;

        let (request, proposals) = self.load_open_thread(request_id).await?;
        if organizer_id != request.organizer_id {
            return Err(AppError::BadRequest(
                "Only the organizer may open the negotiation".to_string(),
            ));
        }
        if !proposals.is_empty() {
            return Err(NegotiationError::AlreadyInitiated.into());
        }

        let proposal = Proposal::opening(request_id, organizer_id, terms);
        if !self.store.insert_opening_proposal(&proposal).await? {
            // Lost the round-1 insert to a concurrent submit
            return Err(NegotiationError::AlreadyInitiated.into());
        }

        let _ = self.event_tx.send(NegotiationEvent::ProposalSubmitted {
            request_id,
            proposal_id: proposal.id,
            from_actor_id: organizer_id,
        });

        self.projection(request_id).await
    }

    /// Fork new terms from an existing proposal.
    ///
    /// Normally the base must be the active proposal and the actor its
    /// counterparty; the base is superseded atomically with the insert.
    /// When the thread has no active proposal (a round > 1 rejection), the
    /// rejected proposal's author may resume with a fresh counter anchored
    /// at it.
    pub async fn counter(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        base_proposal_id: Uuid,
        changes: Terms,
    ) -> Result<ThreadProjection> {
        let (request, proposals) = self.load_open_thread(request_id).await?;
        ensure_party(&request, actor_id)?;

        let next = match active_of(&proposals) {
            Some(active) => {
                if active.id != base_proposal_id {
                    return Err(NegotiationError::NotActionable(base_proposal_id).into());
                }
                if active.from_actor_id == actor_id {
                    return Err(NegotiationError::SelfAction.into());
                }

                let next = Proposal::counter_to(active, actor_id, &changes);
                next.terms.validate().map_err(NegotiationError::InvalidTerms)?;

                if !self.store.supersede_and_counter(active.id, &next).await? {
                    return Err(NegotiationError::Conflict.into());
                }
                next
            }
            None => {
                // Mid-reject resumption: only the latest, rejected proposal
                // is a legal anchor, and only for its own author (the
                // rejecting actor's counterpart).
                let latest = proposals
                    .last()
                    .filter(|p| p.status == ProposalStatus::Rejected)
                    .ok_or(NegotiationError::NotActionable(base_proposal_id))?;
                if latest.id != base_proposal_id || latest.from_actor_id != actor_id {
                    return Err(NegotiationError::NotActionable(base_proposal_id).into());
                }

                let next = Proposal::counter_to(latest, actor_id, &changes);
                next.terms.validate().map_err(NegotiationError::InvalidTerms)?;

                if !self.store.append_counter(&next).await? {
                    return Err(NegotiationError::Conflict.into());
                }
                next
            }
        };

        let _ = self.event_tx.send(NegotiationEvent::CounterOffered {
            request_id,
            proposal_id: next.id,
            base_proposal_id,
            from_actor_id: actor_id,
            round: next.round,
        });

        self.projection(request_id).await
    }

    /// Accept the active proposal, closing the thread as agreed
    pub async fn accept(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        proposal_id: Uuid,
    ) -> Result<ThreadProjection> {
        let (request, proposals) = self.load_open_thread(request_id).await?;
        ensure_party(&request, actor_id)?;
        let active = self.actionable_target(&proposals, actor_id, proposal_id)?;

        // The provider is whichever side of the deal is not the organizer;
        // the store only records it if it is still unset.
        let provider_id = if actor_id == request.organizer_id {
            active.from_actor_id
        } else {
            actor_id
        };

        if !self.store.resolve_accept(active.id, request_id, provider_id).await? {
            return Err(NegotiationError::Conflict.into());
        }

        let _ = self.event_tx.send(NegotiationEvent::ProposalAccepted {
            request_id,
            proposal_id: active.id,
            accepted_by: actor_id,
            provider_id,
        });

        self.projection(request_id).await
    }

    /// Reject the active proposal.
    ///
    /// Rejecting round 1 declines the whole request; rejecting a later
    /// round only kills that counter and leaves the thread awaiting a
    /// fresh one from the rejected side.
    pub async fn reject(
        &self,
        request_id: Uuid,
        actor_id: Uuid,
        proposal_id: Uuid,
    ) -> Result<ThreadProjection> {
        let (request, proposals) = self.load_open_thread(request_id).await?;
        ensure_party(&request, actor_id)?;
        let active = self.actionable_target(&proposals, actor_id, proposal_id)?;

        let request_declined = active.round == 1;
        if !self
            .store
            .resolve_reject(active.id, request_id, request_declined)
            .await?
        {
            return Err(NegotiationError::Conflict.into());
        }

        let _ = self.event_tx.send(NegotiationEvent::ProposalRejected {
            request_id,
            proposal_id: active.id,
            rejected_by: actor_id,
            request_declined,
        });

        self.projection(request_id).await
    }

    /// Withdraw a request that has not reached a terminal status
    pub async fn cancel(&self, request_id: Uuid, actor_id: Uuid) -> Result<ThreadProjection> {
        let request = self.store.get_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(NegotiationError::ThreadClosed(request.status).into());
        }
        if actor_id != request.organizer_id {
            return Err(AppError::BadRequest(
                "Only the organizer may cancel a request".to_string(),
            ));
        }

        if !self.store.cancel_request(request_id).await? {
            return Err(NegotiationError::Conflict.into());
        }

        let _ = self.event_tx.send(NegotiationEvent::RequestCancelled {
            request_id,
            cancelled_by: actor_id,
        });

        self.projection(request_id).await
    }

    /// Delivery surface: `agreed -> in_progress`
    pub async fn begin_delivery(&self, request_id: Uuid) -> Result<ThreadProjection> {
        let request = self.store.get_request(request_id).await?;
        if request.status != RequestStatus::Agreed {
            return Err(AppError::BadRequest(format!(
                "Delivery cannot start while the request is {}",
                request.status
            )));
        }

        if !self
            .store
            .advance_delivery(request_id, RequestStatus::Agreed, RequestStatus::InProgress)
            .await?
        {
            return Err(NegotiationError::Conflict.into());
        }

        let _ = self
            .event_tx
            .send(NegotiationEvent::DeliveryStarted { request_id });

        self.projection(request_id).await
    }

    /// Delivery surface: `in_progress -> completed`
    pub async fn complete_delivery(&self, request_id: Uuid) -> Result<ThreadProjection> {
        let request = self.store.get_request(request_id).await?;
        if request.status != RequestStatus::InProgress {
            return Err(AppError::BadRequest(format!(
                "Delivery cannot complete while the request is {}",
                request.status
            )));
        }

        if !self
            .store
            .advance_delivery(request_id, RequestStatus::InProgress, RequestStatus::Completed)
            .await?
        {
            return Err(NegotiationError::Conflict.into());
        }

        let _ = self
            .event_tx
            .send(NegotiationEvent::DeliveryCompleted { request_id });

        self.projection(request_id).await
    }

    async fn load_open_thread(&self, request_id: Uuid) -> Result<(WorkRequest, Vec<Proposal>)> {
        let request = self.store.get_request(request_id).await?;
        if request.status.is_terminal() {
            return Err(NegotiationError::ThreadClosed(request.status).into());
        }
        let proposals = self.store.proposals_for_request(request_id).await?;
        Ok((request, proposals))
    }

    /// Resolve the accept/reject target: must be the active proposal and
    /// not the actor's own.
    fn actionable_target<'a>(
        &self,
        proposals: &'a [Proposal],
        actor_id: Uuid,
        proposal_id: Uuid,
    ) -> Result<&'a Proposal> {
        let active =
            active_of(proposals).ok_or(NegotiationError::NotActionable(proposal_id))?;
        if active.id != proposal_id {
            return Err(NegotiationError::NotActionable(proposal_id).into());
        }
        if active.from_actor_id == actor_id {
            return Err(NegotiationError::SelfAction.into());
        }
        Ok(active)
    }
}

fn active_of(proposals: &[Proposal]) -> Option<&Proposal> {
    proposals.iter().find(|p| p.status == ProposalStatus::Pending)
}

/// Once a provider is on record, outsiders cannot join the thread
fn ensure_party(request: &WorkRequest, actor_id: Uuid) -> Result<()> {
    if request.provider_id.is_some() && !request.is_party(actor_id) {
        return Err(AppError::BadRequest(
            "Actor is not a party to this request".to_string(),
        ));
    }
    Ok(())
}
