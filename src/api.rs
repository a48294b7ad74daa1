//! HTTP interface for the negotiation core
//!
//! Thin handlers: decode the body, call the engine, return the fresh
//! projection. All protocol decisions live in the engine.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CancelBody, CounterBody, CreateRequestBody, DecisionBody, SubmitBody, ThreadQuery,
};
use crate::negotiation::{NegotiationError, ThreadProjection, WorkRequest};
use crate::AppState;

/// Thread projection plus, when an actor was named, whether they may act
#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    #[serde(flatten)]
    pub thread: ThreadProjection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actionable: Option<bool>,
}

impl ThreadResponse {
    fn new(thread: ThreadProjection, actor_id: Option<Uuid>) -> Self {
        let actionable = actor_id.map(|actor| thread.actionable_by(actor));
        Self { thread, actionable }
    }
}

/// Build the API router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id/proposals", post(submit))
        .route("/requests/:id/thread", get(get_thread))
        .route("/requests/:id/counter", post(counter))
        .route("/requests/:id/accept", post(accept))
        .route("/requests/:id/reject", post(reject))
        .route("/requests/:id/cancel", post(cancel))
        .route("/requests/:id/delivery/start", post(start_delivery))
        .route("/requests/:id/delivery/complete", post(complete_delivery))
}

async fn health() -> &'static str {
    "ok"
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<ThreadResponse>)> {
    // Validate opening terms up front so a refusal leaves no orphan row
    if let Some(terms) = &body.terms {
        terms.validate().map_err(NegotiationError::InvalidTerms)?;
    }

    let request = state
        .store
        .create_request(
            &body.title,
            body.description.as_deref().unwrap_or_default(),
            body.organizer_id,
            body.provider_id,
        )
        .await?;

    tracing::info!(request_id = %request.id, organizer_id = %request.organizer_id, "created work request");

    let thread = match body.terms {
        Some(terms) => {
            state
                .engine
                .submit(request.id, body.organizer_id, terms)
                .await?
        }
        None => state.engine.projection(request.id).await?,
    };

    Ok((StatusCode::CREATED, Json(ThreadResponse::new(thread, None))))
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WorkRequest>>> {
    Ok(Json(state.store.list_requests().await?))
}

async fn submit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<ThreadResponse>)> {
    let thread = state.engine.submit(id, body.organizer_id, body.terms).await?;
    Ok((StatusCode::CREATED, Json(ThreadResponse::new(thread, None))))
}

async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<ThreadResponse>> {
    let thread = state.engine.projection(id).await?;
    Ok(Json(ThreadResponse::new(thread, query.actor_id)))
}

async fn counter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CounterBody>,
) -> Result<Json<ThreadResponse>> {
    let thread = state
        .engine
        .counter(id, body.actor_id, body.base_proposal_id, body.changes)
        .await?;
    Ok(Json(ThreadResponse::new(thread, Some(body.actor_id))))
}

async fn accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<ThreadResponse>> {
    let thread = state
        .engine
        .accept(id, body.actor_id, body.proposal_id)
        .await?;
    Ok(Json(ThreadResponse::new(thread, Some(body.actor_id))))
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<ThreadResponse>> {
    let thread = state
        .engine
        .reject(id, body.actor_id, body.proposal_id)
        .await?;
    Ok(Json(ThreadResponse::new(thread, Some(body.actor_id))))
}

async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelBody>,
) -> Result<Json<ThreadResponse>> {
    let thread = state.engine.cancel(id, body.actor_id).await?;
    Ok(Json(ThreadResponse::new(thread, None)))
}

async fn start_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ThreadResponse>> {
    let thread = state.engine.begin_delivery(id).await?;
    Ok(Json(ThreadResponse::new(thread, None)))
}

async fn complete_delivery(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ThreadResponse>> {
    let thread = state.engine.complete_delivery(id).await?;
    Ok(Json(ThreadResponse::new(thread, None)))
}
