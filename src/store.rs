//! Database store for work requests and proposals
//!
//! Mutations that resolve a negotiation step run as a single transaction
//! whose first write is a compare-and-set on the pending proposal (or the
//! `UNIQUE (request_id, round)` constraint for inserts). A raced write
//! reports "not applied" instead of overwriting the earlier decision.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::negotiation::{
    EngagementStatus, Proposal, ProposalStatus, RequestStatus, Terms, WorkRequest,
};

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Request operations

    pub async fn create_request(
        &self,
        title: &str,
        description: &str,
        organizer_id: Uuid,
        provider_id: Option<Uuid>,
    ) -> Result<WorkRequest> {
        let mut request = WorkRequest::new(title, description, organizer_id);
        if let Some(provider_id) = provider_id {
            request = request.with_provider(provider_id);
        }

        sqlx::query(
            r#"
            INSERT INTO requests (id, title, description, organizer_id, provider_id, status, engagement_status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.organizer_id.to_string())
        .bind(request.provider_id.map(|u| u.to_string()))
        .bind(request.status.as_str())
        .bind(request.engagement_status.as_str())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(request)
    }

    pub async fn get_request(&self, id: Uuid) -> Result<WorkRequest> {
        let row = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, title, description, organizer_id, provider_id, status, engagement_status, created_at, updated_at
            FROM requests
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))?;

        row.try_into()
    }

    pub async fn list_requests(&self) -> Result<Vec<WorkRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(
            r#"
            SELECT id, title, description, organizer_id, provider_id, status, engagement_status, created_at, updated_at
            FROM requests
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Proposal operations

    pub async fn get_proposal(&self, id: Uuid) -> Result<Proposal> {
        let row = sqlx::query_as::<_, ProposalRow>(
            r#"
            SELECT id, request_id, from_actor_id, round, parent_proposal_id, quote_amount, timeline, scope_ref, terms_ref, status, created_at, updated_at
            FROM proposals
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", id)))?;

        row.try_into()
    }

    pub async fn proposals_for_request(&self, request_id: Uuid) -> Result<Vec<Proposal>> {
        let rows = sqlx::query_as::<_, ProposalRow>(
            r#"
            SELECT id, request_id, from_actor_id, round, parent_proposal_id, quote_amount, timeline, scope_ref, terms_ref, status, created_at, updated_at
            FROM proposals
            WHERE request_id = ?
            ORDER BY round ASC
            "#,
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Atomic negotiation writes
    //
    // Each returns Ok(false) when the optimistic guard failed, i.e. another
    // action committed between the caller's read and this write.

    /// Insert the round-1 proposal and mark its request pending.
    ///
    /// The round uniqueness constraint is the guard: a racing duplicate
    /// submit loses the insert.
    pub async fn insert_opening_proposal(&self, proposal: &Proposal) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !insert_proposal(&mut tx, proposal).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE requests SET status = ?, updated_at = ? WHERE id = ?
            "#,
        )
        .bind(RequestStatus::Pending.as_str())
        .bind(Utc::now())
        .bind(proposal.request_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Supersede the active proposal and append its counter, atomically.
    pub async fn supersede_and_counter(&self, base_id: Uuid, next: &Proposal) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            r#"
            UPDATE proposals SET status = ?, updated_at = ? WHERE id = ? AND status = ?
            "#,
        )
        .bind(ProposalStatus::Superseded.as_str())
        .bind(Utc::now())
        .bind(base_id.to_string())
        .bind(ProposalStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        if superseded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if !insert_proposal(&mut tx, next).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        mark_negotiating(&mut tx, next.request_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Append a fresh counter to a thread left without an active proposal
    /// (resuming after a round > 1 rejection). The round uniqueness
    /// constraint is the guard.
    pub async fn append_counter(&self, next: &Proposal) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !insert_proposal(&mut tx, next).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        mark_negotiating(&mut tx, next.request_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Accept the active proposal: the request becomes agreed and, if the
    /// provider is still unknown, `provider_id` is recorded.
    pub async fn resolve_accept(
        &self,
        proposal_id: Uuid,
        request_id: Uuid,
        provider_id: Uuid,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !resolve_pending(&mut tx, proposal_id, ProposalStatus::Accepted).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE requests
            SET status = ?, engagement_status = ?, provider_id = COALESCE(provider_id, ?), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(RequestStatus::Agreed.as_str())
        .bind(EngagementStatus::Active.as_str())
        .bind(provider_id.to_string())
        .bind(Utc::now())
        .bind(request_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Reject the active proposal. A round-1 rejection declines the whole
    /// request; a later one leaves the request negotiating with no active
    /// proposal.
    pub async fn resolve_reject(
        &self,
        proposal_id: Uuid,
        request_id: Uuid,
        decline_request: bool,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !resolve_pending(&mut tx, proposal_id, ProposalStatus::Rejected).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        if decline_request {
            sqlx::query(
                r#"
                UPDATE requests SET status = ?, engagement_status = ?, updated_at = ? WHERE id = ?
                "#,
            )
            .bind(RequestStatus::Declined.as_str())
            .bind(EngagementStatus::None.as_str())
            .bind(Utc::now())
            .bind(request_id.to_string())
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE requests SET updated_at = ? WHERE id = ?
                "#,
            )
            .bind(Utc::now())
            .bind(request_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Withdraw a request that has not reached a terminal status. Any
    /// pending proposal is superseded so the thread closes cleanly.
    pub async fn cancel_request(&self, request_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query(
            r#"
            UPDATE requests
            SET status = ?, engagement_status = ?, updated_at = ?
            WHERE id = ? AND status IN (?, ?)
            "#,
        )
        .bind(RequestStatus::Cancelled.as_str())
        .bind(EngagementStatus::None.as_str())
        .bind(Utc::now())
        .bind(request_id.to_string())
        .bind(RequestStatus::Pending.as_str())
        .bind(RequestStatus::Negotiating.as_str())
        .execute(&mut *tx)
        .await?;

        if cancelled.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE proposals SET status = ?, updated_at = ? WHERE request_id = ? AND status = ?
            "#,
        )
        .bind(ProposalStatus::Superseded.as_str())
        .bind(Utc::now())
        .bind(request_id.to_string())
        .bind(ProposalStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Move a request along the delivery track, guarded on the exact source
    /// status (`agreed -> in_progress -> completed`).
    pub async fn advance_delivery(
        &self,
        request_id: Uuid,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(request_id.to_string())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

async fn insert_proposal(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    proposal: &Proposal,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO proposals (id, request_id, from_actor_id, round, parent_proposal_id, quote_amount, timeline, scope_ref, terms_ref, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(proposal.id.to_string())
    .bind(proposal.request_id.to_string())
    .bind(proposal.from_actor_id.to_string())
    .bind(proposal.round)
    .bind(proposal.parent_proposal_id.map(|u| u.to_string()))
    .bind(proposal.terms.quote_amount)
    .bind(proposal.terms.timeline.as_deref())
    .bind(proposal.terms.scope_ref.as_deref())
    .bind(proposal.terms.terms_ref.as_deref())
    .bind(proposal.status.as_str())
    .bind(proposal.created_at)
    .bind(proposal.updated_at)
    .execute(&mut **tx)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

async fn resolve_pending(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    proposal_id: Uuid,
    status: ProposalStatus,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE proposals SET status = ?, updated_at = ? WHERE id = ? AND status = ?
        "#,
    )
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(proposal_id.to_string())
    .bind(ProposalStatus::Pending.as_str())
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn mark_negotiating(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    request_id: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE requests SET status = ?, engagement_status = ?, updated_at = ? WHERE id = ?
        "#,
    )
    .bind(RequestStatus::Negotiating.as_str())
    .bind(EngagementStatus::Negotiating.as_str())
    .bind(Utc::now())
    .bind(request_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    title: String,
    description: String,
    organizer_id: String,
    provider_id: Option<String>,
    status: String,
    engagement_status: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl TryFrom<RequestRow> for WorkRequest {
    type Error = AppError;

    fn try_from(row: RequestRow) -> Result<Self> {
        let provider_id = row
            .provider_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid provider_id UUID: {}", e)))?;

        Ok(WorkRequest {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            title: row.title,
            description: row.description,
            organizer_id: Uuid::parse_str(&row.organizer_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            provider_id,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            engagement_status: row
                .engagement_status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid engagement status: {}", e)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: String,
    request_id: String,
    from_actor_id: String,
    round: i64,
    parent_proposal_id: Option<String>,
    quote_amount: Option<f64>,
    timeline: Option<String>,
    scope_ref: Option<String>,
    terms_ref: Option<String>,
    status: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl TryFrom<ProposalRow> for Proposal {
    type Error = AppError;

    fn try_from(row: ProposalRow) -> Result<Self> {
        let parent_proposal_id = row
            .parent_proposal_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid parent_proposal_id UUID: {}", e)))?;

        Ok(Proposal {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            request_id: Uuid::parse_str(&row.request_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            from_actor_id: Uuid::parse_str(&row.from_actor_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            round: row.round,
            parent_proposal_id,
            terms: Terms {
                quote_amount: row.quote_amount,
                timeline: row.timeline,
                scope_ref: row.scope_ref,
                terms_ref: row.terms_ref,
            },
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
