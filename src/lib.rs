//! Parley server - offer/counter-offer negotiation broker for work engagements

pub mod api;
pub mod error;
pub mod models;
pub mod negotiation;
pub mod store;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::negotiation::NegotiationEngine;
use crate::store::Store;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub engine: NegotiationEngine,
}

impl AppState {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        let store = Store::new(pool);
        let engine = NegotiationEngine::new(store.clone());
        Arc::new(Self { store, engine })
    }
}
