//! Feature modules implementing the HTTP API
//!
//! Each feature is a vertical slice with its own commands, queries and
//! routes. Commands and queries implement `mediator::Request` and are handled
//! by free `handle` functions.
//!
//! # Features
//!
//! - **backfill**: start, stop, resume and inspect the backfill loop
//! - **imports**: queue list imports, festival imports and movie fetches
//! - **jobs**: read-only view of the background queue
//! - **gap**: missing-movie analysis
//! - **events**: live progress notifications over SSE

pub mod backfill;
pub mod events;
pub mod gap;
pub mod imports;
pub mod jobs;

use axum::Router;

use crate::ingest::Services;
use crate::notify::BroadcastNotifier;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub services: Services,
    /// Same notifier the workers publish to, for SSE subscribers
    pub events: BroadcastNotifier,
}

/// Creates the API router with every feature mounted under its prefix
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/backfill", backfill::backfill_routes().with_state(state.services.clone()))
        .nest("/imports", imports::imports_routes().with_state(state.services.clone()))
        .nest("/jobs", jobs::jobs_routes().with_state(state.services.clone()))
        .nest("/gap", gap::gap_routes().with_state(state.services.clone()))
        .nest("/events", events::events_routes().with_state(state.events))
}
