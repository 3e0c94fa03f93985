//! Jobs feature module
//!
//! Read-only view of the background queue. No triggers here; work is
//! queued through the imports and backfill slices.

pub mod queries;
pub mod routes;

pub use routes::jobs_routes;
