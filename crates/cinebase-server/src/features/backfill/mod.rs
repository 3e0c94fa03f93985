//! Backfill feature module
//!
//! Start, stop and resume the continuous backfill loop and read its progress.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::backfill_routes;
