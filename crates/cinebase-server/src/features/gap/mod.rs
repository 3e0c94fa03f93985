//! Gap analysis feature module
//!
//! Which movies in the provider's id export are not stored locally.

pub mod queries;
pub mod routes;

pub use routes::gap_routes;
