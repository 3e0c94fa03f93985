//! Events feature module
//!
//! Live import progress over Server-Sent Events.

pub mod routes;

pub use routes::events_routes;
