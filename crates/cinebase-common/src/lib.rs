//! Cinebase Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Cinebase workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`CinebaseError`] and the crate [`Result`] alias
//! - **Logging**: centralized `tracing` setup driven by environment variables
//! - **Identifiers**: validated TMDb and IMDb identifiers
//! - **Text**: title and name normalization plus string similarity used by
//!   the festival reconciliation cascade
//!
//! # Example
//!
//! ```no_run
//! use cinebase_common::ids::ImdbId;
//! use cinebase_common::text::title_similarity;
//!
//! fn main() -> cinebase_common::Result<()> {
//!     let id: ImdbId = "tt0111161".parse()?;
//!     let score = title_similarity("The Shawshank Redemption", "Shawshank Redemption");
//!     tracing::info!(%id, score, "compared titles");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ids;
pub mod logging;
pub mod text;

// Re-export commonly used types
pub use error::{CinebaseError, Result};
pub use ids::{ImdbId, TmdbId};
