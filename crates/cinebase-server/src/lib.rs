//! Cinebase Server Library
//!
//! Background import pipeline and HTTP control surface for the Cinebase
//! movie catalogue.
//!
//! # Overview
//!
//! - **Queue**: a durable job queue ([`queue::JobQueue`]) with Postgres and
//!   in-memory backends, plus the polling [`queue::runner::QueueRunner`]
//! - **Progress**: a small key/value store holding import status and counters
//! - **Store**: movies, people, ceremonies and nominations
//! - **Sources**: rate-limited clients for TMDb, OMDb, the daily id export and
//!   IMDb event pages
//! - **Ingest**: gap analysis, fetch/enrich workers, list imports, the
//!   continuous backfill loop and festival imports
//! - **Features**: CQRS slices exposing the pipeline over HTTP
//!
//! # Architecture
//!
//! Workers never call each other. Every piece of work is a job; every
//! cross-job decision reads the queue or the progress store. The HTTP
//! layer only enqueues and reads.
//!
//! ```text
//! HTTP -> features -> ingest::queue_* -> JobQueue
//!                                           |
//!                       QueueRunner -> Dispatcher -> workers -> MovieStore
//!                                                        \-> ProgressStore
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod notify;
pub mod progress;
pub mod queue;
pub mod sources;
pub mod store;

pub use config::Config;
pub use error::AppError;
pub use ingest::Services;
