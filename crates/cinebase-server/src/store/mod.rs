//! Local movie store
//!
//! Everything the import workers persist: movies with their credits, people,
//! curated-list membership, festival ceremonies and nominations, failed
//! lookup markers and collaboration pairs. Every create is preceded by an
//! existence check inside the same operation, so replays of a job never
//! duplicate rows.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

pub use memory::MemoryMovieStore;
pub use models::{
    CanonicalEntry, Ceremony, CreditKind, FailedLookup, ImportStatus, Movie, MovieCredit,
    NewCredit, NewMovie, NewNomination, NewPerson, Nomination, NominationLinks, NominationWrite, Person,
};
pub use postgres::PgMovieStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound(format!("{} '{}'", resource, id))
    }
}

impl From<StoreError> for crate::queue::runner::JobError {
    fn from(err: StoreError) -> Self {
        crate::queue::runner::JobError::Retryable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failed lookup sources
pub mod lookup_source {
    pub const TMDB_MOVIE: &str = "tmdb_movie";
    pub const OMDB: &str = "omdb";
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    // Movies

    async fn movie(&self, id: i64) -> StoreResult<Option<Movie>>;

    async fn movie_by_tmdb_id(&self, tmdb_id: i64) -> StoreResult<Option<Movie>>;

    async fn movie_by_imdb_id(&self, imdb_id: &str) -> StoreResult<Option<Movie>>;

    /// TMDb ids of every stored movie
    async fn known_tmdb_ids(&self) -> StoreResult<HashSet<i64>>;

    /// Movies released within `[year - tolerance, year + tolerance]`, or all
    /// movies when `year` is unknown, capped at `limit`.
    async fn movies_near_year(&self, year: Option<i32>, tolerance: i32, limit: usize) -> StoreResult<Vec<Movie>>;

    /// Store a movie with genres and credits. Returns the existing movie
    /// unchanged if the TMDb id is already stored.
    async fn insert_full_movie(&self, movie: NewMovie, credits: Vec<NewCredit>) -> StoreResult<Movie>;

    /// Store a minimal record for a movie that failed the quality criteria.
    async fn insert_soft_movie(&self, movie: NewMovie, failed_criteria: Vec<String>) -> StoreResult<Movie>;

    async fn update_omdb(&self, movie_id: i64, data: Value) -> StoreResult<()>;

    async fn movie_credits(&self, movie_id: i64) -> StoreResult<Vec<MovieCredit>>;

    // Curated lists

    /// Tag a movie as a member of `list_key`. Merges into the existing map in
    /// one transaction; returns false if it was already tagged.
    async fn mark_canonical(&self, movie_id: i64, list_key: &str, entry: CanonicalEntry) -> StoreResult<bool>;

    async fn count_canonical(&self, list_key: &str) -> StoreResult<i64>;

    // People

    async fn person_by_imdb_id(&self, imdb_id: &str) -> StoreResult<Option<Person>>;

    async fn person_by_tmdb_id(&self, tmdb_id: i64) -> StoreResult<Option<Person>>;

    /// Find by TMDb id, then IMDb id, else insert.
    async fn upsert_person(&self, person: NewPerson) -> StoreResult<Person>;

    /// Existing placeholder with this name, or a new one.
    async fn placeholder_person(&self, name: &str) -> StoreResult<Person>;

    // Festivals

    async fn ceremony(&self, festival: &str, year: i32) -> StoreResult<Option<Ceremony>>;

    /// Existing ceremony for `(festival, year)` or a new one.
    async fn upsert_ceremony(&self, festival: &str, year: i32, source_format: &str) -> StoreResult<Ceremony>;

    async fn ceremony_years(&self, festival: &str) -> StoreResult<Vec<i32>>;

    /// Insert a nomination unless the same ceremony and category already
    /// record it (see [`NominationLinks::same_nomination`]). A stored row with
    /// weaker links (title only, pending TMDb id, placeholder person) is
    /// updated in place instead.
    async fn insert_nomination(&self, nomination: NewNomination) -> StoreResult<NominationWrite>;

    async fn nominations(&self, ceremony_id: i64) -> StoreResult<Vec<Nomination>>;

    /// Point nominations waiting on `tmdb_id` at the imported movie.
    async fn resolve_pending_nominations(&self, tmdb_id: i64, movie_id: i64) -> StoreResult<u64>;

    // Bookkeeping

    async fn record_failed_lookup(&self, lookup: FailedLookup) -> StoreResult<()>;

    async fn failed_lookup(&self, source: &str, identifier: &str) -> StoreResult<Option<FailedLookup>>;

    /// Identifiers with a failed lookup from `source`
    async fn failed_identifiers(&self, source: &str) -> StoreResult<HashSet<String>>;

    /// Record that two people worked on a movie. Order of the pair does not
    /// matter; returns false if already recorded.
    async fn record_collaboration(&self, person_a: i64, person_b: i64, movie_id: i64) -> StoreResult<bool>;

    async fn collaboration_count(&self, person_a: i64, person_b: i64) -> StoreResult<i64>;
}
