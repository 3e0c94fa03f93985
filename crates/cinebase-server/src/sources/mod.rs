//! External data sources
//!
//! Workers reach TMDb, OMDb, festival event pages and the TMDb daily id
//! export through the traits below. Each HTTP client paces itself with a
//! [`rate_limit::MinInterval`] limiter; none assumes the remote side
//! enforces its quota.

pub mod imdb_events;
pub mod omdb;
pub mod rate_limit;
pub mod tmdb;
pub mod universe;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::queue::runner::JobError;

pub use imdb_events::ImdbEventClient;
pub use omdb::OmdbClient;
pub use tmdb::TmdbClient;
pub use universe::TmdbExportUniverse;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Missing or rejected credentials. Retried, not permanent.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("Server error {status} from {url}")]
    Server { status: u16, url: String },

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SourceError {
    /// The resource is absent or off limits; retrying cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::Forbidden(_))
    }

    /// Map an HTTP status to an error, or `None` for success.
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status.as_u16() {
            404 => SourceError::NotFound(url.to_string()),
            401 => SourceError::Unauthorized(url.to_string()),
            403 => SourceError::Forbidden(url.to_string()),
            408 | 504 => SourceError::Timeout(url.to_string()),
            429 => SourceError::RateLimited(url.to_string()),
            code => SourceError::Server {
                status: code,
                url: url.to_string(),
            },
        })
    }

    fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(url.to_string())
        } else if err.is_decode() {
            SourceError::Decode(format!("{}: {}", url, err))
        } else {
            SourceError::Http(err)
        }
    }
}

impl From<SourceError> for JobError {
    fn from(err: SourceError) -> Self {
        if err.is_permanent() {
            JobError::Permanent(err.to_string())
        } else {
            JobError::Retryable(err.to_string())
        }
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Send a GET and decode the JSON body, mapping failures to [`SourceError`].
pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(request: reqwest::RequestBuilder, url: &str) -> SourceResult<T> {
    let response = request.send().await.map_err(|e| SourceError::from_reqwest(e, url))?;
    if let Some(err) = SourceError::from_status(response.status(), url) {
        return Err(err);
    }
    response.json::<T>().await.map_err(|e| SourceError::from_reqwest(e, url))
}

pub(crate) fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    pub tmdb_id: i64,
    pub name: String,
    pub character: Option<String>,
    pub order: Option<i32>,
    pub popularity: Option<f64>,
    pub imdb_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewMember {
    pub tmdb_id: i64,
    pub name: String,
    pub job: String,
    pub department: Option<String>,
    pub popularity: Option<f64>,
    pub imdb_id: Option<String>,
}

/// Everything the fetch worker needs from one movie lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub tmdb_id: i64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub popularity: Option<f64>,
    pub vote_count: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Vec<String>,
    pub cast: Vec<CastMember>,
    pub crew: Vec<CrewMember>,
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieCandidate {
    pub tmdb_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub popularity: Option<f64>,
}

impl MovieCandidate {
    pub fn year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonCandidate {
    pub tmdb_id: i64,
    pub name: String,
    pub popularity: Option<f64>,
    /// Titles the person is best known for
    pub known_for: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListInfo {
    pub list_id: String,
    pub name: String,
    pub total_pages: u32,
    pub item_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub tmdb_id: i64,
    pub title: String,
    /// 1-based rank within the list
    pub position: Option<i32>,
}

/// Secondary ratings for a movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ratings {
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<i64>,
    pub metascore: Option<i32>,
    /// Whole US dollars
    pub box_office: Option<i64>,
    pub runtime: Option<i32>,
    pub awards: Option<String>,
}

/// One id from the authoritative universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub tmdb_id: i64,
    pub popularity: Option<f64>,
    pub title: Option<String>,
}

/// Snapshot of the authoritative id universe
#[derive(Debug, Clone)]
pub struct Universe {
    pub entries: Arc<Vec<UniverseEntry>>,
    pub baseline_at: DateTime<Utc>,
}

#[async_trait]
pub trait MovieSource: Send + Sync {
    /// Details with credits, external ids and genres
    async fn get_movie(&self, tmdb_id: i64) -> SourceResult<MovieDetails>;

    /// TMDb ids of movies carrying this IMDb id
    async fn find_by_imdb_id(&self, imdb_id: &str) -> SourceResult<Vec<MovieCandidate>>;

    async fn search_movies(&self, query: &str, year: Option<i32>) -> SourceResult<Vec<MovieCandidate>>;

    async fn search_people(&self, query: &str) -> SourceResult<Vec<PersonCandidate>>;
}

#[async_trait]
pub trait ListSource: Send + Sync {
    async fn list_info(&self, list_id: &str) -> SourceResult<ListInfo>;

    async fn list_page(&self, list_id: &str, page: u32) -> SourceResult<Vec<ListItem>>;
}

#[async_trait]
pub trait RatingsSource: Send + Sync {
    async fn ratings(&self, imdb_id: &str) -> SourceResult<Ratings>;
}

#[async_trait]
pub trait CeremonySource: Send + Sync {
    /// Raw page or document for one ceremony year
    async fn fetch_ceremony(&self, event_id: &str, year: i32) -> SourceResult<String>;
}

#[async_trait]
pub trait IdUniverse: Send + Sync {
    async fn snapshot(&self) -> SourceResult<Universe>;
}
