//! TMDb API client

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::rate_limit::MinInterval;
use super::{
    get_json, parse_date, CastMember, CrewMember, ListInfo, ListItem, ListSource, MovieCandidate, MovieDetails,
    MovieSource, PersonCandidate, SourceError, SourceResult,
};

pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub min_interval: Duration,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
        }
    }
}

impl TmdbConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TMDB_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("TMDB_API_KEY").unwrap_or_default(),
            timeout: std::env::var("TMDB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            min_interval: std::env::var("TMDB_MIN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    id: i64,
    imdb_id: Option<String>,
    title: String,
    original_title: Option<String>,
    release_date: Option<String>,
    popularity: Option<f64>,
    vote_count: Option<i32>,
    runtime: Option<i32>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    credits: TmdbCredits,
    external_ids: Option<TmdbExternalIds>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct TmdbCredits {
    #[serde(default)]
    cast: Vec<TmdbCast>,
    #[serde(default)]
    crew: Vec<TmdbCrew>,
}

#[derive(Debug, Deserialize)]
struct TmdbCast {
    id: i64,
    name: String,
    character: Option<String>,
    order: Option<i32>,
    popularity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TmdbCrew {
    id: i64,
    name: String,
    job: String,
    department: Option<String>,
    popularity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TmdbExternalIds {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieHit {
    id: i64,
    title: Option<String>,
    original_title: Option<String>,
    release_date: Option<String>,
    popularity: Option<f64>,
}

impl From<TmdbMovieHit> for MovieCandidate {
    fn from(hit: TmdbMovieHit) -> Self {
        MovieCandidate {
            tmdb_id: hit.id,
            title: hit.title.or_else(|| hit.original_title.clone()).unwrap_or_default(),
            original_title: hit.original_title,
            release_date: parse_date(hit.release_date.as_deref()),
            popularity: hit.popularity,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TmdbPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbFind {
    #[serde(default)]
    movie_results: Vec<TmdbMovieHit>,
}

#[derive(Debug, Deserialize)]
struct TmdbPersonHit {
    id: i64,
    name: String,
    popularity: Option<f64>,
    #[serde(default)]
    known_for: Vec<TmdbKnownFor>,
}

#[derive(Debug, Deserialize)]
struct TmdbKnownFor {
    title: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbList {
    id: serde_json::Value,
    name: String,
    #[serde(default)]
    item_count: u32,
    #[serde(default)]
    total_pages: Option<u32>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    items: Vec<TmdbMovieHit>,
}

/// Rate-limited TMDb client
pub struct TmdbClient {
    client: reqwest::Client,
    config: TmdbConfig,
    limiter: MinInterval,
}

impl TmdbClient {
    pub fn new(config: TmdbConfig) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cinebase/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            limiter: MinInterval::new(config.min_interval),
            config,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SourceResult<T> {
        self.limiter.wait().await;
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        debug!(url = %url, "TMDb request");
        let request = self
            .client
            .get(&url)
            .query(&[("api_key", self.config.api_key.as_str())])
            .query(query);
        get_json(request, &url).await
    }

    async fn list(&self, list_id: &str, page: u32) -> SourceResult<TmdbList> {
        self.get(&format!("/list/{}", list_id), &[("page", page.to_string())]).await
    }
}

#[async_trait]
impl MovieSource for TmdbClient {
    async fn get_movie(&self, tmdb_id: i64) -> SourceResult<MovieDetails> {
        let movie: TmdbMovie = self
            .get(
                &format!("/movie/{}", tmdb_id),
                &[("append_to_response", "credits,external_ids".to_string())],
            )
            .await?;

        let imdb_id = movie
            .imdb_id
            .filter(|id| !id.is_empty())
            .or_else(|| movie.external_ids.and_then(|ids| ids.imdb_id))
            .filter(|id| !id.is_empty());

        Ok(MovieDetails {
            tmdb_id: movie.id,
            imdb_id,
            title: movie.title,
            original_title: movie.original_title,
            release_date: parse_date(movie.release_date.as_deref()),
            popularity: movie.popularity,
            vote_count: movie.vote_count,
            runtime: movie.runtime.filter(|r| *r > 0),
            genres: movie.genres.into_iter().map(|g| g.name).collect(),
            cast: movie
                .credits
                .cast
                .into_iter()
                .map(|c| CastMember {
                    tmdb_id: c.id,
                    name: c.name,
                    character: c.character.filter(|s| !s.is_empty()),
                    order: c.order,
                    popularity: c.popularity,
                    imdb_id: None,
                })
                .collect(),
            crew: movie
                .credits
                .crew
                .into_iter()
                .map(|c| CrewMember {
                    tmdb_id: c.id,
                    name: c.name,
                    job: c.job,
                    department: c.department,
                    popularity: c.popularity,
                    imdb_id: None,
                })
                .collect(),
        })
    }

    async fn find_by_imdb_id(&self, imdb_id: &str) -> SourceResult<Vec<MovieCandidate>> {
        let found: TmdbFind = self
            .get(
                &format!("/find/{}", imdb_id),
                &[("external_source", "imdb_id".to_string())],
            )
            .await?;
        Ok(found.movie_results.into_iter().map(MovieCandidate::from).collect())
    }

    async fn search_movies(&self, query: &str, year: Option<i32>) -> SourceResult<Vec<MovieCandidate>> {
        let mut params = vec![("query", query.to_string()), ("include_adult", "false".to_string())];
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }
        let page: TmdbPage<TmdbMovieHit> = self.get("/search/movie", &params).await?;
        Ok(page.results.into_iter().map(MovieCandidate::from).collect())
    }

    async fn search_people(&self, query: &str) -> SourceResult<Vec<PersonCandidate>> {
        let page: TmdbPage<TmdbPersonHit> = self.get("/search/person", &[("query", query.to_string())]).await?;
        Ok(page
            .results
            .into_iter()
            .map(|p| PersonCandidate {
                tmdb_id: p.id,
                name: p.name,
                popularity: p.popularity,
                known_for: p.known_for.into_iter().filter_map(|k| k.title.or(k.name)).collect(),
            })
            .collect())
    }
}

#[async_trait]
impl ListSource for TmdbClient {
    async fn list_info(&self, list_id: &str) -> SourceResult<ListInfo> {
        let list = self.list(list_id, 1).await?;
        let total_pages = list.total_pages.unwrap_or(1);
        if total_pages == 0 && list.item_count > 0 {
            return Err(SourceError::Decode(format!("list {} reports items but no pages", list_id)));
        }
        Ok(ListInfo {
            list_id: match list.id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            name: list.name,
            total_pages,
            item_count: list.item_count,
        })
    }

    async fn list_page(&self, list_id: &str, page: u32) -> SourceResult<Vec<ListItem>> {
        let list = self.list(list_id, page).await?;
        let per_page = list.items.len() as i32;
        let offset = (list.page.unwrap_or(page) as i32 - 1).max(0) * per_page.max(20);
        Ok(list
            .items
            .into_iter()
            .enumerate()
            .map(|(i, hit)| ListItem {
                tmdb_id: hit.id,
                title: hit.title.or(hit.original_title).unwrap_or_default(),
                position: Some(offset + i as i32 + 1),
            })
            .collect())
    }
}
