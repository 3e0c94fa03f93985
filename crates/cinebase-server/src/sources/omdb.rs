//! OMDb client
//!
//! OMDb answers HTTP 200 for everything and reports failures in the body
//! (`"Response": "False"`), and sends numbers as display strings such as
//! `"$1,234,567"` or `"N/A"`. Parsing returns `Result` so malformed values
//! surface instead of silently becoming zero.

use async_trait::async_trait;
use cinebase_common::{CinebaseError, Result as ParseResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::rate_limit::MinInterval;
use super::{get_json, Ratings, RatingsSource, SourceError, SourceResult};

pub const DEFAULT_BASE_URL: &str = "https://www.omdbapi.com/";
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OmdbConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub min_interval: Duration,
}

impl Default for OmdbConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
        }
    }
}

impl OmdbConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OMDB_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("OMDB_API_KEY").unwrap_or_default(),
            timeout: std::env::var("OMDB_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            min_interval: std::env::var("OMDB_MIN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OmdbResponse {
    response: String,
    error: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes")]
    imdb_votes: Option<String>,
    metascore: Option<String>,
    box_office: Option<String>,
    awards: Option<String>,
    runtime: Option<String>,
}

fn is_missing(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw.eq_ignore_ascii_case("n/a")
}

/// `"$1,234,567"` to whole dollars; `"N/A"` to `None`.
pub fn parse_currency(raw: &str) -> ParseResult<Option<i64>> {
    if is_missing(raw) {
        return Ok(None);
    }
    let digits: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let whole = digits.split('.').next().unwrap_or_default();
    whole
        .parse::<i64>()
        .map(Some)
        .map_err(|_| CinebaseError::Parse(format!("currency '{}'", raw)))
}

/// `"1,234"` to 1234; `"N/A"` to `None`.
pub fn parse_count(raw: &str) -> ParseResult<Option<i64>> {
    if is_missing(raw) {
        return Ok(None);
    }
    raw.trim()
        .replace(',', "")
        .parse::<i64>()
        .map(Some)
        .map_err(|_| CinebaseError::Parse(format!("count '{}'", raw)))
}

/// `"7.7"` to 7.7; `"N/A"` to `None`.
pub fn parse_rating(raw: &str) -> ParseResult<Option<f64>> {
    if is_missing(raw) {
        return Ok(None);
    }
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite())
        .map(Some)
        .ok_or_else(|| CinebaseError::Parse(format!("rating '{}'", raw)))
}

/// `"117 min"` to 117; `"N/A"` to `None`.
pub fn parse_runtime(raw: &str) -> ParseResult<Option<i32>> {
    if is_missing(raw) {
        return Ok(None);
    }
    raw.trim()
        .trim_end_matches("min")
        .trim()
        .parse::<i32>()
        .map(Some)
        .map_err(|_| CinebaseError::Parse(format!("runtime '{}'", raw)))
}

/// Parse an optional field, logging and dropping malformed values.
fn lenient<T>(field: &str, raw: Option<&str>, parse: fn(&str) -> ParseResult<Option<T>>) -> Option<T> {
    match raw.map(parse).transpose() {
        Ok(value) => value.flatten(),
        Err(e) => {
            warn!(field, error = %e, "Ignoring malformed OMDb value");
            None
        },
    }
}

pub struct OmdbClient {
    client: reqwest::Client,
    config: OmdbConfig,
    limiter: MinInterval,
}

impl OmdbClient {
    pub fn new(config: OmdbConfig) -> SourceResult<Self> {
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
}

#[async_trait]
impl RatingsSource for OmdbClient {
    async fn ratings(&self, imdb_id: &str) -> SourceResult<Ratings> {
        self.limiter.wait().await;
        let url = self.config.base_url.clone();
        debug!(imdb_id, "OMDb request");
        let request = self
            .client
            .get(&url)
            .query(&[("apikey", self.config.api_key.as_str()), ("i", imdb_id)]);
        let body: OmdbResponse = get_json(request, &url).await?;

        if !body.response.eq_ignore_ascii_case("true") {
            let error = body.error.unwrap_or_else(|| "unknown error".to_string());
            let lower = error.to_lowercase();
            return Err(if lower.contains("limit") {
                SourceError::RateLimited(format!("omdb: {}", error))
            } else if lower.contains("api key") {
                SourceError::Unauthorized(format!("omdb: {}", error))
            } else {
                SourceError::NotFound(format!("omdb {}: {}", imdb_id, error))
            });
        }

        Ok(Ratings {
            imdb_rating: lenient("imdbRating", body.imdb_rating.as_deref(), parse_rating),
            imdb_votes: lenient("imdbVotes", body.imdb_votes.as_deref(), parse_count),
            metascore: lenient("Metascore", body.metascore.as_deref(), parse_count).map(|m| m as i32),
            box_office: lenient("BoxOffice", body.box_office.as_deref(), parse_currency),
            runtime: lenient("Runtime", body.runtime.as_deref(), parse_runtime),
            awards: body.awards.filter(|a| !is_missing(a)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("$1,234,567").unwrap(), Some(1_234_567));
        assert_eq!(parse_currency("$12.50").unwrap(), Some(12));
        assert_eq!(parse_currency("N/A").unwrap(), None);
        assert!(parse_currency("about a million").is_err());
    }

    #[test]
    fn test_parse_runtime_and_rating() {
        assert_eq!(parse_runtime("117 min").unwrap(), Some(117));
        assert_eq!(parse_runtime("N/A").unwrap(), None);
        assert!(parse_runtime("two hours").is_err());
        assert_eq!(parse_rating("7.7").unwrap(), Some(7.7));
        assert!(parse_rating("NaN").is_err());
    }

    fn client(server: &MockServer) -> OmdbClient {
        OmdbClient::new(OmdbConfig {
            base_url: server.uri(),
            api_key: "k".into(),
            timeout: Duration::from_secs(5),
            min_interval: Duration::from_millis(1),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ratings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("i", "tt10288566"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": "True",
                "imdbRating": "7.7",
                "imdbVotes": "187,000",
                "Metascore": "79",
                "BoxOffice": "$1,234,567",
                "Runtime": "117 min",
                "Awards": "Won 1 Oscar"
            })))
            .mount(&server)
            .await;

        let ratings = client(&server).ratings("tt10288566").await.unwrap();
        assert_eq!(ratings.imdb_rating, Some(7.7));
        assert_eq!(ratings.imdb_votes, Some(187_000));
        assert_eq!(ratings.metascore, Some(79));
        assert_eq!(ratings.box_office, Some(1_234_567));
        assert_eq!(ratings.runtime, Some(117));
    }

    #[tokio::test]
    async fn test_body_level_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("i", "tt0000001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": "False", "Error": "Incorrect IMDb ID."
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("i", "tt0000002"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": "False", "Error": "Request limit reached!"
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.ratings("tt0000001").await.unwrap_err().is_permanent());
        assert!(matches!(
            client.ratings("tt0000002").await.unwrap_err(),
            SourceError::RateLimited(_)
        ));
    }
}
