//! TMDb daily id export
//!
//! TMDb publishes every movie id once a day as gzipped JSON lines at
//! `movie_ids_MM_DD_YYYY.json.gz`. The snapshot is cached and refreshed at
//! most once per refresh interval; when today's file is not published yet
//! the previous day's is used.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{IdUniverse, SourceError, SourceResult, Universe, UniverseEntry};

pub const DEFAULT_EXPORT_BASE_URL: &str = "https://files.tmdb.org/p/exports";
pub const DEFAULT_REFRESH_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub base_url: String,
    pub refresh_interval: ChronoDuration,
    pub timeout: Duration,
    pub include_adult: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXPORT_BASE_URL.to_string(),
            refresh_interval: ChronoDuration::hours(DEFAULT_REFRESH_HOURS),
            timeout: Duration::from_secs(300),
            include_adult: false,
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TMDB_EXPORT_BASE_URL").unwrap_or(defaults.base_url),
            refresh_interval: std::env::var("TMDB_EXPORT_REFRESH_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(ChronoDuration::hours)
                .unwrap_or(defaults.refresh_interval),
            timeout: defaults.timeout,
            include_adult: std::env::var("TMDB_EXPORT_INCLUDE_ADULT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.include_adult),
        }
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/movie_ids_{}.json.gz",
            self.base_url.trim_end_matches('/'),
            date.format("%m_%d_%Y")
        )
    }
}

#[derive(Debug, Deserialize)]
struct ExportLine {
    id: i64,
    #[serde(default)]
    adult: bool,
    original_title: Option<String>,
    popularity: Option<f64>,
}

/// Decode a gzipped JSON-lines export. Malformed lines are skipped.
pub fn decode_export(compressed: &[u8], include_adult: bool) -> SourceResult<Vec<UniverseEntry>> {
    let reader = BufReader::new(GzDecoder::new(compressed));
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line.map_err(|e| SourceError::Decode(format!("export gzip stream: {}", e)))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExportLine>(&line) {
            Ok(entry) if include_adult || !entry.adult => entries.push(UniverseEntry {
                tmdb_id: entry.id,
                popularity: entry.popularity,
                title: entry.original_title,
            }),
            Ok(_) => {},
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(skipped, "Skipped malformed export lines");
    }
    Ok(entries)
}

pub struct TmdbExportUniverse {
    client: reqwest::Client,
    config: ExportConfig,
    cache: Mutex<Option<Universe>>,
}

impl TmdbExportUniverse {
    pub fn new(config: ExportConfig) -> SourceResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            cache: Mutex::new(None),
        })
    }

    async fn download(&self, date: NaiveDate) -> SourceResult<Vec<u8>> {
        let url = self.config.url_for(date);
        info!(url = %url, "Downloading TMDb id export");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, &url))?;
        if let Some(err) = SourceError::from_status(response.status(), &url) {
            return Err(err);
        }
        let bytes = response.bytes().await.map_err(|e| SourceError::from_reqwest(e, &url))?;
        Ok(bytes.to_vec())
    }

    async fn load(&self, now: DateTime<Utc>) -> SourceResult<Universe> {
        let today = now.date_naive();
        let compressed = match self.download(today).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_permanent() => {
                let yesterday = today.pred_opt().unwrap_or(today);
                warn!(error = %e, "Today's export not published yet, using yesterday's");
                self.download(yesterday).await?
            },
            Err(e) => return Err(e),
        };

        let include_adult = self.config.include_adult;
        let entries = tokio::task::spawn_blocking(move || decode_export(&compressed, include_adult))
            .await
            .map_err(|e| SourceError::Decode(format!("export decode task failed: {}", e)))??;

        info!(ids = entries.len(), "Loaded TMDb id universe");
        Ok(Universe {
            entries: Arc::new(entries),
            baseline_at: now,
        })
    }
}

#[async_trait]
impl IdUniverse for TmdbExportUniverse {
    async fn snapshot(&self) -> SourceResult<Universe> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        if let Some(universe) = cache.as_ref() {
            if now - universe.baseline_at < self.config.refresh_interval {
                return Ok(universe.clone());
            }
        }
        let universe = self.load(now).await?;
        *cache = Some(universe.clone());
        Ok(universe)
    }
}
