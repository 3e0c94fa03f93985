//! Ingestion configuration
//!
//! Everything tunable about the import pipeline: queue concurrency, the
//! fetch timeout, quality criteria, backfill pacing, list completion
//! polling, reconciliation thresholds and the festival catalogue. Values
//! come from environment variables with the defaults below.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::queue::runner::{QueueLimit, RunnerConfig};

/// Queue names
pub mod queues {
    pub const FETCH: &str = "fetch";
    pub const ENRICH: &str = "enrich";
    pub const LISTS: &str = "lists";
    pub const BACKFILL: &str = "backfill";
    pub const FESTIVALS: &str = "festivals";
}

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_RESCUE_AFTER_SECS: u64 = 3600;

pub const DEFAULT_PENDING_THRESHOLD: i64 = 10_000;
pub const DEFAULT_HIGH_WATER: i64 = 1_000;
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_INSERT_CHUNK: usize = 100;

pub const DEFAULT_COMPLETION_DELAY_SECS: u64 = 30;
pub const DEFAULT_MAX_CHECKS: u32 = 120;

pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.85;
pub const DEFAULT_YEAR_TOLERANCE: i32 = 2;
pub const DEFAULT_AMBIGUITY_GAP: f64 = 0.10;

pub const DEFAULT_FESTIVAL_CONCURRENCY: usize = 3;
pub const DEFAULT_FESTIVAL_YEAR_TIMEOUT_SECS: u64 = 120;

/// Parse an environment variable, falling back to `default` when unset or
/// unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Whether this process runs the job runner
    pub enabled: bool,
    /// Node name recorded on claimed jobs; hostname:pid when unset
    pub node: Option<String>,
    pub poll_interval_ms: u64,
    /// Upper bound for one job attempt
    pub job_timeout_secs: u64,
    /// Age at which an `executing` attempt counts as orphaned
    pub rescue_after_secs: u64,
    pub concurrency: QueueConcurrency,
    pub fetch: FetchConfig,
    pub quality: QualityCriteria,
    pub backfill: BackfillConfig,
    pub lists: ListImportConfig,
    pub matching: MatchingConfig,
    pub festivals: FestivalConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
            rescue_after_secs: DEFAULT_RESCUE_AFTER_SECS,
            concurrency: QueueConcurrency::default(),
            fetch: FetchConfig::default(),
            quality: QualityCriteria::default(),
            backfill: BackfillConfig::default(),
            lists: ListImportConfig::default(),
            matching: MatchingConfig::default(),
            festivals: FestivalConfig::default(),
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            enabled: env_or("INGEST_ENABLED", defaults.enabled),
            node: std::env::var("INGEST_NODE").ok().filter(|n| !n.is_empty()),
            poll_interval_ms: env_or("INGEST_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            job_timeout_secs: env_or("INGEST_JOB_TIMEOUT_SECS", defaults.job_timeout_secs),
            rescue_after_secs: env_or("INGEST_RESCUE_AFTER_SECS", defaults.rescue_after_secs),
            concurrency: QueueConcurrency::from_env(),
            fetch: FetchConfig::from_env(),
            quality: QualityCriteria::from_env(),
            backfill: BackfillConfig::from_env(),
            lists: ListImportConfig::from_env(),
            matching: MatchingConfig::from_env(),
            festivals: FestivalConfig::from_env(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("INGEST_POLL_INTERVAL_MS must be greater than 0");
        }
        if self.job_timeout_secs == 0 {
            anyhow::bail!("INGEST_JOB_TIMEOUT_SECS must be greater than 0");
        }
        if self.job_timeout_secs < self.fetch.timeout_secs {
            anyhow::bail!("INGEST_JOB_TIMEOUT_SECS must not be shorter than FETCH_TIMEOUT_SECS");
        }
        if self.rescue_after_secs <= self.job_timeout_secs {
            anyhow::bail!("INGEST_RESCUE_AFTER_SECS must be longer than INGEST_JOB_TIMEOUT_SECS");
        }
        self.fetch.validate()?;
        self.backfill.validate()?;
        self.lists.validate()?;
        self.matching.validate()?;
        self.festivals.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn queue_limits(&self) -> Vec<QueueLimit> {
        self.concurrency.limits()
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            node: self.node.clone().unwrap_or_else(RunnerConfig::default_node),
            queues: self.queue_limits(),
            poll_interval: self.poll_interval(),
            job_timeout: self.job_timeout(),
            rescue_after: Duration::from_secs(self.rescue_after_secs),
        }
    }
}

/// Worker slots per queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConcurrency {
    pub fetch: usize,
    pub enrich: usize,
    pub lists: usize,
    pub backfill: usize,
    pub festivals: usize,
}

impl Default for QueueConcurrency {
    fn default() -> Self {
        Self {
            fetch: 10,
            enrich: 2,
            lists: 5,
            backfill: 1,
            festivals: 2,
        }
    }
}

impl QueueConcurrency {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fetch: env_or("INGEST_QUEUE_FETCH", defaults.fetch),
            enrich: env_or("INGEST_QUEUE_ENRICH", defaults.enrich),
            lists: env_or("INGEST_QUEUE_LISTS", defaults.lists),
            backfill: env_or("INGEST_QUEUE_BACKFILL", defaults.backfill),
            festivals: env_or("INGEST_QUEUE_FESTIVALS", defaults.festivals),
        }
    }

    pub fn limits(&self) -> Vec<QueueLimit> {
        vec![
            QueueLimit::new(queues::FETCH, self.fetch),
            QueueLimit::new(queues::ENRICH, self.enrich),
            QueueLimit::new(queues::LISTS, self.lists),
            QueueLimit::new(queues::BACKFILL, self.backfill),
            QueueLimit::new(queues::FESTIVALS, self.festivals),
        ]
    }
}

/// Fetch worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Bound on one metadata fetch
    pub timeout_secs: u64,
    /// Enqueue OMDb enrichment after full imports
    pub enrich: bool,
    /// Top-billed cast members linked to the director in the collaboration graph
    pub collaboration_top_cast: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            enrich: true,
            collaboration_top_cast: 5,
        }
    }
}

impl FetchConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: env_or("FETCH_TIMEOUT_SECS", defaults.timeout_secs),
            enrich: env_or("FETCH_ENRICH", defaults.enrich),
            collaboration_top_cast: env_or("FETCH_COLLABORATION_TOP_CAST", defaults.collaboration_top_cast),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            anyhow::bail!("FETCH_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Criteria a movie must meet for a full import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCriteria {
    pub require_imdb_id: bool,
    pub require_release_date: bool,
    pub min_vote_count: i32,
    /// Minutes
    pub min_runtime: i32,
}

impl Default for QualityCriteria {
    fn default() -> Self {
        Self {
            require_imdb_id: true,
            require_release_date: true,
            min_vote_count: 5,
            min_runtime: 40,
        }
    }
}

impl QualityCriteria {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            require_imdb_id: env_or("QUALITY_REQUIRE_IMDB_ID", defaults.require_imdb_id),
            require_release_date: env_or("QUALITY_REQUIRE_RELEASE_DATE", defaults.require_release_date),
            min_vote_count: env_or("QUALITY_MIN_VOTE_COUNT", defaults.min_vote_count),
            min_runtime: env_or("QUALITY_MIN_RUNTIME", defaults.min_runtime),
        }
    }
}

/// Continuous backfill pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    pub default_batch_size: usize,
    /// Skip gap analysis while at least this many fetch jobs are pending
    pub pending_threshold: i64,
    /// Above this many in-flight jobs the completion check waits longer
    pub high_water: i64,
    /// Jobs per bulk insert
    pub insert_chunk: usize,
    pub short_recheck_secs: u64,
    pub long_recheck_secs: u64,
    /// Interval of the server's health check; 0 disables it
    pub health_check_interval_secs: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            default_batch_size: DEFAULT_BATCH_SIZE,
            pending_threshold: DEFAULT_PENDING_THRESHOLD,
            high_water: DEFAULT_HIGH_WATER,
            insert_chunk: DEFAULT_INSERT_CHUNK,
            short_recheck_secs: 60,
            long_recheck_secs: 300,
            health_check_interval_secs: 600,
        }
    }
}

impl BackfillConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_batch_size: env_or("BACKFILL_BATCH_SIZE", defaults.default_batch_size),
            pending_threshold: env_or("BACKFILL_PENDING_THRESHOLD", defaults.pending_threshold),
            high_water: env_or("BACKFILL_HIGH_WATER", defaults.high_water),
            insert_chunk: env_or("BACKFILL_INSERT_CHUNK", defaults.insert_chunk),
            short_recheck_secs: env_or("BACKFILL_SHORT_RECHECK_SECS", defaults.short_recheck_secs),
            long_recheck_secs: env_or("BACKFILL_LONG_RECHECK_SECS", defaults.long_recheck_secs),
            health_check_interval_secs: env_or(
                "BACKFILL_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval_secs,
            ),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.default_batch_size == 0 {
            anyhow::bail!("BACKFILL_BATCH_SIZE must be greater than 0");
        }
        if self.insert_chunk == 0 {
            anyhow::bail!("BACKFILL_INSERT_CHUNK must be greater than 0");
        }
        if self.pending_threshold <= 0 {
            anyhow::bail!("BACKFILL_PENDING_THRESHOLD must be greater than 0");
        }
        if self.high_water < 0 {
            anyhow::bail!("BACKFILL_HIGH_WATER must not be negative");
        }
        Ok(())
    }

    pub fn short_recheck(&self) -> Duration {
        Duration::from_secs(self.short_recheck_secs)
    }

    pub fn long_recheck(&self) -> Duration {
        Duration::from_secs(self.long_recheck_secs)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_secs > 0).then(|| Duration::from_secs(self.health_check_interval_secs))
    }
}

/// Curated list import polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListImportConfig {
    pub completion_delay_secs: u64,
    /// Completion checks before the import is declared failed
    pub max_checks: u32,
}

impl Default for ListImportConfig {
    fn default() -> Self {
        Self {
            completion_delay_secs: DEFAULT_COMPLETION_DELAY_SECS,
            max_checks: DEFAULT_MAX_CHECKS,
        }
    }
}

impl ListImportConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            completion_delay_secs: env_or("LIST_IMPORT_COMPLETION_DELAY_SECS", defaults.completion_delay_secs),
            max_checks: env_or("LIST_IMPORT_MAX_CHECKS", defaults.max_checks),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.max_checks == 0 {
            anyhow::bail!("LIST_IMPORT_MAX_CHECKS must be greater than 0");
        }
        Ok(())
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_secs(self.completion_delay_secs)
    }
}

/// Reconciliation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum Jaro-Winkler similarity of normalized titles
    pub title_threshold: f64,
    /// Maximum release year difference
    pub year_tolerance: i32,
    /// Required lead of the best candidate over the runner-up
    pub ambiguity_gap: f64,
    pub title_weight: f64,
    pub year_weight: f64,
    /// Local movies considered per fuzzy search
    pub local_candidate_limit: usize,
    /// Minimum name similarity against a movie's credits
    pub person_name_threshold: f64,
    /// Minimum combined score for an external person candidate
    pub person_search_threshold: f64,
    pub person_name_weight: f64,
    pub person_popularity_weight: f64,
    pub person_known_for_weight: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            year_tolerance: DEFAULT_YEAR_TOLERANCE,
            ambiguity_gap: DEFAULT_AMBIGUITY_GAP,
            title_weight: 0.7,
            year_weight: 0.3,
            local_candidate_limit: 5_000,
            person_name_threshold: 0.90,
            person_search_threshold: 0.75,
            person_name_weight: 0.7,
            person_popularity_weight: 0.1,
            person_known_for_weight: 0.2,
        }
    }
}

impl MatchingConfig {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            title_threshold: env_or("MATCH_TITLE_THRESHOLD", d.title_threshold),
            year_tolerance: env_or("MATCH_YEAR_TOLERANCE", d.year_tolerance),
            ambiguity_gap: env_or("MATCH_AMBIGUITY_GAP", d.ambiguity_gap),
            title_weight: env_or("MATCH_TITLE_WEIGHT", d.title_weight),
            year_weight: env_or("MATCH_YEAR_WEIGHT", d.year_weight),
            local_candidate_limit: env_or("MATCH_LOCAL_CANDIDATE_LIMIT", d.local_candidate_limit),
            person_name_threshold: env_or("MATCH_PERSON_NAME_THRESHOLD", d.person_name_threshold),
            person_search_threshold: env_or("MATCH_PERSON_SEARCH_THRESHOLD", d.person_search_threshold),
            person_name_weight: env_or("MATCH_PERSON_NAME_WEIGHT", d.person_name_weight),
            person_popularity_weight: env_or("MATCH_PERSON_POPULARITY_WEIGHT", d.person_popularity_weight),
            person_known_for_weight: env_or("MATCH_PERSON_KNOWN_FOR_WEIGHT", d.person_known_for_weight),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("MATCH_TITLE_THRESHOLD", self.title_threshold),
            ("MATCH_AMBIGUITY_GAP", self.ambiguity_gap),
            ("MATCH_PERSON_NAME_THRESHOLD", self.person_name_threshold),
            ("MATCH_PERSON_SEARCH_THRESHOLD", self.person_search_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be between 0 and 1, got {}", name, value);
            }
        }
        if self.year_tolerance < 0 {
            anyhow::bail!("MATCH_YEAR_TOLERANCE must not be negative");
        }
        if self.title_weight < 0.0 || self.year_weight < 0.0 || self.title_weight + self.year_weight <= 0.0 {
            anyhow::bail!("MATCH_TITLE_WEIGHT and MATCH_YEAR_WEIGHT must be non-negative with a positive sum");
        }
        Ok(())
    }
}

/// A festival the pipeline knows how to import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FestivalSpec {
    pub key: String,
    pub name: String,
    /// IMDb event id
    pub event_id: String,
    pub first_year: i32,
}

impl FestivalSpec {
    pub fn new(key: &str, name: &str, event_id: &str, first_year: i32) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            event_id: event_id.to_string(),
            first_year,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FestivalConfig {
    pub festivals: Vec<FestivalSpec>,
    /// Years imported at once by a multi-year job
    pub concurrency: usize,
    pub year_timeout_secs: u64,
}

impl Default for FestivalConfig {
    fn default() -> Self {
        Self {
            festivals: vec![
                FestivalSpec::new("oscars", "Academy Awards", "ev0000003", 1929),
                FestivalSpec::new("cannes", "Cannes Film Festival", "ev0000147", 1946),
                FestivalSpec::new("venice", "Venice Film Festival", "ev0000681", 1932),
                FestivalSpec::new("berlin", "Berlin International Film Festival", "ev0000091", 1951),
                FestivalSpec::new("sundance", "Sundance Film Festival", "ev0000631", 1985),
            ],
            concurrency: DEFAULT_FESTIVAL_CONCURRENCY,
            year_timeout_secs: DEFAULT_FESTIVAL_YEAR_TIMEOUT_SECS,
        }
    }
}

impl FestivalConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            festivals: defaults.festivals,
            concurrency: env_or("FESTIVAL_CONCURRENCY", defaults.concurrency),
            year_timeout_secs: env_or("FESTIVAL_YEAR_TIMEOUT_SECS", defaults.year_timeout_secs),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("FESTIVAL_CONCURRENCY must be greater than 0");
        }
        if self.year_timeout_secs == 0 {
            anyhow::bail!("FESTIVAL_YEAR_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FestivalSpec> {
        self.festivals.iter().find(|f| f.key == key)
    }

    pub fn year_timeout(&self) -> Duration {
        Duration::from_secs(self.year_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults_validate() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch.timeout(), Duration::from_secs(90));
        assert_eq!(config.matching.title_threshold, 0.85);
        assert_eq!(config.matching.year_tolerance, 2);
        assert_eq!(config.festivals.get("cannes").map(|f| f.event_id.as_str()), Some("ev0000147"));
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut config = IngestConfig::default();
        config.matching.title_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.backfill.insert_chunk = 0;
        assert!(config.validate().is_err());

        let mut config = IngestConfig::default();
        config.rescue_after_secs = config.job_timeout_secs;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_limits_cover_every_queue() {
        let names: Vec<_> = IngestConfig::default()
            .queue_limits()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["fetch", "enrich", "lists", "backfill", "festivals"]);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("BACKFILL_PENDING_THRESHOLD", "5000");
        std::env::set_var("MATCH_AMBIGUITY_GAP", "0.2");
        let config = IngestConfig::from_env().unwrap();
        std::env::remove_var("BACKFILL_PENDING_THRESHOLD");
        std::env::remove_var("MATCH_AMBIGUITY_GAP");

        assert_eq!(config.backfill.pending_threshold, 5000);
        assert_eq!(config.matching.ambiguity_gap, 0.2);
    }
}
