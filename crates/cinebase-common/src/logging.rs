//! Tracing subscriber setup shared by Cinebase binaries
//!
//! Log lines go to stdout, a daily-rolling file, or both, as text or JSON.
//! Prefer structured fields over interpolated strings:
//!
//! ```rust
//! let list_key = "criterion";
//! tracing::info!(list_key, page = 3, queued = 12, "Processed list page");
//! ```
//!
//! ```no_run
//! use cinebase_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::new("cinebase-server")
//!         .with_directives("sqlx=warn")
//!         .overlay_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSink {
    #[default]
    Stdout,
    File,
    Both,
}

impl std::str::FromStr for LogSink {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "stdout" | "console" => LogSink::Stdout,
            "file" => LogSink::File,
            "both" => LogSink::Both,
            other => bail!("Invalid LOG_OUTPUT '{}': expected stdout, file or both", other),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level for everything not named in `directives`
    pub level: String,
    /// Comma-separated `target=level` directives
    pub directives: Vec<String>,
    pub sink: LogSink,
    pub json: bool,
    pub log_dir: PathBuf,
    /// Rolling file prefix, e.g. `cinebase-server` -> `cinebase-server.2026-01-18`
    pub file_prefix: String,
}

impl LogConfig {
    pub fn new(file_prefix: impl Into<String>) -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            sink: LogSink::Stdout,
            json: false,
            log_dir: PathBuf::from("./logs"),
            file_prefix: file_prefix.into(),
        }
    }

    pub fn with_directives(mut self, directives: &str) -> Self {
        self.directives.extend(split_directives(directives));
        self
    }

    /// Apply `LOG_LEVEL`, `LOG_FILTER`, `LOG_OUTPUT`, `LOG_FORMAT` and
    /// `LOG_DIR` on top of this config.
    pub fn overlay_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.directives.extend(split_directives(&filter));
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.sink = output.parse()?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.json = match format.to_ascii_lowercase().as_str() {
                "json" => true,
                "text" | "pretty" => false,
                other => bail!("Invalid LOG_FORMAT '{}': expected text or json", other),
            };
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    /// `RUST_LOG` wins over the configured level; directives are added on top.
    fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .with_context(|| format!("Invalid log level '{}'", self.level))?;
        for directive in &self.directives {
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("Invalid filter directive '{}'", directive))?,
            );
        }
        Ok(filter)
    }
}

fn split_directives(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',').map(str::trim).filter(|d| !d.is_empty()).map(String::from)
}

/// Install the global subscriber. Call once, at startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if matches!(config.sink, LogSink::Stdout | LogSink::Both) {
        layers.push(fmt_layer(config.json, std::io::stdout, true));
    }
    if matches!(config.sink, LogSink::File | LogSink::Both) {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create log directory {}", config.log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(&config.log_dir, &config.file_prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Flushes on drop; lives as long as the process
        std::mem::forget(guard);
        layers.push(fmt_layer(config.json, writer, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")
}

fn fmt_layer<W>(json: bool, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_parsing() {
        assert_eq!("BOTH".parse::<LogSink>().unwrap(), LogSink::Both);
        assert_eq!("console".parse::<LogSink>().unwrap(), LogSink::Stdout);
        assert!("syslog".parse::<LogSink>().is_err());
    }

    #[test]
    fn test_directives_are_split_and_validated() {
        let config = LogConfig::new("cinebase-test").with_directives("sqlx=warn, ,tower_http=debug");
        assert_eq!(config.directives, vec!["sqlx=warn", "tower_http=debug"]);
        assert!(config.env_filter().is_ok());
    }
}
