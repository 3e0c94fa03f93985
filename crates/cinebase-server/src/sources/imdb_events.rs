//! Festival event page client
//!
//! Fetches the raw document for one ceremony year. The URL comes from a
//! template with `{event_id}` and `{year}` placeholders so the same client
//! serves IMDb event pages and JSON mirrors of them.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::rate_limit::MinInterval;
use super::{CeremonySource, SourceError, SourceResult};

pub const DEFAULT_URL_TEMPLATE: &str = "https://www.imdb.com/event/{event_id}/{year}/1/";
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct EventPageConfig {
    pub url_template: String,
    pub timeout: Duration,
    pub min_interval: Duration,
}

impl Default for EventPageConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            timeout: Duration::from_secs(60),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
        }
    }
}

impl EventPageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url_template: std::env::var("FESTIVAL_URL_TEMPLATE").unwrap_or(defaults.url_template),
            timeout: defaults.timeout,
            min_interval: std::env::var("FESTIVAL_MIN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.min_interval),
        }
    }

    pub fn url_for(&self, event_id: &str, year: i32) -> String {
        self.url_template
            .replace("{event_id}", event_id)
            .replace("{year}", &year.to_string())
    }
}

pub struct ImdbEventClient {
    client: reqwest::Client,
    config: EventPageConfig,
    limiter: MinInterval,
}

impl ImdbEventClient {
    pub fn new(config: EventPageConfig) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("Mozilla/5.0 (compatible; cinebase)")
            .build()?;
        Ok(Self {
            client,
            limiter: MinInterval::new(config.min_interval),
            config,
        })
    }
}

#[async_trait]
impl CeremonySource for ImdbEventClient {
    async fn fetch_ceremony(&self, event_id: &str, year: i32) -> SourceResult<String> {
        self.limiter.wait().await;
        let url = self.config.url_for(event_id, year);
        debug!(url = %url, "Fetching ceremony page");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| SourceError::from_reqwest(e, &url))?;
        if let Some(err) = SourceError::from_status(response.status(), &url) {
            return Err(err);
        }
        let body = response.text().await.map_err(|e| SourceError::from_reqwest(e, &url))?;
        if body.trim().is_empty() {
            return Err(SourceError::Decode(format!("empty ceremony page at {}", url)));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_url_template() {
        let config = EventPageConfig::default();
        assert_eq!(
            config.url_for("ev0000147", 2019),
            "https://www.imdb.com/event/ev0000147/2019/1/"
        );
    }

    #[tokio::test]
    async fn test_fetch_ceremony() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/event/ev0000147/2019/1/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/event/ev0000147/1900/1/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ImdbEventClient::new(EventPageConfig {
            url_template: format!("{}/event/{{event_id}}/{{year}}/1/", server.uri()),
            timeout: Duration::from_secs(5),
            min_interval: Duration::from_millis(1),
        })
        .unwrap();

        assert!(client.fetch_ceremony("ev0000147", 2019).await.unwrap().contains("ok"));
        assert!(client.fetch_ceremony("ev0000147", 1900).await.unwrap_err().is_permanent());
    }
}
