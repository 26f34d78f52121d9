//! # Threat Intelligence Feed
//!
//! Read-only source of threat indicators the correlation store scores
//! against. The feed is an external collaborator: it may return an empty
//! list, and a fetch failure degrades to an empty list at the call site
//! rather than failing the pipeline.

use serde::Deserialize;
use std::time::Duration;

use crate::{GeneralConfig, PipelineError, PipelineResult};

/// External indicator source.
pub trait ThreatIntelFeed: Send {
    /// Fetch the current indicator list. May be empty.
    fn fetch(&self) -> PipelineResult<Vec<String>>;
}

/// Wire shape of the feed response.
#[derive(Debug, Deserialize)]
struct IntelResponse {
    #[serde(default)]
    indicators: Vec<String>,
}

/// HTTP-backed feed with the standard outbound latency budget. Any
/// failure (timeout, transport, non-2xx, bad body) maps to
/// `UpstreamTimeout`, since the only caller-visible fact is that the
/// upstream did not answer usefully within budget.
pub struct HttpIntelFeed {
    url: String,
    agent: ureq::Agent,
}

impl HttpIntelFeed {
    pub fn new(url: &str, general: &GeneralConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(general.http_timeout_secs))
            .build();
        Self {
            url: url.to_string(),
            agent,
        }
    }
}

impl ThreatIntelFeed for HttpIntelFeed {
    fn fetch(&self) -> PipelineResult<Vec<String>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| PipelineError::UpstreamTimeout(format!("intel feed {}: {}", self.url, e)))?;

        let body = response
            .into_string()
            .map_err(|e| PipelineError::UpstreamTimeout(format!("intel feed {}: {}", self.url, e)))?;

        let parsed: IntelResponse = serde_json::from_str(&body).map_err(|e| {
            PipelineError::UpstreamTimeout(format!("intel feed {} returned bad body: {}", self.url, e))
        })?;

        Ok(parsed.indicators)
    }
}

/// Fixed in-memory indicator list, for offline operation and tests.
pub struct StaticIntelFeed {
    indicators: Vec<String>,
}

impl StaticIntelFeed {
    pub fn new(indicators: Vec<String>) -> Self {
        Self { indicators }
    }

    /// An always-empty feed, used when no feed URL is configured.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl ThreatIntelFeed for StaticIntelFeed {
    fn fetch(&self) -> PipelineResult<Vec<String>> {
        Ok(self.indicators.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_feed_returns_indicators() {
        let feed = StaticIntelFeed::new(vec!["mimikatz".to_string(), "192.0.2.7".to_string()]);
        assert_eq!(feed.fetch().unwrap().len(), 2);
        // Restartable: repeat fetches see the same list.
        assert_eq!(feed.fetch().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_feed_is_ok_not_error() {
        let feed = StaticIntelFeed::empty();
        assert!(feed.fetch().unwrap().is_empty());
    }

    #[test]
    fn test_unreachable_http_feed_maps_to_upstream_timeout() {
        let general = GeneralConfig {
            data_dir: std::env::temp_dir(),
            poll_interval_secs: 60,
            http_timeout_secs: 1,
        };
        let feed = HttpIntelFeed::new("http://192.0.2.1:9/intel", &general);
        assert!(matches!(
            feed.fetch(),
            Err(PipelineError::UpstreamTimeout(_))
        ));
    }

    #[test]
    fn test_intel_response_defaults_to_empty() {
        let parsed: IntelResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.indicators.is_empty());
    }
}
