use std::time::Duration as StdDuration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::throttle::{RequestThrottle, Upstream};
use super::{combination_label, Params, StatSource};
use crate::error::{EtlError, Result};
use crate::payload::Payload;
use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_BASE_URL: &str = "https://stats.nba.com/stats/";

// The provider rejects requests that do not look like they come from its own site.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_0) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/45.0.2454.101 Safari/537.36";
const SITE_REFERER: &str = "https://stats.nba.com/scores/";

/// HTTP client for the stats API.
#[derive(Clone, Debug)]
pub struct StatsApiClient {
    client: Client,
    base_url: Url,
    throttle: RequestThrottle,
}

impl StatsApiClient {
    pub fn new(base_url: &str, timeout: StdDuration, throttle: RequestThrottle) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends with '/'.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).map_err(|e| {
            EtlError::Configuration(format!("invalid stats base url {normalized:?}: {e}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(REFERER, HeaderValue::from_static(SITE_REFERER));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EtlError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            throttle,
        })
    }

    /// NBA_STATS_BASE_URL, NBA_STATS_TIMEOUT_SECS and the NBA_STATS_* request budget.
    pub fn from_env() -> Result<Self> {
        let base_url = env_opt("NBA_STATS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let timeout = StdDuration::from_secs(env_parse("NBA_STATS_TIMEOUT_SECS", 30u64));
        Self::new(&base_url, timeout, RequestThrottle::from_env(Upstream::StatsApi))
    }

    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| EtlError::Configuration(format!("invalid endpoint {endpoint:?}: {e}")))
    }
}

#[async_trait]
impl StatSource for StatsApiClient {
    #[instrument(skip(self, params), fields(combination = %combination_label(endpoint, params)))]
    async fn fetch(&self, endpoint: &str, params: &Params) -> Result<Payload> {
        let url = self.endpoint_url(endpoint)?;
        let transient = |message: String| EtlError::FetchTransient {
            combination: combination_label(endpoint, params),
            message,
        };

        self.throttle.acquire().await;
        debug!(url = %url, "stats_api: requesting");

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error".to_string());
            return Err(transient(format!("status {status}: {body}")));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| transient(format!("invalid JSON: {e}")))?;
        Payload::from_value(value)
    }
}
