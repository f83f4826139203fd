//! Reference-site pages: HTTP fetch plus `data-stat` table extraction.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::throttle::{RequestThrottle, Upstream};
use super::HtmlSource;
use crate::error::{EtlError, Result};
use crate::util::env::{env_opt, env_parse};

pub const DEFAULT_BBREF_BASE_URL: &str = "https://www.basketball-reference.com/";

#[derive(Clone, Debug)]
pub struct HttpHtmlSource {
    client: Client,
    base_url: Url,
    throttle: RequestThrottle,
}

impl HttpHtmlSource {
    pub fn new(base_url: &str, timeout: StdDuration, throttle: RequestThrottle) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            EtlError::Configuration(format!("invalid reference base url {base_url:?}: {e}"))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EtlError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            throttle,
        })
    }

    /// BBREF_BASE_URL, BBREF_TIMEOUT_SECS and the BBREF_* request budget.
    pub fn from_env() -> Result<Self> {
        let base_url = env_opt("BBREF_BASE_URL").unwrap_or_else(|| DEFAULT_BBREF_BASE_URL.into());
        let timeout = StdDuration::from_secs(env_parse("BBREF_TIMEOUT_SECS", 30u64));
        Self::new(&base_url, timeout, RequestThrottle::from_env(Upstream::Reference))
    }
}

#[async_trait]
impl HtmlSource for HttpHtmlSource {
    /// `url` may be absolute or relative to the configured base.
    #[instrument(skip(self))]
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let full = self.base_url.join(url).map_err(|e| EtlError::FetchTransient {
            combination: url.to_string(),
            message: format!("bad url: {e}"),
        })?;
        let transient = |message: String| EtlError::FetchTransient {
            combination: full.to_string(),
            message,
        };

        self.throttle.acquire().await;
        debug!(url = %full, "reference: requesting");
        let response = self
            .client
            .get(full.clone())
            .send()
            .await
            .map_err(|e| transient(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(transient(format!("status {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| transient(format!("unreadable body: {e}")))
    }
}

/// One table row keyed by each cell's `data-stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub cells: IndexMap<String, String>,
    /// First link inside each cell that has one.
    pub links: IndexMap<String, String>,
}

impl TableRow {
    pub fn get(&self, stat: &str) -> Option<&str> {
        self.cells.get(stat).map(String::as_str)
    }

    pub fn link(&self, stat: &str) -> Option<&str> {
        self.links.get(stat).map(String::as_str)
    }
}

fn selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| EtlError::payload(format!("bad selector {raw:?}: {e}")))
}

fn is_spacer(row: &ElementRef<'_>) -> bool {
    row.value().classes().any(|class| {
        matches!(class, "thead" | "over_header" | "spacer" | "partial_table")
    })
}

/// Body rows of `table#table_id`. Header, over-header and spacer rows are skipped and empty
/// cells read as "0". A missing table yields no rows.
pub fn extract_table(html: &str, table_id: &str) -> Result<Vec<TableRow>> {
    let document = Html::parse_document(html);
    let table_sel = selector(&format!("table#{table_id}"))?;
    let row_sel = selector("tbody tr")?;
    let cell_sel = selector("th[data-stat], td[data-stat]")?;
    let link_sel = selector("a[href]")?;

    let Some(table) = document.select(&table_sel).next() else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for row in table.select(&row_sel) {
        if is_spacer(&row) {
            continue;
        }
        let mut out = TableRow::default();
        for cell in row.select(&cell_sel) {
            let Some(stat) = cell.value().attr("data-stat") else {
                continue;
            };
            let text = cell.text().collect::<String>().trim().to_string();
            let text = if text.is_empty() { "0".to_string() } else { text };
            if let Some(href) = cell
                .select(&link_sel)
                .next()
                .and_then(|a| a.value().attr("href"))
            {
                out.links.insert(stat.to_string(), href.to_string());
            }
            out.cells.insert(stat.to_string(), text);
        }
        if !out.cells.is_empty() {
            rows.push(out);
        }
    }
    Ok(rows)
}
