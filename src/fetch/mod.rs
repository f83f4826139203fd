//! Fetch collaborators. The ingestion core only sees the [`StatSource`] and [`HtmlSource`]
//! traits; the HTTP implementations live in the submodules.

pub mod endpoints;
pub mod html;
#[cfg(test)]
pub mod scripted;
pub mod stats_client;
pub mod throttle;

use async_trait::async_trait;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::error::Result;
use crate::payload::Payload;

/// Query parameters in the order the provider expects them.
pub type Params = IndexMap<String, String>;

#[async_trait]
pub trait StatSource: Send + Sync {
    /// Fetch one endpoint for one parameter combination.
    ///
    /// "No data for this combination" is `Ok(Payload::Unavailable)`; transport and decode
    /// failures are [`crate::error::EtlError::FetchTransient`].
    async fn fetch(&self, endpoint: &str, params: &Params) -> Result<Payload>;
}

#[async_trait]
pub trait HtmlSource: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String>;
}

/// `endpoint?K=V&...`, used to label a unit of work in logs and run summaries.
pub fn combination_label(endpoint: &str, params: &Params) -> String {
    if params.is_empty() {
        return endpoint.to_string();
    }
    let query = params.iter().map(|(k, v)| format!("{k}={v}")).join("&");
    format!("{endpoint}?{query}")
}

pub use html::{extract_table, HttpHtmlSource, TableRow};
pub use stats_client::StatsApiClient;
pub use throttle::{RequestBudget, RequestThrottle, Upstream};
