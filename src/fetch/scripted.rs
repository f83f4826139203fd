//! In-memory sources that replay canned payloads for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{HtmlSource, Params, StatSource};
use crate::error::{EtlError, Result};
use crate::payload::Payload;

struct Rule {
    endpoint: String,
    matches: Vec<(String, String)>,
    response: std::result::Result<Value, String>,
}

/// Answers by endpoint plus an optional parameter subset; the most recently added matching
/// rule wins. Unscripted requests answer with a provider `Message`.
#[derive(Default)]
pub struct ScriptedSource {
    rules: Vec<Rule>,
    calls: Mutex<Vec<(String, Params)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, endpoint: &str, matches: &[(&str, &str)], body: Value) -> Self {
        self.rules.push(Rule {
            endpoint: endpoint.to_string(),
            matches: matches
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            response: Ok(body),
        });
        self
    }

    pub fn fail(mut self, endpoint: &str, matches: &[(&str, &str)], message: &str) -> Self {
        self.rules.push(Rule {
            endpoint: endpoint.to_string(),
            matches: matches
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            response: Err(message.to_string()),
        });
        self
    }

    pub fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls().iter().filter(|(e, _)| e == endpoint).count()
    }
}

#[async_trait]
impl StatSource for ScriptedSource {
    async fn fetch(&self, endpoint: &str, params: &Params) -> Result<Payload> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((endpoint.to_string(), params.clone()));
        }
        let rule = self.rules.iter().rev().find(|rule| {
            rule.endpoint == endpoint
                && rule
                    .matches
                    .iter()
                    .all(|(k, v)| params.get(k).is_some_and(|actual| actual == v))
        });
        match rule.map(|r| &r.response) {
            Some(Ok(body)) => Payload::from_value(body.clone()),
            Some(Err(message)) => Err(EtlError::FetchTransient {
                combination: endpoint.to_string(),
                message: message.clone(),
            }),
            None => Payload::from_value(json!({"Message": "no scripted response"})),
        }
    }
}

/// Pages keyed by URL.
#[derive(Default)]
pub struct ScriptedHtml {
    pages: HashMap<String, String>,
}

impl ScriptedHtml {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl HtmlSource for ScriptedHtml {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| EtlError::FetchTransient {
                combination: url.to_string(),
                message: "404".into(),
            })
    }
}

/// `{resource, parameters, resultSets}` envelope for fixtures.
pub fn envelope(resource: &str, sets: Vec<(&str, Vec<&str>, Vec<Value>)>) -> Value {
    let result_sets: Vec<Value> = sets
        .into_iter()
        .map(|(name, headers, rows)| json!({"name": name, "headers": headers, "rowSet": rows}))
        .collect();
    json!({"resource": resource, "parameters": {}, "resultSets": result_sets})
}
