//! Provider response envelope.
//!
//! The stats API answers either with `{resource, parameters, resultSets: [...]}` (some endpoints
//! use a singular `resultSet`) or with `{Message: "..."}` when a parameter combination has no data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EtlError, Result};

/// One provider row keyed by header name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    #[serde(default)]
    pub name: String,
    pub headers: Vec<String>,
    #[serde(rename = "rowSet")]
    pub row_set: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Zip headers onto every row.
    pub fn rows(&self) -> Vec<Row> {
        self.row_set
            .iter()
            .map(|values| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(values.iter().cloned())
                    .collect::<Row>()
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatPayload {
    pub resource: String,
    pub parameters: Row,
    pub result_sets: Vec<ResultSet>,
}

impl StatPayload {
    pub fn result_set(&self, index: usize) -> Result<&ResultSet> {
        self.result_sets.get(index).ok_or_else(|| {
            EtlError::payload(format!(
                "{} returned {} result sets, wanted index {index}",
                self.resource,
                self.result_sets.len()
            ))
        })
    }

    pub fn rows(&self, index: usize) -> Result<Vec<Row>> {
        Ok(self.result_set(index)?.rows())
    }

    /// Parameter echoed back by the provider, rendered as a string.
    pub fn param(&self, key: &str) -> Option<String> {
        self.parameters.get(key).and_then(value_as_string)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The provider has nothing for this parameter combination.
    Unavailable { message: String },
    Data(StatPayload),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    resource: String,
    #[serde(default)]
    parameters: Value,
    #[serde(rename = "resultSets")]
    result_sets: Option<Vec<ResultSet>>,
    #[serde(rename = "resultSet")]
    result_set: Option<Value>,
}

impl Payload {
    pub fn from_value(value: Value) -> Result<Self> {
        if let Some(message) = value.get("Message") {
            return Ok(Payload::Unavailable {
                message: value_as_string(message).unwrap_or_default(),
            });
        }
        let envelope: Envelope = serde_json::from_value(value)?;
        let result_sets = match (envelope.result_sets, envelope.result_set) {
            (Some(sets), _) => sets,
            (None, Some(Value::Array(items))) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<Vec<ResultSet>, _>>()?,
            (None, Some(single)) => vec![serde_json::from_value(single)?],
            (None, None) => {
                return Err(EtlError::payload(format!(
                    "{} carries neither resultSets nor resultSet",
                    envelope.resource
                )))
            }
        };
        let parameters = match envelope.parameters {
            Value::Object(map) => map,
            _ => Row::new(),
        };
        Ok(Payload::Data(StatPayload {
            resource: envelope.resource,
            parameters,
            result_sets,
        }))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Payload::Unavailable { .. })
    }
}

/// Strings pass through; numbers and booleans are rendered; null and containers are `None`.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Provider ids arrive as numbers or as zero-padded strings ("0021600001").
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_means_unavailable() {
        let payload = Payload::from_value(json!({"Message": "An error has occurred."})).unwrap();
        assert!(payload.is_unavailable());
    }

    #[test]
    fn dictifies_result_sets() {
        let payload = Payload::from_value(json!({
            "resource": "leaguedashteamstats",
            "parameters": {"MeasureType": "Misc", "Season": "2016-17"},
            "resultSets": [{
                "name": "LeagueDashTeamStats",
                "headers": ["TEAM_ID", "PTS"],
                "rowSet": [[1610612739, 110], [1610612744, 116]]
            }]
        }))
        .unwrap();
        let Payload::Data(data) = payload else {
            panic!("expected data");
        };
        assert_eq!(data.param("MeasureType").as_deref(), Some("Misc"));
        let rows = data.rows(0).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("PTS"), Some(&json!(116)));
        assert!(data.rows(1).is_err());
    }

    #[test]
    fn accepts_singular_result_set() {
        let payload = Payload::from_value(json!({
            "resource": "leaguedashptstats",
            "parameters": {},
            "resultSet": {"name": "x", "headers": ["A"], "rowSet": [[1]]}
        }))
        .unwrap();
        let Payload::Data(data) = payload else {
            panic!("expected data");
        };
        assert_eq!(data.rows(0).unwrap()[0].get("A"), Some(&json!(1)));
    }

    #[test]
    fn ids_from_strings() {
        assert_eq!(value_as_i64(&json!("0021600001")), Some(21600001));
        assert_eq!(value_as_i64(&json!(2544)), Some(2544));
        assert_eq!(value_as_i64(&Value::Null), None);
    }
}
