use thiserror::Error;

/// Error taxonomy for the ingestion core.
///
/// Only [`EtlError::Configuration`] is fatal for a whole run; everything else is scoped to a
/// row or a parameter combination and ends up in the run summary.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("provider has no data for {combination}: {message}")]
    FetchUnavailable {
        combination: String,
        message: String,
    },

    #[error("fetch failed for {combination}: {message}")]
    FetchTransient {
        combination: String,
        message: String,
    },

    #[error("no record kind registered for {shape} (resource {resource})")]
    Classification { resource: String, shape: String },

    #[error("{entity} with external id {external_id} does not exist")]
    EntityResolution {
        entity: &'static str,
        external_id: i64,
    },

    #[error("lineup roster already recorded for {kind}: {detail}")]
    DuplicateLineup { kind: String, detail: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    pub fn classification(resource: impl Into<String>, shape: impl Into<String>) -> Self {
        EtlError::Classification {
            resource: resource.into(),
            shape: shape.into(),
        }
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        EtlError::Payload(msg.into())
    }

    /// Whether the error must terminate the entire run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EtlError::Configuration(_))
    }

    /// Errors that only invalidate the current row; the rest of the unit keeps going.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            EtlError::EntityResolution { .. } | EtlError::DuplicateLineup { .. }
        )
    }

    /// Short label used in run summaries and structured log fields.
    pub fn category(&self) -> &'static str {
        match self {
            EtlError::FetchUnavailable { .. } => "fetch_unavailable",
            EtlError::FetchTransient { .. } => "fetch_transient",
            EtlError::Classification { .. } => "classification",
            EtlError::EntityResolution { .. } => "entity_resolution",
            EtlError::DuplicateLineup { .. } => "duplicate_lineup",
            EtlError::Configuration(_) => "configuration",
            EtlError::Payload(_) => "payload",
            EtlError::Database(_) => "database",
            EtlError::Migrate(_) => "migrate",
            EtlError::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configuration_is_fatal() {
        assert!(EtlError::Configuration("bad key".into()).is_fatal());
        assert!(!EtlError::classification("leaguedashplayerstats", "PlayerFooSplit").is_fatal());
        assert!(!EtlError::EntityResolution {
            entity: "game",
            external_id: 21600001
        }
        .is_fatal());
    }

    #[test]
    fn row_scoped_errors() {
        assert!(EtlError::DuplicateLineup {
            kind: "TeamTraditionalLineup".into(),
            detail: "1-2".into()
        }
        .is_row_scoped());
        assert!(!EtlError::payload("missing rowSet").is_row_scoped());
    }
}
