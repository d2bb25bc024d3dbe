// ⚠️ Error types for the store, the snapshot loader and configuration

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Field-level validation failures, keyed by field name.
///
/// Serialized as `{"field": ["message", ...]}` so API clients can map each
/// message back to the offending input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was recorded, the collected errors otherwise.
    pub fn into_result(self) -> Result<(), StoreError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors raised by the taxonomy/collection store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: i64 },

    #[error("invalid input: {0}")]
    Validation(ValidationErrors),

    /// Delete blocked because other rows still point at this one.
    #[error("cannot delete {entity} {id}: referenced by {references}")]
    Protected {
        entity: String,
        id: i64,
        references: String,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors raised while loading the fact snapshot for the dashboard.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Dates are mandatory for every chart, so one bad date aborts the load.
    #[error("record {id} has an unparsable date: {value:?}")]
    InvalidDate { id: i64, value: String },
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_group_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("codigo", "This field is required.");
        errors.add("codigo", "Ensure this field has exactly 1 characters.");
        errors.add("descricao", "This field may not be blank.");

        assert_eq!(errors.messages("codigo").len(), 2);
        assert!(errors.has("descricao"));
        assert!(!errors.has("secao"));

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json["descricao"][0],
            serde_json::json!("This field may not be blank.")
        );
    }

    #[test]
    fn test_empty_validation_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());

        let mut errors = ValidationErrors::new();
        errors.add("valor", "A valid number is required.");
        assert!(matches!(
            errors.into_result(),
            Err(StoreError::Validation(_))
        ));
    }
}
