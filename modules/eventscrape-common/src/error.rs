use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One rejected field in a request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Rejection at the HTTP boundary. Carries a structured details list and
/// never touches the database.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("validation failed: {}", summary(.details))]
pub struct ValidationError {
    pub details: Vec<FieldError>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self { details: Vec::new() }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            details: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.details.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Returns `Err(self)` when any detail has accumulated.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

fn summary(details: &[FieldError]) -> String {
    details
        .iter()
        .map(|d| format!("{}: {}", d.field, d.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_summarizes() {
        let mut err = ValidationError::new();
        err.push("cron", "must have 5 fields");
        err.push("timezone", "unknown zone");
        let rendered = err.to_string();
        assert!(rendered.contains("cron: must have 5 fields"));
        assert!(rendered.contains("timezone: unknown zone"));
        assert!(err.into_result().is_err());
    }

    #[test]
    fn empty_is_ok() {
        assert!(ValidationError::new().into_result().is_ok());
    }
}
