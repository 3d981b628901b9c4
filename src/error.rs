use std::collections::BTreeMap;

/// Field path -> messages, as reported by form validation.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Failures of the API <-> Form entry conversion.
///
/// Any of these aborts the whole conversion; no partial result is produced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    #[error("Unknown property identifier '{0}'")]
    UnknownPropertyId(String),

    #[error("Unknown property name '{0}'")]
    UnknownPropertyName(String),

    #[error("Entry is missing the '{0}' field")]
    MissingField(String),

    #[error("Entry field '{field}' must be a string")]
    InvalidKey { field: String },

    #[error("Property '{property}' mixes primitive and nested values in one list")]
    MixedList { property: String },

    #[error("Unexpected value shape for '{context}': expected {expected}")]
    UnexpectedShape {
        context: String,
        expected: &'static str,
    },
}

/// Errors surfaced by the study service to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Passed data did not validate with the form {form_name}")]
    Validation {
        form_name: String,
        errors: FieldErrors,
    },

    #[error("The entries cannot have several identical property values: {0}")]
    DuplicateProperty(String),

    #[error("{0}")]
    RequestBody(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn request_body(message: impl Into<String>) -> Self {
        Self::RequestBody(message.into())
    }
}
