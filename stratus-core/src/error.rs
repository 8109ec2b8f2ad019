//! Error types for assembling construct specifications

use thiserror::Error;

use crate::key_material::KeyResolutionError;
use crate::schema::TypeError;
use crate::user_data::UserDataSourceError;

/// A configuration that cannot produce a complete specification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSpecError {
    #[error("{construct}: required field '{field}' is missing")]
    MissingField { construct: String, field: String },

    #[error("{construct}: invalid value for '{field}': {message}")]
    InvalidField {
        construct: String,
        field: String,
        message: String,
    },

    #[error("{construct}: duplicate port binding name '{name}'")]
    DuplicatePortName { construct: String, name: String },

    #[error("construct id '{0}' is used more than once")]
    DuplicateConstruct(String),
}

impl InvalidSpecError {
    pub fn missing(construct: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            construct: construct.into(),
            field: field.into(),
        }
    }

    pub fn invalid(
        construct: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            construct: construct.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Convert a schema validation error for `construct`
    pub fn from_type_error(construct: &str, error: TypeError) -> Self {
        match error {
            TypeError::MissingRequired { name } => Self::missing(construct, name),
            TypeError::Attribute { name, inner } => {
                Self::invalid(construct, name, inner.to_string())
            }
            other => Self::invalid(construct, "<unknown>", other.to_string()),
        }
    }

    /// Name of the offending field, if the error concerns one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Any failure while building a specification
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),

    #[error(transparent)]
    UserDataSource(#[from] UserDataSourceError),

    #[error(transparent)]
    InvalidSpec(#[from] InvalidSpecError),
}

pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_spec_display() {
        let error = InvalidSpecError::missing("WebServer", "vpc");
        assert_eq!(error.to_string(), "WebServer: required field 'vpc' is missing");
        assert_eq!(error.field(), Some("vpc"));

        let error = InvalidSpecError::DuplicateConstruct("Web".to_string());
        assert_eq!(error.to_string(), "construct id 'Web' is used more than once");
        assert_eq!(error.field(), None);
    }

    #[test]
    fn test_from_type_error() {
        let error = InvalidSpecError::from_type_error(
            "Cluster",
            TypeError::Attribute {
                name: "max_capacity".to_string(),
                inner: Box::new(TypeError::ValidationFailed {
                    message: "Value must be positive".to_string(),
                }),
            },
        );
        assert_eq!(
            error,
            InvalidSpecError::invalid(
                "Cluster",
                "max_capacity",
                "Validation failed: Value must be positive"
            )
        );
    }
}
