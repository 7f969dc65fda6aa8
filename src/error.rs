//! Error taxonomy for document loading, resolution and transforms.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, XpjsonError>;

#[derive(Debug, Error)]
pub enum XpjsonError {
    /// The document kind needs a resolved PlanSchema and none was supplied.
    #[error("{doc_type} documents require a schema, but none was supplied")]
    SchemaRequired { doc_type: String },

    #[error("spec '{id}' names unknown parent '{parent}'")]
    UnknownParent { id: String, parent: String },

    #[error("inheritance cycle among specs: {}", ids.join(", "))]
    InheritanceCycle { ids: Vec<String> },

    #[error("duplicate id '{id}' in {collection}")]
    DuplicateId { collection: String, id: String },

    #[error(transparent)]
    FieldValidation(Box<FieldValidationError>),

    #[error("document has no 'type' field")]
    MissingType,

    #[error("unknown document type '{0}'")]
    UnknownDocumentType(String),

    #[error("invalid value type '{name}': {reason}")]
    InvalidValueType { name: String, reason: String },

    #[error("id format '{format}': {reason}")]
    IdFormat { format: String, reason: String },

    #[error("crs: {0}")]
    Crs(String),

    #[error("no platform named '{0}' is configured")]
    UnknownPlatform(String),

    /// A transform hook failed; `location` names the sequence position.
    #[error("transform failed at {location}")]
    Transform {
        location: String,
        #[source]
        source: Box<XpjsonError>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl XpjsonError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn transform(location: impl Into<String>, source: XpjsonError) -> Self {
        Self::Transform {
            location: location.into(),
            source: Box::new(source),
        }
    }

    /// The validation detail, if this is a field validation failure.
    pub fn as_field_error(&self) -> Option<&FieldValidationError> {
        match self {
            Self::FieldValidation(err) => Some(err),
            Self::Transform { source, .. } => source.as_field_error(),
            _ => None,
        }
    }
}

impl From<FieldValidationError> for XpjsonError {
    fn from(err: FieldValidationError) -> Self {
        Self::FieldValidation(Box::new(err))
    }
}

/// A required field is missing, has the wrong type, or failed its validator.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct FieldValidationError {
    pub node_type: String,
    pub node_id: Option<String>,
    pub field: String,
    pub expected: String,
    /// `None` when the field is missing.
    pub actual: Option<Value>,
}

impl FieldValidationError {
    pub fn missing(
        node_type: impl Into<String>,
        node_id: Option<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            node_id,
            field: field.into(),
            expected: expected.into(),
            actual: None,
        }
    }

    pub fn mismatch(
        node_type: impl Into<String>,
        node_id: Option<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: Value,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            node_id,
            field: field.into(),
            expected: expected.into(),
            actual: Some(actual),
        }
    }
}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node_type)?;
        if let Some(id) = &self.node_id {
            write!(f, " '{}'", id)?;
        }
        match &self.actual {
            None => write!(
                f,
                ": required field '{}' is missing (expected {})",
                self.field, self.expected
            ),
            Some(actual) => write!(
                f,
                ": field '{}' expected {}, got {}",
                self.field, self.expected, actual
            ),
        }
    }
}
