//! Non-fatal diagnostics and message helpers.
//!
//! Warnings are logged through `tracing` and also returned to the caller so
//! that tools can report them without scraping logs.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    /// A field matched neither a declared field nor a schema parameter.
    UnknownField,
    /// A plan sequence element was neither a Station nor a Segment.
    SequenceShape,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn unknown_field(node_type: &str, node_id: Option<&str>, field: &str) -> Self {
        let owner = match node_id {
            Some(id) => format!("{} '{}'", node_type, id),
            None => node_type.to_string(),
        };
        Self {
            kind: DiagnosticKind::UnknownField,
            message: format!("{} has unknown field '{}'", owner, field),
        }
    }

    pub fn sequence_shape(index: usize, found: &str) -> Self {
        Self {
            kind: DiagnosticKind::SequenceShape,
            message: format!(
                "plan sequence element {} has type '{}'; expected Station or Segment, skipping",
                index, found
            ),
        }
    }

    /// Log this diagnostic at warn level.
    pub fn emit(&self) {
        warn(&self.message);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn warn(msg: impl AsRef<str>) {
    tracing::warn!("{}", msg.as_ref());
}

/// Format a user-facing error line.
pub fn error_message(msg: impl AsRef<str>) -> String {
    format!("xpjson: {}", msg.as_ref())
}
