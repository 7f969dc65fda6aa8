//! XPJSON document engine.
//!
//! Loads `PlanSchema`, `PlanLibrary` and `Plan` documents into typed trees,
//! resolves schema inheritance, validates documents against their schema,
//! writes canonical JSON, and runs bottom-up transforms over plans.

pub mod build;
pub mod cache;
pub mod config;
pub mod crs;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod inherit;
pub mod node;
pub mod schema;
pub mod serialize;
pub mod types;
pub mod walk;

pub use build::{build, load_document_path, load_document_str, load_schema_path, load_schema_str};
pub use cache::{Catalog, PlatformBundle, SchemaCache};
pub use config::{LoadOptions, Settings};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{FieldValidationError, Result, XpjsonError};
pub use node::{Document, Element, FieldSource, TypedNode};
pub use schema::{CommandSpec, ParamSpec, PlanSchema};
pub use serialize::{dump_document_to_path, dump_document_to_string, to_value};
pub use types::{NodeKind, ValueType, is_of_type};
pub use walk::{FromNode, PlanTransform, WalkContext, transform};
