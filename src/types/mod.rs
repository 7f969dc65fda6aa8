//! Type registry: node kinds, declared fields and value types.

pub mod kind;
pub mod registry;
pub mod value_type;

pub use kind::NodeKind;
pub use registry::{FieldDescriptor, FieldTable, TypeRegistry, Validator, registry};
pub use value_type::{GEOMETRY_TYPES, ValueType, is_of_type};
