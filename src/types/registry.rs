//! Statically-known fields per node kind.
//!
//! The registry is compiled once on first use and never mutated.

use crate::types::{NodeKind, ValueType};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Extra check run after the value-type predicate.
#[derive(Debug, Clone)]
pub enum Validator {
    NonNegative,
    Range { min: f64, max: f64 },
    OneOf(&'static [&'static str]),
    UpperCase,
    Pattern(Regex),
    Custom {
        expected: &'static str,
        check: fn(&Value) -> bool,
    },
}

impl Validator {
    /// `Err` carries a description of what was expected.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        let ok = match self {
            Validator::NonNegative => value.as_f64().is_some_and(|n| n >= 0.0),
            Validator::Range { min, max } => value.as_f64().is_some_and(|n| n >= *min && n <= *max),
            Validator::OneOf(choices) => value.as_str().is_some_and(|s| choices.contains(&s)),
            Validator::UpperCase => value.as_str().is_some_and(|s| s == s.to_uppercase()),
            Validator::Pattern(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            Validator::Custom { check, .. } => check(value),
        };
        if ok { Ok(()) } else { Err(self.describe()) }
    }

    fn describe(&self) -> String {
        match self {
            Validator::NonNegative => "a non-negative number".to_string(),
            Validator::Range { min, max } => format!("a number in [{}, {}]", min, max),
            Validator::OneOf(choices) => format!("one of {:?}", choices),
            Validator::UpperCase => "an upper-case string".to_string(),
            Validator::Pattern(re) => format!("a string matching /{}/", re.as_str()),
            Validator::Custom { expected, .. } => expected.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub value_type: ValueType,
    pub default: Option<Value>,
    pub required: bool,
    pub validator: Option<Validator>,
}

impl FieldDescriptor {
    fn new(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            default: None,
            required: false,
            validator: None,
        }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

pub type FieldTable = IndexMap<&'static str, FieldDescriptor>;

pub struct TypeRegistry {
    kinds: HashMap<NodeKind, FieldTable>,
}

impl TypeRegistry {
    pub fn fields(&self, kind: NodeKind) -> &FieldTable {
        // Every kind is registered in `compile`.
        &self.kinds[&kind]
    }

    pub fn field(&self, kind: NodeKind, name: &str) -> Option<&FieldDescriptor> {
        self.kinds.get(&kind)?.get(name)
    }

    fn compile() -> Self {
        let kinds = NodeKind::ALL
            .into_iter()
            .map(|kind| {
                let table = declared_fields(kind)
                    .into_iter()
                    .map(|f| (f.name, f))
                    .collect::<FieldTable>();
                (kind, table)
            })
            .collect();
        Self { kinds }
    }
}

pub static REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::compile);

pub fn registry() -> &'static TypeRegistry {
    &REGISTRY
}

fn string(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, ValueType::String)
}

fn number(name: &'static str) -> FieldDescriptor {
    FieldDescriptor::new(name, ValueType::Number)
}

fn boolean(name: &'static str, default: bool) -> FieldDescriptor {
    FieldDescriptor::new(name, ValueType::Boolean).default(json!(default))
}

fn list_of(name: &'static str, kind: &str) -> FieldDescriptor {
    FieldDescriptor::new(name, ValueType::array_of(ValueType::kind(kind)))
}

fn is_value_type_name(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.parse::<ValueType>().is_ok())
}

fn is_choice_list(value: &Value) -> bool {
    value.as_array().is_some_and(|choices| {
        choices
            .iter()
            .all(|c| c.as_array().is_some_and(|pair| !pair.is_empty() && pair.len() <= 2))
    })
}

fn is_unit_table(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|units| units.values().all(Value::is_number))
}

fn declared_fields(kind: NodeKind) -> Vec<FieldDescriptor> {
    let mut fields = vec![
        string("type").required(),
        string("id"),
        string("name"),
        string("notes"),
    ];

    if kind.is_document() {
        fields.extend([
            string("xpjson").required().validate(Validator::OneOf(&["0.2"])),
            string("creator"),
            FieldDescriptor::new("contributors", ValueType::array_of(ValueType::String)),
            FieldDescriptor::new("dateCreated", ValueType::DateTime),
            FieldDescriptor::new("dateModified", ValueType::DateTime),
            FieldDescriptor::new("schemaUrl", ValueType::Url),
            FieldDescriptor::new("libraryUrls", ValueType::array_of(ValueType::Url)),
        ]);
    }

    if kind.is_path_element() {
        fields.extend([
            list_of("sequence", "Command").default(json!([])),
            number("tolerance").validate(Validator::NonNegative),
        ]);
    }

    match kind {
        NodeKind::PlanSchema => fields.extend([
            string("planIdFormat"),
            string("stationIdFormat"),
            string("segmentIdFormat"),
            string("commandIdFormat"),
            list_of("paramSpecs", "ParamSpec"),
            list_of("commandSpecs", "CommandSpec"),
            list_of("planParams", "ParamSpec"),
            list_of("stationParams", "ParamSpec"),
            list_of("segmentParams", "ParamSpec"),
            list_of("targetParams", "ParamSpec"),
            FieldDescriptor::new("planSequenceCommands", ValueType::array_of(ValueType::String)),
            FieldDescriptor::new(
                "stationSequenceCommands",
                ValueType::array_of(ValueType::String),
            ),
            FieldDescriptor::new(
                "segmentSequenceCommands",
                ValueType::array_of(ValueType::String),
            ),
            list_of("unitSpecs", "UnitSpec"),
            list_of("sites", "Site"),
            list_of("platforms", "Platform"),
        ]),
        NodeKind::PlanLibrary => fields.extend([
            list_of("sites", "Site"),
            list_of("platforms", "Platform"),
            list_of("stations", "Station"),
            list_of("segments", "Segment"),
            list_of("targets", "Target"),
            list_of("commands", "Command"),
        ]),
        NodeKind::Plan => fields.extend([
            FieldDescriptor::new("planNumber", ValueType::Integer).validate(Validator::NonNegative),
            string("planVersion").validate(Validator::UpperCase),
            FieldDescriptor::new("site", ValueType::kind("Site")),
            FieldDescriptor::new("platform", ValueType::kind("Platform")),
            list_of("targets", "Target"),
            FieldDescriptor::new("sequence", ValueType::array_of(ValueType::Any))
                .default(json!([])),
        ]),
        NodeKind::Station => fields.extend([
            FieldDescriptor::new("geometry", ValueType::Geometry("Point".to_string())).required(),
            number("headingDegrees").validate(Validator::Range {
                min: -360.0,
                max: 360.0,
            }),
            number("headingToleranceDegrees").validate(Validator::NonNegative),
            boolean("isDirectional", false),
        ]),
        NodeKind::Segment => fields.extend([
            FieldDescriptor::new("geometry", ValueType::Geometry("LineString".to_string())),
            number("speed").validate(Validator::NonNegative),
        ]),
        NodeKind::Command => fields.extend([string("presetCode"), string("presetName")]),
        NodeKind::ParamSpec => fields.extend([
            string("valueType").default(json!("string")).validate(Validator::Custom {
                expected: "a value type name",
                check: is_value_type_name,
            }),
            string("unit"),
            number("minimum"),
            boolean("strictMinimum", false),
            number("maximum"),
            boolean("strictMaximum", false),
            FieldDescriptor::new("choices", ValueType::array_of(ValueType::Any)).validate(
                Validator::Custom {
                    expected: "a list of [value, label] pairs",
                    check: is_choice_list,
                },
            ),
            FieldDescriptor::new("maxLength", ValueType::Integer).validate(Validator::NonNegative),
            FieldDescriptor::new("default", ValueType::Any),
            boolean("required", true),
            boolean("visible", true),
            boolean("editable", true),
            string("widget"),
            string("parent"),
        ]),
        NodeKind::CommandSpec => fields.extend([
            string("parent"),
            boolean("abstract", false),
            list_of("params", "ParamSpec"),
            string("color").validate(Validator::Pattern(
                Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("color pattern"),
            )),
            boolean("blocking", true),
            boolean("scopeTerminate", true),
        ]),
        NodeKind::Site => fields.extend([
            FieldDescriptor::new("crs", ValueType::Crs),
            FieldDescriptor::new("alternateCrs", ValueType::Crs),
            FieldDescriptor::new("bbox", ValueType::BBox),
        ]),
        NodeKind::Target => fields.extend([
            FieldDescriptor::new("geometry", ValueType::Geometry("Point".to_string())),
            string("targetType"),
        ]),
        NodeKind::UnitSpec => fields.push(
            FieldDescriptor::new("units", ValueType::Any)
                .required()
                .validate(Validator::Custom {
                    expected: "an object mapping unit names to numeric factors",
                    check: is_unit_table,
                }),
        ),
        NodeKind::Platform => {}
    }

    fields
}
