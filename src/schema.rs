//! Resolved PlanSchema model.
//!
//! A raw `PlanSchema` document is compiled in two steps:
//! 1. [`resolve_schema_document`] runs inheritance over `paramSpecs` and
//!    `commandSpecs` (with the implicit abstract `Command` root), then
//!    resolves every nested param list against the named `paramSpecs`.
//!    The result is a plain JSON document with no `parent` markers and no
//!    abstract command specs.
//! 2. [`PlanSchema::from_resolved`] reads that document into typed tables.
//!
//! A `PlanSchema` is never mutated after construction; share it via `Arc`.

use crate::error::{FieldValidationError, Result};
use crate::inherit::{self, MergePolicy, ResolvedSpecs, Spec};
use crate::types::{NodeKind, ValueType};

use indexmap::IndexMap;
use serde::de::{Deserializer, Error as _};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

/// Name of the implicit abstract root command spec.
pub const ROOT_COMMAND: &str = "Command";

/// Param lists resolved against the named `paramSpecs`.
const PARAM_LISTS: &[&str] = &["planParams", "stationParams", "segmentParams", "targetParams"];

pub type ParamTable = IndexMap<String, ParamSpec>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub id: String,
    pub name: Option<String>,
    #[serde(default = "default_value_type")]
    pub value_type: ValueType,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    #[serde(default)]
    pub strict_minimum: bool,
    pub maximum: Option<f64>,
    #[serde(default)]
    pub strict_maximum: bool,
    /// `[value, label]` pairs.
    #[serde(default)]
    pub choices: Vec<Vec<Value>>,
    pub max_length: Option<usize>,
    pub default: Option<Value>,
    #[serde(default = "yes")]
    pub required: bool,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default = "yes")]
    pub editable: bool,
    pub widget: Option<String>,
    pub notes: Option<String>,
}

fn default_value_type() -> ValueType {
    ValueType::String
}

fn yes() -> bool {
    true
}

impl ParamSpec {
    /// Check a parameter value; `Err` describes the violated constraint.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        if !self.value_type.matches(value) {
            return Err(self.value_type.to_string());
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                let ok = if self.strict_minimum { n > min } else { n >= min };
                if !ok {
                    let op = if self.strict_minimum { ">" } else { ">=" };
                    return Err(format!("{} {} {}", self.value_type, op, min));
                }
            }
            if let Some(max) = self.maximum {
                let ok = if self.strict_maximum { n < max } else { n <= max };
                if !ok {
                    let op = if self.strict_maximum { "<" } else { "<=" };
                    return Err(format!("{} {} {}", self.value_type, op, max));
                }
            }
        }

        if !self.choices.is_empty() && !self.choices.iter().any(|c| c.first() == Some(value)) {
            let allowed: Vec<String> = self
                .choices
                .iter()
                .filter_map(|c| c.first())
                .map(Value::to_string)
                .collect();
            return Err(format!("one of [{}]", allowed.join(", ")));
        }

        if let (Some(max_len), Some(s)) = (self.max_length, value.as_str()) {
            if s.chars().count() > max_len {
                return Err(format!("a string of at most {} characters", max_len));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default, deserialize_with = "param_table")]
    pub params: Arc<ParamTable>,
    #[serde(default = "yes")]
    pub blocking: bool,
    #[serde(default = "yes")]
    pub scope_terminate: bool,
    pub color: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSchema {
    pub id: Option<String>,
    pub name: Option<String>,
    pub plan_id_format: Option<String>,
    pub station_id_format: Option<String>,
    pub segment_id_format: Option<String>,
    pub command_id_format: Option<String>,
    #[serde(default, deserialize_with = "param_table")]
    pub param_specs: Arc<ParamTable>,
    #[serde(default, deserialize_with = "command_table")]
    pub command_specs: IndexMap<String, CommandSpec>,
    #[serde(default, deserialize_with = "param_table")]
    pub plan_params: Arc<ParamTable>,
    #[serde(default, deserialize_with = "param_table")]
    pub station_params: Arc<ParamTable>,
    #[serde(default, deserialize_with = "param_table")]
    pub segment_params: Arc<ParamTable>,
    #[serde(default, deserialize_with = "param_table")]
    pub target_params: Arc<ParamTable>,
    #[serde(default)]
    pub plan_sequence_commands: Vec<String>,
    #[serde(default)]
    pub station_sequence_commands: Vec<String>,
    #[serde(default)]
    pub segment_sequence_commands: Vec<String>,
}

impl PlanSchema {
    /// Read typed tables from a document produced by
    /// [`resolve_schema_document`].
    pub fn from_resolved(doc: &Value) -> Result<Self> {
        Ok(Self::deserialize(doc)?)
    }

    /// Resolve a raw schema document and read it.
    pub fn from_raw(raw: &Value) -> Result<Self> {
        Self::from_resolved(&resolve_schema_document(raw)?)
    }

    pub fn command_spec(&self, id: &str) -> Option<&CommandSpec> {
        self.command_specs.get(id)
    }

    /// Schema parameters that apply to a node of `kind`.
    pub fn params_for(&self, kind: NodeKind) -> Option<Arc<ParamTable>> {
        match kind {
            NodeKind::Plan => Some(self.plan_params.clone()),
            NodeKind::Station => Some(self.station_params.clone()),
            NodeKind::Segment => Some(self.segment_params.clone()),
            NodeKind::Target => Some(self.target_params.clone()),
            _ => None,
        }
    }

    /// Command types allowed inside the sequence of a node of `kind`.
    /// An empty list allows every concrete command type.
    pub fn sequence_commands_for(&self, kind: NodeKind) -> &[String] {
        match kind {
            NodeKind::Plan => &self.plan_sequence_commands,
            NodeKind::Station => &self.station_sequence_commands,
            NodeKind::Segment => &self.segment_sequence_commands,
            _ => &[],
        }
    }

    pub fn id_format(&self, kind: NodeKind) -> Option<&str> {
        match kind {
            NodeKind::Plan => self.plan_id_format.as_deref(),
            NodeKind::Station => self.station_id_format.as_deref(),
            NodeKind::Segment => self.segment_id_format.as_deref(),
            NodeKind::Command => self.command_id_format.as_deref(),
            _ => None,
        }
    }
}

fn param_table<'de, D>(deserializer: D) -> std::result::Result<Arc<ParamTable>, D::Error>
where
    D: Deserializer<'de>,
{
    let specs = Vec::<ParamSpec>::deserialize(deserializer)?;
    let mut table = ParamTable::new();
    for spec in specs {
        let id = spec.id.clone();
        if table.insert(id.clone(), spec).is_some() {
            return Err(D::Error::custom(format!("duplicate param id '{}'", id)));
        }
    }
    Ok(Arc::new(table))
}

fn command_table<'de, D>(
    deserializer: D,
) -> std::result::Result<IndexMap<String, CommandSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let specs = Vec::<CommandSpec>::deserialize(deserializer)?;
    let mut table = IndexMap::new();
    for spec in specs {
        let id = spec.id.clone();
        if table.insert(id.clone(), spec).is_some() {
            return Err(D::Error::custom(format!("duplicate command spec id '{}'", id)));
        }
    }
    Ok(table)
}

/// Compile inheritance out of a raw `PlanSchema` document.
///
/// Keys absent from the input stay absent in the output.
pub fn resolve_schema_document(raw: &Value) -> Result<Value> {
    let Some(doc) = raw.as_object() else {
        return Err(FieldValidationError::mismatch(
            "PlanSchema",
            None,
            "document",
            "object",
            raw.clone(),
        )
        .into());
    };
    let doc_id = doc.get("id").and_then(Value::as_str).map(str::to_string);
    let mut out = doc.clone();

    // Pass 1: named param specs, plain override.
    let param_pool = inherit::resolve(
        spec_list(doc, "paramSpecs", &doc_id)?,
        &MergePolicy::named_specs(),
    )?;
    if doc.contains_key("paramSpecs") {
        out.insert("paramSpecs".to_string(), to_list(&param_pool));
    }

    // Pass 2: command specs under the implicit root.
    let mut commands = spec_list(doc, "commandSpecs", &doc_id)?;
    let has_root = commands
        .iter()
        .any(|c| c.get("id").and_then(Value::as_str) == Some(ROOT_COMMAND));
    for spec in commands.iter_mut() {
        let is_root = spec.get("id").and_then(Value::as_str) == Some(ROOT_COMMAND);
        if !is_root && spec.get("parent").is_none_or(Value::is_null) {
            spec.insert("parent".to_string(), json!(ROOT_COMMAND));
        }
    }
    if !has_root {
        commands.insert(0, implicit_root());
    }
    let resolved_commands = inherit::resolve(commands, &MergePolicy::command_specs())?;

    // Nested: each command's params against the named pool.
    let mut concrete: Vec<Value> = Vec::new();
    for (id, mut spec) in resolved_commands {
        if let Some(params) = spec.get("params") {
            let params = params_as_specs(params, "CommandSpec", &id)?;
            let resolved = inherit::resolve_with_pool(params, &MergePolicy::named_specs(), &param_pool)?;
            spec.insert("params".to_string(), to_list(&resolved));
        }
        let is_abstract = spec.get("abstract").and_then(Value::as_bool).unwrap_or(false);
        if is_abstract {
            debug!(command = %id, "dropping abstract command spec from output");
        } else {
            concrete.push(Value::Object(spec));
        }
    }
    if doc.contains_key("commandSpecs") {
        out.insert("commandSpecs".to_string(), Value::Array(concrete));
    }

    // Per-element param lists against the named pool.
    for key in PARAM_LISTS {
        if let Some(list) = doc.get(*key) {
            let params = params_as_specs(list, "PlanSchema", doc_id.as_deref().unwrap_or(*key))?;
            let resolved = inherit::resolve_with_pool(params, &MergePolicy::named_specs(), &param_pool)?;
            out.insert(key.to_string(), to_list(&resolved));
        }
    }

    Ok(Value::Object(out))
}

fn implicit_root() -> Spec {
    let mut root = Map::new();
    root.insert("type".to_string(), json!("CommandSpec"));
    root.insert("id".to_string(), json!(ROOT_COMMAND));
    root.insert("abstract".to_string(), json!(true));
    root
}

fn spec_list(doc: &Map<String, Value>, key: &str, doc_id: &Option<String>) -> Result<Vec<Spec>> {
    match doc.get(key) {
        None => Ok(Vec::new()),
        Some(list) => objects(list).ok_or_else(|| {
            FieldValidationError::mismatch(
                "PlanSchema",
                doc_id.clone(),
                key,
                "array of objects",
                list.clone(),
            )
            .into()
        }),
    }
}

fn params_as_specs(list: &Value, owner_type: &str, owner_id: &str) -> Result<Vec<Spec>> {
    objects(list).ok_or_else(|| {
        FieldValidationError::mismatch(
            owner_type,
            Some(owner_id.to_string()),
            "params",
            "array.ParamSpec",
            list.clone(),
        )
        .into()
    })
}

fn objects(list: &Value) -> Option<Vec<Spec>> {
    list.as_array()?
        .iter()
        .map(|v| v.as_object().cloned())
        .collect()
}

fn to_list(specs: &ResolvedSpecs) -> Value {
    Value::Array(specs.values().cloned().map(Value::Object).collect())
}
