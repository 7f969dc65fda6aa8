//! Document tree builder.
//!
//! `build` is a bottom-up transform over parsed JSON: children are built
//! first, then an object whose `type` names a node kind (or, with a schema, a
//! command spec id) becomes a [`TypedNode`], is validated, and optionally has
//! its defaults filled in.

use crate::config::LoadOptions;
use crate::diagnostics::Diagnostic;
use crate::error::{FieldValidationError, Result, XpjsonError};
use crate::node::{Document, Element, Fields, TypedNode};
use crate::schema::{self, ParamSpec, ParamTable, PlanSchema};
use crate::types::{NodeKind, registry};

use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// What a JSON object's `type` discriminator decodes to.
enum NodeType {
    Kind(NodeKind, Option<Arc<ParamTable>>),
    Plain,
}

struct Builder<'a> {
    schema: Option<&'a PlanSchema>,
    opts: &'a LoadOptions,
    diagnostics: Vec<Diagnostic>,
}

/// Build a typed document from parsed JSON.
///
/// A `PlanSchema` document is resolved first and validated on its own; any
/// other document type requires `schema`.
pub fn build(raw: Value, schema: Option<Arc<PlanSchema>>, opts: &LoadOptions) -> Result<Document> {
    let kind = document_kind(&raw)?;

    let (raw, schema) = if kind == NodeKind::PlanSchema {
        let resolved = schema::resolve_schema_document(&raw)?;
        let own = Arc::new(PlanSchema::from_resolved(&resolved)?);
        (resolved, own)
    } else {
        let schema = schema.ok_or_else(|| XpjsonError::SchemaRequired {
            doc_type: kind.name().to_string(),
        })?;
        (raw, schema)
    };

    let mut builder = Builder {
        // Schema documents never contain commands, so they are built
        // without a command table.
        schema: (kind != NodeKind::PlanSchema).then_some(&*schema),
        opts,
        diagnostics: Vec::new(),
    };
    let root = match builder.transform(raw)? {
        Element::Node(node) => *node,
        _ => return Err(XpjsonError::UnknownDocumentType(kind.name().to_string())),
    };
    let diagnostics = builder.diagnostics;
    debug!(
        kind = %kind,
        id = root.id().unwrap_or(""),
        warnings = diagnostics.len(),
        "built document"
    );

    Ok(Document {
        root,
        schema: Some(schema),
        diagnostics,
    })
}

pub fn load_document_str(
    text: &str,
    schema: Option<Arc<PlanSchema>>,
    opts: &LoadOptions,
) -> Result<Document> {
    build(serde_json::from_str(text)?, schema, opts)
}

pub fn load_document_path(
    path: impl AsRef<Path>,
    schema: Option<Arc<PlanSchema>>,
    opts: &LoadOptions,
) -> Result<Document> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| XpjsonError::io(path, e))?;
    load_document_str(&text, schema, opts)
}

/// Load and resolve a PlanSchema document.
pub fn load_schema_path(path: impl AsRef<Path>, opts: &LoadOptions) -> Result<Arc<PlanSchema>> {
    let doc = load_document_path(path, None, opts)?;
    expect_schema(doc)
}

pub fn load_schema_str(text: &str, opts: &LoadOptions) -> Result<Arc<PlanSchema>> {
    let doc = load_document_str(text, None, opts)?;
    expect_schema(doc)
}

fn expect_schema(doc: Document) -> Result<Arc<PlanSchema>> {
    match (doc.kind(), doc.schema) {
        (NodeKind::PlanSchema, Some(schema)) => Ok(schema),
        (kind, _) => Err(XpjsonError::UnknownDocumentType(format!(
            "{} (expected PlanSchema)",
            kind
        ))),
    }
}

fn document_kind(raw: &Value) -> Result<NodeKind> {
    let type_name = match raw.get("type") {
        Some(Value::String(t)) => t,
        _ => return Err(XpjsonError::MissingType),
    };
    NodeKind::from_type_name(type_name)
        .filter(|k| k.is_document())
        .ok_or_else(|| XpjsonError::UnknownDocumentType(type_name.clone()))
}

impl Builder<'_> {
    fn transform(&mut self, value: Value) -> Result<Element> {
        match value {
            Value::Array(items) => Ok(Element::List(
                items
                    .into_iter()
                    .map(|v| self.transform(v))
                    .collect::<Result<_>>()?,
            )),
            Value::Object(map) => {
                let mut fields = Fields::with_capacity(map.len());
                for (key, child) in map {
                    let child = self.transform(child)?;
                    fields.insert(key, child);
                }
                match self.decode(&fields) {
                    NodeType::Plain => Ok(Element::Object(fields)),
                    NodeType::Kind(kind, params) => {
                        let type_name = fields
                            .get("type")
                            .and_then(Element::as_str)
                            .unwrap_or(kind.name())
                            .to_string();
                        let mut node = TypedNode::new(kind, type_name, fields, params);
                        self.validate(&node)?;
                        if self.opts.fill_defaults {
                            node.fill_defaults();
                        }
                        Ok(node.into())
                    }
                }
            }
            scalar => Ok(Element::Scalar(scalar)),
        }
    }

    fn decode(&self, fields: &Fields) -> NodeType {
        let Some(type_name) = fields.get("type").and_then(Element::as_str) else {
            return NodeType::Plain;
        };
        if let Some(kind) = NodeKind::from_type_name(type_name) {
            let params = self.schema.and_then(|s| s.params_for(kind));
            return NodeType::Kind(kind, params);
        }
        match self.schema.and_then(|s| s.command_spec(type_name)) {
            Some(spec) => NodeType::Kind(NodeKind::Command, Some(spec.params.clone())),
            None => NodeType::Plain,
        }
    }

    fn validate(&mut self, node: &TypedNode) -> Result<()> {
        let node_type = node.type_name();
        let node_id = node.id().map(str::to_string);
        let mismatch = |field: &str, expected: String, actual: &Element| -> XpjsonError {
            FieldValidationError::mismatch(
                node_type,
                node_id.clone(),
                field,
                expected,
                actual.to_value(),
            )
            .into()
        };

        // Declared fields.
        for field in registry().fields(node.kind()).values() {
            match node.raw(field.name).filter(|e| !e.is_null()) {
                None => {
                    if field.required && field.default.is_none() {
                        return Err(FieldValidationError::missing(
                            node_type,
                            node_id.clone(),
                            field.name,
                            field.value_type.to_string(),
                        )
                        .into());
                    }
                }
                Some(value) => {
                    if !value.matches(&field.value_type) {
                        return Err(mismatch(field.name, field.value_type.to_string(), value));
                    }
                    if let Some(validator) = &field.validator {
                        validator
                            .check(&value.to_value())
                            .map_err(|expected| mismatch(field.name, expected, value))?;
                    }
                }
            }
        }

        // Schema parameters.
        if let Some(params) = node.params() {
            for (id, spec) in params {
                match node.raw(id).filter(|e| !e.is_null()) {
                    None => {
                        if spec.required && spec.default.is_none() {
                            return Err(FieldValidationError::missing(
                                node_type,
                                node_id.clone(),
                                id.as_str(),
                                spec.value_type.to_string(),
                            )
                            .into());
                        }
                    }
                    Some(value) => spec
                        .check(&value.to_value())
                        .map_err(|expected| mismatch(id, expected, value))?,
                }
            }
        }

        // Unknown fields.
        for key in node.fields().keys() {
            let declared = registry().field(node.kind(), key).is_some();
            let param = node.params().is_some_and(|p| p.contains_key(key));
            if !declared && !param && self.opts.warn_unknown_fields {
                let diagnostic = Diagnostic::unknown_field(node_type, node_id.as_deref(), key);
                diagnostic.emit();
                self.diagnostics.push(diagnostic);
            }
        }

        // Ids are unique within each list of typed nodes.
        for (key, value) in node.fields() {
            let Some(items) = value.as_list() else {
                continue;
            };
            let mut seen = HashSet::new();
            for id in items.iter().filter_map(Element::as_node).filter_map(TypedNode::id) {
                if !seen.insert(id) {
                    return Err(XpjsonError::DuplicateId {
                        collection: match &node_id {
                            Some(owner) => format!("{} '{}'.{}", node_type, owner, key),
                            None => format!("{}.{}", node_type, key),
                        },
                        id: id.to_string(),
                    });
                }
            }
        }

        // Station and segment sequences hold concrete commands only; abstract
        // command specs never decode to a Command node.
        if node.kind().is_path_element() {
            for item in node.list("sequence") {
                if item.as_node().is_none_or(|n| n.kind() != NodeKind::Command) {
                    return Err(mismatch(
                        "sequence",
                        "a concrete command type".to_string(),
                        item,
                    ));
                }
            }
        }

        // Command types allowed in this node's sequence.
        if let Some(schema) = self.schema {
            let allowed = schema.sequence_commands_for(node.kind());
            if !allowed.is_empty() {
                for item in node.list("sequence") {
                    if let Some(cmd) = item.as_node().filter(|n| n.kind() == NodeKind::Command) {
                        if !allowed.iter().any(|a| a == cmd.type_name()) {
                            return Err(mismatch(
                                "sequence",
                                format!("commands of type {:?}", allowed),
                                item,
                            ));
                        }
                    }
                }
            }
        }

        match node.kind() {
            NodeKind::Plan => self.check_plan_sequence(node),
            NodeKind::ParamSpec => check_param_default(node),
            _ => Ok(()),
        }
    }

    /// The sequence must read `Station, [Segment, Station]*`. Elements of
    /// other types are reported and ignored.
    fn check_plan_sequence(&mut self, plan: &TypedNode) -> Result<()> {
        let mut shape: Vec<NodeKind> = Vec::new();
        for (index, item) in plan.list("sequence").iter().enumerate() {
            match item.as_node().map(TypedNode::kind) {
                Some(kind @ (NodeKind::Station | NodeKind::Segment)) => shape.push(kind),
                _ => {
                    let found = item
                        .field("type")
                        .and_then(|t| t.as_str().map(str::to_string))
                        .unwrap_or_else(|| "<untyped>".to_string());
                    let diagnostic = Diagnostic::sequence_shape(index, &found);
                    diagnostic.emit();
                    self.diagnostics.push(diagnostic);
                }
            }
        }

        let alternates = shape.windows(2).all(|w| w[0] != w[1]);
        let ends_ok = shape.first().is_none_or(|k| *k == NodeKind::Station)
            && shape.last().is_none_or(|k| *k == NodeKind::Station);
        if alternates && ends_ok {
            return Ok(());
        }

        let found: Vec<Value> = shape.iter().map(|k| Value::from(k.name())).collect();
        Err(FieldValidationError::mismatch(
            plan.type_name(),
            plan.id().map(str::to_string),
            "sequence",
            "Station, [Segment, Station]*",
            Value::Array(found),
        )
        .into())
    }
}

/// A ParamSpec's own default must satisfy the spec.
fn check_param_default(node: &TypedNode) -> Result<()> {
    let Some(default) = node.raw("default").filter(|d| !d.is_null()) else {
        return Ok(());
    };
    let spec: ParamSpec = serde_json::from_value(node.to_value())?;
    spec.check(&default.to_value()).map_err(|expected| {
        FieldValidationError::mismatch(
            node.type_name(),
            Some(spec.id.clone()),
            "default",
            expected,
            default.to_value(),
        )
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Arc<PlanSchema> {
        let doc = build(
            json!({
                "type": "PlanSchema",
                "xpjson": "0.2",
                "id": "s",
                "paramSpecs": [
                    {"type": "ParamSpec", "id": "duration", "valueType": "number", "minimum": 0}
                ],
                "commandSpecs": [
                    {"type": "CommandSpec", "id": "Timed", "abstract": true},
                    {"type": "CommandSpec", "id": "Sample",
                     "params": [{"type": "ParamSpec", "id": "duration", "parent": "duration", "default": 60}]},
                    {"type": "CommandSpec", "id": "Photo",
                     "params": [{"type": "ParamSpec", "id": "count", "valueType": "integer"}]}
                ],
                "stationParams": [
                    {"type": "ParamSpec", "id": "dwell", "valueType": "number", "default": 0}
                ],
                "stationSequenceCommands": ["Sample", "Photo"],
                "segmentSequenceCommands": ["Photo"]
            }),
            None,
            &LoadOptions::default(),
        )
        .unwrap();
        doc.schema.unwrap()
    }

    fn point() -> Value {
        json!({"type": "Point", "coordinates": [0.0, 0.0]})
    }

    fn plan(sequence: Value) -> Value {
        json!({"type": "Plan", "xpjson": "0.2", "id": "P1", "sequence": sequence})
    }

    #[test]
    fn builds_typed_tree() {
        let doc = build(
            plan(json!([
                {"type": "Station", "geometry": point(),
                 "sequence": [{"type": "Sample", "duration": 5}]},
                {"type": "Segment"},
                {"type": "Station", "geometry": point()}
            ])),
            Some(schema()),
            &LoadOptions::default(),
        )
        .unwrap();

        assert_eq!(doc.kind(), NodeKind::Plan);
        let seq: Vec<&TypedNode> = doc.root.nodes("sequence").collect();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq[0].kind(), NodeKind::Station);
        let cmd = seq[0].nodes("sequence").next().unwrap();
        assert_eq!(cmd.kind(), NodeKind::Command);
        assert_eq!(cmd.type_name(), "Sample");
        assert_eq!(cmd.get_f64("duration"), Some(5.0));
        // geometry stays a plain object
        assert!(seq[0].raw("geometry").unwrap().as_object().is_some());
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn plan_requires_schema() {
        let err = build(plan(json!([])), None, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, XpjsonError::SchemaRequired { ref doc_type } if doc_type == "Plan"));
    }

    #[test]
    fn unknown_document_type() {
        let err = build(json!({"type": "Station"}), None, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, XpjsonError::UnknownDocumentType(_)));
        let err = build(json!({"xpjson": "0.2"}), None, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, XpjsonError::MissingType));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut raw = plan(json!([]));
        raw["xpjson"] = json!("0.1");
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        let field = err.as_field_error().unwrap();
        assert_eq!(field.field, "xpjson");
        assert_eq!(field.node_id.as_deref(), Some("P1"));
    }

    #[test]
    fn command_param_constraints_are_enforced() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point(),
             "sequence": [{"type": "Sample", "duration": -1}]}
        ]));
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        let field = err.as_field_error().unwrap();
        assert_eq!(field.node_type, "Sample");
        assert_eq!(field.field, "duration");
        assert_eq!(field.actual, Some(json!(-1)));
    }

    #[test]
    fn missing_required_param_is_rejected() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point(), "sequence": [{"type": "Photo"}]}
        ]));
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        let field = err.as_field_error().unwrap();
        assert_eq!(field.field, "count");
        assert_eq!(field.actual, None);
    }

    #[test]
    fn sequence_command_allowlist() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point()},
            {"type": "Segment", "sequence": [{"type": "Sample"}]},
            {"type": "Station", "geometry": point()}
        ]));
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        let field = err.as_field_error().unwrap();
        assert_eq!(field.node_type, "Segment");
        assert_eq!(field.field, "sequence");
    }

    #[test]
    fn abstract_command_type_is_rejected() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point(), "sequence": [{"type": "Timed"}]}
        ]));
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        let field = err.as_field_error().unwrap();
        assert_eq!(field.node_type, "Station");
        assert_eq!(field.field, "sequence");
    }

    #[test]
    fn adjacent_segments_are_rejected() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point()},
            {"type": "Segment"},
            {"type": "Segment"},
            {"type": "Station", "geometry": point()}
        ]));
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        assert_eq!(err.as_field_error().unwrap().field, "sequence");
    }

    #[test]
    fn foreign_sequence_elements_warn_and_are_skipped() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point()},
            {"type": "Waypoint"},
            {"type": "Segment"},
            {"type": "Station", "geometry": point()}
        ]));
        let doc = build(raw, Some(schema()), &LoadOptions::default()).unwrap();
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].kind, DiagnosticKind::SequenceShape);
    }

    #[test]
    fn unknown_fields_warn_unless_suppressed() {
        let raw = plan(json!([{"type": "Station", "geometry": point(), "colour": "red"}]));
        let doc = build(raw.clone(), Some(schema()), &LoadOptions::default()).unwrap();
        assert_eq!(doc.diagnostics.len(), 1);
        assert_eq!(doc.diagnostics[0].kind, DiagnosticKind::UnknownField);

        let quiet = LoadOptions::new().warn_unknown_fields(false);
        let doc = build(raw, Some(schema()), &quiet).unwrap();
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn duplicate_station_ids_are_rejected() {
        let raw = plan(json!([
            {"type": "Station", "id": "A", "geometry": point()},
            {"type": "Segment"},
            {"type": "Station", "id": "A", "geometry": point()}
        ]));
        let err = build(raw, Some(schema()), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, XpjsonError::DuplicateId { ref id, .. } if id == "A"));
    }

    #[test]
    fn fill_defaults_writes_param_and_field_defaults() {
        let raw = plan(json!([
            {"type": "Station", "geometry": point(), "sequence": [{"type": "Sample"}]}
        ]));
        let doc = build(raw, Some(schema()), &LoadOptions::new().fill_defaults(true)).unwrap();
        let station = doc.root.nodes("sequence").next().unwrap();
        assert_eq!(station.raw("dwell").unwrap().to_value(), json!(0));
        assert_eq!(station.raw("isDirectional").unwrap().to_value(), json!(false));
        let cmd = station.nodes("sequence").next().unwrap();
        assert_eq!(cmd.raw("duration").unwrap().to_value(), json!(60));
    }

    #[test]
    fn param_spec_default_must_satisfy_spec() {
        let raw = json!({
            "type": "PlanSchema",
            "xpjson": "0.2",
            "paramSpecs": [
                {"type": "ParamSpec", "id": "speed", "valueType": "number", "maximum": 2, "default": 5}
            ]
        });
        let err = build(raw, None, &LoadOptions::default()).unwrap_err();
        let field = err.as_field_error().unwrap();
        assert_eq!(field.field, "default");
        assert_eq!(field.node_id.as_deref(), Some("speed"));
    }

    #[test]
    fn schema_document_is_self_describing() {
        let doc = build(
            json!({
                "type": "PlanSchema",
                "xpjson": "0.2",
                "commandSpecs": [{"type": "CommandSpec", "id": "Drive", "params": []}]
            }),
            None,
            &LoadOptions::default(),
        )
        .unwrap();
        let schema = doc.schema.unwrap();
        assert!(schema.command_spec("Drive").is_some());
        assert!(schema.command_spec("Command").is_none());
    }
}
