//! Fill element ids from the schema's id formats.
//!
//! Format context keys: `plan`, `station`, `segment`, `command`, `parent`,
//! `stationIndex`, `commandIndex`. `plan` carries the plan's final id, and
//! `parent` the holding element's final id, so command ids can be built
//! from them.

use super::{FromNode, PlanTransform, WalkContext, transform};
use crate::error::{Result, XpjsonError};
use crate::format::format_id;
use crate::node::{Document, Element, TypedNode};
use crate::types::NodeKind;

use serde_json::{Map, Value, json};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct IdFiller {
    overwrite: bool,
    plan: Value,
    filled: usize,
}

impl IdFiller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renumber ids that are already present.
    pub fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }

    /// Number of ids written by the last run.
    pub fn filled(&self) -> usize {
        self.filled
    }

    fn wants_id(&self, node: &TypedNode) -> bool {
        self.overwrite || node.id().is_none()
    }

    /// The id a station or segment ends up with.
    fn element_id(&self, node: &TypedNode, ctx: &WalkContext<'_>) -> Result<Option<String>> {
        if !self.wants_id(node) {
            return Ok(node.id().map(str::to_string));
        }
        match ctx.schema.id_format(node.kind()) {
            Some(format) => format_id(format, &self.element_context(node, ctx)).map(Some),
            None => Ok(node.id().map(str::to_string)),
        }
    }

    fn element_context(&self, node: &TypedNode, ctx: &WalkContext<'_>) -> Value {
        let mut map = Map::new();
        map.insert("plan".to_string(), self.plan.clone());
        map.insert(role(node).to_string(), shallow(node));
        map.insert("stationIndex".to_string(), json!(ctx.station_index));
        Value::Object(map)
    }

    fn assign(&mut self, mut node: TypedNode, id: Option<String>) -> TypedNode {
        if let Some(id) = id {
            if node.id() != Some(id.as_str()) {
                self.filled += 1;
                node.set("id", Element::Scalar(Value::String(id)));
            }
        }
        node
    }
}

impl PlanTransform for IdFiller {
    type Output = TypedNode;

    fn init(&mut self, plan: &TypedNode, ctx: &WalkContext<'_>) -> Result<()> {
        self.filled = 0;
        self.plan = shallow(plan);
        if self.wants_id(plan) {
            if let Some(format) = ctx.schema.id_format(NodeKind::Plan) {
                let id = format_id(format, &json!({ "plan": self.plan }))?;
                if let Value::Object(map) = &mut self.plan {
                    map.insert("id".to_string(), Value::String(id));
                }
            }
        }
        Ok(())
    }

    fn on_command(&mut self, cmd: &TypedNode, ctx: &WalkContext<'_>) -> Result<TypedNode> {
        let out = TypedNode::from_node(cmd, Vec::new());
        if !self.wants_id(cmd) {
            return Ok(out);
        }
        let (Some(format), Some(parent)) = (ctx.schema.id_format(NodeKind::Command), ctx.parent)
        else {
            return Ok(out);
        };

        let mut parent_value = shallow(parent);
        if let (Some(id), Value::Object(map)) = (self.element_id(parent, ctx)?, &mut parent_value) {
            map.insert("id".to_string(), Value::String(id));
        }
        let mut map = Map::new();
        map.insert("plan".to_string(), self.plan.clone());
        map.insert(role(parent).to_string(), parent_value.clone());
        map.insert("parent".to_string(), parent_value);
        map.insert("command".to_string(), shallow(cmd));
        map.insert("stationIndex".to_string(), json!(ctx.station_index));
        map.insert("commandIndex".to_string(), json!(ctx.command_index));

        let id = format_id(format, &Value::Object(map))?;
        Ok(self.assign(out, Some(id)))
    }

    fn on_station(
        &mut self,
        station: &TypedNode,
        children: Vec<TypedNode>,
        ctx: &WalkContext<'_>,
    ) -> Result<TypedNode> {
        let id = self.element_id(station, ctx)?;
        Ok(self.assign(TypedNode::from_node(station, children), id))
    }

    fn on_segment(
        &mut self,
        segment: &TypedNode,
        children: Vec<TypedNode>,
        ctx: &WalkContext<'_>,
    ) -> Result<TypedNode> {
        let id = self.element_id(segment, ctx)?;
        Ok(self.assign(TypedNode::from_node(segment, children), id))
    }

    fn on_plan(
        &mut self,
        plan: &TypedNode,
        children: Vec<TypedNode>,
        _ctx: &WalkContext<'_>,
    ) -> Result<TypedNode> {
        let id = self.plan.get("id").and_then(Value::as_str).map(str::to_string);
        let out = self.assign(TypedNode::from_node(plan, children), id);
        debug!(plan = out.id().unwrap_or(""), filled = self.filled, "filled ids");
        Ok(out)
    }
}

/// Fill ids on a Plan document, returning a new document.
pub fn fill_ids(doc: &Document, overwrite: bool) -> Result<Document> {
    let schema = doc.schema.clone().ok_or_else(|| XpjsonError::SchemaRequired {
        doc_type: doc.kind().name().to_string(),
    })?;
    let mut filler = IdFiller::new().overwrite(overwrite);
    let root = transform(&doc.root, &schema, &mut filler)?;
    Ok(Document {
        root,
        schema: Some(schema),
        diagnostics: doc.diagnostics.clone(),
    })
}

fn role(node: &TypedNode) -> &'static str {
    match node.kind() {
        NodeKind::Segment => "segment",
        _ => "station",
    }
}

/// The node's fields without its `sequence`.
fn shallow(node: &TypedNode) -> Value {
    let mut value = node.to_value();
    if let Value::Object(map) = &mut value {
        map.remove("sequence");
    }
    value
}
