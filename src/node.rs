//! Typed document tree.
//!
//! A document is a tree of [`Element`]s. JSON objects whose `type` names a
//! node kind become [`TypedNode`]s; everything else keeps its JSON shape.

use crate::diagnostics::Diagnostic;
use crate::schema::{ParamTable, PlanSchema};
use crate::types::{NodeKind, ValueType, registry};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;

/// The backing key/value map of a node or plain object.
pub type Fields = IndexMap<String, Element>;

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// String, number, boolean or null.
    Scalar(Value),
    List(Vec<Element>),
    /// An object with no node kind (geometry, CRS, ...).
    Object(Fields),
    Node(Box<TypedNode>),
}

impl Element {
    /// Structural conversion without node typing.
    pub fn from_plain(value: Value) -> Self {
        match value {
            Value::Array(items) => Element::List(items.into_iter().map(Element::from_plain).collect()),
            Value::Object(map) => Element::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Element::from_plain(v)))
                    .collect(),
            ),
            scalar => Element::Scalar(scalar),
        }
    }

    /// Unwrap back into plain JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Element::Scalar(v) => v.clone(),
            Element::List(items) => Value::Array(items.iter().map(Element::to_value).collect()),
            Element::Object(fields) => Value::Object(fields_to_map(fields)),
            Element::Node(node) => node.to_value(),
        }
    }

    pub fn as_node(&self) -> Option<&TypedNode> {
        match self {
            Element::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Element]> {
        match self {
            Element::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Element::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Element::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Element::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Element::Scalar(Value::Null))
    }

    /// Look up a key on a node or plain object.
    pub fn field(&self, key: &str) -> Option<Cow<'_, Element>> {
        match self {
            Element::Node(node) => node.get(key),
            Element::Object(fields) => fields.get(key).map(Cow::Borrowed),
            _ => None,
        }
    }

    /// The value-type predicate lifted to typed elements.
    pub fn matches(&self, vt: &ValueType) -> bool {
        match (self, vt) {
            (_, ValueType::Any) => true,
            (Element::List(items), ValueType::Array { len, item }) => {
                len.is_none_or(|n| items.len() == n) && items.iter().all(|e| e.matches(item))
            }
            (Element::Node(node), ValueType::Kind(name)) => {
                node.kind().is_a(name) || node.type_name() == name
            }
            (Element::Node(_), _) => false,
            _ => vt.matches(&self.to_value()),
        }
    }
}

impl From<TypedNode> for Element {
    fn from(node: TypedNode) -> Self {
        Element::Node(Box::new(node))
    }
}

pub(crate) fn fields_to_map(fields: &Fields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_value()))
        .collect()
}

/// Where a looked-up attribute value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Present in the node's backing map.
    Present,
    SchemaParamDefault,
    CallerDefault,
    FieldDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedNode {
    kind: NodeKind,
    type_name: String,
    fields: Fields,
    params: Option<Arc<ParamTable>>,
}

impl TypedNode {
    pub fn new(
        kind: NodeKind,
        type_name: impl Into<String>,
        fields: Fields,
        params: Option<Arc<ParamTable>>,
    ) -> Self {
        Self {
            kind,
            type_name: type_name.into(),
            fields,
            params,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The document's `type` string; for commands, the command spec id.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn params(&self) -> Option<&ParamTable> {
        self.params.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.raw("id").and_then(Element::as_str)
    }

    pub fn raw(&self, key: &str) -> Option<&Element> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Element) {
        self.fields.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: Element) -> Self {
        self.set(key, value);
        self
    }

    /// Attribute lookup: backing map, then schema parameter default, then
    /// `caller_default`, then the declared field default.
    pub fn lookup(
        &self,
        key: &str,
        caller_default: Option<&Value>,
    ) -> Option<(FieldSource, Cow<'_, Element>)> {
        if let Some(value) = self.fields.get(key) {
            return Some((FieldSource::Present, Cow::Borrowed(value)));
        }
        if let Some(default) = self
            .params
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(|spec| spec.default.as_ref())
        {
            return Some((
                FieldSource::SchemaParamDefault,
                Cow::Owned(Element::from_plain(default.clone())),
            ));
        }
        if let Some(default) = caller_default {
            return Some((
                FieldSource::CallerDefault,
                Cow::Owned(Element::from_plain(default.clone())),
            ));
        }
        registry()
            .field(self.kind, key)
            .and_then(|f| f.default.as_ref())
            .map(|default| {
                (
                    FieldSource::FieldDefault,
                    Cow::Owned(Element::from_plain(default.clone())),
                )
            })
    }

    pub fn get(&self, key: &str) -> Option<Cow<'_, Element>> {
        self.lookup(key, None).map(|(_, value)| value)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|e| e.as_f64())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|e| e.as_str().map(str::to_string))
    }

    /// Items of a list-valued field; empty when absent.
    pub fn list(&self, key: &str) -> &[Element] {
        self.fields
            .get(key)
            .and_then(Element::as_list)
            .unwrap_or(&[])
    }

    /// Typed nodes of a list-valued field, skipping plain items.
    pub fn nodes(&self, key: &str) -> impl Iterator<Item = &TypedNode> {
        self.list(key).iter().filter_map(Element::as_node)
    }

    /// `[lon, lat]` (or `[x, y]`) of a Point geometry.
    pub fn point(&self) -> Option<[f64; 2]> {
        let geometry = self.raw("geometry")?;
        let coords = geometry.field("coordinates")?;
        let items = coords.as_list()?;
        Some([items.first()?.as_f64()?, items.get(1)?.as_f64()?])
    }

    /// Write declared-field and schema-parameter defaults for absent keys.
    pub fn fill_defaults(&mut self) {
        for field in registry().fields(self.kind).values() {
            if let Some(default) = &field.default {
                if !self.fields.contains_key(field.name) {
                    self.fields
                        .insert(field.name.to_string(), Element::from_plain(default.clone()));
                }
            }
        }
        if let Some(params) = self.params.clone() {
            for (id, spec) in params.iter() {
                if let Some(default) = &spec.default {
                    if !self.fields.contains_key(id) {
                        self.fields
                            .insert(id.clone(), Element::from_plain(default.clone()));
                    }
                }
            }
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(fields_to_map(&self.fields))
    }
}

/// A built document: the typed root plus what was learned while building it.
#[derive(Debug, Clone)]
pub struct Document {
    pub root: TypedNode,
    /// The schema the document was validated against. For a PlanSchema
    /// document this is the document itself, resolved.
    pub schema: Option<Arc<PlanSchema>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub fn kind(&self) -> NodeKind {
        self.root.kind()
    }

    pub fn to_value(&self) -> Value {
        self.root.to_value()
    }
}
