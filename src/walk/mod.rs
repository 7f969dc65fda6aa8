//! Bottom-up transforms over a Plan's station/segment sequence.
//!
//! A [`PlanTransform`] sees every command first, then the station or segment
//! that holds it, then the plan. Each hook receives the results of its
//! children and a [`WalkContext`] describing where it is. The default hooks
//! rebuild the input tree, so an implementation only overrides what it needs.

pub mod ids;
pub mod stats;
pub mod summary;
pub mod timeline;

pub use ids::{IdFiller, fill_ids};
pub use stats::{PlanStats, StatsCollector};
pub use summary::MapSummary;
pub use timeline::{TimelineBuilder, TimelineEntry};

use crate::diagnostics::Diagnostic;
use crate::error::{Result, XpjsonError};
use crate::node::{Element, TypedNode};
use crate::schema::PlanSchema;
use crate::types::NodeKind;

use serde_json::Value;
use tracing::debug;

/// Rebuild an output value from a node and its transformed children.
pub trait FromNode: Sized {
    fn from_node(node: &TypedNode, children: Vec<Self>) -> Self;
}

impl FromNode for Value {
    fn from_node(node: &TypedNode, children: Vec<Self>) -> Self {
        let mut value = node.to_value();
        if writes_sequence(node, children.len()) {
            if let Value::Object(map) = &mut value {
                map.insert("sequence".to_string(), Value::Array(children));
            }
        }
        value
    }
}

impl FromNode for TypedNode {
    fn from_node(node: &TypedNode, children: Vec<Self>) -> Self {
        let mut out = node.clone();
        if writes_sequence(node, children.len()) {
            let children = children.into_iter().map(Element::from).collect();
            out.set("sequence", Element::List(children));
        }
        out
    }
}

/// Plans and path elements get their `sequence` rebuilt, unless it was
/// absent and stays empty.
fn writes_sequence(node: &TypedNode, children: usize) -> bool {
    let holder = node.kind() == NodeKind::Plan || node.kind().is_path_element();
    holder && (children > 0 || node.raw("sequence").is_some())
}

/// Position of the element being visited.
#[derive(Debug, Clone)]
pub struct WalkContext<'a> {
    pub plan: &'a TypedNode,
    pub schema: &'a PlanSchema,
    /// Index in `plan.sequence`.
    pub index: Option<usize>,
    /// Stations visited before a station; for a segment, the index of the
    /// station it leaves from.
    pub station_index: Option<usize>,
    pub prev_station: Option<&'a TypedNode>,
    pub next_station: Option<&'a TypedNode>,
    /// The station or segment holding the current command.
    pub parent: Option<&'a TypedNode>,
    pub command_index: Option<usize>,
}

impl<'a> WalkContext<'a> {
    fn root(plan: &'a TypedNode, schema: &'a PlanSchema) -> Self {
        Self {
            plan,
            schema,
            index: None,
            station_index: None,
            prev_station: None,
            next_station: None,
            parent: None,
            command_index: None,
        }
    }
}

pub trait PlanTransform {
    type Output: FromNode;

    fn init(&mut self, _plan: &TypedNode, _ctx: &WalkContext<'_>) -> Result<()> {
        Ok(())
    }

    fn on_command(&mut self, cmd: &TypedNode, _ctx: &WalkContext<'_>) -> Result<Self::Output> {
        Ok(Self::Output::from_node(cmd, Vec::new()))
    }

    fn on_station(
        &mut self,
        station: &TypedNode,
        children: Vec<Self::Output>,
        _ctx: &WalkContext<'_>,
    ) -> Result<Self::Output> {
        Ok(Self::Output::from_node(station, children))
    }

    fn on_segment(
        &mut self,
        segment: &TypedNode,
        children: Vec<Self::Output>,
        _ctx: &WalkContext<'_>,
    ) -> Result<Self::Output> {
        Ok(Self::Output::from_node(segment, children))
    }

    fn on_plan(
        &mut self,
        plan: &TypedNode,
        children: Vec<Self::Output>,
        _ctx: &WalkContext<'_>,
    ) -> Result<Self::Output> {
        Ok(Self::Output::from_node(plan, children))
    }
}

/// Run `t` over `plan`, returning the plan-level output.
pub fn transform<T: PlanTransform>(
    plan: &TypedNode,
    schema: &PlanSchema,
    t: &mut T,
) -> Result<T::Output> {
    transform_with_diagnostics(plan, schema, t).map(|(output, _)| output)
}

/// Like [`transform`], also returning the warnings raised on the way.
pub fn transform_with_diagnostics<T: PlanTransform>(
    plan: &TypedNode,
    schema: &PlanSchema,
    t: &mut T,
) -> Result<(T::Output, Vec<Diagnostic>)> {
    if plan.kind() != NodeKind::Plan {
        return Err(XpjsonError::UnknownDocumentType(format!(
            "{} (expected Plan)",
            plan.type_name()
        )));
    }

    let root = WalkContext::root(plan, schema);
    t.init(plan, &root)
        .map_err(|e| XpjsonError::transform("plan", e))?;

    let mut diagnostics = Vec::new();
    let mut elements: Vec<(usize, &TypedNode)> = Vec::new();
    for (index, item) in plan.list("sequence").iter().enumerate() {
        match item.as_node() {
            Some(node) if node.kind().is_path_element() => elements.push((index, node)),
            _ => {
                let found = item
                    .field("type")
                    .and_then(|t| t.as_str().map(str::to_string))
                    .unwrap_or_else(|| "<untyped>".to_string());
                // Logged once when the plan was built.
                diagnostics.push(Diagnostic::sequence_shape(index, &found));
            }
        }
    }

    let is_station = |n: &TypedNode| n.kind() == NodeKind::Station;
    let mut children = Vec::with_capacity(elements.len());
    let mut stations_seen = 0usize;

    for (pos, &(index, node)) in elements.iter().enumerate() {
        let prev = elements[..pos].iter().rev().map(|(_, n)| *n).find(|n| is_station(*n));
        let next = elements[pos + 1..].iter().map(|(_, n)| *n).find(|n| is_station(*n));

        let station = is_station(node);
        let (station_index, prev_station, next_station) = if station {
            (Some(stations_seen), prev.or(Some(node)), next.or(Some(node)))
        } else {
            (stations_seen.checked_sub(1), prev, next)
        };
        let label = if station { "station" } else { "segment" };
        let location = match station_index {
            Some(s) => format!("{} {} (sequence index {})", label, s, index),
            None => format!("{} at sequence index {}", label, index),
        };

        let ctx = WalkContext {
            index: Some(index),
            station_index,
            prev_station,
            next_station,
            ..root.clone()
        };

        let mut commands = Vec::new();
        for (command_index, cmd) in node.nodes("sequence").enumerate() {
            let cmd_ctx = WalkContext {
                parent: Some(node),
                command_index: Some(command_index),
                ..ctx.clone()
            };
            let out = t.on_command(cmd, &cmd_ctx).map_err(|e| {
                XpjsonError::transform(format!("command {} of {}", command_index, location), e)
            })?;
            commands.push(out);
        }

        let out = if station {
            t.on_station(node, commands, &ctx)
        } else {
            t.on_segment(node, commands, &ctx)
        }
        .map_err(|e| XpjsonError::transform(location.as_str(), e))?;
        children.push(out);

        if station {
            stations_seen += 1;
        }
    }

    debug!(
        plan = plan.id().unwrap_or(""),
        stations = stations_seen,
        elements = elements.len(),
        "walked plan"
    );
    let output = t
        .on_plan(plan, children, &root)
        .map_err(|e| XpjsonError::transform("plan", e))?;
    Ok((output, diagnostics))
}
