//! Ordered timeline of plan activity with running elapsed time.
//!
//! A station's entry spans its commands. A segment's entry spans its
//! commands plus the traverse time; commands on a segment start with it.

use super::stats::{command_seconds, path_length, segment_path, site_crs, traverse_seconds};
use super::{PlanTransform, WalkContext, transform};
use crate::crs::Crs;
use crate::error::Result;
use crate::node::TypedNode;
use crate::schema::PlanSchema;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: Option<String>,
    /// `station`, `segment` or `command`.
    pub kind: &'static str,
    #[serde(rename = "type")]
    pub type_name: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Default)]
pub struct TimelineBuilder {
    crs: Option<Crs>,
    clock: f64,
    entries: Vec<TimelineEntry>,
    /// Commands of the element being visited, in order.
    pending: Vec<TimelineEntry>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(plan: &TypedNode, schema: &PlanSchema) -> Result<Vec<TimelineEntry>> {
        let mut builder = Self::new();
        transform(plan, schema, &mut builder)?;
        Ok(builder.entries)
    }

    /// Close the current element: push its entry, then its commands.
    fn close(&mut self, node: &TypedNode, kind: &'static str, start: f64) {
        self.entries.push(TimelineEntry {
            id: node.id().map(str::to_string),
            kind,
            type_name: node.type_name().to_string(),
            start,
            duration: self.clock - start,
        });
        self.entries.append(&mut self.pending);
    }

    fn element_start(&self) -> f64 {
        self.pending.first().map_or(self.clock, |e| e.start)
    }
}

impl PlanTransform for TimelineBuilder {
    type Output = Value;

    fn init(&mut self, plan: &TypedNode, _ctx: &WalkContext<'_>) -> Result<()> {
        self.crs = site_crs(plan)?;
        self.clock = 0.0;
        self.entries.clear();
        self.pending.clear();
        Ok(())
    }

    fn on_command(&mut self, cmd: &TypedNode, _ctx: &WalkContext<'_>) -> Result<Value> {
        let duration = command_seconds(cmd);
        self.pending.push(TimelineEntry {
            id: cmd.id().map(str::to_string),
            kind: "command",
            type_name: cmd.type_name().to_string(),
            start: self.clock,
            duration,
        });
        self.clock += duration;
        Ok(Value::Null)
    }

    fn on_station(&mut self, station: &TypedNode, _c: Vec<Value>, _ctx: &WalkContext<'_>) -> Result<Value> {
        let start = self.element_start();
        self.close(station, "station", start);
        Ok(Value::Null)
    }

    fn on_segment(
        &mut self,
        segment: &TypedNode,
        _children: Vec<Value>,
        ctx: &WalkContext<'_>,
    ) -> Result<Value> {
        let start = self.element_start();
        let meters = path_length(&segment_path(segment, ctx), self.crs.as_ref());
        self.clock += traverse_seconds(segment, meters);
        self.close(segment, "segment", start);
        Ok(Value::Null)
    }

    fn on_plan(&mut self, _plan: &TypedNode, _c: Vec<Value>, _ctx: &WalkContext<'_>) -> Result<Value> {
        Ok(serde_json::to_value(&self.entries)?)
    }
}
