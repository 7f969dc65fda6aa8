//! Plan statistics: element counts, distance and time.

use super::{PlanTransform, WalkContext, transform};
use crate::crs::{Crs, haversine_m, planar_m};
use crate::error::Result;
use crate::node::{Element, TypedNode};
use crate::schema::PlanSchema;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStats {
    pub plan_id: Option<String>,
    pub stations: usize,
    pub segments: usize,
    pub commands: usize,
    pub commands_by_type: BTreeMap<String, usize>,
    pub distance_meters: f64,
    /// Sum of command `duration` parameters.
    pub command_seconds: f64,
    /// Distance over speed, for segments with a known speed.
    pub traverse_seconds: f64,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Default)]
pub struct StatsCollector {
    crs: Option<Crs>,
    stats: PlanStats,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(plan: &TypedNode, schema: &PlanSchema) -> Result<PlanStats> {
        let mut collector = Self::new();
        transform(plan, schema, &mut collector)?;
        Ok(collector.stats)
    }
}

impl PlanTransform for StatsCollector {
    type Output = Value;

    fn init(&mut self, plan: &TypedNode, _ctx: &WalkContext<'_>) -> Result<()> {
        self.crs = site_crs(plan)?;
        self.stats = PlanStats {
            plan_id: plan.id().map(str::to_string),
            ..PlanStats::default()
        };
        Ok(())
    }

    fn on_command(&mut self, cmd: &TypedNode, _ctx: &WalkContext<'_>) -> Result<Value> {
        self.stats.commands += 1;
        *self
            .stats
            .commands_by_type
            .entry(cmd.type_name().to_string())
            .or_default() += 1;
        self.stats.command_seconds += command_seconds(cmd);
        Ok(Value::Null)
    }

    fn on_station(&mut self, _s: &TypedNode, _c: Vec<Value>, _ctx: &WalkContext<'_>) -> Result<Value> {
        self.stats.stations += 1;
        Ok(Value::Null)
    }

    fn on_segment(
        &mut self,
        segment: &TypedNode,
        _children: Vec<Value>,
        ctx: &WalkContext<'_>,
    ) -> Result<Value> {
        self.stats.segments += 1;
        let meters = path_length(&segment_path(segment, ctx), self.crs.as_ref());
        self.stats.distance_meters += meters;
        self.stats.traverse_seconds += traverse_seconds(segment, meters);
        Ok(Value::Null)
    }

    fn on_plan(&mut self, _plan: &TypedNode, _c: Vec<Value>, _ctx: &WalkContext<'_>) -> Result<Value> {
        self.stats.elapsed_seconds = self.stats.command_seconds + self.stats.traverse_seconds;
        Ok(serde_json::to_value(&self.stats)?)
    }
}

/// The projected CRS of the plan's site, if it has one.
pub(crate) fn site_crs(plan: &TypedNode) -> Result<Option<Crs>> {
    let Some(crs) = plan.raw("site").and_then(|site| site.field("crs").map(|c| c.to_value())) else {
        return Ok(None);
    };
    let crs = Crs::from_value(&crs)?;
    Ok(crs.is_projected().then_some(crs))
}

/// `[lon, lat]` points from the leaving station through the segment's own
/// geometry to the arriving station.
pub(crate) fn segment_path(segment: &TypedNode, ctx: &WalkContext<'_>) -> Vec<[f64; 2]> {
    let mut path = Vec::new();
    path.extend(ctx.prev_station.and_then(TypedNode::point));
    if let Some(coords) = segment
        .raw("geometry")
        .and_then(|g| g.field("coordinates").map(|c| c.into_owned()))
    {
        for item in coords.as_list().unwrap_or(&[]) {
            if let Some(point) = point_of(item) {
                if path.last() != Some(&point) {
                    path.push(point);
                }
            }
        }
    }
    if let Some(end) = ctx.next_station.and_then(TypedNode::point) {
        if path.last() != Some(&end) {
            path.push(end);
        }
    }
    path
}

fn point_of(item: &Element) -> Option<[f64; 2]> {
    let xy = item.as_list()?;
    Some([xy.first()?.as_f64()?, xy.get(1)?.as_f64()?])
}

/// Haversine in lon/lat, planar in the site's projected CRS.
pub(crate) fn path_length(path: &[[f64; 2]], crs: Option<&Crs>) -> f64 {
    path.windows(2)
        .map(|w| match crs {
            Some(crs) => planar_m(crs.to_local(w[0][0], w[0][1]), crs.to_local(w[1][0], w[1][1])),
            None => haversine_m(w[0], w[1]),
        })
        .sum()
}

pub(crate) fn command_seconds(cmd: &TypedNode) -> f64 {
    cmd.get_f64("duration").filter(|d| *d > 0.0).unwrap_or(0.0)
}

pub(crate) fn traverse_seconds(segment: &TypedNode, meters: f64) -> f64 {
    match segment.get_f64("speed") {
        Some(speed) if speed > 0.0 => meters / speed,
        _ => 0.0,
    }
}
