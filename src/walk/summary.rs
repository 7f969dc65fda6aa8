//! Structured map data: station points and segment lines.
//!
//! Coordinates are `[lon, lat]`. When the plan's site has a projected CRS
//! each feature also carries `local` coordinates in that plane.

use super::stats::{segment_path, site_crs};
use super::{PlanTransform, WalkContext, transform};
use crate::crs::Crs;
use crate::error::Result;
use crate::node::TypedNode;
use crate::schema::PlanSchema;

use serde_json::{Map, Value, json};

#[derive(Debug, Default)]
pub struct MapSummary {
    crs: Option<Crs>,
    stations: Vec<Value>,
    segments: Vec<Value>,
}

impl MapSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(plan: &TypedNode, schema: &PlanSchema) -> Result<Value> {
        transform(plan, schema, &mut Self::new())
    }

    fn local(&self, points: &[[f64; 2]]) -> Option<Value> {
        let crs = self.crs.as_ref()?;
        let local: Vec<[f64; 2]> = points.iter().map(|p| crs.to_local(p[0], p[1])).collect();
        Some(json!(local))
    }
}

impl PlanTransform for MapSummary {
    type Output = Value;

    fn init(&mut self, plan: &TypedNode, _ctx: &WalkContext<'_>) -> Result<()> {
        self.crs = site_crs(plan)?;
        self.stations.clear();
        self.segments.clear();
        Ok(())
    }

    fn on_command(&mut self, _cmd: &TypedNode, _ctx: &WalkContext<'_>) -> Result<Value> {
        Ok(Value::Null)
    }

    fn on_station(
        &mut self,
        station: &TypedNode,
        children: Vec<Value>,
        ctx: &WalkContext<'_>,
    ) -> Result<Value> {
        let mut feature = Map::new();
        feature.insert("id".to_string(), json!(station.id()));
        feature.insert("name".to_string(), json!(station.get_string("name")));
        feature.insert("stationIndex".to_string(), json!(ctx.station_index));
        feature.insert("commands".to_string(), json!(children.len()));
        if let Some(point) = station.point() {
            feature.insert("coordinates".to_string(), json!(point));
            if let Some(local) = self.local(&[point]).and_then(|v| v.get(0).cloned()) {
                feature.insert("local".to_string(), local);
            }
        }
        self.stations.push(Value::Object(feature));
        Ok(Value::Null)
    }

    fn on_segment(
        &mut self,
        segment: &TypedNode,
        _children: Vec<Value>,
        ctx: &WalkContext<'_>,
    ) -> Result<Value> {
        let path = segment_path(segment, ctx);
        let mut feature = Map::new();
        feature.insert("id".to_string(), json!(segment.id()));
        feature.insert("stationIndex".to_string(), json!(ctx.station_index));
        feature.insert("from".to_string(), json!(ctx.prev_station.and_then(TypedNode::id)));
        feature.insert("to".to_string(), json!(ctx.next_station.and_then(TypedNode::id)));
        if let Some(local) = self.local(&path) {
            feature.insert("local".to_string(), local);
        }
        feature.insert("coordinates".to_string(), json!(path));
        self.segments.push(Value::Object(feature));
        Ok(Value::Null)
    }

    fn on_plan(&mut self, plan: &TypedNode, _c: Vec<Value>, _ctx: &WalkContext<'_>) -> Result<Value> {
        Ok(json!({
            "planId": plan.id(),
            "name": plan.get_string("name"),
            "stations": std::mem::take(&mut self.stations),
            "segments": std::mem::take(&mut self.segments),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build;
    use crate::config::LoadOptions;
    use pretty_assertions::assert_eq;

    #[test]
    fn stations_and_segment_lines() {
        let schema = build(
            json!({"type": "PlanSchema", "xpjson": "0.2"}),
            None,
            &LoadOptions::default(),
        )
        .unwrap()
        .schema
        .unwrap();
        let doc = build(
            json!({
                "type": "Plan", "xpjson": "0.2", "id": "P", "name": "Traverse",
                "sequence": [
                    {"type": "Station", "id": "A", "name": "Start",
                     "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
                    {"type": "Segment", "id": "AB",
                     "geometry": {"type": "LineString", "coordinates": [[1.5, 2.5]]}},
                    {"type": "Station", "id": "B",
                     "geometry": {"type": "Point", "coordinates": [2.0, 3.0]}}
                ]
            }),
            Some(schema.clone()),
            &LoadOptions::default(),
        )
        .unwrap();

        let summary = MapSummary::collect(&doc.root, &schema).unwrap();
        assert_eq!(
            summary,
            json!({
                "planId": "P",
                "name": "Traverse",
                "stations": [
                    {"id": "A", "name": "Start", "stationIndex": 0, "commands": 0, "coordinates": [1.0, 2.0]},
                    {"id": "B", "name": null, "stationIndex": 1, "commands": 0, "coordinates": [2.0, 3.0]}
                ],
                "segments": [
                    {"id": "AB", "stationIndex": 0, "from": "A", "to": "B",
                     "coordinates": [[1.0, 2.0], [1.5, 2.5], [2.0, 3.0]]}
                ]
            })
        );
    }
}
