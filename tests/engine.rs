use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;

use xpjson::walk::{MapSummary, StatsCollector, fill_ids};
use xpjson::{
    Document, LoadOptions, NodeKind, PlanSchema, TypedNode, XpjsonError, build, dump_document_to_path,
    dump_document_to_string, load_document_path, load_document_str, load_schema_path, load_schema_str,
};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn schema() -> Arc<PlanSchema> {
    load_schema_path(fixture("schema.json"), &LoadOptions::default()).unwrap()
}

fn plan(opts: &LoadOptions) -> Document {
    load_document_path(fixture("plan.json"), Some(schema()), opts).unwrap()
}

fn element_ids(node: &TypedNode) -> Vec<String> {
    node.nodes("sequence")
        .map(|n| n.id().unwrap_or("-").to_string())
        .collect()
}

#[test]
fn schema_inheritance_is_resolved() {
    let schema = schema();
    assert_eq!(schema.id.as_deref(), Some("rover-schema"));
    assert!(schema.command_spec("Timed").is_none());
    assert!(schema.command_spec("Command").is_none());

    let sample = schema.command_spec("Sample").unwrap();
    let params: Vec<&str> = sample.params.keys().map(String::as_str).collect();
    assert_eq!(params, vec!["duration", "depth", "tool"]);
    assert_eq!(sample.params["duration"].default, Some(json!(60)));
    assert_eq!(sample.params["duration"].unit.as_deref(), Some("seconds"));
    assert_eq!(sample.color.as_deref(), Some("#33AA77"));

    let pano = schema.command_spec("Panorama").unwrap();
    let duration = &pano.params["duration"];
    assert_eq!(duration.default, Some(json!(120)));
    assert_eq!(duration.maximum, Some(600.0));
    assert_eq!(duration.minimum, Some(0.0));

    assert_eq!(schema.station_params["dwell"].maximum, Some(600.0));
}

#[test]
fn missing_parent_is_fatal() {
    let err = load_schema_str(
        r#"{"type": "PlanSchema", "xpjson": "0.2",
            "paramSpecs": [{"type": "ParamSpec", "id": "a", "parent": "nope"}]}"#,
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, XpjsonError::UnknownParent { ref parent, .. } if parent == "nope"));
}

#[test]
fn parent_cycle_is_reported() {
    let err = load_schema_str(
        r#"{"type": "PlanSchema", "xpjson": "0.2",
            "commandSpecs": [
                {"type": "CommandSpec", "id": "A", "parent": "B"},
                {"type": "CommandSpec", "id": "B", "parent": "A"}
            ]}"#,
        &LoadOptions::default(),
    )
    .unwrap_err();
    match err {
        XpjsonError::InheritanceCycle { ids } => assert_eq!(ids, vec!["A", "B"]),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn plan_loads_cleanly() {
    let doc = plan(&LoadOptions::default());
    assert_eq!(doc.kind(), NodeKind::Plan);
    assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
    let kinds: Vec<NodeKind> = doc.root.nodes("sequence").map(TypedNode::kind).collect();
    assert_eq!(kinds, vec![NodeKind::Station, NodeKind::Segment, NodeKind::Station]);
}

#[test]
fn plan_without_schema_is_rejected() {
    let err = load_document_path(fixture("plan.json"), None, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, XpjsonError::SchemaRequired { .. }));
}

#[test]
fn serialize_then_build_round_trips() {
    let doc = plan(&LoadOptions::default());
    let text = dump_document_to_string(&doc).unwrap();
    let again = load_document_str(&text, Some(schema()), &LoadOptions::default()).unwrap();
    assert_eq!(again.to_value(), doc.to_value());
    assert_eq!(dump_document_to_string(&again).unwrap(), text);
}

#[test]
fn default_filling_only_adds_keys() {
    let plain = plan(&LoadOptions::default()).to_value();
    let filled = plan(&LoadOptions::new().fill_defaults(true)).to_value();

    fn assert_superset(small: &Value, big: &Value, path: &str) {
        match (small, big) {
            (Value::Object(s), Value::Object(b)) => {
                for (k, v) in s {
                    let child = b.get(k).unwrap_or_else(|| panic!("{path}.{k} was dropped"));
                    assert_superset(v, child, &format!("{path}.{k}"));
                }
            }
            (Value::Array(s), Value::Array(b)) => {
                assert_eq!(s.len(), b.len(), "{path}");
                for (i, (sv, bv)) in s.iter().zip(b).enumerate() {
                    assert_superset(sv, bv, &format!("{path}[{i}]"));
                }
            }
            _ => assert_eq!(small, big, "{path}"),
        }
    }
    assert_superset(&plain, &filled, "plan");

    let sample = &filled["sequence"][0]["sequence"][0];
    assert_eq!(sample["duration"], json!(60));
    assert_eq!(sample["depth"], json!(0.1));
    assert_eq!(filled["sequence"][0]["dwell"], json!(0));
    assert_eq!(filled["sequence"][0]["isDirectional"], json!(false));
    // present values are never replaced
    assert_eq!(filled["sequence"][1]["speed"], json!(0.25));

    // filling a filled document changes nothing
    let refilled = build(filled.clone(), Some(schema()), &LoadOptions::new().fill_defaults(true)).unwrap();
    assert_eq!(refilled.to_value(), filled);
}

#[test]
fn simplified_file_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("simplified.json");
    let doc = plan(&LoadOptions::new().fill_defaults(true));
    dump_document_to_path(&doc, &out).unwrap();

    let reloaded = load_document_path(&out, Some(schema()), &LoadOptions::default()).unwrap();
    assert_eq!(reloaded.to_value(), doc.to_value());
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("{\n    \""));
    assert!(text.ends_with("}\n"));
}

#[test]
fn ids_are_filled_from_schema_formats() {
    let doc = plan(&LoadOptions::default());
    let filled = fill_ids(&doc, false).unwrap();

    assert_eq!(filled.root.id(), Some("HI007_A"));
    assert_eq!(
        element_ids(&filled.root),
        vec!["HI007_A_STATION_0", "HI007_A_SEGMENT_0", "HI007_A_STATION_1"]
    );
    let mut seq = filled.root.nodes("sequence");
    let first = seq.next().unwrap();
    assert_eq!(element_ids(first), vec!["HI007_A_STATION_0_0_SMP", "HI007_A_STATION_0_1_PAN"]);
    let segment = seq.next().unwrap();
    assert_eq!(element_ids(segment), vec!["HI007_A_SEGMENT_0_0_PAN"]);

    // the filled plan still validates
    let text = dump_document_to_string(&filled).unwrap();
    load_document_str(&text, Some(schema()), &LoadOptions::default()).unwrap();
}

#[test]
fn stats_follow_the_site_projection() {
    let doc = plan(&LoadOptions::default());
    let stats = StatsCollector::collect(&doc.root, &schema()).unwrap();
    assert_eq!(stats.stations, 2);
    assert_eq!(stats.segments, 1);
    assert_eq!(stats.commands, 3);
    assert_eq!(stats.commands_by_type["Panorama"], 2);
    assert_eq!(stats.command_seconds, 210.0);
    assert!((stats.distance_meters - 110.73).abs() < 0.05, "{}", stats.distance_meters);
    assert!((stats.traverse_seconds - stats.distance_meters / 0.25).abs() < 1e-9);
}

#[test]
fn summary_brackets_segments_with_station_ids() {
    let doc = fill_ids(&plan(&LoadOptions::default()), false).unwrap();
    let summary = MapSummary::collect(&doc.root, doc.schema.as_deref().unwrap()).unwrap();
    let segment = &summary["segments"][0];
    assert_eq!(segment["from"], json!("HI007_A_STATION_0"));
    assert_eq!(segment["to"], json!("HI007_A_STATION_1"));
    assert_eq!(
        segment["coordinates"],
        json!([[-155.2, 19.4], [-155.2, 19.401]])
    );
    assert!(summary["stations"][0]["local"].is_array());
}

#[test]
fn minimal_schema_station_ids() {
    let schema = load_schema_str(
        r#"{"type": "PlanSchema", "xpjson": "0.2",
            "stationIdFormat": "{plan.id}_STATION_{stationIndex}",
            "commandSpecs": [{"type": "CommandSpec", "id": "Sample", "params": []}]}"#,
        &LoadOptions::default(),
    )
    .unwrap();
    let point = json!({"type": "Point", "coordinates": [0.0, 0.0]});
    let doc = build(
        json!({
            "type": "Plan", "xpjson": "0.2", "id": "demo",
            "sequence": [
                {"type": "Station", "geometry": point},
                {"type": "Segment"},
                {"type": "Station", "geometry": point}
            ]
        }),
        Some(schema),
        &LoadOptions::default(),
    )
    .unwrap();

    let filled = fill_ids(&doc, false).unwrap();
    assert_eq!(element_ids(&filled.root), vec!["demo_STATION_0", "-", "demo_STATION_1"]);
}
