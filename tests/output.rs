use std::collections::BTreeMap;

use geo_types::{Geometry, Point};
use map_engine::distill::{DistillReport, ZoomExtent};
use map_engine::output::{
    check_lines, check_ndjson_lines, distill_lines, distill_ndjson_lines, summarize_tile,
    tile_summary_lines,
};
use map_engine::registry::ZoomSettings;
use map_engine::tiles::{EXTENT, LayerFeatures, PropertyValue, TileCoord, TileFeature, encode_tile};

fn coord() -> TileCoord {
    let zoom = ZoomSettings {
        min_zoom: 0,
        max_zoom: 22,
        max_distilled_zoom: 0,
        bands: vec![],
    };
    TileCoord::new(9, 273, 168, &zoom).expect("coord")
}

#[test]
fn summarizes_encoded_tile() {
    let mut wind = LayerFeatures::new("wind");
    for id in 1..=3u64 {
        wind.features.push(TileFeature {
            id: Some(id),
            geometry: Geometry::Point(Point::new(id as f32 * 10.0, 5.0)),
            properties: vec![
                ("name".to_string(), Some(PropertyValue::Text(format!("t{id}")))),
                (
                    "hub_height".to_string(),
                    (id == 2).then_some(PropertyValue::Double(120.0)),
                ),
            ],
        });
    }
    let bytes = encode_tile(&[wind], EXTENT).expect("encode");
    let summary = summarize_tile(&coord(), 200, &bytes).expect("summary");
    assert_eq!(summary.total_features, 3);
    assert_eq!(summary.bytes, bytes.len());
    assert_eq!(summary.layers[0].name, "wind");
    assert_eq!(summary.layers[0].property_key_count, 2);

    let lines = tile_summary_lines(&summary);
    assert_eq!(
        lines[0],
        format!(
            "tile_summary: z=9 x=273 y=168 status=200 bytes={} total_features=3",
            bytes.len()
        )
    );
    assert_eq!(lines[1], "layer: wind features=3 property_keys=2");
}

#[test]
fn summarizes_empty_tile_without_decoding() {
    let summary = summarize_tile(&coord(), 204, &[]).expect("summary");
    assert_eq!(summary.total_features, 0);
    assert!(summary.layers.is_empty());
    assert_eq!(tile_summary_lines(&summary).len(), 1);
}

#[test]
fn distill_report_lines() {
    let report = DistillReport {
        group: "static".to_string(),
        total: 13,
        written: 5,
        skipped: 7,
        failed: 1,
        bytes: 2048,
        by_zoom: BTreeMap::from([(8, 4), (9, 9)]),
    };
    assert_eq!(
        distill_lines(&report),
        vec![
            "distill: group=static tiles=13 written=5 skipped=7 failed=1 bytes=2048",
            "z=8: tiles=4",
            "z=9: tiles=9",
        ]
    );
    let json = distill_ndjson_lines(std::slice::from_ref(&report)).expect("ndjson");
    let value: serde_json::Value = serde_json::from_str(&json[0]).expect("json");
    assert_eq!(value["type"], "distill");
    assert_eq!(value["report"]["by_zoom"]["9"], 9);
}

#[test]
fn check_report_lines() {
    let extents = vec![ZoomExtent {
        z: 8,
        min_x: 136,
        max_x: 137,
        min_y: 84,
        max_y: 85,
        count: 4,
    }];
    assert_eq!(
        check_lines("municipality", &extents),
        vec!["check: group=municipality", "z=8: x=136..=137 y=84..=85 tiles=4"]
    );
    let json = check_ndjson_lines("municipality", &extents).expect("ndjson");
    let value: serde_json::Value = serde_json::from_str(&json[0]).expect("json");
    assert_eq!(value["group"], "municipality");
    assert_eq!(value["extent"]["count"], 4);
}
