use std::path::Path;
use std::sync::Arc;

use geo_types::{Geometry, LineString, Point, Polygon};
use mvt_reader::Reader;
use mvt_reader::feature::Value as TileValue;
use rusqlite::types::Value;

use map_engine::config::EngineConfig;
use map_engine::registry::Registry;
use map_engine::store::{NewFeature, SpatialStore};
use map_engine::tiles::{TileResponse, TileService};

fn registry() -> Arc<Registry> {
    Arc::new(Registry::from_config(&EngineConfig::builtin().expect("config")).expect("registry"))
}

fn square(west: f64, south: f64, east: f64, north: f64) -> Geometry<f64> {
    Geometry::Polygon(Polygon::new(
        LineString::from(vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ]),
        vec![],
    ))
}

fn wind(id: i64, lon: f64, lat: f64, voltage: i64) -> NewFeature {
    NewFeature {
        id: Some(id),
        geometry: Geometry::Point(Point::new(lon, lat)),
        values: vec![
            Value::Text(format!("turbine {id}")),
            Value::Integer(3),
            Value::Real(4.2),
            Value::Null,
            Value::Integer(0),
            Value::Integer(12),
            Value::Integer(voltage),
            Value::Integer(1),
        ],
    }
}

// Seeds a store whose features sit inside tile 9/273/168
// (lon 11.95..12.66, lat 52.05..52.48).
fn seed_store(path: &Path, registry: &Registry) {
    let mut store = SpatialStore::create(path).expect("create");
    store.ensure_schema(registry).expect("schema");

    let collection = |name: &str| registry.collection(name).expect("collection").clone();
    store
        .insert_features(
            &collection("wind"),
            &[wind(1, 12.3, 52.3, 20), wind(2, 12.4, 52.2, 110)],
        )
        .expect("wind");
    store
        .insert_features(
            &collection("municipality"),
            &[NewFeature {
                id: Some(10),
                geometry: square(12.1, 52.1, 12.5, 52.4),
                values: vec![Value::Text("Musterstadt".to_string()), Value::Real(120.5)],
            }],
        )
        .expect("municipality");
    store
        .insert_features(
            &collection("protected_area"),
            &[
                NewFeature {
                    id: Some(20),
                    geometry: square(12.0, 52.1, 12.2, 52.2),
                    values: vec![Value::Text("municipality".to_string())],
                },
                NewFeature {
                    id: Some(21),
                    geometry: square(12.3, 52.3, 12.4, 52.4),
                    values: vec![Value::Text("district".to_string())],
                },
            ],
        )
        .expect("protected_area");
}

fn service() -> (tempfile::TempDir, TileService) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("map.sqlite");
    let registry = registry();
    seed_store(&path, &registry);
    (dir, TileService::new(registry, path))
}

fn render(service: &TileService, group: &str, tile: (&str, &str, &str), filters: &[(&str, &str)]) -> TileResponse {
    let filters: Vec<(String, String)> = filters
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    service.render(group, tile.0, tile.1, tile.2, &filters)
}

fn layer_names(body: &[u8]) -> Vec<String> {
    let reader = Reader::new(body.to_vec()).expect("decode");
    reader.get_layer_names().expect("layer names")
}

#[test]
fn tile_with_features_answers_200() {
    let (_dir, service) = service();
    let response = render(&service, "wind", ("9", "273", "168"), &[]);
    assert_eq!(response.status, 200);
    assert!(!response.body.is_empty());

    let reader = Reader::new(response.body).expect("decode");
    let features = reader.get_features(0).expect("features");
    assert_eq!(features.len(), 2);
    // Rows come back ordered by id.
    assert_eq!(features[0].id, Some(1));
    let props = features[0].properties.as_ref().expect("properties");
    assert_eq!(props.get("lat"), Some(&TileValue::Double(52.3)));
    assert_eq!(props.get("lon"), Some(&TileValue::Double(12.3)));
    assert_eq!(props.get("name"), Some(&TileValue::String("turbine 1".to_string())));
    assert_eq!(props.get("setup_repowering"), Some(&TileValue::Bool(true)));
    assert!(!props.contains_key("hub_height"));
}

#[test]
fn tile_without_features_answers_204() {
    let (_dir, service) = service();
    let response = render(&service, "wind", ("9", "0", "0"), &[]);
    assert_eq!(response, TileResponse { status: 204, body: Vec::new() });
    assert!(response.is_empty());
}

#[test]
fn filters_narrow_the_result() {
    let (_dir, service) = service();
    let response = render(&service, "wind", ("9", "273", "168"), &[("setup_voltage", "110")]);
    assert_eq!(response.status, 200);
    let reader = Reader::new(response.body).expect("decode");
    let features = reader.get_features(0).expect("features");
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].id, Some(2));

    let response = render(
        &service,
        "wind",
        ("9", "273", "168"),
        &[("setup_voltage", "110"), ("setup_repowering", "False")],
    );
    assert_eq!(response.status, 204);

    let response = render(
        &service,
        "wind",
        ("9", "273", "168"),
        &[("setup_voltage", "20"), ("setup_voltage", "110")],
    );
    let reader = Reader::new(response.body).expect("decode");
    assert_eq!(reader.get_features(0).expect("features").len(), 2);
}

#[test]
fn invalid_requests_answer_400() {
    let (_dir, service) = service();
    for (group, tile, filters) in [
        ("nowhere", ("9", "273", "168"), vec![]),
        ("wind", ("9", "x", "168"), vec![]),
        ("wind", ("9", "-1", "168"), vec![]),
        ("wind", ("9", "512", "168"), vec![]),
        ("wind", ("5", "0", "0"), vec![]),
        ("wind", ("23", "0", "0"), vec![]),
        ("wind", ("9", "273", "168"), vec![("colour", "red")]),
        ("wind", ("9", "273", "168"), vec![("setup_voltage", "high")]),
        ("wind", ("9", "273", "168"), vec![("setup_repowering", "yes")]),
    ] {
        let response = render(&service, group, tile, &filters);
        assert_eq!(response.status, 400, "{group} {tile:?} {filters:?}");
        assert!(response.body.is_empty());
    }
}

#[test]
fn unreachable_store_answers_400() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = TileService::new(registry(), dir.path().join("missing.sqlite"));
    let response = render(&service, "wind", ("9", "273", "168"), &[]);
    assert_eq!(response.status, 400);
}

#[test]
fn region_group_carries_bbox_and_labels() {
    let (_dir, service) = service();
    let response = render(&service, "municipality", ("9", "273", "168"), &[]);
    assert_eq!(response.status, 200);
    assert_eq!(layer_names(&response.body), vec!["municipality", "municipalitylabel"]);

    let reader = Reader::new(response.body).expect("decode");
    let regions = reader.get_features(0).expect("regions");
    let props = regions[0].properties.as_ref().expect("properties");
    let Some(TileValue::String(bbox)) = props.get("bbox") else {
        panic!("bbox missing");
    };
    let bbox: serde_json::Value = serde_json::from_str(bbox).expect("bbox json");
    assert_eq!(bbox["type"], "Polygon");
    assert!(!props.contains_key("area"));

    let labels = reader.get_features(1).expect("labels");
    assert!(matches!(labels[0].get_geometry(), Geometry::Point(_)));
}

#[test]
fn static_layer_keeps_designated_region_type_only() {
    let (_dir, service) = service();
    let response = render(&service, "static", ("9", "273", "168"), &[]);
    assert_eq!(response.status, 200);
    assert_eq!(layer_names(&response.body), vec!["protected_area"]);
    let reader = Reader::new(response.body).expect("decode");
    let features = reader.get_features(0).expect("features");
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].id, Some(20));
    // Configured without columns.
    assert!(features[0].properties.as_ref().is_none_or(|props| props.is_empty()));
}

#[test]
fn render_tile_reuses_an_open_store() {
    let (_dir, service) = service();
    let store = service.open_store().expect("store");
    let registry = service.registry().clone();
    let group = registry.lookup("wind").expect("wind");
    let coord = map_engine::tiles::TileCoord::new(9, 273, 168, registry.zoom()).expect("coord");
    let first = service.render_tile(&store, group, coord, &[]).expect("render");
    let second = service.render_tile(&store, group, coord, &[]).expect("render");
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn point_on_a_shared_edge_lands_in_the_east_tile_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("map.sqlite");
    let registry = registry();
    let mut store = SpatialStore::create(&path).expect("create");
    store.ensure_schema(&registry).expect("schema");
    // West edge of 9/273/168, east edge of 9/272/168.
    let edge_lon = 273.0 / 512.0 * 360.0 - 180.0;
    store
        .insert_features(
            registry.collection("wind").expect("collection"),
            &[wind(1, edge_lon, 52.3, 20)],
        )
        .expect("wind");
    drop(store);
    let service = TileService::new(registry, path);

    let west = render(&service, "wind", ("9", "272", "168"), &[]);
    assert_eq!(west.status, 204);

    let east = render(&service, "wind", ("9", "273", "168"), &[]);
    assert_eq!(east.status, 200);
    let reader = Reader::new(east.body).expect("decode");
    let features = reader.get_features(0).expect("features");
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].id, Some(1));
}
