use std::io::Read;

use flate2::read::GzDecoder;
use geo_types::{Geometry, LineString, Point, Polygon};
use mvt_reader::Reader;
use mvt_reader::feature::Value;
use map_engine::tiles::{
    EXTENT, LayerFeatures, PropertyValue, TileFeature, encode_tile, gzip_payload,
};

fn point_feature(id: u64, x: f32, y: f32) -> TileFeature {
    TileFeature {
        id: Some(id),
        geometry: Geometry::Point(Point::new(x, y)),
        properties: vec![
            ("id".to_string(), Some(PropertyValue::Int(id as i64))),
            ("name".to_string(), Some(PropertyValue::Text(format!("plant {id}")))),
            ("capacity_net".to_string(), Some(PropertyValue::Double(2.5))),
            ("geometry_approximated".to_string(), Some(PropertyValue::Bool(true))),
            ("hub_height".to_string(), None),
        ],
    }
}

#[test]
fn tile_without_features_is_empty() {
    let layers = vec![LayerFeatures::new("wind"), LayerFeatures::new("hydro")];
    let bytes = encode_tile(&layers, EXTENT).expect("encode");
    assert!(bytes.is_empty());
}

#[test]
fn encodes_only_layers_with_features() {
    let mut wind = LayerFeatures::new("wind");
    wind.features.push(point_feature(7, 100.0, 200.0));
    wind.features.push(point_feature(9, 300.0, 400.0));
    let layers = vec![LayerFeatures::new("hydro"), wind];

    let bytes = encode_tile(&layers, EXTENT).expect("encode");
    let reader = Reader::new(bytes).expect("decode");
    let metadata = reader.get_layer_metadata().expect("layers");
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].name, "wind");
    assert_eq!(metadata[0].extent, EXTENT);
    assert_eq!(metadata[0].feature_count, 2);

    let features = reader.get_features(metadata[0].layer_index).expect("features");
    assert_eq!(features[0].id, Some(7));
    assert_eq!(
        features[0].get_geometry(),
        &Geometry::Point(Point::new(100.0, 200.0))
    );
    let props = features[0].properties.as_ref().expect("properties");
    assert_eq!(props.get("name"), Some(&Value::String("plant 7".to_string())));
    assert_eq!(props.get("capacity_net"), Some(&Value::Double(2.5)));
    assert_eq!(props.get("geometry_approximated"), Some(&Value::Bool(true)));
    assert!(matches!(props.get("id"), Some(Value::Int(7) | Value::SInt(7))));
    // Null attributes are left out.
    assert!(!props.contains_key("hub_height"));
}

#[test]
fn encodes_lines_and_polygons() {
    let line = LineString::from(vec![(0.0f32, 0.0f32), (10.0, 0.0), (10.0, 10.0)]);
    let square = Polygon::new(
        LineString::from(vec![
            (0.0f32, 0.0f32),
            (4096.0, 0.0),
            (4096.0, 4096.0),
            (0.0, 4096.0),
            (0.0, 0.0),
        ]),
        vec![],
    );
    let mut roads = LayerFeatures::new("municipality");
    roads.features.push(TileFeature {
        id: Some(1),
        geometry: Geometry::LineString(line),
        properties: vec![],
    });
    roads.features.push(TileFeature {
        id: Some(2),
        geometry: Geometry::Polygon(square),
        properties: vec![],
    });

    let bytes = encode_tile(&[roads], EXTENT).expect("encode");
    let reader = Reader::new(bytes).expect("decode");
    let features = reader.get_features(0).expect("features");
    assert_eq!(features.len(), 2);
    assert!(matches!(
        features[0].get_geometry(),
        Geometry::LineString(_) | Geometry::MultiLineString(_)
    ));
    assert!(matches!(
        features[1].get_geometry(),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_)
    ));
}

#[test]
fn gzip_payload_round_trips() {
    let payload = b"not really a tile".to_vec();
    let compressed = gzip_payload(&payload).expect("gzip");
    assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
    let mut decoded = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .expect("gunzip");
    assert_eq!(decoded, payload);
}
