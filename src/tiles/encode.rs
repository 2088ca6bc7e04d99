use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use geo_types::{Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Polygon};
use mvt::{GeomData, GeomEncoder, GeomType, Tile};

use crate::error::{TileError, TileResult};

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    Double(f64),
    Text(String),
    Bool(bool),
}

// A clipped feature in tile coordinates. `None` properties are omitted
// from the encoded feature.
#[derive(Debug, Clone, PartialEq)]
pub struct TileFeature {
    pub id: Option<u64>,
    pub geometry: Geometry<f32>,
    pub properties: Vec<(String, Option<PropertyValue>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerFeatures {
    pub name: String,
    pub features: Vec<TileFeature>,
}

impl LayerFeatures {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }
}

pub fn encode_tile(layers: &[LayerFeatures], extent: u32) -> TileResult<Vec<u8>> {
    if layers.iter().all(|layer| layer.features.is_empty()) {
        return Ok(Vec::new());
    }
    let mut tile = Tile::new(extent);
    for layer in layers.iter().filter(|layer| !layer.features.is_empty()) {
        let mut layer_builder = tile.create_layer(&layer.name);
        for feature in layer.features.iter() {
            let geom_data = encode_geometry(&feature.geometry)?;
            let mut feature_builder = layer_builder.into_feature(geom_data);
            if let Some(id) = feature.id {
                feature_builder.set_id(id);
            }
            for (key, value) in feature.properties.iter() {
                match value {
                    Some(PropertyValue::Int(val)) => feature_builder.add_tag_int(key, *val),
                    Some(PropertyValue::Double(val)) => feature_builder.add_tag_double(key, *val),
                    Some(PropertyValue::Text(text)) => feature_builder.add_tag_string(key, text),
                    Some(PropertyValue::Bool(val)) => feature_builder.add_tag_bool(key, *val),
                    None => {}
                }
            }
            layer_builder = feature_builder.into_layer();
        }
        tile.add_layer(layer_builder)
            .map_err(|err| TileError::Encode(format!("add layer {}: {err}", layer.name)))?;
    }
    tile.to_bytes()
        .map_err(|err| TileError::Encode(format!("serialize tile: {err}")))
}

fn geom_err(err: mvt::Error) -> TileError {
    TileError::Encode(format!("encode geometry: {err}"))
}

fn encode_linestring(encoder: &mut GeomEncoder<f32>, line: &LineString<f32>) -> TileResult<()> {
    for coord in ring_coords(line) {
        encoder.add_point(coord.x, coord.y).map_err(geom_err)?;
    }
    Ok(())
}

fn ring_coords(line: &LineString<f32>) -> &[geo_types::Coord<f32>] {
    let coords = line.0.as_slice();
    if coords.len() > 1 && coords.first() == coords.last() {
        &coords[..coords.len() - 1]
    } else {
        coords
    }
}

fn encode_polygon_rings(
    encoder: &mut GeomEncoder<f32>,
    polygon: &Polygon<f32>,
    more_follow: bool,
) -> TileResult<()> {
    let rings: Vec<&LineString<f32>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .collect();
    for (idx, ring) in rings.iter().enumerate() {
        encode_linestring(encoder, ring)?;
        if idx + 1 < rings.len() || more_follow {
            encoder.complete_geom().map_err(geom_err)?;
        }
    }
    Ok(())
}

pub fn encode_geometry(geometry: &Geometry<f32>) -> TileResult<GeomData> {
    match geometry {
        Geometry::Point(point) => GeomEncoder::new(GeomType::Point)
            .point(point.x(), point.y())
            .map_err(geom_err)?
            .encode()
            .map_err(geom_err),
        Geometry::MultiPoint(MultiPoint(points)) => {
            let mut encoder = GeomEncoder::new(GeomType::Point);
            for point in points {
                encoder.add_point(point.x(), point.y()).map_err(geom_err)?;
            }
            encoder.encode().map_err(geom_err)
        }
        Geometry::LineString(line) => {
            let mut encoder = GeomEncoder::new(GeomType::Linestring);
            encode_linestring(&mut encoder, line)?;
            encoder.encode().map_err(geom_err)
        }
        Geometry::MultiLineString(MultiLineString(lines)) => {
            let mut encoder = GeomEncoder::new(GeomType::Linestring);
            for (idx, line) in lines.iter().enumerate() {
                encode_linestring(&mut encoder, line)?;
                if idx + 1 < lines.len() {
                    encoder.complete_geom().map_err(geom_err)?;
                }
            }
            encoder.encode().map_err(geom_err)
        }
        Geometry::Polygon(polygon) => {
            let mut encoder = GeomEncoder::new(GeomType::Polygon);
            encode_polygon_rings(&mut encoder, polygon, false)?;
            encoder.encode().map_err(geom_err)
        }
        Geometry::MultiPolygon(MultiPolygon(polygons)) => {
            let mut encoder = GeomEncoder::new(GeomType::Polygon);
            for (idx, polygon) in polygons.iter().enumerate() {
                encode_polygon_rings(&mut encoder, polygon, idx + 1 < polygons.len())?;
            }
            encoder.encode().map_err(geom_err)
        }
        other => Err(TileError::Encode(format!(
            "unsupported tile geometry: {}",
            geometry_name(other)
        ))),
    }
}

fn geometry_name(geometry: &Geometry<f32>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

pub fn gzip_payload(data: &[u8]) -> std::io::Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
