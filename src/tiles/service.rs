use std::path::PathBuf;
use std::sync::Arc;

use geo::Intersects;
use rusqlite::types::Value;
use tracing::{debug, error, warn};

use super::clip::clip_to_tile;
use super::coord::{EXTENT, TileCoord};
use super::encode::{LayerFeatures, PropertyValue, TileFeature, encode_tile};
use super::filter::FilterSet;
use super::kind::project;
use super::query::{LayerQuery, build_layer_query};
use crate::config::AttributeType;
use crate::error::{TileError, TileResult};
use crate::registry::{Column, Layer, Registry, TileGroup};
use crate::store::{FeatureRow, SpatialStore};

pub const MVT_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TileResponse {
    pub fn from_result(result: TileResult<Vec<u8>>) -> Self {
        match result {
            Ok(body) if body.is_empty() => Self {
                status: 204,
                body,
            },
            Ok(body) => Self { status: 200, body },
            Err(err) => Self {
                status: err.status(),
                body: Vec::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status == 204
    }
}

#[derive(Clone)]
pub struct TileService {
    registry: Arc<Registry>,
    database: PathBuf,
}

impl TileService {
    pub fn new(registry: Arc<Registry>, database: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            database: database.into(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn open_store(&self) -> TileResult<SpatialStore> {
        SpatialStore::open_readonly(&self.database).map_err(|err| TileError::Store(format!("{err:#}")))
    }

    pub fn render(
        &self,
        group: &str,
        z: &str,
        x: &str,
        y: &str,
        filters: &[(String, String)],
    ) -> TileResponse {
        let result = self
            .validate(group, z, x, y, filters)
            .and_then(|(group, coord, filter_sets)| {
                let store = self.open_store()?;
                self.render_validated(&store, group, coord, &filter_sets)
            });
        log_outcome(group, z, x, y, &result);
        TileResponse::from_result(result)
    }

    pub fn render_tile(
        &self,
        store: &SpatialStore,
        group: &TileGroup,
        coord: TileCoord,
        filters: &[(String, String)],
    ) -> TileResult<Vec<u8>> {
        let filter_sets = parse_filters(group, filters)?;
        self.render_validated(store, group, coord, &filter_sets)
    }

    fn validate<'a>(
        &'a self,
        group: &str,
        z: &str,
        x: &str,
        y: &str,
        filters: &[(String, String)],
    ) -> TileResult<(&'a TileGroup, TileCoord, Vec<FilterSet>)> {
        let group = self
            .registry
            .lookup(group)
            .ok_or_else(|| TileError::UnknownGroup(group.to_string()))?;
        let coord = TileCoord::parse(z, x, y, self.registry.zoom())?;
        let filter_sets = parse_filters(group, filters)?;
        Ok((group, coord, filter_sets))
    }

    fn render_validated(
        &self,
        store: &SpatialStore,
        group: &TileGroup,
        coord: TileCoord,
        filter_sets: &[FilterSet],
    ) -> TileResult<Vec<u8>> {
        let layers = self.collect_layers(store, group, coord, filter_sets)?;
        let bytes = encode_tile(&layers, EXTENT)?;
        debug!(
            group = %group.name,
            tile = %coord,
            features = layers.iter().map(|layer| layer.features.len()).sum::<usize>(),
            bytes = bytes.len(),
            "rendered tile"
        );
        Ok(bytes)
    }

    pub fn collect_layers(
        &self,
        store: &SpatialStore,
        group: &TileGroup,
        coord: TileCoord,
        filter_sets: &[FilterSet],
    ) -> TileResult<Vec<LayerFeatures>> {
        let designated = self.registry.designated_region(coord.z);
        let mut out = Vec::with_capacity(group.layers.len());
        for (layer, filters) in group.layers.iter().zip(filter_sets.iter()) {
            let mut features = LayerFeatures::new(layer.name.clone());
            if let Some(query) = build_layer_query(layer, &coord, filters, designated) {
                let rows = store.fetch(&query)?;
                features.features = layer_features(layer, &query, &coord, rows);
            }
            out.push(features);
        }
        Ok(out)
    }
}

// Resolves the request filters against every layer of the group. A key
// unknown to any layer rejects the request.
pub fn parse_filters(group: &TileGroup, filters: &[(String, String)]) -> TileResult<Vec<FilterSet>> {
    group
        .layers
        .iter()
        .map(|layer| FilterSet::parse(filters, &layer.name, &layer.collection))
        .collect()
}

fn layer_features(
    layer: &Layer,
    query: &LayerQuery,
    coord: &TileCoord,
    rows: Vec<FeatureRow>,
) -> Vec<TileFeature> {
    let tile_polygon = query.bounds.to_polygon();
    let mut features = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(projected) = project(&layer.kind, row.geometry) else {
            continue;
        };
        if !projected.geometry.intersects(&tile_polygon) {
            continue;
        }
        let Some(geometry) = clip_to_tile(&projected.geometry, coord, EXTENT, layer.simplify) else {
            continue;
        };

        let mut stored = query.columns.iter().zip(row.values);
        let mut properties = Vec::with_capacity(layer.columns.len());
        for column in layer.columns.iter() {
            let value = match column {
                Column::Id => Some(PropertyValue::Int(row.id)),
                Column::Stored { kind, .. } => stored
                    .next()
                    .and_then(|(_, value)| property_value(*kind, value)),
                Column::Derived { column } => projected
                    .derived
                    .iter()
                    .find(|(derived, _)| derived == column)
                    .map(|(_, value)| value.clone()),
            };
            properties.push((column.name().to_string(), value));
        }

        features.push(TileFeature {
            id: u64::try_from(row.id).ok(),
            geometry,
            properties,
        });
    }
    features
}

fn property_value(kind: AttributeType, value: Value) -> Option<PropertyValue> {
    match (kind, value) {
        (_, Value::Null) => None,
        (AttributeType::Boolean, Value::Integer(v)) => Some(PropertyValue::Bool(v != 0)),
        (AttributeType::Float, Value::Integer(v)) => Some(PropertyValue::Double(v as f64)),
        (_, Value::Integer(v)) => Some(PropertyValue::Int(v)),
        (_, Value::Real(v)) => Some(PropertyValue::Double(v)),
        (_, Value::Text(text)) => Some(PropertyValue::Text(text)),
        (_, Value::Blob(_)) => None,
    }
}

fn log_outcome(group: &str, z: &str, x: &str, y: &str, result: &TileResult<Vec<u8>>) {
    match result {
        Ok(_) => {}
        Err(err) if err.is_validation() => {
            warn!(group, z, x, y, error = %err, "rejected tile request");
        }
        Err(err) => {
            error!(group, z, x, y, error = %err, "tile request failed");
        }
    }
}
