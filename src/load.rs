use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use geo_types::Geometry;
use geojson::{GeoJson, feature::Id};
use rusqlite::types::Value;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AttributeType;
use crate::registry::{Attribute, FeatureCollection, Registry};
use crate::store::{NewFeature, SpatialStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub collection: String,
    pub read: usize,
    pub written: usize,
    pub skipped: usize,
}

pub fn parse_mapping(entries: &[String]) -> Result<HashMap<String, String>> {
    entries
        .iter()
        .map(|entry| {
            let (attribute, property) = entry
                .split_once('=')
                .with_context(|| format!("mapping '{entry}' must look like attribute=property"))?;
            Ok((attribute.trim().to_string(), property.trim().to_string()))
        })
        .collect()
}

pub fn load_geojson(
    store: &mut SpatialStore,
    registry: &Registry,
    collection: &str,
    path: &Path,
    mapping: &HashMap<String, String>,
) -> Result<LoadReport> {
    let collection = registry
        .collection(collection)
        .with_context(|| format!("unknown collection: {collection}"))?
        .clone();
    for attribute in mapping.keys() {
        if collection.attribute(attribute).is_none() {
            anyhow::bail!("collection {} has no attribute {attribute}", collection.name);
        }
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read GeoJSON: {}", path.display()))?;
    let geojson: GeoJson = raw
        .parse()
        .with_context(|| format!("failed to parse GeoJSON: {}", path.display()))?;
    let source = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => anyhow::bail!("expected a Feature or FeatureCollection"),
    };

    store.ensure_collection(&collection)?;

    let read = source.len();
    let mut features = Vec::with_capacity(read);
    for (index, feature) in source.into_iter().enumerate() {
        let Some(geometry) = feature.geometry.as_ref() else {
            warn!(collection = %collection.name, index, "feature without geometry");
            continue;
        };
        let geometry = match Geometry::<f64>::try_from(geometry.value.clone()) {
            Ok(geometry) => geometry,
            Err(err) => {
                warn!(collection = %collection.name, index, error = %err, "unsupported geometry");
                continue;
            }
        };
        let values = collection
            .attributes
            .iter()
            .map(|attr| {
                let property = mapping.get(&attr.name).unwrap_or(&attr.property);
                let raw = feature
                    .properties
                    .as_ref()
                    .and_then(|props| props.get(property));
                convert_property(attr, raw)
                    .with_context(|| format!("feature {index}: attribute {}", attr.name))
            })
            .collect::<Result<Vec<_>>>()?;
        let id = match feature.id.as_ref() {
            Some(Id::Number(number)) => number.as_i64(),
            Some(Id::String(text)) => text.parse::<i64>().ok(),
            None => None,
        };
        features.push(NewFeature {
            id,
            geometry,
            values,
        });
    }

    let written = store.insert_features(&collection, &features)?;
    let report = LoadReport {
        collection: collection.name.clone(),
        read,
        written,
        skipped: read - written,
    };
    info!(
        collection = %report.collection,
        read = report.read,
        written = report.written,
        skipped = report.skipped,
        "loaded features"
    );
    Ok(report)
}

fn convert_property(attr: &Attribute, raw: Option<&serde_json::Value>) -> Result<Value> {
    use serde_json::Value as Json;

    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let invalid = || anyhow::anyhow!("cannot store {raw} as {:?}", attr.kind);
    let value = match (attr.kind, raw) {
        (_, Json::Null) => Value::Null,
        (AttributeType::Integer, Json::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Value::Integer)
            .ok_or_else(invalid)?,
        (AttributeType::Integer, Json::String(text)) => {
            Value::Integer(text.trim().parse().map_err(|_| invalid())?)
        }
        (AttributeType::Float, Json::Number(number)) => {
            Value::Real(number.as_f64().ok_or_else(invalid)?)
        }
        (AttributeType::Float, Json::String(text)) => {
            Value::Real(text.trim().parse().map_err(|_| invalid())?)
        }
        (AttributeType::Text, Json::String(text)) => Value::Text(text.clone()),
        (AttributeType::Text, Json::Number(number)) => Value::Text(number.to_string()),
        (AttributeType::Text, Json::Bool(flag)) => Value::Text(flag.to_string()),
        (AttributeType::Boolean, Json::Bool(flag)) => Value::Integer(i64::from(*flag)),
        (AttributeType::Boolean, Json::Number(number)) => {
            Value::Integer(i64::from(number.as_f64().ok_or_else(invalid)? != 0.0))
        }
        (AttributeType::Boolean, Json::String(text)) => match text.trim() {
            "True" | "true" | "1" => Value::Integer(1),
            "False" | "false" | "0" => Value::Integer(0),
            _ => return Err(invalid()),
        },
        _ => return Err(invalid()),
    };
    if let (Some(choices), Value::Integer(v)) = (attr.choices.as_ref(), &value) {
        if !choices.contains(v) {
            anyhow::bail!("value {v} is not one of {choices:?}");
        }
    }
    Ok(value)
}

pub fn collection_counts(
    store: &SpatialStore,
    collections: &[&FeatureCollection],
) -> Result<Vec<(String, u64)>> {
    collections
        .iter()
        .map(|collection| Ok((collection.name.clone(), store.feature_count(collection)?)))
        .collect()
}
