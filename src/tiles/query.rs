use geo_types::Rect;
use rusqlite::types::Value;

use super::coord::TileCoord;
use super::filter::FilterSet;
use crate::config::AttributeType;
use crate::registry::{Column, Layer, QueryKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedColumn {
    pub name: String,
    pub kind: AttributeType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerQuery {
    pub layer: String,
    pub sql: String,
    pub params: Vec<Value>,
    pub columns: Vec<SelectedColumn>,
    pub bounds: Rect<f64>,
}

pub fn build_layer_query(
    layer: &Layer,
    coord: &TileCoord,
    filters: &FilterSet,
    designated_region: Option<&str>,
) -> Option<LayerQuery> {
    if !layer.zoom.contains(coord.z) {
        return None;
    }
    if let Some(region) = layer.region.as_deref() {
        if designated_region != Some(region) {
            return None;
        }
    }

    let collection = &layer.collection;
    let columns: Vec<SelectedColumn> = layer
        .columns
        .iter()
        .filter_map(|column| match column {
            Column::Stored { name, kind } => Some(SelectedColumn {
                name: name.clone(),
                kind: *kind,
            }),
            _ => None,
        })
        .collect();

    let mut select = vec![
        "f.id".to_string(),
        format!("f.{}", quote(&collection.geometry_column)),
    ];
    select.extend(columns.iter().map(|column| format!("f.{}", quote(&column.name))));

    let bounds = coord.tile_edges().to_rect();
    let mut params = vec![
        Value::Real(bounds.min().x),
        Value::Real(bounds.max().x),
        Value::Real(bounds.min().y),
        Value::Real(bounds.max().y),
    ];
    let mut clauses = vec![
        "r.maxx >= ?".to_string(),
        "r.minx <= ?".to_string(),
        "r.maxy >= ?".to_string(),
        "r.miny <= ?".to_string(),
    ];

    for filter in filters.filters.iter() {
        let column = format!("f.{}", quote(&filter.column));
        if let [value] = filter.values.as_slice() {
            clauses.push(format!("{column} = ?"));
            params.push(value.to_sql());
        } else {
            let placeholders = vec!["?"; filter.values.len()].join(", ");
            clauses.push(format!("{column} IN ({placeholders})"));
            params.extend(filter.values.iter().map(|value| value.to_sql()));
        }
    }

    if let QueryKind::Static { region_column } = &layer.kind {
        let region = designated_region?;
        clauses.push(format!("f.{} = ?", quote(region_column)));
        params.push(Value::Text(region.to_string()));
    }

    let sql = format!(
        "SELECT {} FROM {} AS f JOIN {} AS r ON r.id = f.id WHERE {} ORDER BY f.id",
        select.join(", "),
        quote(&collection.name),
        quote(&collection.index_table()),
        clauses.join(" AND "),
    );

    Some(LayerQuery {
        layer: layer.name.clone(),
        sql,
        params,
        columns,
        bounds,
    })
}

// Identifiers are validated at registry build time; quoting keeps
// keywords usable as column names.
pub fn quote(identifier: &str) -> String {
    format!("\"{identifier}\"")
}
