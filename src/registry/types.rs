use std::sync::Arc;

use serde::Serialize;

use crate::config::AttributeType;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeType,
    pub choices: Option<Vec<i64>>,
    pub setup: bool,
    pub property: String,
}

impl Attribute {
    pub fn setup_values(&self) -> Option<Vec<String>> {
        match (self.kind, self.choices.as_ref()) {
            (AttributeType::Boolean, _) => Some(vec!["True".to_string(), "False".to_string()]),
            (AttributeType::Integer, Some(choices)) if !choices.is_empty() => {
                Some(choices.iter().map(|choice| choice.to_string()).collect())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    pub name: String,
    pub geometry_column: String,
    pub attributes: Vec<Attribute>,
    pub region_column: Option<String>,
}

impl FeatureCollection {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn setup_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|attr| attr.setup)
    }

    pub fn has_setup(&self) -> bool {
        self.attributes.iter().any(|attr| attr.setup)
    }

    pub fn index_table(&self) -> String {
        format!("{}_rtree", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum QueryKind {
    Plain,
    Region,
    Static { region_column: String },
    Label,
    Cluster,
}

impl QueryKind {
    pub fn derived_columns(&self) -> &'static [DerivedColumn] {
        match self {
            QueryKind::Region => &[DerivedColumn::Bbox],
            QueryKind::Cluster => &[DerivedColumn::Lat, DerivedColumn::Lon],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedColumn {
    Bbox,
    Lat,
    Lon,
}

impl DerivedColumn {
    pub fn name(self) -> &'static str {
        match self {
            DerivedColumn::Bbox => "bbox",
            DerivedColumn::Lat => "lat",
            DerivedColumn::Lon => "lon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Column {
    Id,
    Stored { name: String, kind: AttributeType },
    Derived { column: DerivedColumn },
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::Id => "id",
            Column::Stored { name, .. } => name,
            Column::Derived { column } => column.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn contains(&self, z: u8) -> bool {
        z >= self.min && z <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub name: String,
    #[serde(skip)]
    pub collection: Arc<FeatureCollection>,
    pub kind: QueryKind,
    pub columns: Vec<Column>,
    pub region: Option<String>,
    pub zoom: ZoomRange,
    pub simplify: Option<f32>,
}

impl Layer {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn is_clustered(&self) -> bool {
        self.kind == QueryKind::Cluster
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileGroup {
    pub name: String,
    pub layers: Vec<Layer>,
    pub region: Option<String>,
    pub distill: bool,
}

impl TileGroup {
    pub fn is_dynamic(&self) -> bool {
        self.layers.iter().any(|layer| layer.collection.has_setup())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoomSettings {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub max_distilled_zoom: u8,
    pub bands: Vec<RegionBand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionBand {
    pub name: String,
    // Half-open `[min, max)`.
    pub min: u8,
    pub max: u8,
}

impl ZoomSettings {
    pub fn designated_region(&self, z: u8) -> Option<&str> {
        self.bands
            .iter()
            .find(|band| z >= band.min && z < band.max)
            .map(|band| band.name.as_str())
    }

    pub fn band(&self, region: &str) -> Option<&RegionBand> {
        self.bands.iter().find(|band| band.name == region)
    }

    pub fn is_region(&self, name: &str) -> bool {
        self.band(name).is_some()
    }

    pub fn contains(&self, z: u8) -> bool {
        z >= self.min_zoom && z <= self.max_zoom
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DynamicSource {
    pub name: String,
    pub group: String,
    pub filters: Vec<(String, String)>,
}

impl DynamicSource {
    pub fn combination(&self) -> String {
        self.filters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn query_string(&self) -> String {
        self.filters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticSource {
    pub group: String,
    pub distilled: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendLayer {
    pub layer: String,
    pub group: String,
    pub name: String,
    pub description: String,
    pub color: Option<String>,
    pub style_type: String,
    pub popup_fields: Vec<String>,
    pub clustered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub name: String,
    pub layers: Vec<LegendLayer>,
}
