use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const BUILTIN_CONFIG: &str = include_str!("../config/default.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub zoom: ZoomConfig,
    pub distill: DistillConfig,
    #[serde(default)]
    pub use_distilled_mvts: bool,
    pub collections: Vec<CollectionConfig>,
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub max_distilled_zoom: u8,
    // Zoom bands per region type, half-open `[min, max)`.
    #[serde(default)]
    pub regions: Vec<RegionBand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionBand {
    pub name: String,
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistillConfig {
    pub x_at_min_zoom: u32,
    pub y_at_min_zoom: u32,
    #[serde(default)]
    pub x_offset: u32,
    #[serde(default)]
    pub y_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default = "default_geometry_column")]
    pub geometry_column: String,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub region_column: Option<String>,
}

fn default_geometry_column() -> String {
    "geom".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Integer,
    Float,
    Text,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeType,
    #[serde(default)]
    pub choices: Option<Vec<i64>>,
    #[serde(default)]
    pub setup: bool,
    #[serde(default)]
    pub property: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKindConfig {
    #[default]
    Plain,
    Region,
    Static,
    Label,
    Cluster,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub collection: String,
    #[serde(default)]
    pub kind: QueryKindConfig,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub minzoom: Option<u8>,
    #[serde(default)]
    pub maxzoom: Option<u8>,
    #[serde(default)]
    pub simplify: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub distill: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub layers: Vec<LegendLayerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendLayerConfig {
    pub layer: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(rename = "type", default = "default_style_type")]
    pub style_type: String,
    #[serde(default)]
    pub popup_fields: Vec<String>,
}

fn default_style_type() -> String {
    "circle".to_string()
}

impl EngineConfig {
    pub fn builtin() -> Result<Self> {
        serde_json::from_str(BUILTIN_CONFIG).context("parse built-in map configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read map configuration: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse map configuration: {}", path.display()))
    }

    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }
}
