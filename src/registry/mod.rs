pub mod map_style;
pub mod types;

pub use self::map_style::*;
pub use self::types::*;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::config::{
    AttributeType, CategoryConfig, CollectionConfig, DistillConfig, EngineConfig, GroupConfig,
    LayerConfig, QueryKindConfig,
};
use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct Registry {
    zoom: ZoomSettings,
    distill: DistillConfig,
    collections: BTreeMap<String, Arc<FeatureCollection>>,
    groups: Vec<TileGroup>,
    dynamic_sources: Vec<DynamicSource>,
    static_sources: Vec<StaticSource>,
    categories: Vec<Category>,
}

impl Registry {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let zoom = build_zoom(config)?;

        let mut collections = BTreeMap::new();
        for collection in config.collections.iter() {
            let built = build_collection(collection)?;
            if collections
                .insert(built.name.clone(), Arc::new(built))
                .is_some()
            {
                return Err(ConfigError::Duplicate {
                    kind: "collection",
                    name: collection.name.clone(),
                });
            }
        }

        let mut groups: Vec<TileGroup> = Vec::with_capacity(config.groups.len());
        for group in config.groups.iter() {
            if groups.iter().any(|existing| existing.name == group.name) {
                return Err(ConfigError::Duplicate {
                    kind: "group",
                    name: group.name.clone(),
                });
            }
            groups.push(build_group(group, &collections, &zoom)?);
        }

        let mut dynamic_sources = Vec::new();
        let mut static_sources = Vec::new();
        for group in groups.iter() {
            if group.is_dynamic() {
                dynamic_sources.extend(expand_setups(group)?);
            } else {
                static_sources.push(StaticSource {
                    group: group.name.clone(),
                    distilled: (config.use_distilled_mvts && group.distill)
                        .then(|| format!("{}_distilled", group.name)),
                });
            }
        }

        let categories = config
            .categories
            .iter()
            .map(|category| build_category(category, &groups))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            zoom,
            distill: config.distill,
            collections,
            groups,
            dynamic_sources,
            static_sources,
            categories,
        })
    }

    pub fn zoom(&self) -> &ZoomSettings {
        &self.zoom
    }

    pub fn distill_settings(&self) -> DistillConfig {
        self.distill
    }

    pub fn lookup(&self, group: &str) -> Option<&TileGroup> {
        self.groups.iter().find(|candidate| candidate.name == group)
    }

    pub fn require(&self, group: &str) -> Result<&TileGroup, ConfigError> {
        self.lookup(group)
            .ok_or_else(|| ConfigError::UnknownGroup(group.to_string()))
    }

    pub fn groups(&self) -> &[TileGroup] {
        &self.groups
    }

    pub fn distill_groups(&self) -> impl Iterator<Item = &TileGroup> {
        self.groups
            .iter()
            .filter(|group| group.distill && !group.is_dynamic())
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<FeatureCollection>> {
        self.collections.get(name)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Arc<FeatureCollection>> {
        self.collections.values()
    }

    pub fn dynamic_sources(&self) -> &[DynamicSource] {
        &self.dynamic_sources
    }

    pub fn static_sources(&self) -> &[StaticSource] {
        &self.static_sources
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn designated_region(&self, z: u8) -> Option<&str> {
        self.zoom.designated_region(z)
    }
}

fn check_identifier(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

fn build_zoom(config: &EngineConfig) -> Result<ZoomSettings, ConfigError> {
    let zoom = &config.zoom;
    if zoom.min_zoom > zoom.max_zoom {
        return Err(ConfigError::InvalidZoom(format!(
            "min_zoom {} is above max_zoom {}",
            zoom.min_zoom, zoom.max_zoom
        )));
    }
    if zoom.max_zoom > 30 {
        return Err(ConfigError::InvalidZoom(format!(
            "max_zoom {} exceeds 30",
            zoom.max_zoom
        )));
    }
    if zoom.max_distilled_zoom < zoom.min_zoom || zoom.max_distilled_zoom > zoom.max_zoom {
        return Err(ConfigError::InvalidZoom(format!(
            "max_distilled_zoom {} is outside [{}, {}]",
            zoom.max_distilled_zoom, zoom.min_zoom, zoom.max_zoom
        )));
    }
    let dx = config.distill.x_at_min_zoom as u64;
    let dy = config.distill.y_at_min_zoom as u64;
    if dx >= 1u64 << zoom.min_zoom || dy >= 1u64 << zoom.min_zoom {
        return Err(ConfigError::InvalidZoom(format!(
            "distill base tile {dx}/{dy} does not exist at zoom {}",
            zoom.min_zoom
        )));
    }

    let mut bands: Vec<RegionBand> = Vec::with_capacity(zoom.regions.len());
    for band in zoom.regions.iter() {
        check_identifier(&band.name)?;
        if band.min >= band.max {
            return Err(ConfigError::InvalidZoom(format!(
                "empty zoom band [{}, {}) for region {}",
                band.min, band.max, band.name
            )));
        }
        for other in bands.iter() {
            if other.name == band.name {
                return Err(ConfigError::Duplicate {
                    kind: "region",
                    name: band.name.clone(),
                });
            }
            if band.min < other.max && other.min < band.max {
                return Err(ConfigError::InvalidZoom(format!(
                    "zoom bands of {} and {} overlap",
                    other.name, band.name
                )));
            }
        }
        bands.push(RegionBand {
            name: band.name.clone(),
            min: band.min,
            max: band.max,
        });
    }

    Ok(ZoomSettings {
        min_zoom: zoom.min_zoom,
        max_zoom: zoom.max_zoom,
        max_distilled_zoom: zoom.max_distilled_zoom,
        bands,
    })
}

fn build_collection(config: &CollectionConfig) -> Result<FeatureCollection, ConfigError> {
    check_identifier(&config.name)?;
    check_identifier(&config.geometry_column)?;

    let mut seen = HashSet::new();
    let mut attributes = Vec::with_capacity(config.attributes.len());
    for attr in config.attributes.iter() {
        check_identifier(&attr.name)?;
        if attr.name == "id" || attr.name == config.geometry_column || !seen.insert(&attr.name) {
            return Err(ConfigError::Duplicate {
                kind: "attribute",
                name: format!("{}.{}", config.name, attr.name),
            });
        }
        let built = Attribute {
            name: attr.name.clone(),
            kind: attr.kind,
            choices: attr.choices.clone(),
            setup: attr.setup,
            property: attr.property.clone().unwrap_or_else(|| attr.name.clone()),
        };
        if built.setup && built.setup_values().is_none() {
            return Err(ConfigError::SetupNotExpandable {
                collection: config.name.clone(),
                attribute: attr.name.clone(),
            });
        }
        attributes.push(built);
    }

    if let Some(region_column) = config.region_column.as_ref() {
        let declared = attributes
            .iter()
            .find(|attr| &attr.name == region_column)
            .is_some_and(|attr| attr.kind == AttributeType::Text);
        if !declared {
            return Err(ConfigError::UnknownColumn {
                layer: config.name.clone(),
                column: region_column.clone(),
            });
        }
    }

    Ok(FeatureCollection {
        name: config.name.clone(),
        geometry_column: config.geometry_column.clone(),
        attributes,
        region_column: config.region_column.clone(),
    })
}

fn build_group(
    config: &GroupConfig,
    collections: &BTreeMap<String, Arc<FeatureCollection>>,
    zoom: &ZoomSettings,
) -> Result<TileGroup, ConfigError> {
    check_identifier(&config.name)?;
    if let Some(region) = config.region.as_ref() {
        if !zoom.is_region(region) {
            return Err(ConfigError::UnknownRegion {
                owner: config.name.clone(),
                region: region.clone(),
            });
        }
    }

    let mut layers: Vec<Layer> = Vec::with_capacity(config.layers.len());
    for layer in config.layers.iter() {
        if layers.iter().any(|existing| existing.name == layer.name) {
            return Err(ConfigError::Duplicate {
                kind: "layer",
                name: layer.name.clone(),
            });
        }
        layers.push(build_layer(layer, config.region.as_deref(), collections, zoom)?);
    }

    Ok(TileGroup {
        name: config.name.clone(),
        layers,
        region: config.region.clone(),
        distill: config.distill,
    })
}

fn build_layer(
    config: &LayerConfig,
    group_region: Option<&str>,
    collections: &BTreeMap<String, Arc<FeatureCollection>>,
    zoom: &ZoomSettings,
) -> Result<Layer, ConfigError> {
    check_identifier(&config.name)?;
    let collection = collections
        .get(&config.collection)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownCollection {
            layer: config.name.clone(),
            collection: config.collection.clone(),
        })?;

    let kind = match config.kind {
        QueryKindConfig::Plain => QueryKind::Plain,
        QueryKindConfig::Region => QueryKind::Region,
        QueryKindConfig::Label => QueryKind::Label,
        QueryKindConfig::Cluster => QueryKind::Cluster,
        QueryKindConfig::Static => QueryKind::Static {
            region_column: collection
                .region_column
                .clone()
                .ok_or_else(|| ConfigError::MissingRegionColumn(config.name.clone()))?,
        },
    };

    let columns = match config.columns.as_ref() {
        Some(names) => names
            .iter()
            .map(|name| resolve_column(&config.name, name, &collection, &kind))
            .collect::<Result<Vec<_>, _>>()?,
        None => std::iter::once(Column::Id)
            .chain(collection.attributes.iter().map(|attr| Column::Stored {
                name: attr.name.clone(),
                kind: attr.kind,
            }))
            .collect(),
    };

    let region = config
        .region
        .clone()
        .or_else(|| group_region.map(str::to_string));
    if let Some(region) = region.as_ref() {
        if !zoom.is_region(region) {
            return Err(ConfigError::UnknownRegion {
                owner: config.name.clone(),
                region: region.clone(),
            });
        }
    }

    let range = ZoomRange {
        min: config.minzoom.unwrap_or(zoom.min_zoom),
        max: config.maxzoom.unwrap_or(zoom.max_zoom),
    };
    if range.min > range.max {
        return Err(ConfigError::InvalidZoom(format!(
            "layer {} has minzoom {} above maxzoom {}",
            config.name, range.min, range.max
        )));
    }

    Ok(Layer {
        name: config.name.clone(),
        collection,
        kind,
        columns,
        region,
        zoom: range,
        simplify: config.simplify.filter(|tolerance| *tolerance > 0.0),
    })
}

fn resolve_column(
    layer: &str,
    name: &str,
    collection: &FeatureCollection,
    kind: &QueryKind,
) -> Result<Column, ConfigError> {
    if name == "id" {
        return Ok(Column::Id);
    }
    if let Some(attr) = collection.attribute(name) {
        return Ok(Column::Stored {
            name: attr.name.clone(),
            kind: attr.kind,
        });
    }
    kind.derived_columns()
        .iter()
        .find(|derived| derived.name() == name)
        .map(|derived| Column::Derived { column: *derived })
        .ok_or_else(|| ConfigError::UnknownColumn {
            layer: layer.to_string(),
            column: name.to_string(),
        })
}

fn expand_setups(group: &TileGroup) -> Result<Vec<DynamicSource>, ConfigError> {
    let mut seen = HashSet::new();
    let mut axes: Vec<(String, Vec<String>)> = Vec::new();
    for layer in group.layers.iter() {
        for attr in layer.collection.setup_attributes() {
            if !seen.insert(attr.name.clone()) {
                continue;
            }
            let values = attr
                .setup_values()
                .ok_or_else(|| ConfigError::SetupNotExpandable {
                    collection: layer.collection.name.clone(),
                    attribute: attr.name.clone(),
                })?;
            axes.push((attr.name.clone(), values));
        }
    }

    let mut combinations: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for (name, values) in axes.iter() {
        let mut next = Vec::with_capacity(combinations.len() * values.len());
        for prefix in combinations.iter() {
            for value in values.iter() {
                let mut combination = prefix.clone();
                combination.push((name.clone(), value.clone()));
                next.push(combination);
            }
        }
        combinations = next;
    }

    Ok(combinations
        .into_iter()
        .map(|filters| {
            let mut source = DynamicSource {
                name: String::new(),
                group: group.name.clone(),
                filters,
            };
            source.name = format!("{}-{}", group.name, source.combination());
            source
        })
        .collect())
}

fn build_category(
    config: &CategoryConfig,
    groups: &[TileGroup],
) -> Result<Category, ConfigError> {
    let layers = config
        .layers
        .iter()
        .map(|entry| {
            let (group, layer) = groups
                .iter()
                .find_map(|group| {
                    group
                        .layers
                        .iter()
                        .find(|layer| layer.name == entry.layer)
                        .map(|layer| (group, layer))
                })
                .ok_or_else(|| ConfigError::UnknownLegendLayer(entry.layer.clone()))?;
            Ok(LegendLayer {
                layer: entry.layer.clone(),
                group: group.name.clone(),
                name: entry.name.clone(),
                description: entry.description.clone(),
                color: entry.color.clone(),
                style_type: entry.style_type.clone(),
                popup_fields: entry.popup_fields.clone(),
                clustered: layer.is_clustered(),
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    Ok(Category {
        name: config.name.clone(),
        layers,
    })
}
