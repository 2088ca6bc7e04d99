use serde::Serialize;

use super::types::{Category, LegendLayer, QueryKind, TileGroup};
use super::Registry;

const DISTILLED_SUFFIX: &str = "_distilled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapSource {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub tiles: Vec<String>,
}

impl MapSource {
    fn vector(name: String, tile: String) -> Self {
        Self {
            name,
            source_type: "vector".to_string(),
            tiles: vec![tile],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapLayer {
    pub id: String,
    pub minzoom: u8,
    pub maxzoom: u8,
    pub style: String,
    pub source: String,
    #[serde(rename = "source-layer")]
    pub source_layer: String,
    #[serde(rename = "type")]
    pub layer_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub clustered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Popup {
    pub source: String,
    pub layer_id: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStyle {
    pub sources: Vec<MapSource>,
    pub layers: Vec<MapLayer>,
    pub popups: Vec<Popup>,
    pub legend: Vec<Category>,
}

impl Registry {
    pub fn map_style(&self) -> MapStyle {
        MapStyle {
            sources: self.map_sources(),
            layers: self.map_layers(),
            popups: self.popups(),
            legend: self.legend().to_vec(),
        }
    }

    pub fn map_sources(&self) -> Vec<MapSource> {
        let mut sources = Vec::new();
        for source in self.static_sources() {
            sources.push(MapSource::vector(
                source.group.clone(),
                format!("{}_mvt/{{z}}/{{x}}/{{y}}/", source.group),
            ));
            if let Some(distilled) = source.distilled.as_ref() {
                sources.push(MapSource::vector(
                    distilled.clone(),
                    format!("static/mvts/{{z}}/{{x}}/{{y}}/{}.mvt", source.group),
                ));
            }
        }
        for source in self.dynamic_sources() {
            sources.push(MapSource::vector(
                source.name.clone(),
                format!(
                    "{}_mvt/{{z}}/{{x}}/{{y}}/?{}",
                    source.group,
                    source.query_string()
                ),
            ));
        }
        sources
    }

    pub fn map_layers(&self) -> Vec<MapLayer> {
        let mut layers = Vec::new();
        for group in self.groups().iter().filter(|group| group.region.is_some()) {
            self.push_region_layers(group, &mut layers);
        }
        for entry in self.legend_entries() {
            let Some(group) = self.lookup(&entry.group) else {
                continue;
            };
            if group.is_dynamic() {
                self.push_dynamic_layers(entry, &mut layers);
            } else {
                self.push_static_layers(group, entry, &mut layers);
            }
        }
        layers
    }

    pub fn popups(&self) -> Vec<Popup> {
        let mut popups = Vec::new();
        for entry in self.legend_entries() {
            if entry.popup_fields.is_empty() {
                continue;
            }
            for suffix in self.suffixes_for(&entry.group, entry.clustered) {
                popups.push(Popup {
                    source: entry.layer.clone(),
                    layer_id: format!("{}{}", entry.layer, suffix),
                    fields: entry.popup_fields.clone(),
                });
            }
        }
        popups
    }

    pub fn legend(&self) -> &[Category] {
        self.categories()
    }

    fn legend_entries(&self) -> impl Iterator<Item = &LegendLayer> {
        self.categories()
            .iter()
            .flat_map(|category| category.layers.iter())
    }

    // Source suffixes a layer of `group` is styled for. Clustered layers
    // never get a distilled variant.
    fn suffixes_for(&self, group: &str, clustered: bool) -> Vec<&'static str> {
        let distilled = !clustered
            && self
                .static_sources()
                .iter()
                .any(|source| source.group == group && source.distilled.is_some());
        if distilled {
            vec!["", DISTILLED_SUFFIX]
        } else {
            vec![""]
        }
    }

    fn style_zoom(&self, distilled_variant: bool, has_distilled: bool, min: u8, max: u8) -> (u8, u8) {
        let boundary = self.zoom().max_distilled_zoom + 1;
        match (has_distilled, distilled_variant) {
            (false, _) => (min, max),
            (true, false) => (min.max(boundary), max),
            (true, true) => (min, max.min(boundary)),
        }
    }

    fn push_region_layers(&self, group: &TileGroup, out: &mut Vec<MapLayer>) {
        let suffixes = self.suffixes_for(&group.name, false);
        let has_distilled = suffixes.len() > 1;
        for layer in group.layers.iter() {
            let region = layer.region.as_deref().or(group.region.as_deref());
            let Some(band) = region.and_then(|region| self.zoom().band(region)) else {
                continue;
            };
            let styles: &[(&str, &str)] = match layer.kind {
                QueryKind::Region => &[("line", "region-line"), ("fill", "region-fill")],
                QueryKind::Label => &[("label", "region-label")],
                _ => continue,
            };
            for suffix in suffixes.iter() {
                let (minzoom, maxzoom) =
                    self.style_zoom(!suffix.is_empty(), has_distilled, band.min, band.max);
                for (prefix, style) in styles {
                    out.push(MapLayer {
                        id: format!("{prefix}-{}{suffix}", layer.name),
                        minzoom,
                        maxzoom,
                        style: style.to_string(),
                        source: format!("{}{suffix}", group.name),
                        source_layer: layer.name.clone(),
                        layer_type: "region".to_string(),
                        name: None,
                        description: None,
                        color: None,
                        clustered: false,
                    });
                }
            }
        }
    }

    fn push_static_layers(&self, group: &TileGroup, entry: &LegendLayer, out: &mut Vec<MapLayer>) {
        let suffixes = self.suffixes_for(&group.name, entry.clustered);
        let has_distilled = suffixes.len() > 1;
        let zoom = self.zoom();
        for suffix in suffixes {
            let (minzoom, maxzoom) = if entry.clustered {
                // Unclustered features show only at the last zoom band.
                let last_band = zoom.bands.last().map_or(zoom.min_zoom, |band| band.min);
                (last_band, zoom.max_zoom)
            } else {
                self.style_zoom(!suffix.is_empty(), has_distilled, zoom.min_zoom, zoom.max_zoom)
            };
            out.push(self.legend_layer_style(
                entry,
                format!("{}{suffix}", entry.layer),
                format!("{}{suffix}", group.name),
                minzoom,
                maxzoom,
            ));
        }
    }

    fn push_dynamic_layers(&self, entry: &LegendLayer, out: &mut Vec<MapLayer>) {
        let zoom = self.zoom();
        for source in self
            .dynamic_sources()
            .iter()
            .filter(|source| source.group == entry.group)
        {
            out.push(self.legend_layer_style(
                entry,
                format!("fill-{}-{}", entry.layer, source.combination()),
                source.name.clone(),
                zoom.min_zoom,
                zoom.max_zoom,
            ));
        }
    }

    fn legend_layer_style(
        &self,
        entry: &LegendLayer,
        id: String,
        source: String,
        minzoom: u8,
        maxzoom: u8,
    ) -> MapLayer {
        MapLayer {
            id,
            minzoom,
            maxzoom,
            style: entry.layer.clone(),
            source,
            source_layer: entry.layer.clone(),
            layer_type: "static".to_string(),
            name: Some(entry.name.clone()),
            description: Some(entry.description.clone()),
            color: entry.color.clone(),
            clustered: entry.clustered,
        }
    }
}
