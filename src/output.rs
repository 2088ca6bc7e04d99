use std::collections::HashSet;

use anyhow::Result;
use mvt_reader::Reader;
use serde::Serialize;
use serde_json::json;

use crate::distill::{DistillReport, ZoomExtent};
use crate::tiles::TileCoord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub feature_count: usize,
    pub property_key_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileSummary {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
    pub status: u16,
    pub bytes: usize,
    pub total_features: usize,
    pub layers: Vec<LayerSummary>,
}

pub fn summarize_tile(coord: &TileCoord, status: u16, payload: &[u8]) -> Result<TileSummary> {
    let mut summary = TileSummary {
        zoom: coord.z,
        x: coord.x,
        y: coord.y,
        status,
        bytes: payload.len(),
        total_features: 0,
        layers: Vec::new(),
    };
    if payload.is_empty() {
        return Ok(summary);
    }
    let reader = Reader::new(payload.to_vec())
        .map_err(|err| anyhow::anyhow!("decode vector tile: {err}"))?;
    let layers = reader
        .get_layer_metadata()
        .map_err(|err| anyhow::anyhow!("read layer metadata: {err}"))?;
    for layer in layers {
        let features = reader
            .get_features(layer.layer_index)
            .map_err(|err| anyhow::anyhow!("read layer features: {err}"))?;
        let mut keys = HashSet::new();
        for feature in features {
            if let Some(props) = feature.properties {
                keys.extend(props.into_keys());
            }
        }
        summary.total_features += layer.feature_count;
        summary.layers.push(LayerSummary {
            name: layer.name,
            feature_count: layer.feature_count,
            property_key_count: keys.len(),
        });
    }
    Ok(summary)
}

pub fn tile_summary_lines(summary: &TileSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "tile_summary: z={} x={} y={} status={} bytes={} total_features={}",
        summary.zoom, summary.x, summary.y, summary.status, summary.bytes, summary.total_features
    )];
    for layer in summary.layers.iter() {
        lines.push(format!(
            "layer: {} features={} property_keys={}",
            layer.name, layer.feature_count, layer.property_key_count
        ));
    }
    lines
}

pub fn distill_lines(report: &DistillReport) -> Vec<String> {
    let mut lines = vec![format!(
        "distill: group={} tiles={} written={} skipped={} failed={} bytes={}",
        report.group, report.total, report.written, report.skipped, report.failed, report.bytes
    )];
    for (zoom, count) in report.by_zoom.iter() {
        lines.push(format!("z={zoom}: tiles={count}"));
    }
    lines
}

pub fn check_lines(group: &str, extents: &[ZoomExtent]) -> Vec<String> {
    let mut lines = vec![format!("check: group={group}")];
    for extent in extents {
        lines.push(format!(
            "z={}: x={}..={} y={}..={} tiles={}",
            extent.z, extent.min_x, extent.max_x, extent.min_y, extent.max_y, extent.count
        ));
    }
    lines
}

pub fn distill_ndjson_lines(reports: &[DistillReport]) -> Result<Vec<String>> {
    let mut lines = Vec::with_capacity(reports.len());
    for report in reports {
        lines.push(serde_json::to_string(&json!({
            "type": "distill",
            "report": report,
        }))?);
    }
    Ok(lines)
}

pub fn check_ndjson_lines(group: &str, extents: &[ZoomExtent]) -> Result<Vec<String>> {
    extents
        .iter()
        .map(|extent| {
            serde_json::to_string(&json!({
                "type": "check",
                "group": group,
                "extent": extent,
            }))
            .map_err(Into::into)
        })
        .collect()
}
