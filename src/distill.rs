use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::TileResult;
use crate::registry::{Registry, TileGroup};
use crate::tiles::{TileCoord, TileService, gzip_payload};

#[derive(Debug, Clone)]
pub struct DistillOptions {
    pub output: PathBuf,
    pub gzip: bool,
    // Write zero-length files for empty tiles so static hosting answers
    // them instead of returning 404.
    pub write_empty: bool,
    pub threads: Option<usize>,
    pub progress: bool,
}

impl DistillOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            gzip: false,
            write_empty: true,
            threads: None,
            progress: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DistillReport {
    pub group: String,
    pub total: u64,
    pub written: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes: u64,
    pub by_zoom: BTreeMap<u8, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoomExtent {
    pub z: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    pub count: u64,
}

pub fn tile_coordinates<'a>(
    registry: &'a Registry,
    group: &'a TileGroup,
) -> impl Iterator<Item = TileCoord> + 'a {
    let zoom = registry.zoom();
    let base = registry.distill_settings();
    (zoom.min_zoom..=zoom.max_distilled_zoom)
        .filter(move |z| match group.region.as_deref() {
            Some(region) => registry.designated_region(*z) == Some(region),
            None => true,
        })
        .flat_map(move |z| {
            let factor = 1u32 << (z - zoom.min_zoom);
            let xs = base.x_at_min_zoom * factor..(base.x_at_min_zoom + 1) * factor + base.x_offset;
            let ys = base.y_at_min_zoom * factor..(base.y_at_min_zoom + 1) * factor + base.y_offset;
            xs.flat_map(move |x| ys.clone().map(move |y| (z, x, y)))
        })
        .filter_map(move |(z, x, y)| TileCoord::new(z, x, y, zoom).ok())
}

pub fn check_coordinates(registry: &Registry, group: &TileGroup) -> Vec<ZoomExtent> {
    let mut extents: BTreeMap<u8, ZoomExtent> = BTreeMap::new();
    for coord in tile_coordinates(registry, group) {
        extents
            .entry(coord.z)
            .and_modify(|extent| {
                extent.min_x = extent.min_x.min(coord.x);
                extent.max_x = extent.max_x.max(coord.x);
                extent.min_y = extent.min_y.min(coord.y);
                extent.max_y = extent.max_y.max(coord.y);
                extent.count += 1;
            })
            .or_insert(ZoomExtent {
                z: coord.z,
                min_x: coord.x,
                max_x: coord.x,
                min_y: coord.y,
                max_y: coord.y,
                count: 1,
            });
    }
    extents.into_values().collect()
}

pub fn tile_path(root: &Path, coord: &TileCoord, group: &str) -> PathBuf {
    root.join(coord.relative_dir()).join(format!("{group}.mvt"))
}

pub fn distill_group(
    service: &TileService,
    group: &TileGroup,
    options: &DistillOptions,
) -> Result<DistillReport> {
    let coords: Vec<TileCoord> = tile_coordinates(service.registry(), group).collect();
    let bar = make_progress_bar(coords.len() as u64, &group.name, options.progress);

    let render = || -> Result<DistillReport> {
        let (tx, rx) = bounded::<(TileCoord, TileResult<Vec<u8>>)>(256);
        std::thread::scope(|scope| {
            let writer = scope.spawn(|| write_tiles(rx, group, options, &bar));
            coords.par_iter().for_each_init(
                || (tx.clone(), service.open_store()),
                |(tx, store), coord| {
                    let result = match store {
                        Ok(store) => service.render_tile(store, group, *coord, &[]),
                        Err(err) => Err(err.clone()),
                    };
                    // A closed channel means the writer failed; its error is reported below.
                    let _ = tx.send((*coord, result));
                },
            );
            drop(tx);
            writer
                .join()
                .map_err(|_| anyhow::anyhow!("tile writer thread panicked"))?
        })
    };

    let mut report = match options.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("build distill thread pool")?
            .install(render)?,
        None => render()?,
    };
    report.total = coords.len() as u64;
    bar.finish_and_clear();
    info!(
        group = %report.group,
        total = report.total,
        written = report.written,
        skipped = report.skipped,
        failed = report.failed,
        bytes = report.bytes,
        "distilled group"
    );
    Ok(report)
}

pub fn distill_all(service: &TileService, options: &DistillOptions) -> Result<Vec<DistillReport>> {
    let groups: Vec<&TileGroup> = service.registry().distill_groups().collect();
    groups
        .into_iter()
        .map(|group| distill_group(service, group, options))
        .collect()
}

fn write_tiles(
    rx: Receiver<(TileCoord, TileResult<Vec<u8>>)>,
    group: &TileGroup,
    options: &DistillOptions,
    bar: &ProgressBar,
) -> Result<DistillReport> {
    let mut report = DistillReport {
        group: group.name.clone(),
        ..DistillReport::default()
    };
    for (coord, result) in rx.iter() {
        *report.by_zoom.entry(coord.z).or_default() += 1;
        bar.inc(1);
        let bytes = match result {
            Ok(bytes) if bytes.is_empty() => {
                report.skipped += 1;
                if !options.write_empty {
                    continue;
                }
                bytes
            }
            Ok(bytes) => {
                report.written += 1;
                if options.gzip {
                    gzip_payload(&bytes).context("encode gzip tile data")?
                } else {
                    bytes
                }
            }
            Err(err) => {
                report.failed += 1;
                warn!(group = %group.name, tile = %coord, error = %err, "failed to distill tile");
                continue;
            }
        };
        let path = tile_path(&options.output, &coord, &group.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, &bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        report.bytes += bytes.len() as u64;
    }
    Ok(report)
}

fn make_progress_bar(total: u64, group: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(10));
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(group.to_string());
    bar.enable_steady_tick(Duration::from_millis(200));
    bar
}
