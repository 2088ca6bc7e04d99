use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use map_engine::cli::{Cli, Command, DistillArgs, LoadArgs, ReportFormat, ServeArgs, TileArgs};
use map_engine::config::EngineConfig;
use map_engine::distill::{DistillOptions, DistillReport, check_coordinates, distill_group};
use map_engine::load::{collection_counts, load_geojson, parse_mapping};
use map_engine::output::{
    check_lines, check_ndjson_lines, distill_lines, distill_ndjson_lines, summarize_tile,
    tile_summary_lines,
};
use map_engine::registry::{Registry, TileGroup};
use map_engine::server::{AppState, serve};
use map_engine::store::SpatialStore;
use map_engine::tiles::{TileCoord, TileService};

fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let config = EngineConfig::load_or_builtin(cli.config.as_deref())?;
    let registry = Arc::new(Registry::from_config(&config).context("invalid map configuration")?);
    info!(
        groups = registry.groups().len(),
        dynamic_sources = registry.dynamic_sources().len(),
        static_sources = registry.static_sources().len(),
        "layer registry ready"
    );

    match cli.command {
        Command::Serve(args) => run_serve(registry, args),
        Command::Distill(args) => run_distill(registry, args),
        Command::Load(args) => run_load(&registry, args),
        Command::Layers => {
            println!("{}", serde_json::to_string_pretty(&registry.map_style())?);
            Ok(())
        }
        Command::Tile(args) => run_tile(registry, args),
    }
}

fn run_serve(registry: Arc<Registry>, args: ServeArgs) -> Result<()> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = args.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.build().context("failed to build tokio runtime")?;

    let service = TileService::new(registry, &args.store.database);
    let state = Arc::new(AppState::new(service, Duration::from_millis(args.timeout_ms)));
    runtime.block_on(serve(state, args.listen, args.distilled_dir.as_deref()))
}

fn run_distill(registry: Arc<Registry>, args: DistillArgs) -> Result<()> {
    let groups: Vec<TileGroup> = if args.group.is_empty() {
        registry.distill_groups().cloned().collect()
    } else {
        args.group
            .iter()
            .map(|name| registry.require(name).cloned().map_err(Into::into))
            .collect::<Result<_>>()?
    };

    if args.check {
        for group in groups.iter() {
            let extents = check_coordinates(&registry, group);
            let lines = match args.output_format {
                ReportFormat::Text => check_lines(&group.name, &extents),
                ReportFormat::Json => check_ndjson_lines(&group.name, &extents)?,
            };
            for line in lines {
                println!("{line}");
            }
        }
        return Ok(());
    }

    let service = TileService::new(registry, &args.store.database);
    let options = DistillOptions {
        output: args.output.clone(),
        gzip: args.gzip,
        write_empty: !args.no_empty,
        threads: args.threads,
        progress: !args.no_progress,
    };
    let reports = groups
        .iter()
        .map(|group| distill_group(&service, group, &options))
        .collect::<Result<Vec<DistillReport>>>()?;
    match args.output_format {
        ReportFormat::Text => {
            for report in reports.iter() {
                for line in distill_lines(report) {
                    println!("{line}");
                }
            }
        }
        ReportFormat::Json => {
            for line in distill_ndjson_lines(&reports)? {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn run_load(registry: &Registry, args: LoadArgs) -> Result<()> {
    let mapping = parse_mapping(&args.mapping)?;
    let mut store = SpatialStore::create(&args.store.database)?;
    store.ensure_schema(registry)?;
    let report = load_geojson(&mut store, registry, &args.collection, &args.input, &mapping)?;
    println!(
        "load: collection={} read={} written={} skipped={}",
        report.collection, report.read, report.written, report.skipped
    );
    let collections: Vec<_> = registry.collections().map(|c| c.as_ref()).collect();
    for (name, count) in collection_counts(&store, &collections)? {
        println!("collection: {name} features={count}");
    }
    Ok(())
}

fn run_tile(registry: Arc<Registry>, args: TileArgs) -> Result<()> {
    let mut parts = args.tile.split('/');
    let (Some(z), Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        anyhow::bail!("tile must look like z/x/y, got '{}'", args.tile);
    };
    let filters = args
        .filter
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .with_context(|| format!("filter '{entry}' must look like key=value"))
        })
        .collect::<Result<Vec<_>>>()?;

    let service = TileService::new(registry.clone(), &args.store.database);
    let response = service.render(&args.group, z, x, y, &filters);
    if let Some(out) = args.out.as_ref() {
        fs::write(out, &response.body)
            .with_context(|| format!("failed to write tile: {}", out.display()))?;
        info!(path = %out.display(), status = response.status, "tile written");
    }

    let coord = match TileCoord::parse(z, x, y, registry.zoom()) {
        Ok(coord) => coord,
        Err(err) => anyhow::bail!("tile request answered {}: {err}", response.status),
    };
    let summary = summarize_tile(&coord, response.status, &response.body)?;
    match args.output_format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        ReportFormat::Text => {
            for line in tile_summary_lines(&summary) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
