use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "map-engine",
    version,
    about = "Vector tile server and distiller for regional energy maps"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long, global = true, default_value = "info", env = "MAP_ENGINE_LOG")]
    pub log: String,

    /// Map configuration JSON; the built-in configuration when omitted
    #[arg(long, global = true, env = "MAP_ENGINE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve tiles over HTTP
    Serve(ServeArgs),
    /// Pre-render low-zoom tiles into a static tree
    Distill(DistillArgs),
    /// Import a GeoJSON file into a collection
    Load(LoadArgs),
    /// Print map sources, layers, popups and legend as JSON
    Layers,
    /// Render a single tile
    Tile(TileArgs),
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// SQLite spatial store
    #[arg(long, default_value = "map.sqlite", env = "MAP_ENGINE_DATABASE")]
    pub database: PathBuf,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = "0.0.0.0:8000", env = "MAP_ENGINE_LISTEN")]
    pub listen: SocketAddr,

    /// Per-request timeout for the store round trip
    #[arg(long, default_value_t = 10_000, env = "MAP_ENGINE_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Serve a distilled tree under /static/mvts
    #[arg(long, env = "MAP_ENGINE_DISTILLED_DIR")]
    pub distilled_dir: Option<PathBuf>,

    #[arg(long, env = "MAP_ENGINE_WORKER_THREADS")]
    pub worker_threads: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DistillArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = "mvts", env = "MAP_ENGINE_DISTILLED_DIR")]
    pub output: PathBuf,

    /// Groups to distill; every group marked for distilling when omitted
    #[arg(long)]
    pub group: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub gzip: bool,

    /// Do not write files for empty tiles
    #[arg(long, default_value_t = false)]
    pub no_empty: bool,

    #[arg(long)]
    pub threads: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Print the coordinate extents per zoom instead of rendering
    #[arg(long, default_value_t = false)]
    pub check: bool,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output_format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    pub collection: String,

    pub input: PathBuf,

    /// attribute=property overrides
    #[arg(long = "map")]
    pub mapping: Vec<String>,
}

#[derive(Debug, Args)]
pub struct TileArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    pub group: String,

    /// Tile in z/x/y format
    pub tile: String,

    /// key=value filter, repeatable
    #[arg(long)]
    pub filter: Vec<String>,

    /// Also write the raw tile bytes to this file
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub output_format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}
