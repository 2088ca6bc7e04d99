pub mod cli;
pub mod config;
pub mod distill;
pub mod error;
pub mod load;
pub mod output;
pub mod registry;
pub mod server;
pub mod store;
pub mod tiles;
