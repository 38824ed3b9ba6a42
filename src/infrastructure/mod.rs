// Infrastructure for threadtrace: passes, export, storage wiring, config, logging.

pub mod concurrency;
pub mod config;
pub mod exporter;
pub mod graph_loader;
pub mod logging;
pub mod passes;
