//! `tinykv` — single-threaded, in-memory key-value server with a sorted-set
//! command language. See `lib.rs` and the per-module docs for the design.

use tinykv::{Config, KeySpace};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::default();
    if let Err(e) = tinykv::server::run(cfg, KeySpace::new()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
