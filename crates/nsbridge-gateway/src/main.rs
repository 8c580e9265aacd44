#![warn(missing_docs)]

//! nsbridge gateway daemon entry point

use std::path::PathBuf;
use std::sync::Arc;

use nsbridge_gateway::config::BridgeConfig;
use nsbridge_gateway::local_fs::LocalNamespace;
use nsbridge_gateway::{Bridge, HandleCache};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => BridgeConfig::from_file(&PathBuf::from(path))?,
        None => BridgeConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    config.validate()?;
    tracing::info!(root = %config.export_root, "nsbridge gateway starting...");

    let bridge = Bridge::new(
        Arc::new(LocalNamespace::new(&config.export_root)),
        Arc::new(HandleCache::new()),
        Arc::new(config.mount_policy()),
    )
    .with_max_name_len(config.max_name_len);

    let (status, root) = bridge.lstat("/");
    match root {
        Some(attr) => tracing::info!(ino = attr.ino, "export root ready"),
        None => tracing::warn!(status, "export root is not accessible"),
    }

    bridge.shutdown();
    Ok(())
}
