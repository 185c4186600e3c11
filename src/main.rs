//! SetuMAV - MAVLink routing daemon

use setu_mav::dialect::common::CommonDialect;
use setu_mav::{Config, Error, Result, Router, RouterConfig, SubscriptionCache};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("SetuMAV v0.2.0 starting...");

    // Get config path from args or default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/setu-mav.toml".to_string());
    log::info!("Using config: {}", config_path);
    let config = Config::load(&config_path)?;

    let transports = config.transports()?;
    if transports.is_empty() {
        log::warn!("no connections configured; only local subscribers will see traffic");
    }
    for spec in &transports {
        log::info!("Transport: {}", spec);
    }

    let cache = SubscriptionCache::new();
    let mut router = Router::start(
        RouterConfig {
            dialect: Some(Arc::new(CommonDialect)),
            system: config.router.system,
            component: config.router.component,
            echo_local_broadcast: config.router.echo_local_broadcast,
            transports,
        },
        cache,
    )?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("error setting Ctrl-C handler: {}", e)))?;

    log::info!(
        "SetuMAV running as system {} component {}. Press Ctrl-C to stop.",
        config.router.system,
        config.router.component
    );

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    router.shutdown();
    log::info!("SetuMAV stopped");
    Ok(())
}
