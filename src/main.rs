use anyhow::{Context, Result};
use pulse::bundle::BundleLoader;
use pulse::config::{load_config, PulseConfig};
use pulse::event::{Event, EventSource, EventType};
use pulse::hub::EventHub;
use pulse::rules::RulesEngine;
use pulse::variant::Variant;
use std::path::Path;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse=info".into()),
        )
        .init();

    info!("Pulse starting...");

    let config_path = std::env::var("PULSE_CONFIG").unwrap_or_else(|_| "pulse.toml".to_string());
    let mut config = if Path::new(&config_path).exists() {
        load_config(&config_path)?
    } else {
        info!(path = %config_path, "No config file, using defaults");
        PulseConfig::default()
    };
    config.apply_env();

    info!(
        response_timeout_ms = config.hub.default_response_timeout_ms,
        max_chain_depth = config.rules.max_chain_depth,
        bundle_url = ?config.bundle.url,
        bundle_path = ?config.bundle.path,
        "Configuration loaded"
    );

    let hub = EventHub::start(config.hub.clone()).context("Failed to start event hub")?;
    let engine = RulesEngine::register(hub.clone(), config.rules.clone());

    // Trace every event flowing through the hub
    hub.register_listener(
        EventType::wildcard(),
        EventSource::wildcard(),
        |event: &Event| debug!(event = %event, depth = event.chain_depth(), "Event observed"),
    );

    if let Some(path) = &config.bundle.path {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rule bundle {}", path.display()))?;
        let document: serde_json::Value =
            serde_json::from_str(&contents).context("Rule bundle is not valid JSON")?;
        let status = engine.load_rules(&Variant::from(document))?;
        info!(rule_count = status.rule_count, "Rules loaded from file");
    } else if let Some(url) = &config.bundle.url {
        let loader = BundleLoader::from_config(&config.bundle);
        match loader.refresh_into(&engine, url).await {
            Ok(status) => info!(rule_count = status.rule_count, "Rules loaded from bundle"),
            Err(e) => warn!(error = %e, "Starting without rules"),
        }
    } else {
        info!("No rule bundle configured");
    }

    info!("Pulse running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    engine.stop();
    hub.shutdown();

    let metrics = hub.metrics();
    info!(
        total_events = metrics.total_events,
        deliveries = metrics.deliveries,
        "Pulse stopped"
    );

    Ok(())
}
