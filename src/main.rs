use std::error::Error;

use climatix_local::{
    CONFIG_VERSION, VERSION,
    config::{self, ClimatixConfig},
    poller::{HostPoller, PointEvent, PointUpdate},
    protocol::ProtocolClient,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = config::config_path();
    info!("climatix-local v{VERSION}, config {} (v{CONFIG_VERSION})", path.display());
    let cfg = ClimatixConfig::from_file(&path)?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    tokio::spawn(log_events(event_rx));

    let mut pollers = Vec::new();
    for host in &cfg.hosts {
        let bundle = match host.load_bundle() {
            Ok(b) => b,
            Err(e) => {
                error!("host {}: {e}", host.name);
                None
            }
        };

        let entities: Vec<_> = host
            .build_entities(bundle.as_ref())
            .into_iter()
            .zip(&host.entities)
            .filter_map(|(res, spec)| match res {
                Ok(entity) => Some(entity),
                Err(e) => {
                    error!("host {}: entity {}: {e}", host.name, spec.key());
                    None
                }
            })
            .collect();

        let client = match ProtocolClient::new(host.connection()) {
            Ok(c) => c,
            Err(e) => {
                error!("host {}: creating client: {e}", host.name);
                continue;
            }
        };

        info!("host {}: polling {} entities", host.name, entities.len());
        let poller = HostPoller::new(host.poller_config(), client, entities, event_tx.clone());
        pollers.push(poller.spawn());
    }

    if pollers.is_empty() {
        warn!("no hosts to poll");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for (handle, task) in pollers {
        drop(handle);
        if let Err(e) = task.await {
            error!("poller task: {e}");
        }
    }

    Ok(())
}

async fn log_events(mut rx: mpsc::Receiver<PointEvent>) {
    while let Some(event) = rx.recv().await {
        match event.update {
            PointUpdate::Available(reading) => info!("{} = {reading:?} at {}", event.entity, event.timestamp),
            PointUpdate::Unavailable => warn!("{} unavailable", event.entity),
        }
    }
}
