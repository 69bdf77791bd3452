use kestrel_engine::prelude::*;
use kestrel_engine::tracing_config::build_subscriber;

use std::{path::PathBuf, sync::Arc, time::Duration};
use structopt::StructOpt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::util::SubscriberInitExt;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, StructOpt)]
#[structopt(rename_all = "kebab")]
struct Opts {
    /// Config file location
    #[structopt(short, long)]
    config: PathBuf,

    /// Quit message sent to every network on shutdown
    #[structopt(long, default_value = "Leaving")]
    quit_message: String,
}

/// Main entry point.
///
/// Loads the config before starting the runtime, so that a bad config file is
/// reported without anything else happening.
pub fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();
    let config = EngineConfig::load_file(&opts.config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(kestrel_main(config, opts.quit_message))
}

async fn kestrel_main(config: EngineConfig, quit_message: String) -> Result<(), anyhow::Error> {
    build_subscriber(config.log.clone())?.init();

    let bus = Arc::new(EventBus::new());
    bus.subscribe(WILDCARD, |event: &Event| match serde_json::to_string(event) {
        Ok(json) => tracing::debug!(target: "kestrel::events", "{}", json),
        Err(e) => tracing::warn!("couldn't serialise {} event: {}", event.event_type, e),
    });

    // History lives for as long as the process does
    let store = Arc::new(MemoryPersistence::new());
    for network in &config.networks {
        let id = network.identity.id;
        for channel in &network.autojoin {
            store.upsert_channel(id, channel)?;
            store.set_channel_auto_join(id, channel, true)?;
        }
    }

    let orchestrator = Orchestrator::new(
        config.settings.clone(),
        Arc::new(TcpConnector::new()),
        Arc::clone(&bus),
        store,
    );

    let identities = config.networks.into_iter().map(|n| n.identity).collect();
    let cancel = CancellationToken::new();
    let connecting = orchestrator.auto_connect(identities, cancel.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    cancel.cancel();
    for handle in &connecting {
        handle.abort();
    }
    for result in futures::future::join_all(connecting).await {
        match result {
            Err(e) if !e.is_cancelled() => tracing::error!("auto-connect task failed: {}", e),
            _ => (),
        }
    }

    let sessions = orchestrator.sessions();
    orchestrator.disconnect_all(Some(&quit_message));

    // Let the QUITs reach the wire before the runtime goes away
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while sessions.iter().any(|s| s.is_connected()) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!("some connections did not close in time");
    }

    Ok(())
}
