//! Supervisor: wires the configured source adapter to the run pipeline,
//! installs signal handlers and drives the main loop to a graceful stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

use crate::config::{Settings, StreamerName};
use crate::consumer::{KafkaConsumer, PollingConsumer};
use crate::error::Result;
use crate::pipeline::RunPipeline;
use crate::port::PortClient;
use crate::schemas::mapping;

/// Run the agent until a signal arrives or the adapter gives up.
pub async fn run(settings: Settings) -> Result<()> {
    let settings = Arc::new(settings);
    let mappings = Arc::new(mapping::load_mappings(
        &settings.control_the_payload_config_path,
    )?);
    info!(
        count = mappings.len(),
        path = %settings.control_the_payload_config_path.display(),
        "loaded payload mappings"
    );

    let port = Arc::new(PortClient::new(settings.clone())?);
    port.patch_org_streamer_setting(settings.streamer_name.as_str())
        .await;

    let pipeline = Arc::new(RunPipeline::new(
        settings.clone(),
        port.clone(),
        mappings,
    )?);

    let running = Arc::new(AtomicBool::new(true));
    spawn_signal_handler(running.clone())?;

    info!(streamer = settings.streamer_name.as_str(), "starting streaming");
    match settings.streamer_name {
        StreamerName::Kafka => {
            let consumer =
                KafkaConsumer::new(settings.clone(), port, pipeline, running.clone()).await?;
            consumer.run().await
        }
        StreamerName::Polling => {
            let consumer = PollingConsumer::new(settings.clone(), port, pipeline, running.clone());
            consumer.run().await
        }
    }
}

/// SIGINT/SIGTERM flip the shared flag; the adapter loops observe it
/// between iterations, never mid-request.
fn spawn_signal_handler(running: Arc<AtomicBool>) -> Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())
        .map_err(|e| crate::error::Error::Config(format!("failed to install handler: {e}")))?;
    let mut terminate = signal(SignalKind::terminate())
        .map_err(|e| crate::error::Error::Config(format!("failed to install handler: {e}")))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        info!("exiting gracefully...");
        running.store(false, Ordering::SeqCst);
    });
    Ok(())
}
