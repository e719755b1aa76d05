//! HTTP long-polling source adapter.
//!
//! Claim → ack → process, in claim order. A run is only processed after its
//! ack succeeds with a non-zero count; losing the ack race (`ackedCount ==
//! 0`) means another consumer owns the run. A processing failure triggers
//! one best-effort FAILURE status report and never blocks later runs.
//! Top-level failures back off exponentially with jitter; after
//! `POLLING_MAX_FAILURE_DURATION_SECONDS` of continuous failure the adapter
//! gives up and the process exits non-zero.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{PollingSettings, Settings};
use crate::error::{Error, Result};
use crate::pipeline::EventProcessor;
use crate::port::PortClient;
use crate::schemas::events::EventOrigin;

/// Exponential backoff with uniform jitter.
///
/// `next = initial` from idle, else `min(prev * factor, max)`; the slept
/// duration adds `U[0, next * jitter_factor]`. Any successful claim resets
/// to idle.
#[derive(Debug)]
pub struct Backoff {
    current: f64,
    initial: f64,
    max: f64,
    factor: f64,
    jitter_factor: f64,
}

impl Backoff {
    pub fn new(settings: &PollingSettings) -> Self {
        Self {
            current: 0.0,
            initial: settings.initial_backoff_seconds,
            max: settings.max_backoff_seconds,
            factor: settings.backoff_factor,
            jitter_factor: settings.backoff_jitter_factor,
        }
    }

    /// Advance to the next backoff step and return the duration to sleep.
    pub fn next_delay(&mut self) -> Duration {
        self.current = if self.current == 0.0 {
            self.initial
        } else {
            (self.current * self.factor).min(self.max)
        };
        let jitter = rand::thread_rng().gen_range(0.0..=self.current * self.jitter_factor);
        Duration::from_secs_f64(self.current + jitter)
    }

    pub fn reset(&mut self) {
        if self.current > 0.0 {
            info!("backoff reset, polling recovered");
        }
        self.current = 0.0;
    }

    pub fn current_seconds(&self) -> f64 {
        self.current
    }
}

pub struct PollingConsumer {
    settings: Arc<Settings>,
    port: Arc<PortClient>,
    processor: Arc<dyn EventProcessor>,
    running: Arc<AtomicBool>,
}

impl PollingConsumer {
    pub fn new(
        settings: Arc<Settings>,
        port: Arc<PortClient>,
        processor: Arc<dyn EventProcessor>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            settings,
            port,
            processor,
            running,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let mut backoff = Backoff::new(&self.settings.polling);
        let mut first_failure_time: Option<Instant> = None;

        while self.running.load(Ordering::SeqCst) {
            match self.poll_once().await {
                Ok(claimed_count) => {
                    backoff.reset();
                    first_failure_time = None;

                    if claimed_count < self.settings.polling.runs_batch_size
                        && self.running.load(Ordering::SeqCst)
                    {
                        tokio::time::sleep(self.settings.polling.interval).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "error during HTTP polling");
                    let since = *first_failure_time.get_or_insert_with(Instant::now);
                    if since.elapsed() > self.settings.polling.max_failure_duration {
                        let seconds = self.settings.polling.max_failure_duration.as_secs();
                        error!("polling has been failing for {seconds} seconds, exiting");
                        self.running.store(false, Ordering::SeqCst);
                        return Err(Error::FailureWindowExceeded(seconds));
                    }
                    let delay = backoff.next_delay();
                    info!(
                        "backing off for {:.1} seconds (base: {:.1}s)",
                        delay.as_secs_f64(),
                        backoff.current_seconds()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        info!("polling consumer stopped");
        Ok(())
    }

    /// One claim → ack → process round. Returns how many runs were claimed
    /// so the caller can decide whether to sleep before the next round.
    async fn poll_once(&self) -> Result<usize> {
        if self.settings.detailed_logging {
            debug!("polling for pending runs");
        }
        let runs = self
            .port
            .claim_pending_runs(self.settings.polling.runs_batch_size)
            .await?;
        let claimed_count = runs.len();
        if claimed_count == 0 {
            debug!("no pending runs found");
            return Ok(0);
        }
        info!(count = claimed_count, "claimed pending runs");

        let mut acked_runs = Vec::new();
        for run in runs {
            let Some(run_id) = run_document_id(&run) else {
                error!("claimed run is missing an id field");
                continue;
            };
            match self.port.ack_runs(&[run_id.clone()]).await {
                Ok(0) => {
                    // Lost the race; another consumer claimed it.
                    warn!(run_id = %run_id, "failed to ack run");
                }
                Ok(_) => {
                    info!(run_id = %run_id, "acked run");
                    acked_runs.push((run_id, run));
                }
                Err(e) => {
                    // Not acked: the control plane re-surfaces the run on a
                    // later claim.
                    error!(run_id = %run_id, error = %e, "failed to ack run");
                }
            }
        }

        for (run_id, run) in acked_runs {
            info!(run_id = %run_id, "processing run");
            if let Err(e) = self.process_run(&run_id, run).await {
                error!(run_id = %run_id, error = %e, "failed to process run");
                let patch = json!({
                    "status": "FAILURE",
                    "summary": "Agent failed to process the run",
                });
                if let Err(report_error) = self.port.report_run_status(&run_id, &patch).await {
                    error!(
                        run_id = %run_id,
                        error = %report_error,
                        "failed to report failure status for run"
                    );
                }
            }
        }

        Ok(claimed_count)
    }

    async fn process_run(&self, run_id: &str, run: Value) -> Result<()> {
        let event = synthesize_event(run_id, &run)?;
        self.processor.process(event, EventOrigin::ActionRun).await
    }
}

/// Claimed run documents carry their id under `id` or `_id` depending on
/// the API version.
pub fn run_document_id(run: &Value) -> Option<String> {
    run.get("id")
        .or_else(|| run.get("_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Shape a claimed run document like a webhook event so the pipeline treats
/// both transports identically: the run's `payload.body` becomes the event,
/// with the invocation descriptor, its headers and the run id grafted into
/// the well-known locations.
pub fn synthesize_event(run_id: &str, run: &Value) -> Result<Value> {
    let payload = run
        .get("payload")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::InvalidEvent(format!("run {run_id} has no payload")))?;

    let invocation_method = json!({
        "type": payload.get("type").cloned().unwrap_or(Value::Null),
        "url": payload.get("url").cloned().unwrap_or(Value::Null),
        "agent": payload.get("agent").cloned().unwrap_or(Value::Bool(false)),
        "synchronized": payload.get("synchronized").cloned().unwrap_or(Value::Bool(false)),
        "method": payload.get("method").cloned().unwrap_or_else(|| json!("POST")),
        "headers": payload.get("headers").cloned().unwrap_or_else(|| json!({})),
    });

    let mut event = payload
        .get("body")
        .cloned()
        .unwrap_or_else(|| json!({}));
    if !event.is_object() {
        return Err(Error::InvalidEvent(format!(
            "run {run_id} payload body is not an object"
        )));
    }

    event
        .as_object_mut()
        .expect("checked above")
        .insert("headers".to_string(), invocation_method["headers"].clone());

    let payload_slot = ensure_object(&mut event, "payload");
    let action_slot = ensure_object(payload_slot, "action");
    action_slot
        .as_object_mut()
        .expect("just ensured")
        .insert("invocationMethod".to_string(), invocation_method);

    let context_slot = ensure_object(&mut event, "context");
    context_slot
        .as_object_mut()
        .expect("just ensured")
        .insert("runId".to_string(), json!(run_id));

    Ok(event)
}

fn ensure_object<'a>(parent: &'a mut Value, key: &str) -> &'a mut Value {
    let map = parent.as_object_mut().expect("parent is an object");
    if !map.get(key).map(Value::is_object).unwrap_or(false) {
        map.insert(key.to_string(), json!({}));
    }
    map.get_mut(key).expect("just inserted")
}
