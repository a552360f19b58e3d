//! Background continuous sampler
//!
//! Runs a fixed set of lightweight metric probes on a period, appending
//! timestamped readings to per-metric series. The sampler owns its series
//! exclusively while running; `stop()` sets the cooperative stop flag and
//! joins the loop, so the series is fully quiesced before the statistics
//! reducer ever sees it. Cancellation latency is bounded by the period, not
//! instantaneous.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{MetricSample, MetricSeries, MetricValue};

/// A lightweight periodic metric probe. Returns the raw reading, or `None`
/// when the device yielded nothing usable this tick.
#[derive(Clone)]
pub struct MetricProbe {
    pub name: String,
    run: Arc<dyn Fn() -> BoxFuture<'static, Option<String>> + Send + Sync>,
}

impl MetricProbe {
    pub fn new<F, Fut>(name: &str, run: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<String>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            run: Arc::new(move || run().boxed()),
        }
    }
}

pub struct Sampler;

/// Control handle for a running sampler: cooperative stop flag plus the
/// joinable loop task. State is owned here, never ambient globals.
pub struct SamplerHandle {
    stop: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
    task: JoinHandle<MetricSeries>,
}

impl Sampler {
    /// Start sampling `metrics` every `period` for at most `duration`.
    pub fn start(metrics: Vec<MetricProbe>, period: Duration, duration: Duration) -> SamplerHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let samples = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(sampling_loop(
            metrics,
            period,
            duration,
            stop.clone(),
            samples.clone(),
        ));
        SamplerHandle { stop, samples, task }
    }
}

impl SamplerHandle {
    /// Samples collected so far, process-wide for this sampler instance.
    pub fn samples_collected(&self) -> u64 {
        self.samples.load(Ordering::SeqCst)
    }

    /// Request a stop and join the loop. Returns the quiesced series and the
    /// final sample count; after this the series is read-only by contract.
    pub async fn stop(self) -> (MetricSeries, u64) {
        self.stop.store(true, Ordering::SeqCst);
        let series = self.task.await.unwrap_or_default();
        (series, self.samples.load(Ordering::SeqCst))
    }
}

async fn sampling_loop(
    metrics: Vec<MetricProbe>,
    period: Duration,
    duration: Duration,
    stop: Arc<AtomicBool>,
    samples: Arc<AtomicU64>,
) -> MetricSeries {
    let mut series = MetricSeries::new();
    let deadline = Instant::now() + duration;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(metrics = metrics.len(), ?period, ?duration, "continuous sampler started");

    loop {
        ticker.tick().await;
        // Stop flag is checked once per period (cooperative cancellation).
        if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
            break;
        }

        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;

        // Probe every metric independently: a slow or failing probe is bounded
        // by the period and cannot block or drop its siblings in this tick.
        let tick = metrics.iter().map(|metric| {
            let name = metric.name.clone();
            let run = metric.run.clone();
            async move {
                let reading = match tokio::time::timeout(period, run()).await {
                    Ok(reading) => reading,
                    Err(_) => None,
                };
                (name, reading)
            }
        });

        for (name, reading) in join_all(tick).await {
            let Some(raw) = reading else { continue };
            if raw.trim().is_empty() {
                continue;
            }
            series.entry(name.clone()).or_default().push(MetricSample {
                metric: name,
                timestamp,
                value: MetricValue::classify(&raw),
            });
            samples.fetch_add(1, Ordering::SeqCst);
        }
    }

    debug!(
        samples = samples.load(Ordering::SeqCst),
        metrics = series.len(),
        "continuous sampler stopped"
    );
    series
}
