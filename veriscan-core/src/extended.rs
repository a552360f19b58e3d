//! Extended post-scan sampler
//!
//! Runs strictly after the main probe batch has joined - it reuses the same
//! probing channel, so it never competes with the scheduler. Each pass
//! gathers a heavier snapshot than the continuous sampler and stores it as an
//! independent dated record keyed by its own timestamp, deliberately
//! throttled to a coarse period. The loop stops while at least one full
//! period of budget remains so report generation is never starved.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{MetricSample, MetricSeries, MetricValue};

/// One dated snapshot: an open map of metric name to reading.
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

pub struct ExtendedSampler {
    probe: Box<dyn Fn() -> BoxFuture<'static, Snapshot> + Send + Sync>,
}

impl ExtendedSampler {
    pub fn new<F, Fut>(probe: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Snapshot> + Send + 'static,
    {
        Self {
            probe: Box::new(move || probe().boxed()),
        }
    }

    /// Fill `remaining_budget` with snapshots taken every `sample_period`.
    pub async fn run(
        &self,
        remaining_budget: Duration,
        sample_period: Duration,
    ) -> BTreeMap<String, Snapshot> {
        let mut snapshots = BTreeMap::new();
        let deadline = Instant::now() + remaining_budget;
        info!(?remaining_budget, ?sample_period, "extended sampling started");

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < sample_period {
                // Reserve the budget tail for final aggregation work.
                break;
            }

            let timestamp = chrono::Utc::now().timestamp();
            let snapshot = (self.probe)().await;
            if !snapshot.is_empty() {
                snapshots.insert(format!("sample_{timestamp}"), snapshot);
            }
            tokio::time::sleep(sample_period).await;
        }

        debug!(snapshots = snapshots.len(), "extended sampling finished");
        snapshots
    }
}

/// Fold the numeric top-level entries of a snapshot collection into a metric
/// series so the statistics reducer applies to both sampler shapes.
pub fn snapshots_to_series(snapshots: &BTreeMap<String, Snapshot>) -> MetricSeries {
    let mut series = MetricSeries::new();
    for (key, snapshot) in snapshots {
        let Some(timestamp) = key.strip_prefix("sample_").and_then(|ts| ts.parse::<f64>().ok())
        else {
            continue;
        };
        for (metric, value) in snapshot {
            let value = match value {
                serde_json::Value::Number(n) => n.as_f64().map(MetricValue::Number),
                serde_json::Value::String(s) => match MetricValue::classify(s) {
                    MetricValue::Number(n) => Some(MetricValue::Number(n)),
                    MetricValue::Text(_) => None,
                },
                _ => None,
            };
            let Some(value) = value else { continue };
            series.entry(metric.clone()).or_default().push(MetricSample {
                metric: metric.clone(),
                timestamp,
                value,
            });
        }
    }
    series
}
