//! Veriscan agent - ADB-backed device diagnostic scanner
//!
//! Drives one full diagnostic scan over a connected device:
//! - Concurrent subsystem probes on a bounded worker pool
//! - Continuous background metric sampling for the scan's duration
//! - Extended snapshot analysis in whatever scan budget remains
//! - Subsystem scoring, composite health aggregation and a text report

mod channel;
mod config;
mod probes;
mod report;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use veriscan_core::extended::{snapshots_to_series, ExtendedSampler};
use veriscan_core::health::aggregate;
use veriscan_core::sampler::Sampler;
use veriscan_core::scheduler::{run_all, ProgressEvent};
use veriscan_core::scoring::score_all;
use veriscan_core::stats::summarize;

use channel::AdbChannel;
use config::ScanConfig;

/// Minimum leftover budget worth spending on extended analysis.
const EXTENDED_THRESHOLD: Duration = Duration::from_secs(60);
/// Budget tail reserved for aggregation and report generation.
const REPORT_RESERVE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = ScanConfig::load()
        .await
        .context("Failed to load configuration")?;
    let channel: probes::Channel = Arc::new(
        AdbChannel::new(&config.device.command)
            .context("Invalid device channel configuration")?,
    );

    let scan_id = Uuid::new_v4().to_string();
    let scan_start = Instant::now();
    info!(scan_id = %scan_id, workers = config.scheduler.max_workers, "diagnostic scan starting");

    // Background monitoring runs alongside the probe batch.
    let monitor = Sampler::start(
        probes::monitor_probes(&channel, config.command_timeout()),
        config.sample_period(),
        config.monitor_duration(),
    );

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
    let progress_logger = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match event {
                ProgressEvent::TaskStarted { task } => info!(task, "probe started"),
                ProgressEvent::TaskCompleted { task, completed, total } => {
                    info!(task, completed, total, "probe completed");
                }
            }
        }
    });

    let tasks = probes::probe_tasks(&channel, config.task_timeout(), config.command_timeout());
    let results = run_all(
        tasks,
        config.scheduler.max_workers,
        config.overall_timeout(),
        Some(progress_tx),
    )
    .await?;
    let _ = progress_logger.await;

    let (series, data_points) = monitor.stop().await;
    let monitor_stats = summarize(&series);
    info!(
        samples = data_points,
        metrics = monitor_stats.len(),
        "continuous monitoring complete"
    );

    // Leftover scan budget goes to extended analysis, keeping a reserve for
    // the report itself.
    let remaining = config.scan_budget().saturating_sub(scan_start.elapsed());
    let extended_stats = if remaining > EXTENDED_THRESHOLD {
        info!(remaining_secs = remaining.as_secs(), "running extended analysis");
        let sampler = ExtendedSampler::new(probes::snapshot_probe(
            channel.clone(),
            config.command_timeout(),
        ));
        let snapshots = sampler
            .run(remaining - REPORT_RESERVE, config.extended_period())
            .await;
        summarize(&snapshots_to_series(&snapshots))
    } else {
        BTreeMap::new()
    };

    let scores = score_all(&results);
    let health = aggregate(&scores);

    let rendered = report::render(&report::ReportContext {
        scan_id: &scan_id,
        duration: scan_start.elapsed(),
        data_points,
        results: &results,
        scores: &scores,
        health: &health,
        monitor_stats: &monitor_stats,
        extended_stats: &extended_stats,
    });
    println!("{rendered}");

    if let Some(path) = &config.report.output_path {
        match tokio::fs::write(path, &rendered).await {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(e) => warn!(path = %path.display(), "failed to write report: {e}"),
        }
    }

    info!(
        score = health.score,
        status = health.status.label(),
        duration_secs = scan_start.elapsed().as_secs(),
        "scan complete"
    );
    Ok(())
}
