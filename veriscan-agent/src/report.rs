//! Plain-text diagnostic report
//!
//! Renders everything one scan produced into a single human-readable
//! document: identity header, composite verdict, per-subsystem detail,
//! monitoring statistics and a closing technical summary. Rendering is pure;
//! where the report lands (stdout, file) is the caller's concern.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::Duration;

use serde_json::Value;

use veriscan_core::models::{CompositeHealth, ScanResults, Subsystem, SubsystemScore};
use veriscan_core::stats::MetricStats;

/// Everything the renderer needs, borrowed from the scan pipeline.
pub struct ReportContext<'a> {
    pub scan_id: &'a str,
    pub duration: Duration,
    pub data_points: u64,
    pub results: &'a ScanResults,
    pub scores: &'a HashMap<Subsystem, SubsystemScore>,
    pub health: &'a CompositeHealth,
    pub monitor_stats: &'a BTreeMap<String, MetricStats>,
    pub extended_stats: &'a BTreeMap<String, MetricStats>,
}

const RULE: &str = "====================================================================================================";
const SECTION_RULE: &str = "------------------------------------------------------------";

pub fn render(ctx: &ReportContext) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "VERISCAN DEVICE DIAGNOSTIC REPORT");
    let _ = writeln!(out, "Scan ID: {}", ctx.scan_id);
    let _ = writeln!(
        out,
        "Generation Time: {}",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Total Scan Duration: {:.2} seconds", ctx.duration.as_secs_f64());
    let _ = writeln!(out, "Data Points Collected: {}", ctx.data_points);
    let _ = writeln!(out, "{RULE}");

    render_device_identity(&mut out, ctx.results);
    render_composite(&mut out, ctx.health);
    render_subsystems(&mut out, ctx.scores);
    render_metric_stats(&mut out, "CONTINUOUS MONITORING STATISTICS", ctx.monitor_stats);
    render_metric_stats(&mut out, "EXTENDED ANALYSIS STATISTICS", ctx.extended_stats);
    render_probe_failures(&mut out, ctx.results);
    render_technical_summary(&mut out, ctx);

    out
}

fn render_device_identity(out: &mut String, results: &ScanResults) {
    let Some(hardware) = results.get("hardware").and_then(|o| o.result()) else {
        return;
    };

    let _ = writeln!(out, "\nDEVICE IDENTIFICATION");
    let _ = writeln!(out, "{SECTION_RULE}");
    let field = |payload: &Value, pointer: &str| {
        payload
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string()
    };
    let _ = writeln!(out, "Manufacturer: {}", field(hardware, "/device_info/manufacturer"));
    let _ = writeln!(out, "Brand: {}", field(hardware, "/device_info/brand"));
    let _ = writeln!(out, "Model: {}", field(hardware, "/device_info/model"));
    let _ = writeln!(out, "Hardware Platform: {}", field(hardware, "/device_info/hardware"));
    let _ = writeln!(out, "Display: {}", field(hardware, "/display/resolution"));

    if let Some(partitions) = hardware.get("storage_analysis").and_then(Value::as_array) {
        if !partitions.is_empty() {
            let _ = writeln!(out, "\nStorage ({} filesystems):", partitions.len());
            for partition in partitions.iter().take(5) {
                let number = |key: &str| {
                    partition.get(key).and_then(Value::as_f64).unwrap_or(0.0)
                };
                let _ = writeln!(
                    out,
                    "  {}: {:.1}GB/{:.1}GB ({:.1}% used)",
                    partition
                        .get("mount_point")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown"),
                    number("used_gb"),
                    number("total_gb"),
                    number("usage_percent"),
                );
            }
        }
    }
}

fn render_composite(out: &mut String, health: &CompositeHealth) {
    let _ = writeln!(out, "\nCOMPOSITE SYSTEM HEALTH");
    let _ = writeln!(out, "{SECTION_RULE}");
    let _ = writeln!(out, "Overall Status: {}", health.status.label());
    let _ = writeln!(out, "Health Score: {:.1}/100", health.score);
    let _ = writeln!(out, "Reliability Index: {:.0}%", health.reliability_index);
    let _ = writeln!(out, "Critical Issues: {}", health.critical_issue_count);
    let _ = writeln!(out, "Warnings: {}", health.warning_count);

    let _ = writeln!(out, "\nComponent Scores:");
    for (component, score) in &health.component_scores {
        let _ = writeln!(out, "  {component:<12} {score:>6.1}/100");
    }

    if !health.critical_findings.is_empty() {
        let _ = writeln!(out, "\nCritical Findings:");
        for finding in &health.critical_findings {
            let _ = writeln!(out, "  ! {finding}");
        }
    }

    let _ = writeln!(out, "\nRecommendations:");
    for recommendation in &health.recommendations {
        let _ = writeln!(out, "  - {recommendation}");
    }
}

fn render_subsystems(out: &mut String, scores: &HashMap<Subsystem, SubsystemScore>) {
    let _ = writeln!(out, "\nSUBSYSTEM DETAIL");
    let _ = writeln!(out, "{SECTION_RULE}");

    for subsystem in Subsystem::ALL {
        let Some(score) = scores.get(&subsystem) else {
            let _ = writeln!(out, "{}: no data (probe failed or timed out)", subsystem.name());
            continue;
        };
        let _ = writeln!(out, "{}: {:.1}/100", subsystem.name(), score.score);
        for issue in &score.critical_issues {
            let _ = writeln!(out, "  ! {issue}");
        }
        for finding in &score.critical_findings {
            let _ = writeln!(out, "  ! {finding}");
        }
        for warning in &score.warnings {
            let _ = writeln!(out, "  * {warning}");
        }
    }
}

fn render_metric_stats(out: &mut String, title: &str, stats: &BTreeMap<String, MetricStats>) {
    if stats.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}");
    let _ = writeln!(out, "{SECTION_RULE}");
    for (metric, summary) in stats {
        let _ = writeln!(
            out,
            "{}: {} samples, min {:.2}, max {:.2}, avg {:.2}, trend {:?}",
            metric, summary.sample_count, summary.min, summary.max, summary.mean, summary.trend,
        );
        if let (Some(variance), Some(stability)) = (summary.variance, summary.stability) {
            let _ = writeln!(out, "  variance {variance:.2} ({stability:?})");
        }
    }
}

fn render_probe_failures(out: &mut String, results: &ScanResults) {
    let mut failures: Vec<_> = results
        .iter()
        .filter_map(|(task, outcome)| outcome.error().map(|record| (task.as_str(), record)))
        .collect();
    if failures.is_empty() {
        return;
    }
    failures.sort_by_key(|(task, _)| *task);

    let _ = writeln!(out, "\nPROBE FAILURES");
    let _ = writeln!(out, "{SECTION_RULE}");
    for (task, record) in failures {
        let partial = if record.partial { " (partial)" } else { "" };
        let _ = writeln!(out, "{task}: {}{partial}", record.message);
    }
}

fn render_technical_summary(out: &mut String, ctx: &ReportContext) {
    let scored = ctx.scores.len();
    let completion_rate = scored as f64 / Subsystem::ALL.len() as f64 * 100.0;

    let _ = writeln!(out, "\nTECHNICAL SUMMARY");
    let _ = writeln!(out, "{SECTION_RULE}");
    let _ = writeln!(
        out,
        "Analysis Completion: {:.1}% ({scored}/{} subsystems scored)",
        completion_rate,
        Subsystem::ALL.len(),
    );
    let _ = writeln!(out, "Monitored Metrics: {}", ctx.monitor_stats.len());
    let _ = writeln!(out, "Extended Metrics: {}", ctx.extended_stats.len());
    let _ = writeln!(out, "{RULE}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use veriscan_core::health::aggregate;
    use veriscan_core::models::{ErrorRecord, ProbeOutcome};

    fn sample_context() -> (ScanResults, HashMap<Subsystem, SubsystemScore>) {
        let mut results = ScanResults::new();
        results.insert(
            "hardware".to_string(),
            ProbeOutcome::Success(json!({
                "device_info": { "manufacturer": "Acme", "model": "Widget-9" },
                "storage_analysis": [
                    { "mount_point": "/data", "used_gb": 3.8, "total_gb": 4.0, "usage_percent": 95.0 }
                ]
            })),
        );
        results.insert(
            "battery".to_string(),
            ProbeOutcome::Failed(ErrorRecord {
                message: "scan deadline exceeded before probe completed".to_string(),
                partial: true,
            }),
        );

        let mut scores = HashMap::new();
        let mut storage = SubsystemScore::new(Subsystem::Storage, 70.0);
        storage
            .warnings
            .push("Storage nearly full: /data".to_string());
        scores.insert(Subsystem::Storage, storage);
        scores.insert(
            Subsystem::Security,
            SubsystemScore::new(Subsystem::Security, 100.0),
        );
        (results, scores)
    }

    #[test]
    fn test_render_covers_all_sections() {
        let (results, scores) = sample_context();
        let health = aggregate(&scores);
        let empty = BTreeMap::new();

        let report = render(&ReportContext {
            scan_id: "3f6b2a",
            duration: Duration::from_secs(614),
            data_points: 833,
            results: &results,
            scores: &scores,
            health: &health,
            monitor_stats: &empty,
            extended_stats: &empty,
        });

        assert!(report.contains("VERISCAN DEVICE DIAGNOSTIC REPORT"));
        assert!(report.contains("Scan ID: 3f6b2a"));
        assert!(report.contains("Manufacturer: Acme"));
        assert!(report.contains("/data: 3.8GB/4.0GB (95.0% used)"));
        assert!(report.contains("Overall Status: CRITICAL"));
        assert!(report.contains("storage: 70.0/100"));
        assert!(report.contains("* Storage nearly full: /data"));
        assert!(report.contains("battery: no data (probe failed or timed out)"));
        assert!(report.contains("battery: scan deadline exceeded before probe completed (partial)"));
        assert!(report.contains("(2/7 subsystems scored)"));
    }

    #[test]
    fn test_empty_stat_sections_are_omitted() {
        let (results, scores) = sample_context();
        let health = aggregate(&scores);
        let empty = BTreeMap::new();

        let report = render(&ReportContext {
            scan_id: "x",
            duration: Duration::from_secs(1),
            data_points: 0,
            results: &results,
            scores: &scores,
            health: &health,
            monitor_stats: &empty,
            extended_stats: &empty,
        });

        assert!(!report.contains("CONTINUOUS MONITORING STATISTICS"));
        assert!(!report.contains("EXTENDED ANALYSIS STATISTICS"));
    }
}
