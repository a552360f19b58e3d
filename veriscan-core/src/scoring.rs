//! Subsystem scorers
//!
//! Each of the seven subsystems derives its verdict from its own probe
//! payload only, reading a small documented set of well-known keys out of the
//! otherwise opaque map:
//!
//! - battery:     `health_analysis.overall_health_score`, or raw
//!                `charge_full` / `charge_full_design` / `cycle_count` /
//!                `voltage` / `temperature`
//! - performance: `memory_analysis.usage_percent`, `thermal_summary.max_temp`,
//!                `avg_cpu_utilization`
//! - security:    `security_score`
//! - software:    `security_analysis.confidence_score`,
//!                `security_analysis.likely_rooted`
//! - network:     `connectivity_tests.*.status`
//! - storage:     `storage_analysis[].usage_percent`, `[].mount_point`
//! - stability:   `cpu_stress_tests[].completed`, `io_stress_tests[].status`,
//!                `memory_stress_test.stability`
//!
//! The point values and thresholds are fixed report-contract constants.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::models::{ProbeResult, ScanResults, Subsystem, SubsystemScore};

/// Probe task names feeding each subsystem.
const SUBSYSTEM_TASKS: [(&str, Subsystem); 7] = [
    ("battery", Subsystem::Battery),
    ("performance", Subsystem::Performance),
    ("security", Subsystem::Security),
    ("software", Subsystem::Software),
    ("network", Subsystem::Network),
    ("hardware", Subsystem::Storage),
    ("stress_test", Subsystem::Stability),
];

/// Score every subsystem whose probe produced a usable result. Subsystems
/// with a missing or failed probe are simply absent (aggregation gap, not an
/// error).
pub fn score_all(results: &ScanResults) -> HashMap<Subsystem, SubsystemScore> {
    let mut scores = HashMap::new();
    for (task, subsystem) in SUBSYSTEM_TASKS {
        let Some(payload) = results.get(task).and_then(|outcome| outcome.result()) else {
            debug!(task, "no usable probe result, subsystem left unscored");
            continue;
        };
        let score = match subsystem {
            Subsystem::Battery => score_battery(payload),
            Subsystem::Performance => score_performance(payload),
            Subsystem::Security => score_security(payload),
            Subsystem::Software => score_software(payload),
            Subsystem::Network => score_network(payload),
            Subsystem::Storage => score_storage(payload),
            Subsystem::Stability => score_stability(payload),
        };
        scores.insert(subsystem, score);
    }
    scores
}

/// Battery health derived from raw electrical readings:
/// `0.5*capacity_ratio + 0.2*voltage_health - 0.15*thermal_penalty -
/// 0.15*cycle_degradation`, clamped to [0, 100]. Voltage health defaults to
/// 80 when the voltage is unavailable.
#[derive(Debug, Clone, Serialize)]
pub struct BatteryHealth {
    #[serde(rename = "overall_health_score")]
    pub score: f64,
    #[serde(rename = "health_grade")]
    pub grade: &'static str,
    pub capacity_ratio: Option<f64>,
    pub voltage_health: Option<f64>,
    pub thermal_penalty: f64,
    pub cycle_degradation: f64,
    pub recommendations: Vec<String>,
}

pub fn battery_health(
    charge_full: f64,
    charge_full_design: f64,
    cycle_count: f64,
    voltage_mv: f64,
    temperature_raw: f64,
) -> BatteryHealth {
    let capacity_ratio = if charge_full_design > 0.0 {
        Some(charge_full / charge_full_design * 100.0)
    } else {
        None
    };

    let voltage_health = if voltage_mv > 0.0 {
        Some((voltage_mv / 4200.0 * 100.0).min(100.0))
    } else {
        None
    };
    let low_voltage = voltage_mv > 0.0 && voltage_mv < 3500.0;

    // Temperatures come in tenths of a degree from most kernels.
    let temp_celsius = if temperature_raw > 100.0 {
        temperature_raw / 10.0
    } else {
        temperature_raw
    };
    let (hot, thermal_penalty) = if temperature_raw > 0.0 && temp_celsius > 45.0 {
        (true, ((temp_celsius - 45.0) * 2.0).min(30.0))
    } else if temperature_raw > 0.0 && temp_celsius < 0.0 {
        (false, (temp_celsius.abs() * 1.5).min(20.0))
    } else {
        (false, 0.0)
    };

    let cycle_degradation = if cycle_count > 0.0 {
        (cycle_count / 1000.0 * 25.0).min(50.0)
    } else {
        0.0
    };
    let high_cycles = cycle_count > 1500.0;

    let mut overall = match capacity_ratio {
        Some(ratio) => ratio * 0.5,
        None => 100.0,
    };
    overall += voltage_health.unwrap_or(80.0) * 0.2;
    overall -= thermal_penalty * 0.15;
    overall -= cycle_degradation * 0.15;
    let score = overall.clamp(0.0, 100.0);

    let grade = if score >= 90.0 {
        "Excellent"
    } else if score >= 75.0 {
        "Good"
    } else if score >= 60.0 {
        "Fair"
    } else if score >= 40.0 {
        "Poor"
    } else {
        "Critical"
    };

    let mut recommendations = Vec::new();
    if hot {
        recommendations.push("Device running hot - allow cooling".to_string());
    }
    if low_voltage {
        recommendations.push("Low voltage detected - charge immediately".to_string());
    }
    if high_cycles {
        recommendations.push("High cycle count - consider battery replacement".to_string());
    }
    if matches!(capacity_ratio, Some(ratio) if ratio < 70.0) {
        recommendations.push("Significant capacity loss detected".to_string());
    }

    BatteryHealth {
        score,
        grade,
        capacity_ratio,
        voltage_health,
        thermal_penalty,
        cycle_degradation,
        recommendations,
    }
}

pub fn score_battery(payload: &ProbeResult) -> SubsystemScore {
    let health_score = num(payload, &["health_analysis", "overall_health_score"])
        .unwrap_or_else(|| {
            let computed = battery_health(
                num(payload, &["charge_full"]).unwrap_or(0.0),
                num(payload, &["charge_full_design"]).unwrap_or(0.0),
                num(payload, &["cycle_count"]).unwrap_or(0.0),
                num(payload, &["voltage"]).unwrap_or(0.0),
                num(payload, &["temperature"]).unwrap_or(0.0),
            );
            // A payload with no electrical data at all scores the neutral 50.
            if payload.get("charge_full").is_some()
                || payload.get("voltage").is_some()
                || payload.get("temperature").is_some()
            {
                computed.score
            } else {
                50.0
            }
        });

    let mut score = SubsystemScore::new(Subsystem::Battery, health_score);
    if health_score < 40.0 {
        score
            .critical_findings
            .push("Battery health critically degraded".to_string());
        score
            .recommendations
            .push("Immediate battery replacement recommended".to_string());
    } else if health_score < 70.0 {
        score.warnings.push("Battery showing signs of wear".to_string());
        score
            .recommendations
            .push("Monitor battery performance closely".to_string());
    }
    score
}

pub fn score_performance(payload: &ProbeResult) -> SubsystemScore {
    let mut points = 70.0;
    let mut score = SubsystemScore::new(Subsystem::Performance, points);

    let memory_usage = num(payload, &["memory_analysis", "usage_percent"]).unwrap_or(0.0);
    if memory_usage > 90.0 {
        points -= 25.0;
        score
            .critical_issues
            .push("Critical memory usage detected".to_string());
        score
            .recommendations
            .push("Close unnecessary applications to free memory".to_string());
    } else if memory_usage > 80.0 {
        points -= 10.0;
        score.warnings.push("High memory usage".to_string());
    }

    let max_temp = num(payload, &["thermal_summary", "max_temp"]).unwrap_or(0.0);
    if max_temp > 50.0 {
        points -= 20.0;
        score
            .critical_issues
            .push("Device overheating detected".to_string());
        score
            .recommendations
            .push("Allow device to cool down immediately".to_string());
    } else if max_temp > 45.0 {
        points -= 10.0;
        score.warnings.push("Device running warm".to_string());
    }

    let avg_utilization = num(payload, &["avg_cpu_utilization"]).unwrap_or(0.0);
    if avg_utilization > 90.0 {
        points -= 15.0;
        score.warnings.push("High CPU utilization".to_string());
    }

    score.score = points.max(0.0);
    score
}

pub fn score_security(payload: &ProbeResult) -> SubsystemScore {
    let security_score = num(payload, &["security_score"]).unwrap_or(50.0);
    let mut score = SubsystemScore::new(Subsystem::Security, security_score);

    if security_score < 50.0 {
        score
            .critical_findings
            .push("Multiple security vulnerabilities detected".to_string());
        score
            .recommendations
            .push("Update system and enable security features".to_string());
    } else if security_score < 75.0 {
        score
            .warnings
            .push("Security configuration suboptimal".to_string());
    }
    score
}

pub fn score_software(payload: &ProbeResult) -> SubsystemScore {
    let mut points = 75.0;
    let mut score = SubsystemScore::new(Subsystem::Software, points);

    let likely_rooted = payload
        .pointer("/security_analysis/likely_rooted")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    let confidence = num(payload, &["security_analysis", "confidence_score"]).unwrap_or(0.0);

    if likely_rooted {
        if confidence > 60.0 {
            points -= 40.0;
            score
                .critical_findings
                .push("Device appears to be rooted with high confidence".to_string());
            score
                .recommendations
                .push("Consider security implications of root access".to_string());
        } else if confidence > 20.0 {
            points -= 20.0;
            score.warnings.push("Possible root access detected".to_string());
        }
    }

    score.score = points;
    score
}

pub fn score_network(payload: &ProbeResult) -> SubsystemScore {
    let mut points = 80.0;
    let mut score = SubsystemScore::new(Subsystem::Network, points);

    if let Some(tests) = payload.get("connectivity_tests").and_then(|t| t.as_object()) {
        let total = tests.len();
        if total > 0 {
            let failed = tests
                .values()
                .filter(|test| {
                    test.get("status").and_then(|s| s.as_str()) == Some("Failed")
                })
                .count();
            let success_rate = (total - failed) as f64 / total as f64;
            points = (success_rate * 100.0).floor();

            if success_rate < 0.5 {
                score
                    .critical_issues
                    .push("Multiple network connectivity failures".to_string());
            } else if success_rate < 0.8 {
                score
                    .warnings
                    .push("Some network connectivity issues".to_string());
            }
        }
    }

    score.score = points;
    score
}

pub fn score_storage(payload: &ProbeResult) -> SubsystemScore {
    let mut points = 100.0;
    let mut score = SubsystemScore::new(Subsystem::Storage, points);

    let partitions = payload
        .get("storage_analysis")
        .and_then(|s| s.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for partition in partitions {
        let usage = num(partition, &["usage_percent"]).unwrap_or(0.0);
        let mount_point = partition
            .get("mount_point")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown");
        if usage > 95.0 {
            points -= 30.0;
            score
                .critical_findings
                .push(format!("Storage critically full: {mount_point}"));
        } else if usage > 85.0 {
            points -= 15.0;
            score
                .warnings
                .push(format!("Storage nearly full: {mount_point}"));
        }
    }

    score.score = points.max(0.0);
    score
}

pub fn score_stability(payload: &ProbeResult) -> SubsystemScore {
    let mut points = 100.0;
    let mut score = SubsystemScore::new(Subsystem::Stability, points);

    let cpu_failures = payload
        .get("cpu_stress_tests")
        .and_then(|t| t.as_array())
        .map(|tests| {
            tests
                .iter()
                .filter(|test| {
                    test.get("completed").and_then(|c| c.as_bool()) != Some(true)
                })
                .count()
        })
        .unwrap_or(0);
    if cpu_failures > 0 {
        points -= cpu_failures as f64 * 15.0;
        score
            .warnings
            .push(format!("{cpu_failures} CPU stress test failures"));
    }

    let io_failures = payload
        .get("io_stress_tests")
        .and_then(|t| t.as_array())
        .map(|tests| {
            tests
                .iter()
                .filter(|test| {
                    test.get("status").and_then(|s| s.as_str()) != Some("Completed")
                })
                .count()
        })
        .unwrap_or(0);
    if io_failures > 0 {
        points -= io_failures as f64 * 10.0;
        score
            .warnings
            .push(format!("{io_failures} I/O performance issues"));
    }

    let memory_stable = payload
        .pointer("/memory_stress_test/stability")
        .and_then(|s| s.as_str())
        == Some("Stable");
    if !memory_stable {
        points -= 20.0;
        score
            .warnings
            .push("Memory stability concerns detected".to_string());
    }

    score.score = points.max(0.0);
    score
}

/// Walk nested keys and read the value as a number, accepting numeric strings
/// the way loosely typed device output arrives.
fn num(value: &serde_json::Value, path: &[&str]) -> Option<f64> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
