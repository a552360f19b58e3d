//! Shared data model for the diagnostic engine
//!
//! Probe payloads stay opaque (`serde_json::Value` open maps); the engine
//! stores and forwards them and only the scorers read a documented subset of
//! well-known keys. Everything report-facing derives `Serialize`.

use serde::Serialize;
use std::collections::HashMap;

/// Opaque structured payload produced by a probe. Unknown keys pass through
/// untouched for the reporting collaborator.
pub type ProbeResult = serde_json::Value;

/// Recorded in place of a result when a probe raised or timed out.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorRecord {
    pub message: String,
    /// True when the probe was abandoned on a deadline rather than failing
    /// outright - its underlying work may still be running on the device.
    pub partial: bool,
}

/// One entry of [`ScanResults`]: success payload or error record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success(ProbeResult),
    Failed(ErrorRecord),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&ProbeResult> {
        match self {
            ProbeOutcome::Success(value) => Some(value),
            ProbeOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            ProbeOutcome::Success(_) => None,
            ProbeOutcome::Failed(record) => Some(record),
        }
    }
}

/// Per-scan result map keyed by probe task name. Complete once every
/// registered task has exactly one entry (success or error).
pub type ScanResults = HashMap<String, ProbeOutcome>;

/// A sampled reading, classified before storage: a string that parses as a
/// number is stored numerically so the statistics reducer can fold it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Classify a raw reading from the device.
    pub fn classify(raw: &str) -> MetricValue {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => MetricValue::Number(n),
            _ => MetricValue::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            MetricValue::Text(_) => None,
        }
    }
}

/// One timestamped reading of one metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub metric: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub value: MetricValue,
}

/// Per-metric ordered sample sequences. Append-only while the sampler runs;
/// read-only once handed to the statistics reducer.
pub type MetricSeries = HashMap<String, Vec<MetricSample>>;

/// The seven fixed analysis domains. The composite denominator always spans
/// all of them, whether or not a subsystem produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Battery,
    Performance,
    Security,
    Software,
    Network,
    Storage,
    Stability,
}

impl Subsystem {
    pub const ALL: [Subsystem; 7] = [
        Subsystem::Battery,
        Subsystem::Performance,
        Subsystem::Security,
        Subsystem::Software,
        Subsystem::Network,
        Subsystem::Storage,
        Subsystem::Stability,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Battery => "battery",
            Subsystem::Performance => "performance",
            Subsystem::Security => "security",
            Subsystem::Software => "software",
            Subsystem::Network => "network",
            Subsystem::Storage => "storage",
            Subsystem::Stability => "stability",
        }
    }
}

/// Independent verdict for one subsystem, derived once from its own probe
/// payload. Critical *issues* are counted in the composite; critical
/// *findings* are listed verbatim - the distinction is inherited from the
/// report contract and both are carried.
#[derive(Debug, Clone, Serialize)]
pub struct SubsystemScore {
    pub subsystem: Subsystem,
    pub score: f64,
    pub warnings: Vec<String>,
    pub critical_issues: Vec<String>,
    pub critical_findings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl SubsystemScore {
    pub fn new(subsystem: Subsystem, score: f64) -> Self {
        Self {
            subsystem,
            score: score.clamp(0.0, 100.0),
            warnings: Vec::new(),
            critical_issues: Vec::new(),
            critical_findings: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// Composite status label, a fixed step function of the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthStatus {
    pub fn from_score(score: f64) -> HealthStatus {
        if score >= 90.0 {
            HealthStatus::Excellent
        } else if score >= 80.0 {
            HealthStatus::Good
        } else if score >= 70.0 {
            HealthStatus::Fair
        } else if score >= 50.0 {
            HealthStatus::Poor
        } else {
            HealthStatus::Critical
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HealthStatus::Excellent => "EXCELLENT",
            HealthStatus::Good => "GOOD",
            HealthStatus::Fair => "FAIR",
            HealthStatus::Poor => "POOR",
            HealthStatus::Critical => "CRITICAL",
        }
    }

    pub fn reliability_index(self) -> f64 {
        match self {
            HealthStatus::Excellent => 95.0,
            HealthStatus::Good => 85.0,
            HealthStatus::Fair => 70.0,
            HealthStatus::Poor => 50.0,
            HealthStatus::Critical => 25.0,
        }
    }
}

/// Final composite verdict for one scan. Computed once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct CompositeHealth {
    pub status: HealthStatus,
    pub score: f64,
    pub reliability_index: f64,
    pub critical_issue_count: usize,
    pub warning_count: usize,
    pub recommendations: Vec<String>,
    pub critical_findings: Vec<String>,
    pub component_scores: std::collections::BTreeMap<&'static str, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_value_classification() {
        assert_eq!(MetricValue::classify("42"), MetricValue::Number(42.0));
        assert_eq!(MetricValue::classify(" 36.5 "), MetricValue::Number(36.5));
        assert_eq!(MetricValue::classify("-1200"), MetricValue::Number(-1200.0));
        assert_eq!(
            MetricValue::classify("enforcing"),
            MetricValue::Text("enforcing".to_string())
        );
        assert_eq!(
            MetricValue::classify("1.2.3"),
            MetricValue::Text("1.2.3".to_string())
        );
    }

    #[test]
    fn test_status_step_function() {
        assert_eq!(HealthStatus::from_score(95.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(90.0), HealthStatus::Excellent);
        assert_eq!(HealthStatus::from_score(85.7), HealthStatus::Good);
        assert_eq!(HealthStatus::from_score(70.0), HealthStatus::Fair);
        assert_eq!(HealthStatus::from_score(50.0), HealthStatus::Poor);
        assert_eq!(HealthStatus::from_score(49.9), HealthStatus::Critical);
        assert_eq!(HealthStatus::Good.reliability_index(), 85.0);
    }

    #[test]
    fn test_score_clamped() {
        assert_eq!(SubsystemScore::new(Subsystem::Storage, -12.0).score, 0.0);
        assert_eq!(SubsystemScore::new(Subsystem::Storage, 130.0).score, 100.0);
    }
}
