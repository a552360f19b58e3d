//! Composite health aggregation
//!
//! Combines the per-subsystem verdicts into one weighted composite score and
//! status label. The denominator is always the full fixed set of seven
//! subsystems: a subsystem that never produced a result contributes zero
//! rather than being excluded from the average. That choice looks like a
//! latent bug but is part of the report contract, so it is preserved here and
//! pinned down in tests rather than silently "fixed".

use std::collections::{BTreeMap, HashMap};

use tracing::info;

use crate::models::{CompositeHealth, HealthStatus, Subsystem, SubsystemScore};

/// Default recommendation when no rule fired anywhere.
const NOMINAL_RECOMMENDATION: &str = "System performing within normal parameters";

/// Fold all available subsystem scores into the final composite verdict.
pub fn aggregate(scores: &HashMap<Subsystem, SubsystemScore>) -> CompositeHealth {
    let mut component_scores: BTreeMap<&'static str, f64> =
        Subsystem::ALL.iter().map(|s| (s.name(), 0.0)).collect();

    let mut warnings = 0usize;
    let mut critical_issues = 0usize;
    let mut critical_findings = Vec::new();
    let mut recommendations = Vec::new();

    // Fixed iteration order keeps the finding/recommendation lists stable
    // across runs.
    for subsystem in Subsystem::ALL {
        let Some(score) = scores.get(&subsystem) else {
            continue;
        };
        component_scores.insert(subsystem.name(), score.score);
        warnings += score.warnings.len();
        critical_issues += score.critical_issues.len();
        critical_findings.extend(score.critical_findings.iter().cloned());
        recommendations.extend(score.recommendations.iter().cloned());
    }

    let total: f64 = component_scores.values().sum();
    let composite = total / (100.0 * Subsystem::ALL.len() as f64) * 100.0;
    let status = HealthStatus::from_score(composite);

    if recommendations.is_empty() {
        recommendations.push(NOMINAL_RECOMMENDATION.to_string());
    }

    info!(
        score = composite,
        ?status,
        critical_issues,
        warnings,
        "composite health computed"
    );

    CompositeHealth {
        status,
        score: composite,
        reliability_index: status.reliability_index(),
        critical_issue_count: critical_issues,
        warning_count: warnings,
        recommendations,
        critical_findings,
        component_scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores_of(entries: &[(Subsystem, f64)]) -> HashMap<Subsystem, SubsystemScore> {
        entries
            .iter()
            .map(|(subsystem, score)| (*subsystem, SubsystemScore::new(*subsystem, *score)))
            .collect()
    }

    #[test]
    fn test_denominator_is_always_the_full_seven() {
        // A single subsystem at 70 lands at 70/700, not 70/100. Absent
        // subsystems count as zero by contract.
        let health = aggregate(&scores_of(&[(Subsystem::Performance, 70.0)]));
        assert!((health.score - 10.0).abs() < 1e-9);
        assert_eq!(health.status, HealthStatus::Critical);
    }

    #[test]
    fn test_six_perfect_subsystems_with_battery_absent() {
        let health = aggregate(&scores_of(&[
            (Subsystem::Performance, 100.0),
            (Subsystem::Security, 100.0),
            (Subsystem::Software, 100.0),
            (Subsystem::Network, 100.0),
            (Subsystem::Storage, 100.0),
            (Subsystem::Stability, 100.0),
        ]));
        assert!((health.score - 600.0 / 700.0 * 100.0).abs() < 1e-9);
        assert_eq!(health.status, HealthStatus::Good);
        assert_eq!(health.reliability_index, 85.0);
        assert_eq!(health.component_scores["battery"], 0.0);
    }

    #[test]
    fn test_all_seven_present_keeps_plain_average() {
        let health = aggregate(&scores_of(
            &Subsystem::ALL.map(|subsystem| (subsystem, 90.0)),
        ));
        assert!((health.score - 90.0).abs() < 1e-9);
        assert_eq!(health.status, HealthStatus::Excellent);
        assert_eq!(health.reliability_index, 95.0);
    }

    #[test]
    fn test_component_scores_cover_every_subsystem() {
        let health = aggregate(&scores_of(&[(Subsystem::Storage, 55.0)]));
        assert_eq!(health.component_scores.len(), 7);
        assert_eq!(health.component_scores["storage"], 55.0);
        assert_eq!(health.component_scores["network"], 0.0);
    }

    #[test]
    fn test_default_recommendation_when_no_rule_fired() {
        let health = aggregate(&scores_of(&[(Subsystem::Security, 100.0)]));
        assert_eq!(health.recommendations, vec![NOMINAL_RECOMMENDATION]);
    }

    #[test]
    fn test_counts_and_findings_are_accumulated() {
        let mut scores = scores_of(&[(Subsystem::Storage, 70.0), (Subsystem::Network, 40.0)]);
        let storage = scores.get_mut(&Subsystem::Storage).unwrap();
        storage
            .critical_findings
            .push("Storage critically full: /data".to_string());
        storage.recommendations.push("Free up space".to_string());
        let network = scores.get_mut(&Subsystem::Network).unwrap();
        network
            .critical_issues
            .push("Multiple network connectivity failures".to_string());
        network.warnings.push("Some network connectivity issues".to_string());

        let health = aggregate(&scores);
        assert_eq!(health.critical_issue_count, 1);
        assert_eq!(health.warning_count, 1);
        assert_eq!(health.critical_findings, vec!["Storage critically full: /data"]);
        assert_eq!(health.recommendations, vec!["Free up space"]);
    }
}
