//! Statistics reducer
//!
//! Folds the sampler's raw time series into summary statistics. The trend is
//! a pure endpoint comparison and the stability classification a
//! scale-relative heuristic (`variance < 0.1 * max`); both are part of the
//! report contract and are kept exactly as-is rather than replaced with
//! smarter estimators. Non-numeric samples are excluded throughout; a metric
//! with no numeric samples is omitted from the output entirely.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::MetricSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Variable,
}

/// Summary statistics for one metric's numeric samples.
#[derive(Debug, Clone, Serialize)]
pub struct MetricStats {
    pub sample_count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub range: f64,
    pub first: f64,
    pub last: f64,
    pub trend: Trend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<Stability>,
}

/// Reduce a quiesced series to per-metric summaries.
pub fn summarize(series: &MetricSeries) -> BTreeMap<String, MetricStats> {
    let mut out = BTreeMap::new();
    for (metric, samples) in series {
        let values: Vec<f64> = samples.iter().filter_map(|s| s.value.as_number()).collect();
        if values.is_empty() {
            continue;
        }
        out.insert(metric.clone(), reduce(&values));
    }
    out
}

fn reduce(values: &[f64]) -> MetricStats {
    let count = values.len();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / count as f64;
    let first = values[0];
    let last = values[count - 1];

    let trend = if last > first {
        Trend::Increasing
    } else if last < first {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    // Sample variance, only meaningful past two data points.
    let (variance, stability) = if count > 2 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        let stability = if variance < max * 0.1 {
            Stability::Stable
        } else {
            Stability::Variable
        };
        (Some(round2(variance)), Some(stability))
    } else {
        (None, None)
    };

    MetricStats {
        sample_count: count,
        min,
        max,
        mean: round2(mean),
        median: round2(median(values)),
        range: max - min,
        first,
        last,
        trend,
        variance,
        stability,
    }
}

fn median(values: &[f64]) -> f64 {
    if values.len() == 1 {
        return values[0];
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSample, MetricValue};

    fn series_of(metric: &str, values: &[MetricValue]) -> MetricSeries {
        let mut series = MetricSeries::new();
        series.insert(
            metric.to_string(),
            values
                .iter()
                .enumerate()
                .map(|(i, value)| MetricSample {
                    metric: metric.to_string(),
                    timestamp: i as f64,
                    value: value.clone(),
                })
                .collect(),
        );
        series
    }

    fn numeric(values: &[f64]) -> Vec<MetricValue> {
        values.iter().map(|v| MetricValue::Number(*v)).collect()
    }

    #[test]
    fn test_single_sample_median_is_the_sample() {
        let stats = summarize(&series_of("cpu_temp", &numeric(&[41.5])));
        let s = &stats["cpu_temp"];
        assert_eq!(s.sample_count, 1);
        assert_eq!(s.median, 41.5);
        assert_eq!(s.min, 41.5);
        assert_eq!(s.max, 41.5);
        assert_eq!(s.range, 0.0);
        assert_eq!(s.trend, Trend::Stable);
    }

    #[test]
    fn test_trend_is_pure_endpoint_comparison() {
        let stats = summarize(&series_of("load", &numeric(&[1.0, 9.0, 1.0])));
        assert_eq!(stats["load"].trend, Trend::Stable);

        let stats = summarize(&series_of("load", &numeric(&[1.0, 0.0, 2.0])));
        assert_eq!(stats["load"].trend, Trend::Increasing);

        let stats = summarize(&series_of("load", &numeric(&[2.0, 9.0, 1.0])));
        assert_eq!(stats["load"].trend, Trend::Decreasing);
    }

    #[test]
    fn test_variance_omitted_for_two_or_fewer_samples() {
        let stats = summarize(&series_of("temp", &numeric(&[10.0, 20.0])));
        assert!(stats["temp"].variance.is_none());
        assert!(stats["temp"].stability.is_none());

        let stats = summarize(&series_of("temp", &numeric(&[10.0, 20.0, 30.0])));
        assert!(stats["temp"].variance.is_some());
        assert!(stats["temp"].stability.is_some());
    }

    #[test]
    fn test_stability_is_scale_relative() {
        // variance of [100, 101, 102] = 1.0 < 0.1 * 102
        let stats = summarize(&series_of("freq", &numeric(&[100.0, 101.0, 102.0])));
        assert_eq!(stats["freq"].stability, Some(Stability::Stable));

        // variance of [1, 2, 3] = 1.0 >= 0.1 * 3
        let stats = summarize(&series_of("freq", &numeric(&[1.0, 2.0, 3.0])));
        assert_eq!(stats["freq"].stability, Some(Stability::Variable));
    }

    #[test]
    fn test_mean_median_range() {
        let stats = summarize(&series_of("ma", &numeric(&[4.0, 1.0, 3.0, 2.0])));
        let s = &stats["ma"];
        assert_eq!(s.mean, 2.5);
        assert_eq!(s.median, 2.5);
        assert_eq!(s.range, 3.0);
        assert_eq!(s.first, 4.0);
        assert_eq!(s.last, 2.0);
    }

    #[test]
    fn test_non_numeric_samples_excluded_and_metric_omitted() {
        let mixed = vec![
            MetricValue::Number(5.0),
            MetricValue::Text("unavailable".into()),
            MetricValue::Number(7.0),
        ];
        let stats = summarize(&series_of("current", &mixed));
        assert_eq!(stats["current"].sample_count, 2);
        assert_eq!(stats["current"].mean, 6.0);

        let text_only = vec![MetricValue::Text("enforcing".into())];
        let stats = summarize(&series_of("selinux", &text_only));
        assert!(!stats.contains_key("selinux"));
    }
}
