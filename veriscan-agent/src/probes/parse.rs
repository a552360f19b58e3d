//! Field extraction from raw device output
//!
//! The device shell hands back loosely formatted text; these helpers pull the
//! handful of typed fields the probes publish. Anything unparseable simply
//! yields `None` - missing data is a finding for the scorers, never an error.

use serde::Serialize;

/// Value of a `key: value` line, e.g. `dumpsys battery` output.
pub fn kv_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(key) {
            if let Some(value) = rest.trim_start().strip_prefix(':') {
                return Some(value.trim());
            }
        }
    }
    None
}

pub fn kv_number(text: &str, key: &str) -> Option<f64> {
    kv_value(text, key)?.parse().ok()
}

/// `/proc/meminfo` style field in kB, e.g. `MemTotal:  3882924 kB`.
pub fn meminfo_kb(text: &str, field: &str) -> Option<f64> {
    let value = kv_value(text, field)?;
    value.split_whitespace().next()?.parse().ok()
}

/// Whole numeric lines, e.g. thermal zone or cpufreq sysfs reads.
pub fn numeric_lines(text: &str) -> Vec<f64> {
    text.lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// One mounted filesystem from `df` output.
#[derive(Debug, Clone, Serialize)]
pub struct DfEntry {
    pub filesystem: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub usage_percent: f64,
    pub mount_point: String,
}

/// Parse `df` output (1K blocks), skipping the header and tmpfs mounts.
pub fn parse_df(text: &str) -> Vec<DfEntry> {
    let mut entries = Vec::new();
    for line in text.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() || line.starts_with("tmpfs") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let (Ok(total_kb), Ok(used_kb), Ok(available_kb)) = (
            parts[1].parse::<f64>(),
            parts[2].parse::<f64>(),
            parts[3].parse::<f64>(),
        ) else {
            continue;
        };
        if total_kb <= 0.0 {
            continue;
        }
        entries.push(DfEntry {
            filesystem: parts[0].to_string(),
            total_gb: round2(total_kb / (1024.0 * 1024.0)),
            used_gb: round2(used_kb / (1024.0 * 1024.0)),
            available_gb: round2(available_kb / (1024.0 * 1024.0)),
            usage_percent: round2(used_kb / total_kb * 100.0),
            mount_point: parts[5].to_string(),
        });
    }
    entries
}

/// Packet loss percentage from `ping` summary output.
pub fn packet_loss_percent(text: &str) -> Option<f64> {
    for line in text.lines() {
        if let Some(idx) = line.find("% packet loss") {
            let head = &line[..idx];
            let token = head
                .rsplit(|c: char| c.is_whitespace() || c == ',')
                .next()?;
            return token.trim().parse().ok();
        }
    }
    None
}

/// Average round-trip time from a `ping` rtt/round-trip summary line.
pub fn ping_avg_ms(text: &str) -> Option<f64> {
    for line in text.lines() {
        if line.contains("min/avg/max") {
            let rhs = line.split('=').nth(1)?.trim();
            return rhs.split('/').nth(1)?.trim().parse().ok();
        }
    }
    None
}

/// Throughput reported by `dd`, e.g. `52428800 bytes ... 45.3 MB/s`.
pub fn dd_speed_mb_s(text: &str) -> Option<f64> {
    for line in text.lines() {
        let mut tokens = line.split_whitespace().peekable();
        while let Some(token) = tokens.next() {
            if tokens.peek().copied() == Some("MB/s") {
                if let Ok(speed) = token.parse() {
                    return Some(speed);
                }
            }
        }
    }
    None
}

/// Whitespace-separated field by index, for `/proc/loadavg` style lines.
pub fn field(text: &str, index: usize) -> Option<&str> {
    text.split_whitespace().nth(index)
}

/// Count of non-empty lines, for `pm list packages` style listings.
pub fn non_empty_lines(text: &str) -> usize {
    text.lines().filter(|line| !line.trim().is_empty()).count()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
