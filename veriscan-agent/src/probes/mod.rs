//! Subsystem probes
//!
//! The seven heavyweight diagnostic tasks dispatched by the scheduler, plus
//! the lightweight metric probes for the continuous sampler and the snapshot
//! probe for extended analysis. Every probe funnels through the same device
//! channel and publishes a JSON payload; the well-known keys in those payloads
//! are what the subsystem scorers read.
//!
//! Probes never fail the scan over missing data: a field the device refuses
//! to expose is simply absent from the payload.

pub mod parse;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tracing::debug;

use veriscan_core::extended::Snapshot;
use veriscan_core::models::ProbeResult;
use veriscan_core::sampler::MetricProbe;
use veriscan_core::scheduler::ProbeTask;
use veriscan_core::scoring;

use crate::channel::DeviceChannel;

pub type Channel = Arc<dyn DeviceChannel>;

/// Build the full probe registry for one scan.
pub fn probe_tasks(
    channel: &Channel,
    task_timeout: Duration,
    command_timeout: Duration,
) -> Vec<ProbeTask> {
    let mut tasks = Vec::with_capacity(7);
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "battery",
            "Battery Health & Power Analysis",
            task_timeout,
            move || battery_probe(channel.clone(), command_timeout),
        ));
    }
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "performance",
            "Performance & Thermal Analysis",
            task_timeout,
            move || performance_probe(channel.clone(), command_timeout),
        ));
    }
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "hardware",
            "Hardware Configuration Scan",
            task_timeout,
            move || hardware_probe(channel.clone(), command_timeout),
        ));
    }
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "software",
            "Software Integrity Verification",
            task_timeout,
            move || software_probe(channel.clone(), command_timeout),
        ));
    }
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "security",
            "Security Verification Suite",
            task_timeout,
            move || security_probe(channel.clone(), command_timeout),
        ));
    }
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "network",
            "Network Connectivity Analysis",
            task_timeout,
            move || network_probe(channel.clone(), command_timeout),
        ));
    }
    {
        let channel = channel.clone();
        tasks.push(ProbeTask::new(
            "stress_test",
            "System Stress Testing",
            task_timeout,
            move || stress_probe(channel.clone(), command_timeout),
        ));
    }
    tasks
}

async fn read_file(channel: &Channel, path: &str, timeout: Duration) -> Option<String> {
    let out = channel
        .execute(&format!("cat {path} 2>/dev/null"), timeout)
        .await;
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn insert_number(map: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        map.insert(key.to_string(), json!(value));
    }
}

/// Numeric when the raw reading parses, verbatim text otherwise.
fn loose_value(raw: &str) -> Value {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => json!(n),
        _ => json!(raw.trim()),
    }
}

async fn battery_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let dumpsys = channel.execute("dumpsys battery", timeout).await;

    let mut data = Map::new();
    insert_number(&mut data, "level", parse::kv_number(&dumpsys, "level"));
    insert_number(&mut data, "voltage", parse::kv_number(&dumpsys, "voltage"));
    insert_number(&mut data, "temperature", parse::kv_number(&dumpsys, "temperature"));
    insert_number(&mut data, "scale", parse::kv_number(&dumpsys, "scale"));
    insert_number(&mut data, "status", parse::kv_number(&dumpsys, "status"));
    insert_number(&mut data, "health", parse::kv_number(&dumpsys, "health"));
    if let Some(technology) = parse::kv_value(&dumpsys, "technology") {
        data.insert("technology".to_string(), json!(technology));
    }

    // Electrical state lives in sysfs; each file is optional per kernel.
    let supply = "/sys/class/power_supply/battery";
    let mut supply_metrics = Map::new();
    for metric in [
        "capacity",
        "charge_full",
        "charge_full_design",
        "current_now",
        "cycle_count",
        "temp",
        "voltage_now",
    ] {
        if let Some(raw) = read_file(&channel, &format!("{supply}/{metric}"), timeout).await {
            supply_metrics.insert(metric.to_string(), loose_value(&raw));
        }
    }

    let supply_number = |key: &str| {
        supply_metrics
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let charge_full = supply_number("charge_full");
    let charge_full_design = supply_number("charge_full_design");
    let cycle_count = supply_number("cycle_count");
    let voltage = data.get("voltage").and_then(Value::as_f64).unwrap_or(0.0);
    let temperature = data
        .get("temperature")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    insert_number(&mut data, "charge_full", Some(charge_full).filter(|v| *v > 0.0));
    insert_number(
        &mut data,
        "charge_full_design",
        Some(charge_full_design).filter(|v| *v > 0.0),
    );
    insert_number(&mut data, "cycle_count", Some(cycle_count).filter(|v| *v > 0.0));

    let health = scoring::battery_health(
        charge_full,
        charge_full_design,
        cycle_count,
        voltage,
        temperature,
    );
    data.insert("power_supply_metrics".to_string(), Value::Object(supply_metrics));
    data.insert("health_analysis".to_string(), serde_json::to_value(&health)?);

    debug!(score = health.score, grade = health.grade, "battery probe finished");
    Ok(Value::Object(data))
}

async fn performance_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let mut data = Map::new();

    let cpuinfo = channel.execute("cat /proc/cpuinfo", timeout).await;
    let cores = cpuinfo
        .lines()
        .filter(|line| line.trim_start().starts_with("processor"))
        .count();
    if cores > 0 {
        data.insert("cpu_cores".to_string(), json!(cores));
    }
    if let Some(model) = parse::kv_value(&cpuinfo, "Hardware") {
        data.insert("cpu_model".to_string(), json!(model));
    }

    let current = parse::numeric_lines(
        &channel
            .execute(
                "cat /sys/devices/system/cpu/cpu*/cpufreq/scaling_cur_freq 2>/dev/null",
                timeout,
            )
            .await,
    );
    let max = parse::numeric_lines(
        &channel
            .execute(
                "cat /sys/devices/system/cpu/cpu*/cpufreq/cpuinfo_max_freq 2>/dev/null",
                timeout,
            )
            .await,
    );
    if let Some((per_core, avg_utilization)) = frequency_analysis(&current, &max) {
        data.insert("cpu_frequency_analysis".to_string(), per_core);
        data.insert("avg_cpu_utilization".to_string(), json!(avg_utilization));
    }

    let temps: Vec<f64> = parse::numeric_lines(
        &channel
            .execute("cat /sys/class/thermal/thermal_zone*/temp 2>/dev/null", timeout)
            .await,
    )
    .into_iter()
    .map(|millidegrees| millidegrees / 1000.0)
    .collect();
    if !temps.is_empty() {
        let max_temp = temps.iter().cloned().fold(f64::MIN, f64::max);
        let min_temp = temps.iter().cloned().fold(f64::MAX, f64::min);
        let avg_temp = parse::round2(temps.iter().sum::<f64>() / temps.len() as f64);
        data.insert(
            "thermal_summary".to_string(),
            json!({ "max_temp": max_temp, "min_temp": min_temp, "avg_temp": avg_temp }),
        );
    }

    let meminfo = channel.execute("cat /proc/meminfo", timeout).await;
    if let Some(total_kb) = parse::meminfo_kb(&meminfo, "MemTotal") {
        if total_kb > 0.0 {
            let available_kb = parse::meminfo_kb(&meminfo, "MemAvailable").unwrap_or(0.0);
            let total_mb = (total_kb / 1024.0).floor();
            let available_mb = (available_kb / 1024.0).floor();
            let used_mb = total_mb - available_mb;
            data.insert(
                "memory_analysis".to_string(),
                json!({
                    "total_mb": total_mb,
                    "used_mb": used_mb,
                    "available_mb": available_mb,
                    "usage_percent": parse::round2(used_mb / total_mb * 100.0),
                }),
            );
        }
    }

    let loadavg = channel.execute("cat /proc/loadavg", timeout).await;
    if !loadavg.is_empty() {
        let load = |index| {
            parse::field(&loadavg, index)
                .and_then(|f| f.parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        data.insert(
            "load_average".to_string(),
            json!({ "1min": load(0), "5min": load(1), "15min": load(2) }),
        );
    }

    let uptime = channel.execute("cat /proc/uptime", timeout).await;
    if let Some(seconds) = parse::field(&uptime, 0).and_then(|f| f.parse::<f64>().ok()) {
        let days = (seconds / 86_400.0) as u64;
        let hours = (seconds % 86_400.0 / 3_600.0) as u64;
        let minutes = (seconds % 3_600.0 / 60.0) as u64;
        data.insert(
            "uptime_analysis".to_string(),
            json!({
                "total_seconds": seconds,
                "formatted": format!("{days}d {hours}h {minutes}m"),
            }),
        );
    }

    Ok(Value::Object(data))
}

/// Per-core utilization from current vs max scaling frequencies.
fn frequency_analysis(current: &[f64], max: &[f64]) -> Option<(Value, f64)> {
    let cores: Vec<Value> = current
        .iter()
        .zip(max)
        .enumerate()
        .filter(|(_, (_, max_freq))| **max_freq > 0.0)
        .map(|(core, (cur, max_freq))| {
            json!({
                "core": core,
                "current_freq_mhz": (cur / 1000.0).floor(),
                "max_freq_mhz": (max_freq / 1000.0).floor(),
                "utilization_percent": parse::round2(cur / max_freq * 100.0),
            })
        })
        .collect();
    if cores.is_empty() {
        return None;
    }
    let avg = cores
        .iter()
        .filter_map(|core| core.get("utilization_percent").and_then(Value::as_f64))
        .sum::<f64>()
        / cores.len() as f64;
    Some((json!(cores), parse::round2(avg)))
}

async fn hardware_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let mut data = Map::new();

    let mut device_info = Map::new();
    for (key, prop) in [
        ("manufacturer", "ro.product.manufacturer"),
        ("model", "ro.product.model"),
        ("device", "ro.product.device"),
        ("brand", "ro.product.brand"),
        ("hardware", "ro.hardware"),
        ("chipset", "ro.board.platform"),
    ] {
        let value = channel.execute(&format!("getprop {prop}"), timeout).await;
        if !value.is_empty() {
            device_info.insert(key.to_string(), json!(value));
        }
    }
    data.insert("device_info".to_string(), Value::Object(device_info));

    let size = channel.execute("wm size", timeout).await;
    let density = channel.execute("wm density", timeout).await;
    data.insert(
        "display".to_string(),
        json!({
            "resolution": size.replace("Physical size: ", ""),
            "density": density.replace("Physical density: ", ""),
        }),
    );

    let df = channel.execute("df", timeout).await;
    let partitions = parse::parse_df(&df);
    data.insert("storage_analysis".to_string(), serde_json::to_value(&partitions)?);

    debug!(partitions = partitions.len(), "hardware probe finished");
    Ok(Value::Object(data))
}

async fn software_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let mut data = Map::new();

    let mut android_info = Map::new();
    for (key, prop) in [
        ("version", "ro.build.version.release"),
        ("api_level", "ro.build.version.sdk"),
        ("build_id", "ro.build.id"),
        ("build_type", "ro.build.type"),
        ("security_patch", "ro.build.version.security_patch"),
        ("tags", "ro.build.tags"),
    ] {
        let value = channel.execute(&format!("getprop {prop}"), timeout).await;
        if !value.is_empty() {
            android_info.insert(key.to_string(), loose_value(&value));
        }
    }
    data.insert("android_info".to_string(), Value::Object(android_info));

    let kernel = channel.execute("uname -a", timeout).await;
    let selinux = channel.execute("getenforce", timeout).await;
    data.insert(
        "kernel_info".to_string(),
        json!({
            "version": kernel,
            "selinux_status": if selinux.is_empty() { "Unknown".to_string() } else { selinux },
        }),
    );

    let user = channel.execute("pm list packages -3", timeout).await;
    let system = channel.execute("pm list packages -s", timeout).await;
    let disabled = channel.execute("pm list packages -d", timeout).await;
    data.insert(
        "package_analysis".to_string(),
        json!({
            "user_packages": parse::non_empty_lines(&user),
            "system_packages": parse::non_empty_lines(&system),
            "disabled_packages": parse::non_empty_lines(&disabled),
        }),
    );

    // Root detection drives the software scorer.
    let mut observations = Vec::new();
    for (method, command) in ROOT_DETECTION_METHODS {
        let output = channel.execute(command, timeout).await;
        observations.push((*method, output));
    }
    data.insert(
        "security_analysis".to_string(),
        Value::Object(root_assessment(&observations)),
    );

    Ok(Value::Object(data))
}

const ROOT_DETECTION_METHODS: &[(&str, &str)] = &[
    ("su_binary", "which su"),
    (
        "su_locations",
        "ls /system/bin/su /system/xbin/su /sbin/su /vendor/bin/su 2>/dev/null",
    ),
    ("busybox", "which busybox"),
    (
        "magisk_files",
        "ls /data/adb/magisk /cache/magisk.log /data/magisk.img 2>/dev/null",
    ),
    (
        "supersu_files",
        "ls /system/app/SuperSU /system/app/Superuser 2>/dev/null",
    ),
    (
        "xposed_framework",
        "ls /system/framework/XposedBridge.jar 2>/dev/null",
    ),
    (
        "root_apps",
        "pm list packages | grep -E '(supersu|magisk|xposed|kingroot|towelroot)'",
    ),
    ("test_keys", "getprop ro.build.tags"),
    ("ro_debuggable", "getprop ro.debuggable"),
    ("ro_secure", "getprop ro.secure"),
];

/// Weigh the raw root-detection observations into a confidence verdict.
fn root_assessment(observations: &[(&str, String)]) -> Map<String, Value> {
    let mut analysis = Map::new();
    let mut indicators = Vec::new();
    let mut confidence = 0u32;

    for (method, output) in observations {
        analysis.insert(format!("{method}_result"), json!(output));
        let output = output.as_str();
        match *method {
            "su_binary" if !output.is_empty() => {
                indicators.push("SU binary found");
                confidence += 25;
            }
            "su_locations" if output.contains("su") => {
                indicators.push("SU binary in system paths");
                confidence += 20;
            }
            "busybox" if !output.is_empty() => {
                indicators.push("BusyBox detected");
                confidence += 10;
            }
            "magisk_files" if !output.is_empty() => {
                indicators.push("Magisk files detected");
                confidence += 30;
            }
            "supersu_files" if !output.is_empty() => {
                indicators.push("SuperSU files detected");
                confidence += 25;
            }
            "xposed_framework" if !output.is_empty() => {
                indicators.push("Xposed Framework detected");
                confidence += 20;
            }
            "root_apps" if !output.is_empty() => {
                indicators.push("Root management apps detected");
                confidence += 15;
            }
            "test_keys" if output.contains("test-keys") => {
                indicators.push("Test-keys build signature");
                confidence += 10;
            }
            "ro_debuggable" if output == "1" => {
                indicators.push("Debuggable build");
                confidence += 5;
            }
            "ro_secure" if output == "0" => {
                indicators.push("ADB running as root");
                confidence += 15;
            }
            _ => {}
        }
    }

    let confidence = confidence.min(100);
    analysis.insert("indicators_found".to_string(), json!(indicators));
    analysis.insert("confidence_score".to_string(), json!(confidence));
    analysis.insert("likely_rooted".to_string(), json!(confidence > 20));
    analysis.insert(
        "root_status".to_string(),
        json!(if confidence > 60 {
            "Highly Likely"
        } else if confidence > 20 {
            "Possible"
        } else {
            "Unlikely"
        }),
    );
    analysis
}

async fn security_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let prop = |name: &'static str| {
        let channel = channel.clone();
        async move { channel.execute(&format!("getprop {name}"), timeout).await }
    };

    let props = SecurityProps {
        dm_verity: prop("ro.boot.veritymode").await,
        verified_boot: prop("ro.boot.verifiedbootstate").await,
        bootloader_locked: prop("ro.boot.flash.locked").await,
        adb_secure: prop("ro.adb.secure").await,
        usb_debugging: prop("persist.service.adb.enable").await,
        encryption_state: prop("ro.crypto.state").await,
        crypto_type: prop("ro.crypto.type").await,
        patch_level: prop("ro.build.version.security_patch").await,
    };

    Ok(Value::Object(security_assessment(&props)))
}

struct SecurityProps {
    dm_verity: String,
    verified_boot: String,
    bootloader_locked: String,
    adb_secure: String,
    usb_debugging: String,
    encryption_state: String,
    crypto_type: String,
    patch_level: String,
}

/// Score the platform security posture from boot and crypto properties.
fn security_assessment(props: &SecurityProps) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(
        "boot_security".to_string(),
        json!({
            "dm_verity": props.dm_verity,
            "verified_boot_state": props.verified_boot,
            "bootloader_locked": props.bootloader_locked,
        }),
    );
    data.insert(
        "debugging_security".to_string(),
        json!({
            "adb_secure": props.adb_secure == "1",
            "usb_debugging_enabled": props.usb_debugging == "1",
        }),
    );
    data.insert(
        "encryption".to_string(),
        json!({ "state": props.encryption_state, "type": props.crypto_type }),
    );
    data.insert("patch_level".to_string(), json!(props.patch_level));

    let mut score = 0u32;
    let mut checks = Vec::new();

    if matches!(props.dm_verity.as_str(), "enforcing" | "enabled") {
        score += 20;
        checks.push("DM-Verity: PASS");
    } else {
        checks.push("DM-Verity: FAIL");
    }
    if matches!(props.verified_boot.as_str(), "green" | "yellow") {
        score += 20;
        checks.push("Verified Boot: PASS");
    } else {
        checks.push("Verified Boot: FAIL");
    }
    if props.bootloader_locked == "1" {
        score += 25;
        checks.push("Bootloader: LOCKED");
    } else {
        checks.push("Bootloader: UNLOCKED");
    }
    if props.encryption_state == "encrypted" {
        score += 25;
        checks.push("Encryption: ENABLED");
    } else {
        checks.push("Encryption: DISABLED");
    }
    if props.adb_secure == "1" {
        score += 10;
        checks.push("ADB Security: ENABLED");
    } else {
        checks.push("ADB Security: DISABLED");
    }

    data.insert("security_score".to_string(), json!(score));
    data.insert("security_checks".to_string(), json!(checks));
    data.insert(
        "security_level".to_string(),
        json!(if score >= 80 {
            "High"
        } else if score >= 60 {
            "Medium"
        } else if score >= 40 {
            "Low"
        } else {
            "Critical"
        }),
    );
    data
}

const CONNECTIVITY_HOSTS: &[(&str, &str)] = &[
    ("google_dns", "8.8.8.8"),
    ("cloudflare_dns", "1.1.1.1"),
    ("quad9_dns", "9.9.9.9"),
];

async fn network_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let mut data = Map::new();

    let wifi = channel.execute("dumpsys wifi", timeout).await;
    data.insert(
        "wifi_analysis".to_string(),
        json!({
            "enabled": wifi.contains("Wi-Fi is enabled"),
            "connected": wifi.contains("Connected to"),
        }),
    );

    let tcp = channel.execute("cat /proc/net/tcp", timeout).await;
    let udp = channel.execute("cat /proc/net/udp", timeout).await;
    data.insert(
        "connection_stats".to_string(),
        json!({
            "active_tcp_connections": parse::non_empty_lines(&tcp).saturating_sub(1),
            "active_udp_connections": parse::non_empty_lines(&udp).saturating_sub(1),
        }),
    );

    let mut tests = Map::new();
    for (name, host) in CONNECTIVITY_HOSTS {
        let ping = channel
            .execute(&format!("ping -c 3 -W 5 {host} 2>/dev/null"), timeout)
            .await;
        if ping.is_empty() {
            continue;
        }
        let loss = parse::packet_loss_percent(&ping);
        tests.insert(
            format!("{name}_ping"),
            json!({
                "host": host,
                "packet_loss_percent": loss.unwrap_or(100.0),
                "avg_response_ms": parse::ping_avg_ms(&ping).unwrap_or(0.0),
                "status": if loss == Some(0.0) { "Success" } else { "Failed" },
            }),
        );
    }

    let dns = channel
        .execute("nslookup google.com 8.8.8.8 2>/dev/null", timeout)
        .await;
    tests.insert(
        "dns_resolution".to_string(),
        json!({
            "google_lookup": if dns.contains("google.com") { "Pass" } else { "Fail" },
            "response_received": dns.lines().count() > 2,
        }),
    );

    data.insert("connectivity_tests".to_string(), Value::Object(tests));
    Ok(Value::Object(data))
}

async fn stress_probe(channel: Channel, timeout: Duration) -> Result<ProbeResult> {
    let mut data = Map::new();

    // CPU pressure: three bounded workloads, each judged by duration and
    // whether the device produced any output at all.
    let cpu_commands = [
        "timeout 15 dd if=/dev/zero of=/dev/null bs=1M count=500",
        "timeout 10 find /system -name '*.so' 2>/dev/null | wc -l",
        "timeout 10 cat /proc/cpuinfo /proc/meminfo > /dev/null",
    ];
    let mut cpu_tests = Vec::new();
    for command in cpu_commands {
        let started = Instant::now();
        let output = channel.execute(command, timeout).await;
        let duration = started.elapsed().as_secs_f64();
        cpu_tests.push(json!({
            "command": command.split_whitespace().take(3).collect::<Vec<_>>().join(" "),
            "duration_seconds": parse::round2(duration),
            "completed": !output.is_empty() || duration < 20.0,
        }));
    }
    data.insert("cpu_stress_tests".to_string(), json!(cpu_tests));

    let mut io_tests = Vec::new();

    let started = Instant::now();
    let write_out = channel
        .execute("dd if=/dev/zero of=/sdcard/test_write bs=1M count=50 2>&1", timeout)
        .await;
    let write_duration = started.elapsed().as_secs_f64();
    io_tests.push(json!({
        "test_type": "Sequential Write",
        "duration_seconds": parse::round2(write_duration),
        "speed_mb_s": parse::dd_speed_mb_s(&write_out),
        "status": if write_duration < 60.0 { "Completed" } else { "Timeout" },
    }));

    if !channel.execute("ls /sdcard/test_write", timeout).await.is_empty() {
        let started = Instant::now();
        let read_out = channel
            .execute("dd if=/sdcard/test_write of=/dev/null bs=1M 2>&1", timeout)
            .await;
        let read_duration = started.elapsed().as_secs_f64();
        io_tests.push(json!({
            "test_type": "Sequential Read",
            "duration_seconds": parse::round2(read_duration),
            "speed_mb_s": parse::dd_speed_mb_s(&read_out),
            "status": if read_duration < 60.0 { "Completed" } else { "Timeout" },
        }));
        channel.execute("rm /sdcard/test_write", timeout).await;
    }

    let started = Instant::now();
    channel
        .execute(
            "timeout 20 dd if=/dev/urandom of=/sdcard/random_test bs=4k count=1000 2>&1",
            timeout,
        )
        .await;
    let random_duration = started.elapsed().as_secs_f64();
    io_tests.push(json!({
        "test_type": "Random Write",
        "duration_seconds": parse::round2(random_duration),
        "status": if random_duration < 25.0 { "Completed" } else { "Timeout" },
    }));
    channel.execute("rm /sdcard/random_test 2>/dev/null", timeout).await;

    data.insert("io_stress_tests".to_string(), json!(io_tests));

    // Memory pressure: available memory before vs after a bounded allocation
    // burst. Identical readings mean the burst left no lasting footprint.
    let started = Instant::now();
    let before = channel
        .execute("cat /proc/meminfo | grep MemAvailable", timeout)
        .await;
    channel
        .execute("timeout 30 cat /dev/zero | head -c 100M | tail", timeout)
        .await;
    let after = channel
        .execute("cat /proc/meminfo | grep MemAvailable", timeout)
        .await;
    let memory_duration = started.elapsed().as_secs_f64();
    data.insert(
        "memory_stress_test".to_string(),
        json!({
            "duration_seconds": parse::round2(memory_duration),
            "memory_before": parse::field(&before, 1).unwrap_or("Unknown"),
            "memory_after": parse::field(&after, 1).unwrap_or("Unknown"),
            "stability": if before == after { "Stable" } else { "Fluctuated" },
            "test_completed": memory_duration < 35.0,
        }),
    );

    Ok(Value::Object(data))
}

const MONITOR_COMMANDS: &[(&str, &str)] = &[
    ("cpu_freq", "cat /sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq 2>/dev/null"),
    ("cpu_temp", "cat /sys/class/thermal/thermal_zone0/temp 2>/dev/null"),
    ("battery_temp", "cat /sys/class/power_supply/battery/temp 2>/dev/null"),
    ("battery_current", "cat /sys/class/power_supply/battery/current_now 2>/dev/null"),
    ("battery_voltage", "cat /sys/class/power_supply/battery/voltage_now 2>/dev/null"),
    ("mem_available", "cat /proc/meminfo | grep MemAvailable"),
    ("load_avg", "cat /proc/loadavg"),
];

/// Lightweight metric probes for the continuous background sampler.
pub fn monitor_probes(channel: &Channel, command_timeout: Duration) -> Vec<MetricProbe> {
    MONITOR_COMMANDS
        .iter()
        .map(|(name, command)| {
            let channel = channel.clone();
            let takes_field = matches!(*name, "mem_available" | "load_avg");
            MetricProbe::new(name, move || {
                let channel = channel.clone();
                async move {
                    let out = channel.execute(command, command_timeout).await;
                    if out.is_empty() {
                        return None;
                    }
                    if takes_field {
                        parse::field(&out, 1).map(str::to_string)
                    } else {
                        Some(out)
                    }
                }
            })
        })
        .collect()
}

/// Heavier snapshot probe for the extended post-scan sampler. Top-level
/// numeric entries fold straight into the statistics reducer.
pub fn snapshot_probe(
    channel: Channel,
    command_timeout: Duration,
) -> impl Fn() -> BoxFuture<'static, Snapshot> + Send + Sync + 'static {
    move || {
        let channel = channel.clone();
        async move { take_snapshot(channel, command_timeout).await }.boxed()
    }
}

async fn take_snapshot(channel: Channel, timeout: Duration) -> Snapshot {
    let mut snapshot = Snapshot::new();

    let temps: Vec<f64> = parse::numeric_lines(
        &channel
            .execute("cat /sys/class/thermal/thermal_zone*/temp 2>/dev/null", timeout)
            .await,
    )
    .into_iter()
    .map(|millidegrees| millidegrees / 1000.0)
    .collect();
    if !temps.is_empty() {
        let max = temps.iter().cloned().fold(f64::MIN, f64::max);
        let avg = parse::round2(temps.iter().sum::<f64>() / temps.len() as f64);
        snapshot.insert("max_temp".to_string(), json!(max));
        snapshot.insert("avg_temp".to_string(), json!(avg));
    }

    let loadavg = channel.execute("cat /proc/loadavg", timeout).await;
    if let Some(load) = parse::field(&loadavg, 0).and_then(|f| f.parse::<f64>().ok()) {
        snapshot.insert("load_1min".to_string(), json!(load));
    }

    let meminfo = channel
        .execute("cat /proc/meminfo | grep MemAvailable", timeout)
        .await;
    if let Some(kb) = parse::meminfo_kb(&meminfo, "MemAvailable") {
        snapshot.insert("mem_available_kb".to_string(), json!(kb));
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubChannel(HashMap<&'static str, &'static str>);

    impl DeviceChannel for StubChannel {
        fn execute<'a>(&'a self, command: &'a str, _timeout: Duration) -> BoxFuture<'a, String> {
            let out = self.0.get(command).copied().unwrap_or("").to_string();
            async move { out }.boxed()
        }
    }

    fn stub(entries: &[(&'static str, &'static str)]) -> Channel {
        Arc::new(StubChannel(entries.iter().copied().collect()))
    }

    #[test]
    fn test_registry_names_are_unique_and_complete() {
        let channel = stub(&[]);
        let tasks = probe_tasks(&channel, Duration::from_secs(180), Duration::from_secs(45));
        let names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["battery", "performance", "hardware", "software", "security", "network", "stress_test"]
        );
    }

    #[test]
    fn test_root_assessment_weights() {
        let rooted = root_assessment(&[
            ("su_binary", "/system/xbin/su".to_string()),
            ("magisk_files", "/data/adb/magisk".to_string()),
            ("ro_secure", "0".to_string()),
        ]);
        // 25 + 30 + 15 = 70
        assert_eq!(rooted["confidence_score"], json!(70));
        assert_eq!(rooted["likely_rooted"], json!(true));
        assert_eq!(rooted["root_status"], json!("Highly Likely"));

        let clean = root_assessment(&[
            ("su_binary", String::new()),
            ("ro_debuggable", "0".to_string()),
            ("ro_secure", "1".to_string()),
        ]);
        assert_eq!(clean["confidence_score"], json!(0));
        assert_eq!(clean["likely_rooted"], json!(false));
        assert_eq!(clean["root_status"], json!("Unlikely"));
    }

    #[test]
    fn test_security_assessment_point_table() {
        let hardened = SecurityProps {
            dm_verity: "enforcing".into(),
            verified_boot: "green".into(),
            bootloader_locked: "1".into(),
            adb_secure: "1".into(),
            usb_debugging: "0".into(),
            encryption_state: "encrypted".into(),
            crypto_type: "file".into(),
            patch_level: "2024-06-05".into(),
        };
        let data = security_assessment(&hardened);
        assert_eq!(data["security_score"], json!(100));
        assert_eq!(data["security_level"], json!("High"));

        let open = SecurityProps {
            dm_verity: String::new(),
            verified_boot: "orange".into(),
            bootloader_locked: "0".into(),
            adb_secure: "0".into(),
            usb_debugging: "1".into(),
            encryption_state: "unencrypted".into(),
            crypto_type: String::new(),
            patch_level: String::new(),
        };
        let data = security_assessment(&open);
        assert_eq!(data["security_score"], json!(0));
        assert_eq!(data["security_level"], json!("Critical"));
    }

    #[test]
    fn test_frequency_analysis_utilization() {
        let (cores, avg) =
            frequency_analysis(&[900_000.0, 1_800_000.0], &[1_800_000.0, 1_800_000.0]).unwrap();
        assert_eq!(avg, 75.0);
        let cores = cores.as_array().unwrap();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0]["utilization_percent"], json!(50.0));

        assert!(frequency_analysis(&[], &[]).is_none());
        // Cores with an unreadable max frequency are dropped, not divided by.
        assert!(frequency_analysis(&[900_000.0], &[0.0]).is_none());
    }

    #[tokio::test]
    async fn test_battery_probe_embeds_health_analysis() {
        let channel = stub(&[
            (
                "dumpsys battery",
                "Current Battery Service state:\n  level: 80\n  voltage: 4100\n  temperature: 290\n  technology: Li-ion",
            ),
            ("cat /sys/class/power_supply/battery/charge_full 2>/dev/null", "2800000"),
            ("cat /sys/class/power_supply/battery/charge_full_design 2>/dev/null", "3000000"),
            ("cat /sys/class/power_supply/battery/cycle_count 2>/dev/null", "420"),
        ]);
        let payload = battery_probe(channel, Duration::from_secs(1)).await.unwrap();

        assert_eq!(payload["level"], json!(80.0));
        assert_eq!(payload["technology"], json!("Li-ion"));
        assert_eq!(payload["cycle_count"], json!(420.0));
        let health = &payload["health_analysis"];
        assert!(health["overall_health_score"].as_f64().unwrap() > 0.0);
        assert!(health["health_grade"].is_string());
    }

    #[tokio::test]
    async fn test_network_probe_connectivity_statuses() {
        let channel = stub(&[
            (
                "ping -c 3 -W 5 8.8.8.8 2>/dev/null",
                "3 packets transmitted, 3 received, 0% packet loss, time 2003ms\nrtt min/avg/max/mdev = 20.1/22.5/24.0/1.1 ms",
            ),
            (
                "ping -c 3 -W 5 1.1.1.1 2>/dev/null",
                "3 packets transmitted, 1 received, 66% packet loss, time 2010ms",
            ),
            ("nslookup google.com 8.8.8.8 2>/dev/null", "Server: 8.8.8.8\nAddress: 8.8.8.8#53\nName: google.com\nAddress: 142.250.74.78"),
        ]);
        let payload = network_probe(channel, Duration::from_secs(1)).await.unwrap();
        let tests = payload["connectivity_tests"].as_object().unwrap();

        assert_eq!(tests["google_dns_ping"]["status"], json!("Success"));
        assert_eq!(tests["cloudflare_dns_ping"]["status"], json!("Failed"));
        // Quad9 produced no output at all, so it is absent rather than failed.
        assert!(!tests.contains_key("quad9_dns_ping"));
        assert_eq!(tests["dns_resolution"]["google_lookup"], json!("Pass"));
    }

    #[tokio::test]
    async fn test_stress_probe_shapes_for_stability_scorer() {
        let channel = stub(&[
            ("timeout 15 dd if=/dev/zero of=/dev/null bs=1M count=500", "500+0 records"),
            ("timeout 10 find /system -name '*.so' 2>/dev/null | wc -l", "812"),
            ("timeout 10 cat /proc/cpuinfo /proc/meminfo > /dev/null", ""),
            (
                "dd if=/dev/zero of=/sdcard/test_write bs=1M count=50 2>&1",
                "52428800 bytes transferred in 1.2 secs, 43.7 MB/s",
            ),
            ("ls /sdcard/test_write", "/sdcard/test_write"),
            ("dd if=/sdcard/test_write of=/dev/null bs=1M 2>&1", "52428800 bytes, 120.0 MB/s"),
            ("cat /proc/meminfo | grep MemAvailable", "MemAvailable:  1430112 kB"),
        ]);
        let payload = stress_probe(channel, Duration::from_secs(1)).await.unwrap();

        let cpu = payload["cpu_stress_tests"].as_array().unwrap();
        assert_eq!(cpu.len(), 3);
        assert!(cpu.iter().all(|t| t["completed"] == json!(true)));

        let io = payload["io_stress_tests"].as_array().unwrap();
        assert_eq!(io.len(), 3);
        assert_eq!(io[0]["speed_mb_s"], json!(43.7));
        assert!(io.iter().all(|t| t["status"] == json!("Completed")));

        let memory = &payload["memory_stress_test"];
        assert_eq!(memory["stability"], json!("Stable"));
        assert_eq!(memory["test_completed"], json!(true));
    }

    #[tokio::test]
    async fn test_monitor_probes_field_extraction() {
        let channel = stub(&[
            ("cat /proc/loadavg", "0.52 0.48 0.47 1/200 1234"),
            ("cat /proc/meminfo | grep MemAvailable", "MemAvailable:  1430112 kB"),
            ("cat /sys/class/thermal/thermal_zone0/temp 2>/dev/null", "41000"),
        ]);
        let probes = monitor_probes(&channel, Duration::from_secs(1));
        assert_eq!(probes.len(), 7);

        let by_name = |name: &str| probes.iter().find(|p| p.name == name).unwrap().clone();
        assert_eq!(run_once(&by_name("load_avg")).await, Some("0.48".to_string()));
        assert_eq!(run_once(&by_name("mem_available")).await, Some("1430112".to_string()));
        assert_eq!(run_once(&by_name("cpu_temp")).await, Some("41000".to_string()));
        assert_eq!(run_once(&by_name("battery_temp")).await, None);
    }

    async fn run_once(probe: &MetricProbe) -> Option<String> {
        use veriscan_core::sampler::Sampler;
        let handle = Sampler::start(
            vec![probe.clone()],
            Duration::from_millis(5),
            Duration::from_millis(30),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (series, _) = handle.stop().await;
        series
            .get(&probe.name)
            .and_then(|samples| samples.first())
            .map(|sample| match &sample.value {
                veriscan_core::models::MetricValue::Number(n) => {
                    let n = *n;
                    if n.fract() == 0.0 {
                        format!("{}", n as i64)
                    } else {
                        format!("{n}")
                    }
                }
                veriscan_core::models::MetricValue::Text(t) => t.clone(),
            })
    }

    #[tokio::test]
    async fn test_snapshot_probe_numeric_keys() {
        let channel = stub(&[
            ("cat /sys/class/thermal/thermal_zone*/temp 2>/dev/null", "41000\n38500"),
            ("cat /proc/loadavg", "0.61 0.55 0.50 2/210 4321"),
            ("cat /proc/meminfo | grep MemAvailable", "MemAvailable:  1430112 kB"),
        ]);
        let snapshot = take_snapshot(channel, Duration::from_secs(1)).await;

        assert_eq!(snapshot["max_temp"], json!(41.0));
        assert_eq!(snapshot["avg_temp"], json!(39.75));
        assert_eq!(snapshot["load_1min"], json!(0.61));
        assert_eq!(snapshot["mem_available_kb"], json!(1430112.0));
    }
}
