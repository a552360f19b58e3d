//! Device query channel
//!
//! The single primitive every probe is built on: execute a shell command on
//! the device, return its captured output, and return an empty string on any
//! failure or timeout. Nothing ever throws past this boundary - a probe that
//! gets an empty string decides for itself whether that is a finding.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

/// Narrow command-execution channel into the device under diagnosis.
pub trait DeviceChannel: Send + Sync {
    /// Run `command` in the device shell. Returns trimmed stdout, or an empty
    /// string on non-zero exit, spawn failure or timeout. The timeout is
    /// best-effort abandonment: the device-side command is not guaranteed to
    /// be terminated.
    fn execute<'a>(&'a self, command: &'a str, timeout: Duration) -> BoxFuture<'a, String>;
}

/// ADB-backed channel: `adb [base args] shell <command>`.
pub struct AdbChannel {
    program: String,
    base_args: Vec<String>,
}

impl AdbChannel {
    /// Build from a configured command line such as `adb` or
    /// `adb -s emulator-5554`.
    pub fn new(command_line: &str) -> Result<Self> {
        let mut words = shell_words::split(command_line)
            .map_err(|e| anyhow!("invalid adb command line {command_line:?}: {e}"))?;
        if words.is_empty() {
            return Err(anyhow!("adb command line is empty"));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            base_args: words,
        })
    }
}

impl DeviceChannel for AdbChannel {
    fn execute<'a>(&'a self, command: &'a str, timeout: Duration) -> BoxFuture<'a, String> {
        async move {
            let mut cmd = tokio::process::Command::new(&self.program);
            cmd.args(&self.base_args)
                .arg("shell")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            match tokio::time::timeout(timeout, cmd.output()).await {
                Ok(Ok(output)) if output.status.success() => {
                    String::from_utf8_lossy(&output.stdout).trim().to_string()
                }
                Ok(Ok(output)) => {
                    debug!(command, code = ?output.status.code(), "device command failed");
                    String::new()
                }
                Ok(Err(e)) => {
                    debug!(command, "failed to spawn adb: {e}");
                    String::new()
                }
                Err(_) => {
                    debug!(command, ?timeout, "device command abandoned on timeout");
                    String::new()
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_parsing() {
        let channel = AdbChannel::new("adb").unwrap();
        assert_eq!(channel.program, "adb");
        assert!(channel.base_args.is_empty());

        let channel = AdbChannel::new("adb -s emulator-5554").unwrap();
        assert_eq!(channel.program, "adb");
        assert_eq!(channel.base_args, vec!["-s", "emulator-5554"]);

        assert!(AdbChannel::new("").is_err());
        assert!(AdbChannel::new("adb -s 'unterminated").is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure_yields_empty_string() {
        let channel = AdbChannel::new("/nonexistent/adb-binary").unwrap();
        let out = channel.execute("echo hi", Duration::from_secs(1)).await;
        assert_eq!(out, "");
    }
}
