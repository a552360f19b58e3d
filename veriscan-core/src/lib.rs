//! Veriscan core - concurrent diagnostic orchestration engine
//!
//! Probes a remote device through a narrow command-execution channel and
//! reduces heterogeneous subsystem telemetry to one composite health verdict:
//! - Bounded worker pool dispatching heavyweight probes with per-task and
//!   overall deadlines
//! - Background periodic sampler feeding per-metric time series
//! - Coarse-grained extended sampler filling leftover scan budget
//! - Statistics reduction (min/max/mean/median/variance/trend/stability)
//! - Weighted composite scoring over seven fixed subsystems
//!
//! The shell commands issued to the device, output parsing and report
//! rendering live in the agent crate; this crate only consumes opaque
//! `ProbeResult` payloads and a handful of documented well-known keys.

pub mod error;
pub mod extended;
pub mod health;
pub mod models;
pub mod sampler;
pub mod scheduler;
pub mod scoring;
pub mod stats;

pub use error::EngineError;
pub use health::aggregate;
pub use models::{
    CompositeHealth, ErrorRecord, HealthStatus, MetricSample, MetricSeries, MetricValue,
    ProbeOutcome, ProbeResult, ScanResults, Subsystem, SubsystemScore,
};
pub use sampler::{MetricProbe, Sampler, SamplerHandle};
pub use scheduler::{run_all, ProbeTask, ProgressEvent};
pub use stats::{summarize, MetricStats};
