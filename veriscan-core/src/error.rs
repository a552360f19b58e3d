//! Fatal orchestration errors.
//!
//! Everything a probe can do wrong is absorbed into an `ErrorRecord` and the
//! scan continues. The variants here are the one loud failure path: a scan
//! whose task set or worker pool cannot be constructed at all.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("worker pool requires at least one worker")]
    EmptyWorkerPool,

    #[error("duplicate probe task name: {0}")]
    DuplicateTask(String),

    #[error("probe task registered without a name")]
    UnnamedTask,
}
