//! Run statistics and their tracing hooks.
//!
//! No telemetry stack here; the binary decides where events go.

use std::time::Duration;

use blockflow_core::dag::NodeKind;
use blockflow_core::id::PipelineId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStats {
    pub tag: String,
    pub kind: NodeKind,
    /// `execute` calls made on the stage's operator.
    pub calls: u64,
    pub blocks: u64,
    pub rows: u64,
}

impl StageStats {
    pub fn new(tag: String, kind: NodeKind) -> Self {
        Self {
            tag,
            kind,
            calls: 0,
            blocks: 0,
            rows: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub pipeline: PipelineId,
    pub stages: Vec<StageStats>,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn stage(&self, tag: &str) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.tag == tag)
    }

    pub fn total_calls(&self) -> u64 {
        self.stages.iter().map(|s| s.calls).sum()
    }
}

#[cfg(feature = "tracing")]
pub fn emit_run_summary(stats: &RunStats) {
    for s in &stats.stages {
        tracing::trace!(
            pipeline = %stats.pipeline,
            node = %s.tag,
            kind = %s.kind,
            calls = s.calls,
            blocks = s.blocks,
            rows = s.rows,
            "stage summary"
        );
    }
    tracing::debug!(
        pipeline = %stats.pipeline,
        stages = stats.stages.len(),
        elapsed_us = stats.elapsed.as_micros() as u64,
        "pipeline finished"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn emit_run_summary(_stats: &RunStats) { /* no-op */
}
