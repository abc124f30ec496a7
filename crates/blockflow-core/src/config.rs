//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per block exchanged between operators.
    pub block_size: usize,

    /// Free blocks the pool keeps around for reuse; extra releases are dropped.
    pub pool_max_retained: usize,

    /// Blocks a lagging consumer of a shared node may have queued before it
    /// is switched to its own replay of that node's subplan.
    pub max_queued_blocks: usize,

    /// Pipelines `execute_concurrent` runs at the same time.
    pub max_parallel_pipelines: usize,

    /// Per-request timeout for the lambda evaluator.
    pub lambda_request_timeout_ms: u64,

    /// Try the shared-buffer transport before the framed stream transport.
    pub lambda_fast_path: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: 256,
            pool_max_retained: 64,
            max_queued_blocks: 16,
            max_parallel_pipelines: 4,
            lambda_request_timeout_ms: 30_000,
            lambda_fast_path: true,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `BLOCKFLOW_BLOCK_SIZE`: rows per block
    /// - `BLOCKFLOW_POOL_MAX_RETAINED`: free blocks retained by the pool
    /// - `BLOCKFLOW_MAX_QUEUED_BLOCKS`: per-edge queue bound for shared nodes
    /// - `BLOCKFLOW_MAX_PARALLEL_PIPELINES`: concurrent pipelines
    /// - `BLOCKFLOW_LAMBDA_TIMEOUT_MS`: evaluator request timeout
    /// - `BLOCKFLOW_LAMBDA_FAST_PATH`: `0`/`false` disables the shared buffer
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("BLOCKFLOW_BLOCK_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.block_size = v;
            }
        }

        if let Ok(s) = std::env::var("BLOCKFLOW_POOL_MAX_RETAINED") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.pool_max_retained = v;
            }
        }

        if let Ok(s) = std::env::var("BLOCKFLOW_MAX_QUEUED_BLOCKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_queued_blocks = v;
            }
        }

        if let Ok(s) = std::env::var("BLOCKFLOW_MAX_PARALLEL_PIPELINES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_pipelines = v;
            }
        }

        if let Ok(s) = std::env::var("BLOCKFLOW_LAMBDA_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.lambda_request_timeout_ms = v;
            }
        }

        if let Ok(s) = std::env::var("BLOCKFLOW_LAMBDA_FAST_PATH") {
            if let Some(v) = parse_flag(&s) {
                cfg.lambda_fast_path = v;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be > 0".into()));
        }
        if self.max_queued_blocks == 0 {
            return Err(Error::Config("max_queued_blocks must be > 0".into()));
        }
        if self.max_parallel_pipelines == 0 {
            return Err(Error::Config("max_parallel_pipelines must be > 0".into()));
        }
        if self.lambda_request_timeout_ms == 0 {
            return Err(Error::Config(
                "lambda_request_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
