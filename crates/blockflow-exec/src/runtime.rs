//! Runtime: validate a plan, instantiate its operators, and pull it.
//!
//! - `Engine::prepare` runs type and length inference and builds one
//!   prototype operator per distinct planner node. Structural errors surface
//!   here.
//! - `Engine::stream` clones the prototypes into a fresh `Pipeline` and
//!   hands back an iterator over the root's blocks.
//! - `Engine::execute_concurrent` runs independent plans on scoped threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;

use blockflow_core::block::RowBlock;
use blockflow_core::config::EngineConfig;
use blockflow_core::dag::{post_order, NodeTagger, PNode};
use blockflow_core::error::Error as CoreError;
use blockflow_core::id::PipelineId;
use blockflow_core::schema::TypeTag;
use blockflow_mem::{BlockPool, PooledBlock};
use blockflow_operators::traits::Operator;
use blockflow_operators::{validate_plan, PlanInfo, Registry};

use crate::metrics::{emit_run_summary, RunStats, StageStats};
use crate::pipeline::Pipeline;
use crate::scheduler;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0} panicked: {1}")]
    Panicked(PipelineId, String),
}

impl ExecError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            ExecError::Core(e) => e.is_recoverable(),
            ExecError::Panicked(..) => false,
        }
    }
}

impl From<ExecError> for CoreError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Core(e) => e,
            other => CoreError::Invariant(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// A validated plan with one prototype operator per distinct node.
pub struct PreparedPlan {
    pub(crate) root: PNode,
    pub(crate) info: PlanInfo,
    /// Distinct nodes, inputs before consumers; the root is last.
    pub(crate) nodes: Vec<PNode>,
    pub(crate) prototypes: Vec<Box<dyn Operator>>,
    pub(crate) tags: Vec<String>,
}

impl PreparedPlan {
    pub fn root(&self) -> &PNode {
        &self.root
    }

    pub fn types(&self) -> &[TypeTag] {
        &self.info.types
    }

    pub fn length(&self) -> Option<u64> {
        self.info.length
    }

    pub fn distinct_nodes(&self) -> usize {
        self.info.distinct_nodes
    }
}

impl std::fmt::Debug for PreparedPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedPlan")
            .field("info", &self.info)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Everything one run produced.
#[derive(Debug)]
pub struct RunOutput {
    pub types: Vec<TypeTag>,
    pub blocks: Vec<RowBlock>,
    pub stats: RunStats,
}

impl RunOutput {
    pub fn num_rows(&self) -> usize {
        self.blocks.iter().map(|b| b.num_rows()).sum()
    }
}

/// Engine owns the configuration and the block pool shared by every
/// pipeline it starts.
pub struct Engine {
    cfg: EngineConfig,
    pool: BlockPool,
    next_pipeline: AtomicU64,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        let pool = BlockPool::from_config(&cfg);
        Self::with_pool(cfg, pool)
    }

    pub fn with_pool(cfg: EngineConfig, pool: BlockPool) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            pool,
            next_pipeline: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn prepare(&self, root: &PNode) -> Result<PreparedPlan> {
        let info = validate_plan(root)?;
        let nodes = post_order(root);
        let mut tagger = NodeTagger::new();
        let mut prototypes = Vec::with_capacity(nodes.len());
        let mut tags = Vec::with_capacity(nodes.len());
        for n in &nodes {
            prototypes.push(Registry::make(n)?);
            tags.push(tagger.tag(n));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = nodes.len(),
            types = %blockflow_core::schema::format_types(&info.types),
            length = ?info.length,
            "plan prepared"
        );
        Ok(PreparedPlan {
            root: root.clone(),
            info,
            nodes,
            prototypes,
            tags,
        })
    }

    fn pipeline(&self, plan: &PreparedPlan) -> Result<Pipeline> {
        let id = PipelineId::new(self.next_pipeline.fetch_add(1, Ordering::Relaxed));
        Ok(Pipeline::build(
            id,
            plan,
            self.pool.clone(),
            self.cfg.block_size,
            self.cfg.max_queued_blocks,
        )?)
    }

    /// Pull `plan` lazily. Dropping the stream cancels the run.
    pub fn stream(&self, plan: &PreparedPlan) -> Result<BlockStream> {
        Ok(BlockStream::new(self.pipeline(plan)?))
    }

    /// Prepare and run `root` to completion.
    pub fn execute(&self, root: &PNode) -> Result<RunOutput> {
        let plan = self.prepare(root)?;
        run_to_end(self.pipeline(&plan)?, plan.info.types.clone())
    }

    /// Run independent plans, at most `max_parallel_pipelines` at a time.
    /// Results come back in input order; one failing plan does not stop the
    /// others.
    pub fn execute_concurrent(&self, roots: &[PNode]) -> Vec<Result<RunOutput>> {
        let mut jobs = Vec::with_capacity(roots.len());
        for root in roots {
            jobs.push(
                self.prepare(root)
                    .and_then(|p| Ok((self.pipeline(&p)?, p.info.types.clone()))),
            );
        }
        scheduler::run_bounded(jobs, self.cfg.max_parallel_pipelines)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cfg", &self.cfg)
            .field("pool", &self.pool)
            .finish()
    }
}

pub(crate) fn run_to_end(pipeline: Pipeline, types: Vec<TypeTag>) -> Result<RunOutput> {
    let mut stream = BlockStream::new(pipeline);
    let mut blocks = Vec::new();
    for block in &mut stream {
        blocks.push(block?);
    }
    let stats = stream.finish();
    emit_run_summary(&stats);
    Ok(RunOutput {
        types,
        blocks,
        stats,
    })
}

/// Lazily pulled output of one pipeline.
///
/// Iterating yields detached `RowBlock`s; `next_block` keeps the block on
/// loan from the pool instead. After an error the stream yields nothing.
pub struct BlockStream {
    pipeline: Pipeline,
    started: Instant,
    failed: bool,
}

impl BlockStream {
    fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            started: Instant::now(),
            failed: false,
        }
    }

    pub fn id(&self) -> PipelineId {
        self.pipeline.id()
    }

    pub fn next_block(&mut self) -> Result<Option<PooledBlock>> {
        if self.failed {
            return Ok(None);
        }
        match self.pipeline.next_block() {
            Ok(b) => Ok(b),
            Err(e) => {
                self.failed = true;
                Err(e.into())
            }
        }
    }

    pub fn stats(&self) -> Vec<StageStats> {
        self.pipeline.stats()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop pulling and report what ran. Unread blocks go back to the pool.
    pub fn finish(self) -> RunStats {
        let elapsed = self.started.elapsed();
        self.pipeline.into_stats(elapsed)
    }
}

impl Iterator for BlockStream {
    type Item = Result<RowBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose().map(|r| r.map(PooledBlock::detach))
    }
}

impl std::fmt::Debug for BlockStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStream")
            .field("pipeline", &self.pipeline)
            .field("failed", &self.failed)
            .finish()
    }
}
