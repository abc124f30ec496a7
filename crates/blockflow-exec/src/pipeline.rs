//! One executable copy of a prepared plan.
//!
//! Stages live in an arena indexed in post-order, so every stage's inputs
//! sit at lower indices. Each consumer edge owns a queue on the producing
//! stage; pulling from an empty queue steps the producer until it has output
//! for that edge or finishes.
//!
//! A shared producer never queues more than `max_queued` blocks for one
//! edge. An edge that falls that far behind is cut loose: it keeps what it
//! already has queued, then reads from a private copy of the producer's
//! subplan, skipping the rows it was already handed.

use std::collections::{HashMap, VecDeque};

use blockflow_core::dag::node_key;
use blockflow_core::error::{Error, Result};
use blockflow_core::id::PipelineId;
use blockflow_mem::{BlockPool, PooledBlock};
use blockflow_operators::traits::{ExecStatus, Operator};
use blockflow_operators::QueryContext;

use crate::metrics::{RunStats, StageStats};
use crate::runtime::PreparedPlan;

#[derive(Debug, Clone, Copy)]
struct Replay {
    stage: usize,
    slot: usize,
    /// Leading rows of the replay the edge has already been handed.
    skip: u64,
}

#[derive(Default)]
struct Edge {
    queue: VecDeque<PooledBlock>,
    delivered: u64,
    replay: Option<Replay>,
}

struct Stage {
    prototype: Box<dyn Operator>,
    // Taken out while the operator executes.
    operator: Option<Box<dyn Operator>>,
    /// (producing stage, queue index on that stage), one per operator input.
    inputs: Vec<(usize, usize)>,
    outputs: Vec<Edge>,
    finished: bool,
    stats: StageStats,
}

pub struct Pipeline {
    id: PipelineId,
    stages: Vec<Stage>,
    root: usize,
    sink: usize,
    pool: BlockPool,
    block_size: usize,
    max_queued: usize,
}

impl Pipeline {
    pub(crate) fn build(
        id: PipelineId,
        plan: &PreparedPlan,
        pool: BlockPool,
        block_size: usize,
        max_queued: usize,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(plan.nodes.len());
        let mut stages: Vec<Stage> = Vec::with_capacity(plan.nodes.len());

        for (i, node) in plan.nodes.iter().enumerate() {
            let mut inputs = Vec::with_capacity(node.inputs.len());
            for input in &node.inputs {
                let up = *index.get(&node_key(input)).ok_or_else(|| {
                    Error::Invariant(format!("input of {} not prepared", plan.tags[i]))
                })?;
                let producer: &mut Stage = &mut stages[up];
                producer.outputs.push(Edge::default());
                inputs.push((up, producer.outputs.len() - 1));
            }
            index.insert(node_key(node), i);
            stages.push(Stage {
                prototype: plan.prototypes[i].clone_operator(),
                operator: Some(plan.prototypes[i].clone_operator()),
                inputs,
                outputs: Vec::new(),
                finished: false,
                stats: StageStats::new(plan.tags[i].clone(), node.kind),
            });
        }

        let root = stages
            .len()
            .checked_sub(1)
            .ok_or_else(|| Error::Invariant("empty plan".into()))?;
        stages[root].outputs.push(Edge::default());
        let sink = stages[root].outputs.len() - 1;

        Ok(Self {
            id,
            stages,
            root,
            sink,
            pool,
            block_size,
            max_queued: max_queued.max(1),
        })
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Next non-empty block from the root, `None` once the plan is exhausted.
    pub fn next_block(&mut self) -> Result<Option<PooledBlock>> {
        self.pull(self.root, self.sink)
    }

    pub fn is_finished(&self) -> bool {
        let root = &self.stages[self.root];
        root.finished && root.outputs[self.sink].queue.is_empty()
    }

    pub fn stats(&self) -> Vec<StageStats> {
        self.stages.iter().map(|s| s.stats.clone()).collect()
    }

    pub(crate) fn into_stats(self, elapsed: std::time::Duration) -> RunStats {
        RunStats {
            pipeline: self.id,
            stages: self.stats(),
            elapsed,
        }
    }

    fn pull(&mut self, stage: usize, slot: usize) -> Result<Option<PooledBlock>> {
        loop {
            let s = &mut self.stages[stage];
            let edge = s.outputs.get_mut(slot).ok_or_else(|| {
                Error::Invariant(format!("{} has no output queue {}", s.stats.tag, slot))
            })?;
            if let Some(block) = edge.queue.pop_front() {
                return Ok(Some(block));
            }
            if let Some(replay) = edge.replay {
                return self.pull_replay(stage, slot, replay);
            }
            if s.finished {
                return Ok(None);
            }
            self.step(stage)?;
        }
    }

    fn step(&mut self, stage: usize) -> Result<()> {
        let mut op = self.stages[stage].operator.take().ok_or_else(|| {
            Error::Invariant(format!("{} re-entered while executing", self.stages[stage].stats.tag))
        })?;

        let status = op.execute(&mut StageContext {
            pipeline: self,
            stage,
        });

        let s = &mut self.stages[stage];
        s.operator = Some(op);
        s.stats.calls += 1;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            pipeline = %self.id,
            node = %s.stats.tag,
            kind = %s.stats.kind,
            ok = status.is_ok(),
            "stage step"
        );

        if status? == ExecStatus::Finished {
            s.finished = true;
            // Nothing will read these again; give the storage back early.
            s.operator = None;
        }
        Ok(())
    }

    fn pull_replay(
        &mut self,
        stage: usize,
        slot: usize,
        mut replay: Replay,
    ) -> Result<Option<PooledBlock>> {
        loop {
            let Some(block) = self.pull(replay.stage, replay.slot)? else {
                return Ok(None);
            };
            let rows = block.num_rows() as u64;
            if replay.skip >= rows {
                replay.skip -= rows;
                self.stages[stage].outputs[slot].replay = Some(replay);
                continue;
            }
            let out = if replay.skip == 0 {
                block
            } else {
                self.drop_leading(&block, replay.skip as usize)
            };
            replay.skip = 0;
            self.stages[stage].outputs[slot].replay = Some(replay);
            return Ok(Some(out));
        }
    }

    fn drop_leading(&self, block: &PooledBlock, n: usize) -> PooledBlock {
        let keep = block.num_rows() - n;
        let mut out = self.pool.acquire(block.num_columns(), keep);
        out.copy_range_from(0, 0, block, n, keep);
        out
    }

    fn deliver(&mut self, stage: usize, block: PooledBlock) {
        if block.is_empty() {
            return;
        }
        let max_queued = self.max_queued;
        let rows = block.num_rows() as u64;
        let s = &mut self.stages[stage];
        s.stats.blocks += 1;
        s.stats.rows += rows;

        let shared = s.outputs.len() > 1;
        let mut live = Vec::with_capacity(s.outputs.len());
        let mut lagging = Vec::new();
        for (slot, edge) in s.outputs.iter().enumerate() {
            if edge.replay.is_some() {
                continue;
            }
            if shared && edge.queue.len() >= max_queued {
                lagging.push(slot);
            } else {
                live.push(slot);
            }
        }

        if let Some((&last, rest)) = live.split_last() {
            for &slot in rest {
                let edge = &mut s.outputs[slot];
                edge.queue.push_back(block.duplicate());
                edge.delivered += rows;
            }
            let edge = &mut s.outputs[last];
            edge.queue.push_back(block);
            edge.delivered += rows;
        }

        for slot in lagging {
            self.detach(stage, slot);
        }
    }

    /// Give edge `slot` of `stage` its own copy of the producer's subplan.
    fn detach(&mut self, stage: usize, slot: usize) {
        let mut copies = HashMap::new();
        let copy = self.copy_subplan(stage, &mut copies);
        let replica = &mut self.stages[copy];
        replica.outputs.push(Edge::default());
        let replay_slot = replica.outputs.len() - 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            pipeline = %self.id,
            node = %self.stages[stage].stats.tag,
            slot,
            "lagging edge switched to a replay"
        );
        let edge = &mut self.stages[stage].outputs[slot];
        edge.replay = Some(Replay {
            stage: copy,
            slot: replay_slot,
            skip: edge.delivered,
        });
    }

    fn copy_subplan(&mut self, stage: usize, copies: &mut HashMap<usize, usize>) -> usize {
        if let Some(&done) = copies.get(&stage) {
            return done;
        }
        let ups: Vec<usize> = self.stages[stage].inputs.iter().map(|&(up, _)| up).collect();
        let mut inputs = Vec::with_capacity(ups.len());
        for up in ups {
            let c = self.copy_subplan(up, copies);
            let producer = &mut self.stages[c];
            producer.outputs.push(Edge::default());
            inputs.push((c, producer.outputs.len() - 1));
        }
        let src = &self.stages[stage];
        let replica = Stage {
            prototype: src.prototype.clone_operator(),
            operator: Some(src.prototype.clone_operator()),
            inputs,
            outputs: Vec::new(),
            finished: false,
            stats: StageStats::new(format!("{}'", src.stats.tag), src.stats.kind),
        };
        self.stages.push(replica);
        let idx = self.stages.len() - 1;
        copies.insert(stage, idx);
        idx
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("stages", &self.stages.len())
            .field("block_size", &self.block_size)
            .finish()
    }
}

/// The context handed to the operator of `stage`.
struct StageContext<'a> {
    pipeline: &'a mut Pipeline,
    stage: usize,
}

impl QueryContext for StageContext<'_> {
    fn get_next(&mut self, input: usize) -> Result<Option<PooledBlock>> {
        let (up, slot) = *self.pipeline.stages[self.stage]
            .inputs
            .get(input)
            .ok_or_else(|| {
                Error::Invariant(format!(
                    "{} has no input {}",
                    self.pipeline.stages[self.stage].stats.tag, input
                ))
            })?;
        self.pipeline.pull(up, slot)
    }

    fn get_output_buffer(&mut self) -> PooledBlock {
        self.pipeline.pool.acquire(0, 0)
    }

    fn emit(&mut self, block: PooledBlock) {
        self.pipeline.deliver(self.stage, block);
    }

    fn block_size(&self) -> usize {
        self.pipeline.block_size
    }
}
