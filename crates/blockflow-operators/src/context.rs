//! The interface an operator sees while executing.

use blockflow_core::error::Result;
use blockflow_mem::PooledBlock;

/// Pull/push surface bound to one planner node inside one pipeline.
///
/// `get_next` runs upstream work synchronously until the input has a block
/// for this consumer or is exhausted. Blocks handed out are owned by the
/// caller; dropping them returns their storage to the pool.
pub trait QueryContext {
    /// Next block from input `input`, or `None` once that input is exhausted.
    fn get_next(&mut self, input: usize) -> Result<Option<PooledBlock>>;

    /// An empty pooled buffer; the caller resizes it.
    fn get_output_buffer(&mut self) -> PooledBlock;

    /// Hand a finished block downstream.
    fn emit(&mut self, block: PooledBlock);

    /// Rows per output block.
    fn block_size(&self) -> usize;
}
