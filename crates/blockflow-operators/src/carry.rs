//! Cursor over the current block of one input, kept across `execute` calls.

use blockflow_core::block::RowBlock;
use blockflow_core::error::Result;
use blockflow_mem::PooledBlock;

use crate::context::QueryContext;

#[derive(Debug, Default)]
pub(crate) struct Carry {
    block: Option<PooledBlock>,
    cursor: usize,
    exhausted: bool,
}

impl Carry {
    pub fn remaining(&self) -> usize {
        self.block
            .as_ref()
            .map(|b| b.num_rows() - self.cursor)
            .unwrap_or(0)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Make sure unread rows are available, pulling past empty blocks.
    /// Returns false once the input is exhausted.
    pub fn refill(&mut self, ctx: &mut dyn QueryContext, input: usize) -> Result<bool> {
        if self.remaining() > 0 {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        // Drop the drained block before pulling so it can be reused upstream.
        self.block = None;
        self.cursor = 0;
        while let Some(b) = ctx.get_next(input)? {
            if b.num_rows() > 0 {
                self.block = Some(b);
                return Ok(true);
            }
        }
        self.exhausted = true;
        Ok(false)
    }

    pub fn block(&self) -> Option<&RowBlock> {
        self.block.as_deref()
    }

    pub fn advance(&mut self, n: usize) {
        self.cursor += n;
    }
}
