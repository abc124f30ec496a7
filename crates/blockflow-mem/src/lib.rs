#![forbid(unsafe_code)]
//! blockflow-mem: the row block pool.
//!
//! Operators never allocate blocks directly; they ask their context for an
//! output buffer, which comes from a shared `BlockPool`. Dropping a
//! `PooledBlock` hands its storage back, so error paths and cancelled runs
//! return everything without extra bookkeeping.

pub mod error;
pub mod pool;
pub mod tracking;

pub use error::{Error, Result};
pub use pool::{BlockPool, PoolStats, PooledBlock};
pub use tracking::PeakTracker;
