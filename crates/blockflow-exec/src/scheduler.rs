//! Bounded parallel runner for independent pipelines.
//!
//! Pipelines are built on the caller's thread and moved into scoped worker
//! threads, `limit` at a time. A panicking pipeline is reported as
//! `ExecError::Panicked` in its own slot.

use std::any::Any;

use blockflow_core::schema::TypeTag;

use crate::pipeline::Pipeline;
use crate::runtime::{run_to_end, ExecError, Result, RunOutput};

pub(crate) type Job = (Pipeline, Vec<TypeTag>);

pub(crate) fn run_bounded(jobs: Vec<Result<Job>>, limit: usize) -> Vec<Result<RunOutput>> {
    let limit = limit.max(1);
    let mut results: Vec<Result<RunOutput>> = Vec::with_capacity(jobs.len());
    let mut jobs = jobs.into_iter().peekable();

    while jobs.peek().is_some() {
        let wave: Vec<Result<Job>> = jobs.by_ref().take(limit).collect();
        #[cfg(feature = "tracing")]
        tracing::debug!(pipelines = wave.len(), "starting pipeline wave");

        std::thread::scope(|s| {
            let handles: Vec<_> = wave
                .into_iter()
                .map(|job| match job {
                    Ok((pipeline, types)) => {
                        let id = pipeline.id();
                        Ok((id, s.spawn(move || run_to_end(pipeline, types))))
                    }
                    Err(e) => Err(e),
                })
                .collect();
            for h in handles {
                results.push(match h {
                    Ok((id, handle)) => handle
                        .join()
                        .unwrap_or_else(|p| Err(ExecError::Panicked(id, panic_message(p)))),
                    Err(e) => Err(e),
                });
            }
        });
    }
    results
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}
