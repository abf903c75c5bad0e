use std::any::Any;
use std::sync::{Mutex, PoisonError};
use std::thread;

use error_stack::{report, Result};

use crate::LayoutError;

/// Number of resolution threads, leaving room for the rest of the system
pub fn num_threads() -> usize {
    match num_cpus::get() {
        0..3 => 1,
        n => n - 2,
    }
}

/// Runs every job on a bounded set of scoped threads.
///
/// Outputs come back in job order no matter which thread finished first.
/// A job that panics fails the whole run with [`LayoutError::Worker`], with
/// the panic message attached.
pub struct Pool;

impl Pool {
    pub fn run<TIn, TOut, F>(jobs: Vec<TIn>, f: F) -> Result<Vec<TOut>, LayoutError>
    where
        TIn: Send,
        TOut: Send,
        F: Fn(TIn) -> TOut + Sync,
    {
        let count = jobs.len();
        let threads = num_threads().min(count);
        let queue = Mutex::new(jobs.into_iter().enumerate());

        let joined = thread::scope(|s| {
            let handles = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        let mut outputs = Vec::new();
                        loop {
                            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
                            let Some((i, job)) = next else {
                                break;
                            };
                            outputs.push((i, f(job)));
                        }
                        outputs
                    })
                })
                .collect::<Vec<_>>();
            handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
        });

        let mut slots = (0..count).map(|_| None).collect::<Vec<Option<TOut>>>();
        for outputs in joined {
            let outputs = outputs.map_err(|payload| {
                report!(LayoutError::Worker).attach_printable(panic_message(&*payload))
            })?;
            for (i, out) in outputs {
                slots[i] = Some(out);
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, out)| {
                out.ok_or_else(|| {
                    report!(LayoutError::Worker).attach_printable(format!("No output for job {i}"))
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
