// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Background execution of rebuilds.
//!
//! Work runs on a dedicated rayon pool and is tracked in [`RunningTasks`]
//! until it returns, fails or panics. Rebuild results never touch the scene
//! from a worker: they are sent back as [`RebuildMessage`]s and applied on
//! the graph-mutation thread.

pub mod cancel;
mod tasks;

pub use cancel::{no_progress, scaled, CancellationToken, Progress};
pub use tasks::{RunningTasks, TaskContext, TaskHandle, TaskId, TaskInfo};

use crate::error::Error;
use crate::scene::{NodeId, RebuildOutput};
use anyhow::Context;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tasks::{Completion, CompletionGuard, Registration};
use tracing::{debug, error, info};

/// Thread pool plus the registry of what is running on it
pub struct Scheduler {
    pool: rayon::ThreadPool,
    tasks: RunningTasks,
    next_id: AtomicU64,
}

impl Scheduler {
    /// `worker_threads` of None uses one worker per core
    pub fn new(worker_threads: Option<usize>) -> anyhow::Result<Self> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|index| format!("polyframe-rebuild-{}", index));
        if let Some(threads) = worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build().context("Failed to build rebuild thread pool")?;

        Ok(Self {
            pool,
            tasks: RunningTasks::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn running(&self) -> &RunningTasks {
        &self.tasks
    }

    /// Run `work` in the background.
    ///
    /// Errors and panics are logged here and never reach the caller; the
    /// registry entry is removed however the work ends.
    pub fn execute<F>(&self, title: impl Into<String>, owner: Option<NodeId>, work: F) -> TaskHandle
    where
        F: FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let title = title.into();
        let token = CancellationToken::new();
        let completion = Arc::new(Completion::default());

        self.tasks.insert(TaskInfo {
            id,
            title: title.clone(),
            owner,
            status: String::new(),
            progress: 0.0,
        });
        debug!(task = id, %title, "task queued");

        let context = TaskContext {
            id,
            token: token.clone(),
            tasks: self.tasks.clone(),
        };
        let registration = Registration {
            tasks: self.tasks.clone(),
            id,
        };
        let guard = CompletionGuard(completion.clone());

        self.pool.spawn(move || {
            // Dropped in reverse order: registry entry first, then waiters released
            let _guard = guard;
            let _registration = registration;

            match catch_unwind(AssertUnwindSafe(|| work(&context))) {
                Ok(Ok(())) => info!(task = id, %title, "task finished"),
                Ok(Err(err)) if is_cancellation(&err) => debug!(task = id, %title, "task cancelled"),
                Ok(Err(err)) => error!(task = id, %title, error = %format!("{:#}", err), "task failed"),
                Err(payload) => error!(task = id, %title, message = %panic_message(&payload), "task panicked"),
            }
        });

        TaskHandle { id, token, completion }
    }
}

fn is_cancellation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Error>().is_some_and(Error::is_cancelled)
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// How a background rebuild ended
#[derive(Debug)]
pub enum RebuildOutcome {
    Built(RebuildOutput),
    Cancelled,
    Failed(String),
}

/// Result of one rebuild, tagged with the generation it was started for
#[derive(Debug)]
pub struct RebuildMessage {
    pub node: NodeId,
    pub generation: u64,
    pub outcome: RebuildOutcome,
}

/// One-shot reply slot for a rebuild.
///
/// Dropping it unsent reports `Failed`, so the node's lock is released even
/// when the work panics.
pub struct RebuildReply {
    sender: Option<Sender<RebuildMessage>>,
    node: NodeId,
    generation: u64,
}

impl RebuildReply {
    pub fn new(sender: Sender<RebuildMessage>, node: NodeId, generation: u64) -> Self {
        Self {
            sender: Some(sender),
            node,
            generation,
        }
    }

    pub fn send(mut self, outcome: RebuildOutcome) {
        self.deliver(outcome);
    }

    fn deliver(&mut self, outcome: RebuildOutcome) {
        if let Some(sender) = self.sender.take() {
            // The receiver is gone only when the kernel was dropped
            let _ = sender.send(RebuildMessage {
                node: self.node,
                generation: self.generation,
                outcome,
            });
        }
    }
}

impl Drop for RebuildReply {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.deliver(RebuildOutcome::Failed("rebuild ended without a result".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn test_execute_runs_and_unregisters() {
        let scheduler = Scheduler::new(Some(2)).unwrap();
        let (tx, rx) = channel();
        let handle = scheduler.execute("sum", None, move |ctx| {
            ctx.report("Adding", 0.5);
            tx.send(2 + 2).unwrap();
            Ok(())
        });
        assert!(handle.wait(Duration::from_secs(5)));
        assert_eq!(rx.recv().unwrap(), 4);
        assert!(scheduler.running().get(handle.id()).is_none());
    }

    #[test]
    fn test_panic_is_contained() {
        let scheduler = Scheduler::new(Some(1)).unwrap();
        let handle = scheduler.execute("boom", Some(NodeId(9)), |_ctx| panic!("boom"));
        assert!(handle.wait(Duration::from_secs(5)));
        assert!(scheduler.running().is_empty());

        // The pool survives the panic
        let again = scheduler.execute("after", None, |_ctx| Ok(()));
        assert!(again.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_cancel_reaches_work() {
        let scheduler = Scheduler::new(Some(1)).unwrap();
        let (started_tx, started_rx) = channel();
        let (result_tx, result_rx) = channel();
        let handle = scheduler.execute("spin", None, move |ctx| {
            started_tx.send(()).unwrap();
            while !ctx.is_cancelled() {
                std::thread::sleep(Duration::from_millis(1));
            }
            result_tx.send(ctx.check().is_err()).unwrap();
            ctx.check()?;
            Ok(())
        });
        started_rx.recv().unwrap();
        handle.cancel();
        assert!(handle.wait(Duration::from_secs(5)));
        assert!(result_rx.recv().unwrap());
    }

    #[test]
    fn test_unsent_reply_reports_failure() {
        let (tx, rx) = channel();
        drop(RebuildReply::new(tx.clone(), NodeId(4), 2));
        let message = rx.recv().unwrap();
        assert_eq!(message.node, NodeId(4));
        assert_eq!(message.generation, 2);
        assert!(matches!(message.outcome, RebuildOutcome::Failed(_)));

        RebuildReply::new(tx, NodeId(4), 3).send(RebuildOutcome::Cancelled);
        let message = rx.recv().unwrap();
        assert!(matches!(message.outcome, RebuildOutcome::Cancelled));
        assert!(rx.try_recv().is_err());
    }
}
