// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Running-task registry and task handles

use super::cancel::CancellationToken;
use crate::error::Result;
use crate::scene::NodeId;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub type TaskId = u64;

/// What the UI shows for one background job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub title: String,
    pub owner: Option<NodeId>,
    pub status: String,
    pub progress: f64,
}

/// Concurrent registry of tasks that have started and not yet finished
#[derive(Debug, Clone, Default)]
pub struct RunningTasks {
    tasks: Arc<DashMap<TaskId, TaskInfo>>,
}

impl RunningTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, info: TaskInfo) {
        self.tasks.insert(info.id, info);
    }

    pub(crate) fn remove(&self, id: TaskId) {
        self.tasks.remove(&id);
    }

    pub(crate) fn update(&self, id: TaskId, status: &str, progress: f64) {
        if let Some(mut entry) = self.tasks.get_mut(&id) {
            if entry.status != status {
                entry.status = status.to_string();
            }
            entry.progress = progress.clamp(0.0, 1.0);
        }
    }

    pub fn get(&self, id: TaskId) -> Option<TaskInfo> {
        self.tasks.get(&id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All running tasks ordered by start
    pub fn snapshot(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self.tasks.iter().map(|entry| entry.clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub fn for_owner(&self, owner: NodeId) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .tasks
            .iter()
            .filter(|entry| entry.owner == Some(owner))
            .map(|entry| entry.clone())
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }
}

/// Removes the registry entry when the task body ends, panics included
pub(crate) struct Registration {
    pub(crate) tasks: RunningTasks,
    pub(crate) id: TaskId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.tasks.remove(self.id);
    }
}

#[derive(Debug, Default)]
pub(crate) struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn finish(&self) {
        *self.done.lock() = true;
        self.signal.notify_all();
    }

    fn is_done(&self) -> bool {
        *self.done.lock()
    }

    fn wait(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if !*done {
            // Spurious wakeups are handled by the predicate loop
            let _ = self.signal.wait_while_for(&mut done, |done| !*done, timeout);
        }
        *done
    }
}

/// Marks the task finished when dropped
pub(crate) struct CompletionGuard(pub(crate) Arc<Completion>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Passed to the work closure of [`super::Scheduler::execute`]
#[derive(Debug)]
pub struct TaskContext {
    pub(crate) id: TaskId,
    pub(crate) token: CancellationToken,
    pub(crate) tasks: RunningTasks,
}

impl TaskContext {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn check(&self) -> Result<()> {
        self.token.check()
    }

    /// Update the registry entry's status line and progress
    pub fn report(&self, status: &str, progress: f64) {
        self.tasks.update(self.id, status, progress);
    }
}

/// Caller's view of a scheduled task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub(crate) id: TaskId,
    pub(crate) token: CancellationToken,
    pub(crate) completion: Arc<Completion>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Request cooperative cancellation; the task notices at its next check
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.completion.is_done()
    }

    /// Block until the task finishes or `timeout` passes; true if finished
    pub fn wait(&self, timeout: Duration) -> bool {
        self.completion.wait(timeout)
    }
}
