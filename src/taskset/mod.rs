//! Batch submission and completion tracking.
//!
//! A [`TaskSet`] owns everything one batch needs: the connection per server,
//! the key-to-server affinity, the task waiting for its handle, and the
//! [`ProgressTracker`] of tasks that hold a handle or are done.
//!
//! # Flow
//!
//! 1. [`TaskSet::add_task`] routes the task's coalescing key to a server,
//!    sends the submission and reads from that server until a handle is
//!    assigned, failing over to another server on transport errors
//! 2. [`TaskSet::wait`] multiplexes every open connection and routes
//!    status, data and completion packets to the tasks they belong to
//! 3. Tasks that fail and ask for a retry are submitted again from
//!    whichever step observed the failure
//!
//! At any moment a task is in exactly one place: waiting for its handle,
//! in one in-progress bucket, or finished.

pub mod affinity;
pub mod connections;
pub mod dispatch;
mod submit;
pub mod tracker;
mod wait;

pub use tracker::{HandleKey, ProgressTracker};

use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::registry::ServerRegistry;
use crate::task::Task;

use affinity::AffinityRouter;
use connections::ConnectionCache;

pub struct TaskSet<'r, R: ServerRegistry, T: Task> {
    registry: &'r mut R,
    handle_timeout: Duration,
    max_packet_size: usize,
    /// At most one submission is ever waiting for its handle.
    awaiting_handle: Option<T>,
    tracker: ProgressTracker<T>,
    connections: ConnectionCache,
    affinity: AffinityRouter,
}

impl<'r, R: ServerRegistry, T: Task> TaskSet<'r, R, T> {
    pub fn new(registry: &'r mut R, config: &ClientConfig) -> Self {
        Self {
            registry,
            handle_timeout: config.handle_timeout(),
            max_packet_size: config.max_packet_size,
            awaiting_handle: None,
            tracker: ProgressTracker::new(),
            connections: ConnectionCache::new(),
            affinity: AffinityRouter::new(),
        }
    }

    /// Submit a task. On success it holds a handle (or, for background
    /// tasks, is already finished). On failure it is finished unsuccessfully
    /// and the error says why no server took it.
    pub async fn add_task(&mut self, task: T) -> Result<()> {
        self.submit(task, true).await
    }

    /// Submit tasks in order, stopping at the first that cannot be placed.
    pub async fn add_tasks<I>(&mut self, tasks: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        for task in tasks {
            self.add_task(task).await?;
        }
        Ok(())
    }

    pub fn is_awaiting_handle(&self) -> bool {
        self.awaiting_handle.is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.tracker.in_progress_len()
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &T> {
        self.tracker.in_progress()
    }

    pub fn handles(&self) -> impl Iterator<Item = &HandleKey> {
        self.tracker.handles()
    }

    pub fn finished(&self) -> &[T] {
        self.tracker.finished()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Server the given coalescing key is currently routed to.
    pub fn routed_server(&self, key: &str) -> Option<&str> {
        self.affinity.get(key)
    }

    /// Give the tasks back as (finished, still in progress). Open
    /// connections are closed.
    pub fn into_tasks(mut self) -> (Vec<T>, Vec<T>) {
        std::mem::take(&mut self.tracker).into_parts()
    }
}

impl<R: ServerRegistry, T: Task> Drop for TaskSet<'_, R, T> {
    fn drop(&mut self) {
        if !self.connections.is_empty() {
            tracing::debug!(
                connections = self.connections.len(),
                "Closing connections of abandoned task set"
            );
            self.connections.close_all(&mut *self.registry);
        }
    }
}
