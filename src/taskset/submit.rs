use std::collections::HashSet;

use crate::error::{GearmanError, Result};
use crate::protocol::codec;
use crate::registry::ServerRegistry;
use crate::task::Task;
use crate::taskset::dispatch::dispatch;
use crate::taskset::TaskSet;

impl<R: ServerRegistry, T: Task> TaskSet<'_, R, T> {
    /// Submit `task` and, once it holds a handle, any tasks whose failures
    /// were reported while it was in flight.
    pub(crate) async fn submit(&mut self, task: T, is_new: bool) -> Result<()> {
        let mut retries = Vec::new();
        let outcome = self.submit_one(task, is_new, &mut retries).await;
        self.resubmit(retries).await;
        outcome
    }

    /// Resubmit tasks that asked for another attempt. A task that cannot be
    /// placed on any server is finished as failed.
    pub(crate) async fn resubmit(&mut self, mut queue: Vec<T>) {
        while !queue.is_empty() {
            let task = queue.remove(0);
            let key = task.coalescing_key();
            let mut more = Vec::new();
            if let Err(e) = self.submit_one(task, false, &mut more).await {
                tracing::warn!(key = %key.escape_default(), error = %e, "Resubmission failed, giving up on task");
            }
            queue.extend(more);
        }
    }

    /// Drive one task until a server assigns it a handle, failing over to
    /// another server on transport errors. On error the task is finished
    /// unsuccessfully.
    async fn submit_one(&mut self, mut task: T, is_new: bool, retries: &mut Vec<T>) -> Result<()> {
        if is_new {
            task.reset_state();
        }
        let key = task.coalescing_key();
        let request = task.submit_packet();
        let mut pending = Some(task);
        let mut tried = HashSet::new();

        loop {
            let addr = match self.affinity.route(&key, &mut *self.registry) {
                Ok(addr) => addr,
                Err(e) => return Err(self.abandon(pending, e)),
            };
            // Bad marks may expire mid-submission; each server gets one attempt.
            if !tried.insert(addr.clone()) {
                self.affinity.forget(&key);
                return Err(self.abandon(pending, GearmanError::NoServersAvailable));
            }

            match self.exchange(&addr, &request, &mut pending, retries).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_network() => {
                    tracing::warn!(server = %addr, error = %e, "Submission failed, trying another server");
                    if pending.is_none() {
                        pending = self.awaiting_handle.take();
                    }
                    self.registry.mark_bad(&addr);
                    self.connections.evict(&addr, &mut *self.registry);
                    self.affinity.forget(&key);
                }
                Err(e) => return Err(self.abandon(pending, e)),
            }
        }
    }

    /// Send the request to `addr` and read packets from it until the
    /// handle arrives. Packets for other tasks are routed as they come.
    async fn exchange(
        &mut self,
        addr: &str,
        request: &[u8],
        pending: &mut Option<T>,
        retries: &mut Vec<T>,
    ) -> Result<()> {
        let conn = self
            .connections
            .get_or_open(addr, &mut *self.registry)
            .await?;
        codec::send(conn, request, self.handle_timeout).await?;
        self.awaiting_handle = pending.take();

        while self.awaiting_handle.is_some() {
            let conn = self.connections.get_mut(addr).ok_or_else(|| {
                GearmanError::Internal(format!("connection to {} vanished mid-submission", addr))
            })?;
            let packet = codec::read_one(conn, self.handle_timeout, self.max_packet_size).await?;
            retries.extend(dispatch(
                &mut self.awaiting_handle,
                &mut self.tracker,
                addr,
                &packet,
            )?);
        }
        Ok(())
    }

    fn abandon(&mut self, pending: Option<T>, error: GearmanError) -> GearmanError {
        if let Some(task) = pending.or_else(|| self.awaiting_handle.take()) {
            self.tracker.finish(task);
        }
        error
    }
}
