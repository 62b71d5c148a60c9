use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::protocol::codec;
use crate::registry::ServerRegistry;
use crate::task::Task;
use crate::taskset::dispatch::dispatch;
use crate::taskset::TaskSet;

impl<R: ServerRegistry, T: Task> TaskSet<'_, R, T> {
    /// Route server packets until no task is left in progress or `timeout`
    /// passes (`None` waits as long as it takes).
    ///
    /// Returns `Ok(false)` on timeout or when any foreground task failed.
    /// On timeout every connection is closed and unfinished tasks stay where
    /// they are. Only registry inconsistencies are returned as errors.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);

        while !self.tracker.is_empty() {
            let Some(ready) = self.connections.ready(deadline).await else {
                tracing::warn!(
                    pending = self.tracker.in_progress_len(),
                    connections = self.connections.len(),
                    "Timed out waiting for jobs"
                );
                self.connections.close_all(&mut *self.registry);
                return Ok(false);
            };

            for addr in ready {
                let budget = match deadline {
                    Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                    None => self.handle_timeout,
                };
                self.service(&addr, budget).await?;
            }
        }

        self.connections.release_all(&mut *self.registry);

        let failed = self
            .tracker
            .finished()
            .iter()
            .filter(|task| !task.is_background() && !task.is_successful())
            .count();
        tracing::info!(
            finished = self.tracker.finished().len(),
            failed,
            "All jobs finished"
        );
        Ok(failed == 0)
    }

    /// Read and route one packet from a ready connection. Transport and
    /// protocol failures are logged and swallowed; anything else propagates.
    async fn service(&mut self, addr: &str, budget: Duration) -> Result<()> {
        // A resubmission earlier in this round may have evicted it.
        let Some(conn) = self.connections.get_mut(addr) else {
            return Ok(());
        };
        let server = self.registry.address_for(conn)?;

        let packet = match codec::read_one(conn, budget, self.max_packet_size).await {
            Ok(packet) => packet,
            Err(e) if e.is_network() => {
                tracing::warn!(server = %server, error = %e, "Lost connection to job server");
                // A dead socket stays readable forever; keeping it would spin the loop.
                self.registry.mark_bad(&server);
                self.connections.evict(addr, &mut *self.registry);
                return Ok(());
            }
            Err(e) if e.is_protocol() => {
                tracing::warn!(server = %server, error = %e, "Discarding unreadable packet");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match dispatch(&mut self.awaiting_handle, &mut self.tracker, &server, &packet) {
            Ok(retries) => self.resubmit(retries).await,
            Err(e) if e.is_protocol() => {
                tracing::warn!(server = %server, kind = ?packet.kind, error = %e, "Failed to route packet");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}
