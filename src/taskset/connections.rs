use std::collections::HashMap;

use futures::future::select_all;
use tokio::time::Instant;

use crate::error::{GearmanError, Result};
use crate::registry::{Connection, ServerRegistry};

/// One open connection per server for the lifetime of a task set.
#[derive(Debug, Default)]
pub struct ConnectionCache {
    conns: HashMap<String, Connection>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_open<R: ServerRegistry>(
        &mut self,
        addr: &str,
        registry: &mut R,
    ) -> Result<&mut Connection> {
        if !self.conns.contains_key(addr) {
            let conn = registry.acquire(addr).await?;
            self.conns.insert(addr.to_string(), conn);
        }
        self.get_mut(addr)
            .ok_or_else(|| GearmanError::Internal(format!("connection to {} vanished", addr)))
    }

    pub fn get_mut(&mut self, addr: &str) -> Option<&mut Connection> {
        self.conns.get_mut(addr)
    }

    /// Close and forget the connection to `addr`.
    pub fn evict<R: ServerRegistry>(&mut self, addr: &str, registry: &mut R) {
        if let Some(conn) = self.conns.remove(addr) {
            registry.close(conn);
        }
    }

    /// Hand every connection back to the registry for reuse.
    pub fn release_all<R: ServerRegistry>(&mut self, registry: &mut R) {
        for (_, conn) in self.conns.drain() {
            registry.release(conn);
        }
    }

    /// Close every connection; used when their protocol state is unknown.
    pub fn close_all<R: ServerRegistry>(&mut self, registry: &mut R) {
        for (_, conn) in self.conns.drain() {
            registry.close(conn);
        }
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Wait until at least one connection can be read without blocking and
    /// return the addresses of all such connections. `None` means the
    /// deadline passed first.
    ///
    /// With nothing to wait on there is nothing that could make progress: the
    /// call sleeps out the deadline, or gives up at once when unbounded.
    pub async fn ready(&self, deadline: Option<Instant>) -> Option<Vec<String>> {
        if self.conns.is_empty() {
            if let Some(deadline) = deadline {
                tokio::time::sleep_until(deadline).await;
            }
            return None;
        }

        let (addrs, waits): (Vec<&String>, Vec<_>) = self
            .conns
            .iter()
            .map(|(addr, conn)| (addr, Box::pin(conn.readable())))
            .unzip();

        let first = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, select_all(waits))
                .await
                .ok()?
                .1,
            None => select_all(waits).await.1,
        };

        let mut ready = vec![addrs[first].clone()];
        ready.extend(
            self.conns
                .iter()
                .filter(|(addr, conn)| *addr != addrs[first] && conn.is_readable())
                .map(|(addr, _)| addr.clone()),
        );
        Some(ready)
    }
}
