use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::error::{GearmanError, Result};
use crate::registry::{Connection, ServerRegistry};

/// Registry over a fixed list of job servers.
///
/// Routing keys hash onto the server list; servers marked bad are skipped
/// until `bad_server_retry` has passed. Released connections are kept idle
/// per address and handed out again by `acquire`.
#[derive(Debug)]
pub struct ServerPool {
    servers: Vec<String>,
    connect_timeout: Duration,
    bad_server_retry: Duration,
    bad: HashMap<String, Instant>,
    idle: HashMap<String, Vec<Connection>>,
    leased: HashMap<u64, String>,
    next_id: u64,
}

impl ServerPool {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            servers: config.servers.clone(),
            connect_timeout: config.connect_timeout(),
            bad_server_retry: config.bad_server_retry(),
            bad: HashMap::new(),
            idle: HashMap::new(),
            leased: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn is_marked_bad(&self, addr: &str) -> bool {
        self.bad
            .get(addr)
            .is_some_and(|since| since.elapsed() < self.bad_server_retry)
    }

    /// Number of pooled connections waiting for reuse.
    pub fn idle_count(&self, addr: &str) -> usize {
        self.idle.get(addr).map_or(0, Vec::len)
    }

    /// Number of connections currently leased out.
    pub fn leased_count(&self) -> usize {
        self.leased.len()
    }

    async fn connect(&mut self, addr: &str) -> Result<Connection> {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(GearmanError::network(addr, e)),
            Err(_) => {
                return Err(GearmanError::network(
                    addr,
                    io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                ))
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(server = addr, error = %e, "Failed to set TCP_NODELAY");
        }

        self.next_id += 1;
        tracing::debug!(server = addr, conn_id = self.next_id, "Connected to job server");
        Ok(Connection::new(self.next_id, addr.to_string(), stream))
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl ServerRegistry for ServerPool {
    fn resolve(&mut self, routing_key: &str) -> Result<String> {
        let count = self.servers.len();
        if count == 0 {
            return Err(GearmanError::NoServersAvailable);
        }

        let start = (hash_key(routing_key) % count as u64) as usize;
        (0..count)
            .map(|offset| &self.servers[(start + offset) % count])
            .find(|addr| !self.is_marked_bad(addr))
            .cloned()
            .ok_or(GearmanError::NoServersAvailable)
    }

    async fn acquire(&mut self, addr: &str) -> Result<Connection> {
        while let Some(conn) = self.idle.get_mut(addr).and_then(Vec::pop) {
            // An idle connection should have nothing to say; EOF or stray
            // bytes mean it is no longer usable.
            if conn.is_readable() {
                tracing::debug!(server = addr, conn_id = conn.id(), "Dropping stale idle connection");
                continue;
            }
            self.leased.insert(conn.id(), addr.to_string());
            return Ok(conn);
        }

        let conn = self.connect(addr).await?;
        self.leased.insert(conn.id(), addr.to_string());
        Ok(conn)
    }

    fn release(&mut self, conn: Connection) {
        let Some(addr) = self.leased.remove(&conn.id()) else {
            tracing::warn!(conn_id = conn.id(), "Released a connection this pool did not lease");
            return;
        };
        if self.is_marked_bad(&addr) {
            return;
        }
        self.idle.entry(addr).or_default().push(conn);
    }

    fn close(&mut self, conn: Connection) {
        self.leased.remove(&conn.id());
        tracing::debug!(server = conn.addr(), conn_id = conn.id(), "Closing connection");
    }

    fn mark_bad(&mut self, addr: &str) {
        tracing::warn!(server = addr, "Marking job server bad");
        self.bad.insert(addr.to_string(), Instant::now());
        self.idle.remove(addr);
    }

    fn address_for(&self, conn: &Connection) -> Result<String> {
        self.leased.get(&conn.id()).cloned().ok_or_else(|| {
            GearmanError::Internal(format!(
                "connection {} to {} is not leased from this pool",
                conn.id(),
                conn.addr()
            ))
        })
    }
}
