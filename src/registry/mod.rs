//! Job server selection and connection pooling.
//!
//! A task set never opens sockets on its own: it asks a [`ServerRegistry`]
//! which server a routing key should go to, leases connections from it, and
//! hands them back (or asks for them to be closed) when the batch ends.
//!
//! - [`ServerPool`]: the registry used by [`crate::Client`], backed by the
//!   configured server list
//! - [`Connection`]: a leased TCP connection tagged with its server address

pub mod connection;
pub mod pool;

pub use connection::Connection;
pub use pool::ServerPool;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ServerRegistry: Send {
    /// Pick a server for `routing_key`, or `NoServersAvailable`.
    fn resolve(&mut self, routing_key: &str) -> Result<String>;

    /// Lease a connection to `addr`, opening one if none is idle.
    async fn acquire(&mut self, addr: &str) -> Result<Connection>;

    /// Return a healthy connection for reuse.
    fn release(&mut self, conn: Connection);

    /// Drop a connection whose protocol state is unknown.
    fn close(&mut self, conn: Connection);

    /// Stop routing to `addr` for a while.
    fn mark_bad(&mut self, addr: &str);

    /// Address a leased connection is bound to. Fails with `Internal` when the
    /// connection was not leased by this registry.
    fn address_for(&self, conn: &Connection) -> Result<String>;
}
