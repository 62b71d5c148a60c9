use std::io;

use futures::FutureExt;
use tokio::net::TcpStream;

/// An open connection to one job server, leased from a registry.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    addr: String,
    stream: TcpStream,
}

impl Connection {
    pub fn new(id: u64, addr: String, stream: TcpStream) -> Self {
        Self { id, addr, stream }
    }

    /// Registry-assigned lease id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Resolves once a read would not block: data is buffered, the peer
    /// closed the stream, or the socket errored.
    pub async fn readable(&self) -> io::Result<()> {
        let mut probe = [0u8; 1];
        self.stream.peek(&mut probe).await.map(|_| ())
    }

    /// Non-blocking form of [`Connection::readable`].
    pub fn is_readable(&self) -> bool {
        self.readable().now_or_never().is_some()
    }
}
