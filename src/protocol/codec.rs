use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{GearmanError, Result};
use crate::protocol::packet::{Magic, Packet, PacketKind, HEADER_LEN};
use crate::registry::Connection;

/// Read one packet carrying `magic`. Framing violations come back as
/// `InvalidData` so callers can tell them apart from transport failures.
pub async fn read_frame<S>(stream: &mut S, magic: Magic, max_payload: usize) -> io::Result<Packet>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    stream.read_exact(&mut header).await?;

    let found = [header[0], header[1], header[2], header[3]];
    if Magic::from_bytes(found) != Some(magic) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected packet magic {:?}", found),
        ));
    }

    let code = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let kind = PacketKind::from_code(code).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown packet type {}", code),
        )
    })?;

    let len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if len > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("packet payload of {} bytes exceeds limit {}", len, max_payload),
        ));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Packet::new(kind, payload))
}

pub async fn write_frame<S>(stream: &mut S, bytes: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Send an encoded request within `timeout`.
pub async fn send(conn: &mut Connection, bytes: &[u8], timeout: Duration) -> Result<()> {
    let addr = conn.addr().to_string();
    match tokio::time::timeout(timeout, write_frame(conn.stream_mut(), bytes)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(GearmanError::network(addr, e)),
        Err(_) => Err(GearmanError::network(addr, timed_out("write"))),
    }
}

/// Read the next response packet within `timeout`.
pub async fn read_one(conn: &mut Connection, timeout: Duration, max_payload: usize) -> Result<Packet> {
    let addr = conn.addr().to_string();
    let read = read_frame(conn.stream_mut(), Magic::Res, max_payload);
    match tokio::time::timeout(timeout, read).await {
        Ok(Ok(packet)) => {
            tracing::trace!(server = %addr, kind = ?packet.kind, len = packet.payload.len(), "Packet received");
            Ok(packet)
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
            Err(GearmanError::Protocol(format!("{} from {}", e, addr)))
        }
        Ok(Err(e)) => Err(GearmanError::network(addr, e)),
        Err(_) => Err(GearmanError::network(addr, timed_out("read"))),
    }
}

fn timed_out(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("{} timed out", op))
}
