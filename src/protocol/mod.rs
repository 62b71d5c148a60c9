//! Gearman binary protocol as seen from a client.
//!
//! Every packet is a 12-byte header (`\0REQ`/`\0RES` magic, big-endian type,
//! big-endian payload length) followed by NUL-separated arguments.
//!
//! - [`packet`]: packet kinds, construction and payload field access
//! - [`codec`]: framing over async streams and the timed send/read used by
//!   the task set

pub mod codec;
pub mod packet;

pub use packet::{Magic, Packet, PacketKind, Priority};
