use crate::error::{GearmanError, Result};

/// Size of the fixed packet header: magic, type, payload length.
pub const HEADER_LEN: usize = 12;

/// Direction marker at the start of every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    Req,
    Res,
}

impl Magic {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            Magic::Req => *b"\0REQ",
            Magic::Res => *b"\0RES",
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        match &bytes {
            b"\0REQ" => Some(Magic::Req),
            b"\0RES" => Some(Magic::Res),
            _ => None,
        }
    }
}

/// Packet types a client sends or receives. Codes the client never acts on
/// are kept as `Other` so they can be logged and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Noop,
    SubmitJob,
    JobCreated,
    WorkStatus,
    WorkComplete,
    WorkFail,
    EchoRes,
    SubmitJobBg,
    Error,
    StatusRes,
    SubmitJobHigh,
    WorkException,
    OptionRes,
    WorkData,
    WorkWarning,
    SubmitJobHighBg,
    SubmitJobLow,
    SubmitJobLowBg,
    Other(u32),
}

impl PacketKind {
    pub fn code(self) -> u32 {
        match self {
            PacketKind::Noop => 6,
            PacketKind::SubmitJob => 7,
            PacketKind::JobCreated => 8,
            PacketKind::WorkStatus => 12,
            PacketKind::WorkComplete => 13,
            PacketKind::WorkFail => 14,
            PacketKind::EchoRes => 17,
            PacketKind::SubmitJobBg => 18,
            PacketKind::Error => 19,
            PacketKind::StatusRes => 20,
            PacketKind::SubmitJobHigh => 21,
            PacketKind::WorkException => 25,
            PacketKind::OptionRes => 27,
            PacketKind::WorkData => 28,
            PacketKind::WorkWarning => 29,
            PacketKind::SubmitJobHighBg => 32,
            PacketKind::SubmitJobLow => 33,
            PacketKind::SubmitJobLowBg => 34,
            PacketKind::Other(code) => code,
        }
    }

    /// Map a wire code to a kind; codes outside the protocol table are rejected.
    pub fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            6 => PacketKind::Noop,
            7 => PacketKind::SubmitJob,
            8 => PacketKind::JobCreated,
            12 => PacketKind::WorkStatus,
            13 => PacketKind::WorkComplete,
            14 => PacketKind::WorkFail,
            17 => PacketKind::EchoRes,
            18 => PacketKind::SubmitJobBg,
            19 => PacketKind::Error,
            20 => PacketKind::StatusRes,
            21 => PacketKind::SubmitJobHigh,
            25 => PacketKind::WorkException,
            27 => PacketKind::OptionRes,
            28 => PacketKind::WorkData,
            29 => PacketKind::WorkWarning,
            32 => PacketKind::SubmitJobHighBg,
            33 => PacketKind::SubmitJobLow,
            34 => PacketKind::SubmitJobLowBg,
            1..=34 => PacketKind::Other(code),
            _ => return None,
        };
        Some(kind)
    }

    /// Submission packet type for a priority/background combination.
    pub fn submit(priority: Priority, background: bool) -> Self {
        match (priority, background) {
            (Priority::Normal, false) => PacketKind::SubmitJob,
            (Priority::Normal, true) => PacketKind::SubmitJobBg,
            (Priority::High, false) => PacketKind::SubmitJobHigh,
            (Priority::High, true) => PacketKind::SubmitJobHighBg,
            (Priority::Low, false) => PacketKind::SubmitJobLow,
            (Priority::Low, true) => PacketKind::SubmitJobLowBg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Build a packet whose arguments are joined with NUL separators.
    pub fn with_args(kind: PacketKind, args: &[&[u8]]) -> Self {
        Self::new(kind, args.join(&0u8))
    }

    /// Request to run `function` with `argument`. An empty unique id lets the
    /// server skip coalescing.
    pub fn submit(
        priority: Priority,
        background: bool,
        function: &str,
        unique: &str,
        argument: &[u8],
    ) -> Self {
        Self::with_args(
            PacketKind::submit(priority, background),
            &[function.as_bytes(), unique.as_bytes(), argument],
        )
    }

    pub fn encode(&self, magic: Magic) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&magic.bytes());
        buf.extend_from_slice(&self.kind.code().to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Split the payload into at most `count` arguments; the last one keeps
    /// any embedded NULs.
    pub fn args(&self, count: usize) -> Vec<&[u8]> {
        if count == 0 {
            return Vec::new();
        }
        self.payload.splitn(count, |b| *b == 0).collect()
    }

    /// The job handle is the first NUL-delimited field of every work-* payload.
    pub fn handle(&self) -> Result<&str> {
        let raw = self.payload.split(|b| *b == 0).next().unwrap_or_default();
        if raw.is_empty() {
            return Err(GearmanError::Protocol(format!(
                "{:?} packet without a job handle",
                self.kind
            )));
        }
        std::str::from_utf8(raw).map_err(|_| {
            GearmanError::Protocol(format!("{:?} packet with non-UTF-8 handle", self.kind))
        })
    }

    /// Handle plus everything after the first separator.
    pub fn handle_and_body(&self) -> Result<(&str, &[u8])> {
        let handle = self.handle()?;
        let body = self.payload.get(handle.len() + 1..).unwrap_or_default();
        Ok((handle, body))
    }

    /// Handle, numerator and denominator of a work-status packet.
    pub fn status(&self) -> Result<(&str, u64, u64)> {
        let handle = self.handle()?;
        let args = self.args(3);
        if args.len() != 3 {
            return Err(GearmanError::Protocol(format!(
                "work status for {} has {} fields, expected 3",
                handle,
                args.len()
            )));
        }
        Ok((handle, parse_number(args[1])?, parse_number(args[2])?))
    }
}

fn parse_number(raw: &[u8]) -> Result<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| {
            GearmanError::Protocol(format!(
                "invalid status number {:?}",
                String::from_utf8_lossy(raw)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_header_and_payload() {
        let packet = Packet::submit(Priority::Normal, false, "reverse", "u1", b"abc");
        let bytes = packet.encode(Magic::Req);
        assert_eq!(&bytes[..4], b"\0REQ");
        assert_eq!(&bytes[4..8], &7u32.to_be_bytes());
        assert_eq!(&bytes[8..12], &13u32.to_be_bytes());
        assert_eq!(&bytes[12..], b"reverse\0u1\0abc");
    }

    #[test]
    fn submit_kind_follows_priority_and_background() {
        assert_eq!(PacketKind::submit(Priority::Normal, true), PacketKind::SubmitJobBg);
        assert_eq!(PacketKind::submit(Priority::High, false), PacketKind::SubmitJobHigh);
        assert_eq!(PacketKind::submit(Priority::High, true).code(), 32);
        assert_eq!(PacketKind::submit(Priority::Low, false).code(), 33);
        assert_eq!(PacketKind::submit(Priority::Low, true).code(), 34);
    }

    #[test]
    fn codes_outside_table_are_rejected() {
        assert_eq!(PacketKind::from_code(8), Some(PacketKind::JobCreated));
        assert_eq!(PacketKind::from_code(11), Some(PacketKind::Other(11)));
        assert_eq!(PacketKind::from_code(0), None);
        assert_eq!(PacketKind::from_code(35), None);
    }

    #[test]
    fn body_keeps_embedded_nuls() {
        let packet = Packet::new(PacketKind::WorkComplete, b"H:1\0a\0b".to_vec());
        let (handle, body) = packet.handle_and_body().unwrap();
        assert_eq!(handle, "H:1");
        assert_eq!(body, b"a\0b");
    }

    #[test]
    fn handle_only_payload_has_empty_body() {
        let packet = Packet::new(PacketKind::WorkFail, b"H:2".to_vec());
        let (handle, body) = packet.handle_and_body().unwrap();
        assert_eq!(handle, "H:2");
        assert!(body.is_empty());
    }

    #[test]
    fn missing_handle_is_protocol_error() {
        let packet = Packet::new(PacketKind::WorkData, Vec::new());
        assert!(packet.handle().unwrap_err().is_protocol());
    }

    #[test]
    fn parses_status_fields() {
        let packet = Packet::with_args(PacketKind::WorkStatus, &[b"H:3", b"4", b"10"]);
        assert_eq!(packet.status().unwrap(), ("H:3", 4, 10));

        let bad = Packet::with_args(PacketKind::WorkStatus, &[b"H:3", b"four", b"10"]);
        assert!(bad.status().unwrap_err().is_protocol());

        let short = Packet::with_args(PacketKind::WorkStatus, &[b"H:3", b"4"]);
        assert!(short.status().is_err());
    }
}
