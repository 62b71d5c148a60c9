use thiserror::Error;

#[derive(Error, Debug)]
pub enum GearmanError {
    #[error("Network error talking to {addr}: {source}")]
    Network {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unknown job handle {handle} on {server}")]
    UnknownHandle { server: String, handle: String },

    #[error("No job servers available")]
    NoServersAvailable,

    #[error("Timed out waiting for jobs to finish")]
    Timeout,

    #[error("Job {function} failed")]
    JobFailed { function: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GearmanError {
    pub fn network(addr: impl Into<String>, source: std::io::Error) -> Self {
        GearmanError::Network {
            addr: addr.into(),
            source,
        }
    }

    /// Transport failures: the submission engine fails over on these.
    pub fn is_network(&self) -> bool {
        matches!(self, GearmanError::Network { .. })
    }

    /// Failures scoped to a single packet.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            GearmanError::Protocol(_) | GearmanError::UnknownHandle { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, GearmanError>;
