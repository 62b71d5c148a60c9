pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod shutdown;
pub mod task;
pub mod taskset;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{GearmanError, Result};
pub use task::{Job, JobState, Task};
pub use taskset::TaskSet;
