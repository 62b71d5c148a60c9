use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::protocol::{Magic, Packet, Priority};
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Pending,
    Running,
    Queued,
    Completed,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Running => write!(f, "running"),
            JobState::Queued => write!(f, "queued"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// A call to a named worker function, and everything the server reported
/// about it.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub function: String,
    pub argument: Vec<u8>,
    pub unique: Option<String>,
    pub background: bool,
    pub priority: Priority,
    /// How many times a failed run is submitted again
    pub retry_count: u32,
    pub retries_done: u32,
    pub state: JobState,
    pub handle: Option<String>,
    pub result: Option<Vec<u8>>,
    pub data: Vec<u8>,
    pub warnings: Vec<Vec<u8>>,
    pub exception: Option<Vec<u8>>,
    pub status: Option<(u64, u64)>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(function: impl Into<String>, argument: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            function: function.into(),
            argument: argument.into(),
            unique: None,
            background: false,
            priority: Priority::Normal,
            retry_count: 0,
            retries_done: 0,
            state: JobState::Pending,
            handle: None,
            result: None,
            data: Vec::new(),
            warnings: Vec::new(),
            exception: None,
            status: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Server-side coalescing id; jobs sharing it run once.
    pub fn with_unique(mut self, unique: impl Into<String>) -> Self {
        self.unique = Some(unique.into());
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            JobState::Queued | JobState::Completed | JobState::Failed
        )
    }

    fn finish(&mut self, state: JobState) {
        self.state = state;
        self.completed_at = Some(Utc::now());
    }
}

impl Task for Job {
    fn coalescing_key(&self) -> String {
        match &self.unique {
            Some(unique) => format!("{}\0{}", self.function, unique),
            None => {
                let mut hasher = DefaultHasher::new();
                self.argument.hash(&mut hasher);
                format!("{}\0#{:016x}", self.function, hasher.finish())
            }
        }
    }

    fn submit_packet(&self) -> Vec<u8> {
        Packet::submit(
            self.priority,
            self.background,
            &self.function,
            self.unique.as_deref().unwrap_or_default(),
            &self.argument,
        )
        .encode(Magic::Req)
    }

    fn is_background(&self) -> bool {
        self.background
    }

    fn reset_state(&mut self) {
        self.retries_done = 0;
        self.state = JobState::Pending;
        self.handle = None;
        self.result = None;
        self.data.clear();
        self.warnings.clear();
        self.exception = None;
        self.status = None;
        self.completed_at = None;
    }

    fn handle_created(&mut self, handle: &str) {
        tracing::debug!(job_id = %self.id, function = %self.function, handle, "Job accepted");
        self.handle = Some(handle.to_string());
        if self.background {
            self.finish(JobState::Queued);
        } else {
            self.state = JobState::Running;
        }
    }

    fn handle_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    fn handle_warning(&mut self, message: &[u8]) {
        self.warnings.push(message.to_vec());
    }

    fn handle_status(&mut self, numerator: u64, denominator: u64) {
        self.status = Some((numerator, denominator));
    }

    fn handle_exception(&mut self, message: &[u8]) {
        self.exception = Some(message.to_vec());
    }

    fn handle_completion(&mut self, result: &[u8]) {
        self.result = Some(result.to_vec());
        self.finish(JobState::Completed);
    }

    fn handle_failure(&mut self) -> bool {
        if self.retries_done < self.retry_count {
            self.retries_done += 1;
            self.state = JobState::Pending;
            self.handle = None;
            tracing::info!(
                job_id = %self.id,
                function = %self.function,
                attempt = self.retries_done,
                "Job failed, retrying"
            );
            return true;
        }
        self.finish(JobState::Failed);
        false
    }

    fn is_successful(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Queued)
    }
}
