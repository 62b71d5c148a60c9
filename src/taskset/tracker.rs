use std::collections::HashMap;

use crate::error::{GearmanError, Result};

/// Job handles are only unique per server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleKey {
    pub server: String,
    pub handle: String,
}

impl HandleKey {
    pub fn new(server: &str, handle: &str) -> Self {
        Self {
            server: server.to_string(),
            handle: handle.to_string(),
        }
    }
}

impl std::fmt::Display for HandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.server, self.handle)
    }
}

/// Tasks that hold a handle, grouped by handle, plus tasks that are done.
#[derive(Debug)]
pub struct ProgressTracker<T> {
    in_progress: HashMap<HandleKey, Vec<T>>,
    finished: Vec<T>,
}

impl<T> Default for ProgressTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProgressTracker<T> {
    pub fn new() -> Self {
        Self {
            in_progress: HashMap::new(),
            finished: Vec::new(),
        }
    }

    /// Record a task under the handle the server assigned to it. A second
    /// task lands in the same bucket when the server coalesced them.
    pub fn track(&mut self, key: HandleKey, task: T) {
        self.in_progress.entry(key).or_default().push(task);
    }

    /// Remove and return every task sharing `key`.
    pub fn take(&mut self, key: &HandleKey) -> Result<Vec<T>> {
        self.in_progress
            .remove(key)
            .ok_or_else(|| unknown_handle(key))
    }

    pub fn bucket_mut(&mut self, key: &HandleKey) -> Result<&mut Vec<T>> {
        self.in_progress
            .get_mut(key)
            .ok_or_else(|| unknown_handle(key))
    }

    pub fn contains(&self, key: &HandleKey) -> bool {
        self.in_progress.contains_key(key)
    }

    pub fn finish(&mut self, task: T) {
        self.finished.push(task);
    }

    /// True when no task is waiting on a server.
    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }

    /// Number of tasks (not handles) still in progress.
    pub fn in_progress_len(&self) -> usize {
        self.in_progress.values().map(Vec::len).sum()
    }

    pub fn handles(&self) -> impl Iterator<Item = &HandleKey> {
        self.in_progress.keys()
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &T> {
        self.in_progress.values().flatten()
    }

    pub fn finished(&self) -> &[T] {
        &self.finished
    }

    /// Split into (finished, still in progress).
    pub fn into_parts(self) -> (Vec<T>, Vec<T>) {
        let pending = self.in_progress.into_values().flatten().collect();
        (self.finished, pending)
    }
}

fn unknown_handle(key: &HandleKey) -> GearmanError {
    GearmanError::UnknownHandle {
        server: key.server.clone(),
        handle: key.handle.clone(),
    }
}
