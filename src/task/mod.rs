//! Units of work submitted through a task set.
//!
//! The engine only talks to work through the [`Task`] trait. [`Job`] is the
//! stock implementation: a function name plus argument bytes that records
//! everything the job server reports about it.
//!
//! # Callback order
//!
//! For every submission the engine calls `handle_created` at most once and
//! before anything else, then any number of `handle_data`, `handle_warning`,
//! `handle_status` and `handle_exception`, then exactly one of
//! `handle_completion` or `handle_failure`. A `true` from `handle_failure`
//! starts the cycle again with a fresh handle.

pub mod job;

pub use job::{Job, JobState};

pub trait Task {
    /// Submissions sharing this key are routed to the same server.
    fn coalescing_key(&self) -> String;

    /// Encoded submission request.
    fn submit_packet(&self) -> Vec<u8>;

    /// Background tasks are done as soon as the server accepts them.
    fn is_background(&self) -> bool;

    /// Clear per-run state before a brand-new submission.
    fn reset_state(&mut self);

    fn handle_created(&mut self, handle: &str);

    fn handle_data(&mut self, data: &[u8]);

    fn handle_warning(&mut self, message: &[u8]);

    fn handle_status(&mut self, numerator: u64, denominator: u64);

    fn handle_exception(&mut self, message: &[u8]);

    fn handle_completion(&mut self, result: &[u8]);

    /// Returns true when the task should be submitted again.
    fn handle_failure(&mut self) -> bool;

    fn is_successful(&self) -> bool;
}

/// Lending a task to a batch keeps it inspectable by the caller afterwards.
impl<T: Task + ?Sized> Task for &mut T {
    fn coalescing_key(&self) -> String {
        (**self).coalescing_key()
    }

    fn submit_packet(&self) -> Vec<u8> {
        (**self).submit_packet()
    }

    fn is_background(&self) -> bool {
        (**self).is_background()
    }

    fn reset_state(&mut self) {
        (**self).reset_state()
    }

    fn handle_created(&mut self, handle: &str) {
        (**self).handle_created(handle)
    }

    fn handle_data(&mut self, data: &[u8]) {
        (**self).handle_data(data)
    }

    fn handle_warning(&mut self, message: &[u8]) {
        (**self).handle_warning(message)
    }

    fn handle_status(&mut self, numerator: u64, denominator: u64) {
        (**self).handle_status(numerator, denominator)
    }

    fn handle_exception(&mut self, message: &[u8]) {
        (**self).handle_exception(message)
    }

    fn handle_completion(&mut self, result: &[u8]) {
        (**self).handle_completion(result)
    }

    fn handle_failure(&mut self) -> bool {
        (**self).handle_failure()
    }

    fn is_successful(&self) -> bool {
        (**self).is_successful()
    }
}
