use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{GearmanError, Result};
use crate::protocol::Priority;
use crate::registry::{ServerPool, ServerRegistry};
use crate::task::{Job, Task};
use crate::taskset::TaskSet;

/// Submits jobs to a pool of Gearman job servers.
///
/// Connections are pooled in the registry across calls; each call runs its
/// own [`TaskSet`].
pub struct Client<R: ServerRegistry = ServerPool> {
    config: ClientConfig,
    registry: R,
}

impl Client<ServerPool> {
    pub fn new(config: ClientConfig) -> Self {
        let registry = ServerPool::new(&config);
        Self { config, registry }
    }
}

impl<R: ServerRegistry> Client<R> {
    pub fn with_registry(config: ClientConfig, registry: R) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Submit every task, then wait for all of them.
    ///
    /// Returns `Ok(true)` when every foreground task succeeded, `Ok(false)`
    /// on timeout or task failure, and `Err` when a task could not be placed
    /// on any server.
    pub async fn do_tasks_in_parallel<T, I>(&mut self, tasks: I, timeout: Option<Duration>) -> Result<bool>
    where
        T: Task,
        I: IntoIterator<Item = T>,
    {
        let mut set = TaskSet::new(&mut self.registry, &self.config);
        set.add_tasks(tasks).await?;
        let success = set.wait(timeout).await?;
        Ok(success)
    }

    /// Run one job to completion and return its result.
    pub async fn do_task(&mut self, job: &mut Job, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if self.do_tasks_in_parallel([&mut *job], timeout).await? {
            return Ok(job.result.clone().unwrap_or_default());
        }
        if !job.is_finished() {
            return Err(GearmanError::Timeout);
        }
        Err(GearmanError::JobFailed {
            function: job.function.clone(),
        })
    }

    /// Queue a job without waiting for it. Returns the server's job handle.
    pub async fn dispatch_background_task(
        &mut self,
        function: &str,
        argument: impl Into<Vec<u8>>,
        unique: Option<&str>,
        priority: Priority,
    ) -> Result<String> {
        let mut job = Job::new(function, argument)
            .with_priority(priority)
            .background();
        if let Some(unique) = unique {
            job = job.with_unique(unique);
        }

        self.do_tasks_in_parallel([&mut job], None).await?;
        job.handle.ok_or_else(|| {
            GearmanError::Internal(format!("background job {} finished without a handle", function))
        })
    }
}
