use std::{future::Future, pin::Pin, time::Duration};

use log::{debug, info};
use tokio::time::{Instant, sleep, timeout};

use crate::{
    Error, Result,
    error::ensure_arg,
    request::TaskRequest,
    task::{TaskHandle, TaskOutput, TaskResult},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The two calls the polling loop needs. [`crate::AsyncTaskClient`] implements
/// it against DashScope.
pub trait TaskBackend: Sync {
    fn submit<'a>(&'a self, request: &'a TaskRequest) -> BoxFuture<'a, Result<TaskHandle>>;
    fn poll<'a>(&'a self, handle: &'a TaskHandle) -> BoxFuture<'a, Result<TaskResult>>;
}

/// Image tasks finish in seconds, video tasks take minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum TaskFamily {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Cadence {
    pub const SHORT: Cadence = Cadence::new(Duration::from_secs(5), Duration::from_secs(300));
    pub const LONG: Cadence = Cadence::new(Duration::from_secs(30), Duration::from_secs(900));

    pub const fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

/// Polls `handle` every `interval` until the task succeeds or fails.
///
/// Pending, running and unrecognized statuses are waited out. The loop gives up with
/// [`Error::Timeout`] once `max_wait` has elapsed, even while a poll is still in
/// flight, so at most `ceil(max_wait / interval)` polls are made. Transport errors
/// end the loop immediately. A task that failed remotely is returned as
/// [`Error::RemoteFailure`]. A zero `interval` is rejected.
///
/// There is no way to cancel the remote task: dropping this future stops the
/// polling, but the platform keeps running (and billing) the task.
pub async fn await_completion<B: TaskBackend + ?Sized>(
    backend: &B,
    handle: &TaskHandle,
    max_wait: Duration,
    interval: Duration,
) -> Result<TaskOutput> {
    ensure_arg!(!interval.is_zero(), "poll interval must be greater than zero");

    let start = Instant::now();
    let timed_out = || Error::Timeout {
        task_id: handle.to_string(),
        elapsed: start.elapsed(),
    };
    loop {
        let remaining = max_wait.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(timed_out());
        }

        let status = timeout(remaining, backend.poll(handle))
            .await
            .map_err(|_| timed_out())??;
        match status {
            TaskResult::Succeeded(output) => {
                info!(
                    "Task {handle} succeeded after {}s with {} asset(s)",
                    start.elapsed().as_secs(),
                    output.assets.len()
                );
                return Ok(output);
            }
            TaskResult::Failed { reason } => {
                return Err(Error::RemoteFailure {
                    task_id: handle.to_string(),
                    reason,
                });
            }
            status => {
                debug!(
                    "Task {handle} is {status:?} after {}s, checking again in {}s",
                    start.elapsed().as_secs(),
                    interval.as_secs_f32()
                );
                // never sleep past the deadline
                sleep(interval.min(max_wait.saturating_sub(start.elapsed()))).await;
            }
        }
    }
}

/// Submits `request` and waits for it with the given cadence.
pub async fn generate<B: TaskBackend + ?Sized>(
    backend: &B,
    request: &TaskRequest,
    cadence: Cadence,
) -> Result<TaskOutput> {
    let handle = backend.submit(request).await?;
    info!("Submitted task {handle} ({})", request.model);
    await_completion(backend, &handle, cadence.max_wait, cadence.interval).await
}
