//! Task lifecycle polling with single-flight waits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::clock::{PollClock, TokioClock};
use crate::retry::jittered_ms;
use crate::{NlmError, PollPolicyConfig, TaskHandle, TaskStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_SCHEDULE_STEPS: usize = 64;

type SharedWait = Shared<BoxFuture<'static, Result<TaskStatus, NlmError>>>;
type InFlightMap = Arc<Mutex<HashMap<String, InFlightWait>>>;

struct InFlightWait {
    wait: SharedWait,
    waiters: usize,
}

/// Registration of one caller on a shared poll loop.
///
/// Dropping the last registration of an unfinished loop unregisters it and
/// drops the loop with it; a finished loop is unregistered by whichever
/// waiter drops first.
struct WaiterGuard {
    in_flight: InFlightMap,
    task_id: String,
    wait: SharedWait,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let mut in_flight = lock_or_recover_mutex(&self.in_flight);
        let Some(entry) = in_flight.get_mut(&self.task_id) else {
            return;
        };
        if !entry.wait.ptr_eq(&self.wait) {
            return;
        }
        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 || self.wait.peek().is_some() {
            in_flight.remove(&self.task_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Delays between polls; the last entry repeats.
pub struct PollSchedule {
    intervals: Vec<Duration>,
}

impl PollSchedule {
    pub fn fixed(intervals: impl IntoIterator<Item = Duration>) -> Self {
        let intervals: Vec<Duration> = intervals.into_iter().collect();
        if intervals.is_empty() {
            return Self {
                intervals: vec![DEFAULT_POLL_INTERVAL],
            };
        }
        Self { intervals }
    }

    /// Geometric growth from `initial` up to `max`. With `jitter`, every
    /// step is scaled into [50%, 100%] of its nominal value.
    pub fn exponential(initial: Duration, factor: f64, max: Duration, jitter: bool) -> Self {
        let max_ms = max.as_millis().max(1) as f64;
        let mut current_ms = initial.as_millis().max(1) as f64;
        let mut intervals = Vec::new();
        while intervals.len() < MAX_SCHEDULE_STEPS {
            let nominal = current_ms.min(max_ms) as u64;
            let step = if jitter { jittered_ms(nominal) } else { nominal };
            intervals.push(Duration::from_millis(step));
            if current_ms >= max_ms || !factor.is_finite() || factor <= 1.0 {
                break;
            }
            current_ms *= factor;
        }
        Self::fixed(intervals)
    }

    pub fn interval(&self, attempt: usize) -> Duration {
        self.intervals
            .get(attempt)
            .or_else(|| self.intervals.last())
            .copied()
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }
}

#[async_trait]
/// Fetches the current status of a task.
pub trait TaskStatusSource: Send + Sync {
    async fn poll_status(&self, handle: &TaskHandle) -> Result<TaskStatus, NlmError>;
}

#[derive(Clone)]
pub struct TaskPoller {
    source: Arc<dyn TaskStatusSource>,
    clock: Arc<dyn PollClock>,
    max_consecutive_transport_errors: u32,
    in_flight: InFlightMap,
}

impl TaskPoller {
    pub fn new(source: Arc<dyn TaskStatusSource>) -> Self {
        Self {
            source,
            clock: Arc::new(TokioClock::new()),
            max_consecutive_transport_errors: PollPolicyConfig::default()
                .max_consecutive_transport_errors,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_policy(source: Arc<dyn TaskStatusSource>, policy: &PollPolicyConfig) -> Self {
        Self::new(source)
            .with_max_consecutive_transport_errors(policy.max_consecutive_transport_errors)
    }

    pub fn with_clock(mut self, clock: Arc<dyn PollClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_max_consecutive_transport_errors(mut self, max: u32) -> Self {
        self.max_consecutive_transport_errors = max;
        self
    }

    /// Polls until the task is terminal or `deadline` has elapsed.
    ///
    /// Concurrent waits on the same task id share one loop, driven by the
    /// schedule and deadline of the caller that started it. A caller whose
    /// own deadline outlives that loop keeps polling once it times out, so
    /// no caller sees `TaskTimeout` before its own deadline. Cancelling every
    /// waiter cancels the loop.
    pub async fn wait(
        &self,
        handle: &TaskHandle,
        schedule: &PollSchedule,
        deadline: Duration,
    ) -> Result<TaskStatus, NlmError> {
        let started = self.clock.now();
        loop {
            let elapsed = self.clock.now().saturating_sub(started);
            let guard = self.join_or_start(handle, schedule, deadline.saturating_sub(elapsed));
            let result = guard.wait.clone().await;
            drop(guard);

            match result {
                Err(NlmError::TaskTimeout { .. })
                    if self.clock.now().saturating_sub(started) < deadline =>
                {
                    tracing::debug!(
                        task_id = %handle.task_id,
                        "shared poll loop ended before this caller's deadline; polling on"
                    );
                }
                other => return other,
            }
        }
    }

    fn join_or_start(
        &self,
        handle: &TaskHandle,
        schedule: &PollSchedule,
        deadline: Duration,
    ) -> WaiterGuard {
        let mut in_flight = lock_or_recover_mutex(&self.in_flight);
        let running = in_flight
            .get_mut(&handle.task_id)
            .filter(|entry| entry.wait.peek().is_none());
        let wait = match running {
            Some(entry) => {
                tracing::debug!(task_id = %handle.task_id, "joining in-flight poll loop");
                entry.waiters = entry.waiters.saturating_add(1);
                entry.wait.clone()
            }
            None => {
                let wait = run_poll_loop(
                    Arc::clone(&self.source),
                    Arc::clone(&self.clock),
                    handle.clone(),
                    schedule.clone(),
                    deadline,
                    self.max_consecutive_transport_errors,
                )
                .boxed()
                .shared();
                in_flight.insert(
                    handle.task_id.clone(),
                    InFlightWait {
                        wait: wait.clone(),
                        waiters: 1,
                    },
                );
                wait
            }
        };
        WaiterGuard {
            in_flight: Arc::clone(&self.in_flight),
            task_id: handle.task_id.clone(),
            wait,
        }
    }

    /// Like [`TaskPoller::wait`], but a `Failed` task becomes
    /// [`NlmError::TaskFailed`].
    pub async fn wait_for_success(
        &self,
        handle: &TaskHandle,
        schedule: &PollSchedule,
        deadline: Duration,
    ) -> Result<TaskStatus, NlmError> {
        match self.wait(handle, schedule, deadline).await? {
            TaskStatus::Failed { reason } => Err(NlmError::TaskFailed {
                task_id: handle.task_id.clone(),
                reason,
            }),
            status => Ok(status),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        lock_or_recover_mutex(&self.in_flight).len()
    }
}

async fn run_poll_loop(
    source: Arc<dyn TaskStatusSource>,
    clock: Arc<dyn PollClock>,
    handle: TaskHandle,
    schedule: PollSchedule,
    deadline: Duration,
    max_consecutive_transport_errors: u32,
) -> Result<TaskStatus, NlmError> {
    let started = clock.now();
    let mut status = TaskStatus::Pending;
    let mut attempt = 0usize;
    let mut consecutive_transport_errors = 0u32;

    loop {
        let mut retry_after = None;
        match source.poll_status(&handle).await {
            Ok(observed) => {
                consecutive_transport_errors = 0;
                let observed_label = observed.as_str();
                if !status.advance(observed) {
                    tracing::debug!(
                        task_id = %handle.task_id,
                        observed = observed_label,
                        current = status.as_str(),
                        "ignoring status regression"
                    );
                }
                if status.is_terminal() {
                    tracing::debug!(
                        task_id = %handle.task_id,
                        attempt,
                        status = %status,
                        "task finished"
                    );
                    return Ok(status);
                }
            }
            Err(error)
                if error.is_transient()
                    && consecutive_transport_errors < max_consecutive_transport_errors =>
            {
                consecutive_transport_errors = consecutive_transport_errors.saturating_add(1);
                retry_after = error.retry_after_ms().map(Duration::from_millis);
                tracing::warn!(
                    task_id = %handle.task_id,
                    attempt,
                    consecutive_transport_errors,
                    error = %error,
                    "transient poll failure"
                );
            }
            Err(error) => return Err(error),
        }

        let elapsed = clock.now().saturating_sub(started);
        if elapsed >= deadline {
            return Err(NlmError::TaskTimeout {
                task_id: handle.task_id.clone(),
                last_status: status,
            });
        }
        let interval = schedule.interval(attempt);
        let delay = retry_after
            .map_or(interval, |hint| interval.max(hint))
            .min(deadline - elapsed);
        tracing::debug!(
            task_id = %handle.task_id,
            attempt,
            status = %status,
            delay_ms = delay.as_millis() as u64,
            "task not finished"
        );
        attempt = attempt.saturating_add(1);
        clock.sleep(delay).await;
    }
}

fn lock_or_recover_mutex<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
