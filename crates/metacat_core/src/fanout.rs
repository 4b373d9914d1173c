//! Bounded parallel fan-out over independent service calls.
//!
//! # Responsibility
//! - Run a small set of independent tasks on scoped worker threads.
//! - Offer two explicit policies: best-effort and fail-fast.
//!
//! # Invariants
//! - `run_*` returns only after every worker has finished; callers never
//!   observe partial results.
//! - Each task owns its output slot; the runner shares nothing with tasks
//!   except the cancel token.
//! - In fail-fast mode a task dequeued after cancellation is skipped
//!   without running.

use crate::config::FanoutConfig;
use log::{debug, warn};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// One unit of fan-out work.
pub type FanoutTask<'a, E> = Box<dyn FnOnce(&CancelToken) -> Result<(), E> + Send + 'a>;

/// Boxes a closure as a [`FanoutTask`].
pub fn fanout_task<'a, E, F>(f: F) -> FanoutTask<'a, E>
where
    F: FnOnce(&CancelToken) -> Result<(), E> + Send + 'a,
{
    Box::new(f)
}

/// Cooperative cancellation shared by all tasks of one fan-out pass.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until cancelled or `timeout` elapses. Returns the final state.
    pub fn wait_cancelled(&self, timeout: Duration) -> bool {
        let guard = self
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Fail-fast error.
#[derive(Debug, PartialEq, Eq)]
pub enum FanoutError<E> {
    /// First task error; the remaining tasks were cancelled.
    Task(E),
    /// A task panicked before any task returned an error.
    Panicked { task: usize },
}

impl<E: Display> Display for FanoutError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(err) => write!(f, "{err}"),
            Self::Panicked { task } => write!(f, "fan-out task {task} panicked"),
        }
    }
}

impl<E: Error + 'static> Error for FanoutError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Task(err) => Some(err),
            Self::Panicked { .. } => None,
        }
    }
}

/// Best-effort completion summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub succeeded: usize,
    pub failed: usize,
}

enum Outcome<E> {
    Done,
    Failed(E),
    Panicked,
    Skipped,
}

/// Parallel executor with a bounded worker count.
#[derive(Debug, Clone, Copy)]
pub struct FanoutRunner {
    max_workers: usize,
}

impl FanoutRunner {
    pub fn new(config: &FanoutConfig) -> Self {
        Self::with_max_workers(config.max_workers)
    }

    pub fn with_max_workers(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Runs every task to completion, tolerating individual failures.
    ///
    /// Task errors and panics are logged and counted; they never abort the
    /// other tasks.
    pub fn run_best_effort<'a, E>(&self, name: &str, tasks: Vec<FanoutTask<'a, E>>) -> FanoutReport
    where
        E: Display + Send,
    {
        let report = Mutex::new(FanoutReport::default());
        self.run_pool(name, tasks, &CancelToken::new(), |index, outcome| {
            let mut report = report.lock().unwrap_or_else(PoisonError::into_inner);
            match outcome {
                Outcome::Done => report.succeeded += 1,
                Outcome::Failed(err) => {
                    report.failed += 1;
                    warn!(
                        "event=fanout_task module=fanout status=degraded fanout={name} task={index} error={err}"
                    );
                }
                Outcome::Panicked => report.failed += 1,
                Outcome::Skipped => {}
            }
        });
        report.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs tasks until the first failure, then cancels the rest.
    ///
    /// Returns the first recorded task error. Tasks still queued when the
    /// token is cancelled never run.
    pub fn run_fail_fast<'a, E>(
        &self,
        name: &str,
        tasks: Vec<FanoutTask<'a, E>>,
    ) -> Result<(), FanoutError<E>>
    where
        E: Display + Send,
    {
        let token = CancelToken::new();
        let first_error: Mutex<Option<FanoutError<E>>> = Mutex::new(None);
        self.run_pool(name, tasks, &token, |index, outcome| {
            let failure = match outcome {
                Outcome::Done | Outcome::Skipped => return,
                Outcome::Failed(err) => FanoutError::Task(err),
                Outcome::Panicked => FanoutError::Panicked { task: index },
            };
            let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(failure);
            }
            token.cancel();
        });

        match first_error
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(err) => {
                warn!("event=fanout_run module=fanout status=error fanout={name} error={err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn run_pool<'a, E, F>(
        &self,
        name: &str,
        tasks: Vec<FanoutTask<'a, E>>,
        token: &CancelToken,
        on_outcome: F,
    ) where
        E: Display + Send,
        F: Fn(usize, Outcome<E>) + Sync,
    {
        if tasks.is_empty() {
            return;
        }

        let started_at = Instant::now();
        let task_count = tasks.len();
        let workers = self.max_workers.min(task_count);
        let queue: Mutex<VecDeque<(usize, FanoutTask<'a, E>)>> =
            Mutex::new(tasks.into_iter().enumerate().collect());

        debug!("event=fanout_run module=fanout status=start fanout={name} tasks={task_count} workers={workers}");

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some((index, task)) = next else {
                        break;
                    };
                    if token.is_cancelled() {
                        debug!("event=fanout_task module=fanout status=skipped fanout={name} task={index}");
                        on_outcome(index, Outcome::Skipped);
                        continue;
                    }

                    let task_started = Instant::now();
                    let outcome = match catch_unwind(AssertUnwindSafe(|| task(token))) {
                        Ok(Ok(())) => Outcome::Done,
                        Ok(Err(err)) => Outcome::Failed(err),
                        Err(_) => {
                            warn!("event=fanout_task module=fanout status=error fanout={name} task={index} error=panicked");
                            Outcome::Panicked
                        }
                    };
                    debug!(
                        "event=fanout_task module=fanout status=finished fanout={name} task={index} duration_ms={}",
                        task_started.elapsed().as_millis()
                    );
                    on_outcome(index, outcome);
                });
            }
        });

        debug!(
            "event=fanout_run module=fanout status=ok fanout={name} tasks={task_count} duration_ms={}",
            started_at.elapsed().as_millis()
        );
    }
}
