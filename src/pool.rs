//! Fixed-size lane pool
//!
//! A run stripes its jobs across `lanes` scoped threads (see
//! [`crate::partition`]). Each lane works through its stripe in order, with no
//! rebalancing. Progress is reported into one [`ProgressAggregator`] owned by
//! the run, and every lane is joined before [`WorkerPool::run`] returns, on
//! success, failure and cancellation alike.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::cancel::{is_cancellation, CancelToken};
use crate::job::{total_cost, Job};
use crate::partition::stripe;
use crate::progress::{render, ProgressAggregator, ProgressSink, ProgressTotals, SilentSink};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("lane count must be at least 1 (got {0})")]
    InvalidLaneCount(usize),

    #[error("job failed: {job}")]
    JobFailed {
        job: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("a pool lane panicked")]
    LanePanicked,
}

/// How a run ended when it did not fail.
#[derive(Debug)]
pub enum RunOutcome<R> {
    /// Every job ran; results are in the caller's original job order.
    Completed(Vec<R>),
    /// The run was cancelled. Jobs that finished before the stop keep their
    /// result; interrupted and abandoned jobs are `None`.
    Cancelled { partial: Vec<Option<R>> },
}

impl<R> RunOutcome<R> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled { .. })
    }
}

pub struct WorkerPool {
    lanes: usize,
    show_progress: bool,
    unit: &'static str,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl WorkerPool {
    /// A pool of `lanes` lanes. Zero lanes is a configuration error.
    pub fn new(lanes: usize) -> Result<Self, PoolError> {
        if lanes == 0 {
            return Err(PoolError::InvalidLaneCount(lanes));
        }
        Ok(Self {
            lanes,
            show_progress: false,
            unit: "jobs",
            sink: Arc::new(SilentSink),
            cancel: CancelToken::new(),
        })
    }

    /// Draw before and after every job on `sink`.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self.show_progress = true;
        self
    }

    /// Final completion line only; no per-job lines.
    pub fn with_quiet_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self.show_progress = false;
        self
    }

    /// Noun used in the progress line ("files", "frames").
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = unit;
        self
    }

    /// Operator-level token; cancelling it stops every lane of the current run.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `work` over every job.
    ///
    /// `work` receives a token derived from the pool's; it is cancelled when
    /// the operator cancels or when another lane hits a fatal error, and
    /// long-running work should check it at its I/O checkpoints.
    ///
    /// A job returning an error whose chain contains
    /// [`Cancelled`](crate::cancel::Cancelled) stops the whole run with
    /// [`RunOutcome::Cancelled`]. Any other error stops the whole run with
    /// [`PoolError::JobFailed`]. Cancellation wins when both happen.
    pub fn run<J, R, F>(&self, jobs: Vec<J>, work: F) -> Result<RunOutcome<R>, PoolError>
    where
        J: Job,
        R: Send,
        F: Fn(&J, &CancelToken) -> anyhow::Result<R> + Sync,
    {
        let total = jobs.len();
        let totals = ProgressTotals {
            jobs: total as u64,
            cost: total_cost(&jobs),
            unit: self.unit,
        };
        let aggregator = ProgressAggregator::new(totals);
        let run_token = self.cancel.child();
        let interrupted = AtomicBool::new(false);
        let failure: Mutex<Option<PoolError>> = Mutex::new(None);

        let indexed: Vec<(usize, J)> = jobs.into_iter().enumerate().collect();
        let stripes = stripe(indexed, self.lanes);

        let lane_results: Vec<thread::Result<Vec<(usize, R)>>> = thread::scope(|scope| {
            let handles: Vec<_> = stripes
                .into_iter()
                .map(|lane_jobs| {
                    let ctx = LaneContext {
                        work: &work,
                        aggregator: &aggregator,
                        sink: self.sink.as_ref(),
                        show_progress: self.show_progress,
                        token: &run_token,
                        interrupted: &interrupted,
                        failure: &failure,
                    };
                    scope.spawn(move || ctx.drive(lane_jobs))
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
        let mut panicked = false;
        for lane in lane_results {
            match lane {
                Ok(done) => {
                    for (idx, result) in done {
                        slots[idx] = Some(result);
                    }
                }
                Err(_) => panicked = true,
            }
        }

        if self.cancel.is_cancelled() || interrupted.load(Ordering::SeqCst) {
            self.sink.abandon();
            return Ok(RunOutcome::Cancelled { partial: slots });
        }
        if let Some(err) = failure.into_inner() {
            self.sink.abandon();
            return Err(err);
        }
        if panicked {
            self.sink.abandon();
            return Err(PoolError::LanePanicked);
        }

        self.sink.finish(&render(totals.complete(), &totals));
        // Every lane ran to the end of its stripe without stopping, so each
        // slot holds a result.
        Ok(RunOutcome::Completed(slots.into_iter().flatten().collect()))
    }
}

struct LaneContext<'a, F> {
    work: &'a F,
    aggregator: &'a ProgressAggregator,
    sink: &'a dyn ProgressSink,
    show_progress: bool,
    token: &'a CancelToken,
    interrupted: &'a AtomicBool,
    failure: &'a Mutex<Option<PoolError>>,
}

impl<F> LaneContext<'_, F> {
    fn drive<J, R>(self, lane_jobs: Vec<(usize, J)>) -> Vec<(usize, R)>
    where
        J: Job,
        F: Fn(&J, &CancelToken) -> anyhow::Result<R>,
    {
        let totals = self.aggregator.totals();
        let mut done = Vec::with_capacity(lane_jobs.len());
        for (idx, job) in lane_jobs {
            if self.token.is_cancelled() {
                break;
            }
            if self.show_progress {
                self.sink.draw(&render(self.aggregator.snapshot(), &totals));
            }
            match (self.work)(&job, self.token) {
                Ok(result) => {
                    self.aggregator.report(1, job.cost());
                    done.push((idx, result));
                }
                Err(err) if is_cancellation(&err) => {
                    // Only a cancellation nobody else asked for is an
                    // interrupt; a lane halted because another lane failed
                    // leaves the failure as the outcome.
                    if !self.token.is_cancelled() || self.failure.lock().is_none() {
                        self.interrupted.store(true, Ordering::SeqCst);
                    }
                    self.token.cancel();
                    break;
                }
                Err(err) => {
                    let mut slot = self.failure.lock();
                    if slot.is_none() {
                        *slot = Some(PoolError::JobFailed {
                            job: job.describe(),
                            source: err,
                        });
                    }
                    drop(slot);
                    self.token.cancel();
                    break;
                }
            }
            if self.show_progress {
                self.sink.draw(&render(self.aggregator.snapshot(), &totals));
            }
        }
        done
    }
}
