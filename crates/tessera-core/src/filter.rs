// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The two-phase filter contract.
//!
//! A filter first *preflights*: it validates its arguments against a graph
//! and describes its structural effect as a [`MutationPlan`], without
//! touching the graph. *Execute* then applies the primary mutations, runs the
//! computation against the now-present storage and finally applies the
//! deferred mutations.
//!
//! Cancellation is cooperative through a [`CancelToken`] polled at coarse
//! points. Progress is throttled to at most one message per interval.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::args::Arguments;
use crate::diagnostic::{codes, Diagnostic, Diagnostics, Report};
use crate::graph::Graph;
use crate::mutation::{ApplyMode, MutationPlan};
use crate::parallel::default_workers;

/// Shared "should stop" flag.
///
/// Clones observe the same flag. Cancelling is advisory: work already
/// written stays valid and nothing is rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancelToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMessage {
    /// Filter name.
    pub filter: String,
    /// Human-readable text.
    pub text: String,
    /// Units completed so far.
    pub completed: usize,
}

/// Receiver of progress messages.
pub trait ProgressSink: Sync {
    /// Delivers one message.
    fn report(&self, message: &ProgressMessage);
}

impl<F: Fn(&ProgressMessage) + Sync> ProgressSink for F {
    fn report(&self, message: &ProgressMessage) {
        self(message);
    }
}

/// Sink that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _message: &ProgressMessage) {}
}

/// Default spacing between progress messages.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Per-run state handed to [`Filter::execute_impl`].
///
/// `advance` may be called from worker threads; it accumulates the count
/// atomically and forwards at most one message per interval.
pub struct ExecContext<'a> {
    filter: &'a str,
    cancel: &'a CancelToken,
    sink: &'a dyn ProgressSink,
    interval: Duration,
    workers: usize,
    completed: AtomicUsize,
    last_sent: Mutex<Option<Instant>>,
}

impl<'a> ExecContext<'a> {
    /// Creates a context with the default interval and worker count.
    pub fn new(filter: &'a str, cancel: &'a CancelToken, sink: &'a dyn ProgressSink) -> Self {
        Self {
            filter,
            cancel,
            sink,
            interval: DEFAULT_PROGRESS_INTERVAL,
            workers: default_workers(),
            completed: AtomicUsize::new(0),
            last_sent: Mutex::new(None),
        }
    }

    /// Overrides the progress interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Worker count for parallel loops.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(CANCELLED)` once cancellation was requested.
    pub fn check_cancel(&self) -> Result<(), Diagnostic> {
        if self.cancel.is_cancelled() {
            warn!(filter = self.filter, "execution cancelled");
            return Err(Diagnostic::new(
                codes::CANCELLED,
                format!("{} was cancelled", self.filter),
            ));
        }
        Ok(())
    }

    /// Adds `units` to the completed count and reports if the interval
    /// has elapsed since the last message.
    pub fn advance(&self, units: usize) {
        let completed = self.completed.fetch_add(units, Ordering::Relaxed) + units;
        let Ok(mut last) = self.last_sent.try_lock() else {
            return;
        };
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t) < self.interval) {
            return;
        }
        *last = Some(now);
        drop(last);
        self.sink.report(&ProgressMessage {
            filter: self.filter.to_owned(),
            text: format!("{completed} elements processed"),
            completed,
        });
    }

    /// Sends a message regardless of the throttle and restarts the interval.
    pub fn message(&self, text: impl Into<String>) {
        if let Ok(mut last) = self.last_sent.lock() {
            *last = Some(Instant::now());
        }
        self.sink.report(&ProgressMessage {
            filter: self.filter.to_owned(),
            text: text.into(),
            completed: self.completed.load(Ordering::Relaxed),
        });
    }
}

/// A pipeline step.
pub trait Filter: Send + Sync {
    /// Registered name.
    fn name(&self) -> &'static str;

    /// Argument values used where the caller supplies none.
    fn default_arguments(&self) -> Arguments;

    /// Validates arguments against `graph` and returns the mutations execute
    /// will apply. Must not modify anything; calling it twice yields the
    /// same plan.
    fn preflight(&self, graph: &Graph, args: &Arguments) -> Report<MutationPlan>;

    /// Runs the computation after the primary mutations were applied.
    ///
    /// The default does nothing, for filters whose whole effect is
    /// structural.
    fn execute_impl(
        &self,
        graph: &mut Graph,
        args: &Arguments,
        ctx: &ExecContext<'_>,
    ) -> Result<(), Diagnostics> {
        let _ = (graph, args, ctx);
        Ok(())
    }
}

/// Runs a filter end to end against `graph`.
///
/// Re-runs preflight, applies the primary mutations in execute mode, calls
/// [`Filter::execute_impl`] and applies the deferred mutations only when it
/// succeeds. On failure the graph is left with whatever was already applied;
/// no edge dangles but nothing is rolled back.
pub fn execute_filter(
    filter: &dyn Filter,
    graph: &mut Graph,
    args: &Arguments,
    ctx: &ExecContext<'_>,
) -> Report<()> {
    let args = args.merged_over(&filter.default_arguments());
    let Report { result, warnings } = filter.preflight(graph, &args);
    let plan = match result {
        Ok(plan) => plan,
        Err(errors) => return Report::fail(errors).with_warnings(warnings),
    };
    if let Err(d) = ctx.check_cancel() {
        return Report::fail(vec![d]).with_warnings(warnings);
    }
    if let Err(d) = plan.apply_primary(graph, ApplyMode::Execute) {
        return Report::fail(vec![d]).with_warnings(warnings);
    }
    if let Err(errors) = filter.execute_impl(graph, &args, ctx) {
        debug!(filter = filter.name(), "execute failed; deferred mutations skipped");
        return Report::fail(errors).with_warnings(warnings);
    }
    if let Err(d) = plan.apply_deferred(graph, ApplyMode::Execute) {
        return Report::fail(vec![d]).with_warnings(warnings);
    }
    debug!(
        filter = filter.name(),
        primary = plan.primary.len(),
        deferred = plan.deferred.len(),
        "executed"
    );
    Report::ok(()).with_warnings(warnings)
}

/// Preflights a filter after filling in its default arguments.
pub fn preflight_filter(filter: &dyn Filter, graph: &Graph, args: &Arguments) -> Report<MutationPlan> {
    filter.preflight(graph, &args.merged_over(&filter.default_arguments()))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_throttled() {
        let seen = Mutex::new(Vec::new());
        let sink = |m: &ProgressMessage| seen.lock().unwrap().push(m.completed);
        let cancel = CancelToken::new();
        let ctx = ExecContext::new("t", &cancel, &sink).with_interval(Duration::from_secs(3600));
        for _ in 0..1000 {
            ctx.advance(1);
        }
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn zero_interval_reports_every_advance() {
        let count = AtomicUsize::new(0);
        let sink = |_: &ProgressMessage| {
            count.fetch_add(1, Ordering::Relaxed);
        };
        let cancel = CancelToken::new();
        let ctx = ExecContext::new("t", &cancel, &sink).with_interval(Duration::ZERO);
        for _ in 0..5 {
            ctx.advance(1);
        }
        assert_eq!(count.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
        let ctx = ExecContext::new("t", &a, &NullProgress);
        assert_eq!(ctx.check_cancel().unwrap_err().code, codes::CANCELLED);
    }
}
