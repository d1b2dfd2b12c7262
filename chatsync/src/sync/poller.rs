//! Fixed-cadence polling tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest period a loop may run at. `interval` panics on zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// When a loop fires for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FirstTick {
    /// Right after spawning.
    Immediate,
    /// One full period after spawning.
    AfterPeriod,
}

/// Spawn a task that calls `tick` every `period`.
///
/// Each tick is awaited before the next one is scheduled, so a slow request
/// delays the loop instead of overlapping with itself. The task runs until
/// its handle is aborted.
pub(crate) fn spawn<F, Fut>(
    name: &'static str,
    period: Duration,
    first: FirstTick,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let start = match first {
            FirstTick::Immediate => Instant::now(),
            FirstTick::AfterPeriod => Instant::now() + period,
        };
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(loop_name = name, period_ms = period.as_millis(), "poll loop started");
        loop {
            interval.tick().await;
            tick().await;
        }
    })
}

/// A group of loops cancelled together.
///
/// Dropping the set aborts every loop in it.
#[derive(Debug, Default)]
pub(crate) struct LoopSet {
    handles: Vec<JoinHandle<()>>,
}

impl LoopSet {
    pub(crate) fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Abort every loop. In-flight ticks stop at their next suspension point.
    pub(crate) fn abort_all(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for LoopSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}
