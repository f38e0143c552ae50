//! Stoppable periodic drivers.
//!
//! The presentation layer runs on its own cadences (a fine-grained
//! readout refresh, a coarser chart redraw) that must never block the
//! acquisition worker and must be independently stoppable for the
//! ordered shutdown. [`PeriodicTask`] packages that: a named tokio task
//! ticking at a fixed period, invoking a callback, aborted on stop or
//! drop.

use std::time::Duration;

use tokio::task::JoinHandle;

/// A periodically invoked callback with an independent stop control.
///
/// The callback runs on the tokio runtime and should complete promptly;
/// long work belongs on a channel to a dedicated task. Dropping the
/// handle stops the ticking.
pub struct PeriodicTask {
    label: &'static str,
    task: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a task invoking `callback` every `period`.
    ///
    /// The first invocation happens after one full period, not
    /// immediately.
    pub fn spawn<F>(label: &'static str, period: Duration, mut callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Swallow the immediate first tick.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                callback();
            }
        });
        tracing::debug!(label, period_ms = period.as_millis() as u64, "Periodic task started");
        Self { label, task }
    }

    /// Stop the task. Idempotent; already-running callback invocations
    /// complete, no further ones start.
    pub fn stop(&self) {
        self.task.abort();
        tracing::debug!(label = self.label, "Periodic task stopped");
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_configured_period() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = PeriodicTask::spawn("refresh", Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        let ticks = count.load(Ordering::SeqCst);
        assert!((3..=4).contains(&ticks), "expected ~3 ticks, got {}", ticks);

        task.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = PeriodicTask::spawn("redraw", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(55)).await;
        task.stop();
        let at_stop = count.load(Ordering::SeqCst);
        assert!(at_stop >= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), at_stop);

        // Stopping again is harmless.
        task.stop();
    }
}
