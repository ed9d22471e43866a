use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Owns the repeating progress-query timer. At most one interval exists
/// process-wide: `start` reuses an active one, `stop` drops it. The interval
/// is cancelled exactly when a terminal status is observed.
pub(crate) struct Poller {
    period: Duration,
    interval: Option<Interval>,
}

impl Poller {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Begin ticking. Returns false when the timer was already running.
    pub(crate) fn start(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        let mut interval = tokio::time::interval(self.period);
        // A slow host response delays the next tick instead of bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        true
    }

    /// Idempotent.
    pub(crate) fn stop(&mut self) {
        self.interval = None;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves at the next tick while active; pends forever otherwise, which
    /// keeps the select arm parked without a guard condition.
    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => futures::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_is_idempotent_and_stop_clears() {
        let mut poller = Poller::new(Duration::from_millis(1200));
        assert!(poller.start());
        assert!(!poller.start(), "second start must reuse the active timer");
        assert!(poller.is_active());
        poller.stop();
        poller.stop();
        assert!(!poller.is_active());
        // A fresh start after stop creates a new timer.
        assert!(poller.start());
    }

    #[tokio::test(start_paused = true)]
    async fn active_poller_ticks_at_the_period() {
        let mut poller = Poller::new(Duration::from_millis(1200));
        poller.start();
        // First tick completes immediately, the next after one period.
        poller.tick().await;
        tokio::time::timeout(Duration::from_secs(5), poller.tick())
            .await
            .expect("second tick within one period");
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_poller_never_ticks() {
        let mut poller = Poller::new(Duration::from_millis(1200));
        let waited = tokio::time::timeout(Duration::from_secs(60), poller.tick()).await;
        assert!(waited.is_err(), "tick must pend while stopped");
    }
}
