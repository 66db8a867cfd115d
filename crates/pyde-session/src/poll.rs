//! Recurring poll timer for the session's inbound queue.
//!
//! Runs on the caller's event loop: `tick()` is awaited alongside everything
//! else, there is no background task. Start and stop are idempotent.

use std::future;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub struct PollTimer {
    period: Duration,
    active: bool,
    // Created lazily on the first tick so the timer can be started outside a runtime.
    interval: Option<Interval>,
}

impl PollTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            active: false,
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns `true` if the timer was not already running.
    pub fn start(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        true
    }

    /// Returns `true` if the timer was running.
    pub fn stop(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.interval = None;
        true
    }

    /// Wait for the next poll. Never resolves while stopped.
    pub async fn tick(&mut self) {
        if !self.active {
            return future::pending().await;
        }
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            // First poll one period after start, not immediately.
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

impl Default for PollTimer {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_stop_are_idempotent() {
        let mut timer = PollTimer::default();
        assert!(!timer.is_active());

        assert!(timer.start());
        assert!(!timer.start());
        assert!(timer.is_active());

        assert!(timer.stop());
        assert!(!timer.stop());
        assert!(!timer.is_active());
    }

    #[test]
    fn default_period_is_100ms() {
        assert_eq!(PollTimer::default().period(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn tick_fires_while_active() {
        let mut timer = PollTimer::new(Duration::from_millis(5));
        timer.start();
        tokio::time::timeout(Duration::from_secs(5), timer.tick())
            .await
            .expect("active timer should tick");
    }

    #[tokio::test]
    async fn tick_pends_while_stopped() {
        let mut timer = PollTimer::new(Duration::from_millis(1));
        timer.start();
        timer.stop();
        let result = tokio::time::timeout(Duration::from_millis(50), timer.tick()).await;
        assert!(result.is_err(), "stopped timer must not tick");
    }
}
