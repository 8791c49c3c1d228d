//! Owned repeating tick for the countdown display

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// A start/stop interval. While stopped, `tick` never completes.
#[derive(Debug)]
pub struct Cadence {
    period: Duration,
    interval: Option<Interval>,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
        }
    }

    /// Start ticking one period from now. No-op if already running.
    pub fn start(&mut self) {
        if self.interval.is_some() {
            return;
        }
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Stop ticking. Returns whether it was running.
    pub fn stop(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Cancel safe.
    pub async fn tick(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticks_while_running() {
        let mut cadence = Cadence::new(Duration::from_millis(10));
        cadence.start();
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), cadence.tick())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_stopped_never_ticks() {
        let mut cadence = Cadence::new(Duration::from_millis(10));
        assert!(!cadence.is_running());
        let waited = tokio::time::timeout(Duration::from_millis(50), cadence.tick()).await;
        assert!(waited.is_err());

        cadence.start();
        assert!(cadence.stop());
        let waited = tokio::time::timeout(Duration::from_millis(50), cadence.tick()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let mut cadence = Cadence::new(Duration::from_millis(10));
        cadence.start();
        cadence.start();
        assert!(cadence.is_running());
        assert!(cadence.stop());
        assert!(!cadence.stop());
    }
}
