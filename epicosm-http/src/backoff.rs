//! Retry schedule for transient upstream failures.
//!
//! Delays are counted in abstract time units: the first retry waits `initial`
//! units, every further retry multiplies by `factor`, and no single wait exceeds
//! `cap`. The schedule never runs out; the executor keeps retrying until a
//! non-transient outcome arrives.
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: u64,
    pub factor: u64,
    pub cap: u64,
    /// Wall-clock length of one time unit.
    pub unit: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: 1,
            factor: 5,
            cap: 900,
            unit: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Start a fresh schedule; each request gets its own.
    ///
    /// ```
    /// use epicosm_http::BackoffPolicy;
    ///
    /// let units: Vec<u64> = BackoffPolicy::default().schedule().take(7).collect();
    /// assert_eq!(units, vec![1, 5, 25, 125, 625, 900, 900]);
    /// ```
    pub fn schedule(&self) -> BackoffSchedule {
        BackoffSchedule {
            policy: *self,
            next: None,
        }
    }

    pub fn to_duration(&self, units: u64) -> Duration {
        self.unit.saturating_mul(u32::try_from(units).unwrap_or(u32::MAX))
    }
}

/// Endless iterator of delays in time units.
#[derive(Clone, Debug)]
pub struct BackoffSchedule {
    policy: BackoffPolicy,
    next: Option<u64>,
}

impl Iterator for BackoffSchedule {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = match self.next {
            None => self.policy.initial.min(self.policy.cap),
            Some(units) => units,
        };
        self.next = Some(
            current
                .saturating_mul(self.policy.factor)
                .min(self.policy.cap),
        );
        Some(current)
    }
}

/// Where the executor blocks between retries.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Records every requested delay and returns immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingPause {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, delay: Duration) {
        if let Ok(mut d) = self.delays.lock() {
            d.push(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_cap() {
        let policy = BackoffPolicy::default();
        assert!(policy.schedule().take(50).all(|u| u <= 900));
        assert_eq!(policy.schedule().nth(40), Some(900));
    }

    #[test]
    fn initial_above_cap_is_clamped() {
        let policy = BackoffPolicy {
            initial: 2000,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.schedule().next(), Some(900));
    }

    #[test]
    fn factor_one_is_constant() {
        let policy = BackoffPolicy {
            initial: 3,
            factor: 1,
            cap: 10,
            unit: Duration::from_millis(1),
        };
        let units: Vec<u64> = policy.schedule().take(4).collect();
        assert_eq!(units, vec![3, 3, 3, 3]);
    }

    #[test]
    fn converts_units_to_wall_clock() {
        let policy = BackoffPolicy {
            unit: Duration::from_millis(10),
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.to_duration(25), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn recording_pause_keeps_order() {
        let pause = RecordingPause::new();
        pause.pause(Duration::from_secs(1)).await;
        pause.pause(Duration::from_secs(5)).await;
        assert_eq!(
            pause.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(5)]
        );
    }
}
