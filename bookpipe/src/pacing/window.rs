//! Sliding record of recent admissions under a per-minute quota.

use std::collections::VecDeque;
use std::time::Duration;

/// Length of the trailing window the quota applies to.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Timestamps of the last `quota` admitted calls, oldest first.
#[derive(Debug, Clone)]
pub struct RateWindow {
    quota: usize,
    min_spacing: Duration,
    admitted: VecDeque<Duration>,
}

impl RateWindow {
    /// Create a window allowing `calls_per_minute` admissions per 60 seconds.
    ///
    /// A quota of zero is treated as one call per minute.
    pub fn new(calls_per_minute: u32) -> Self {
        let quota = calls_per_minute.max(1);
        Self {
            quota: quota as usize,
            min_spacing: WINDOW / quota,
            admitted: VecDeque::with_capacity(quota as usize),
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Remaining wait for the minimum spacing after the latest admission.
    pub fn spacing_wait(&self, now: Duration) -> Option<Duration> {
        let last = *self.admitted.back()?;
        let elapsed = now.saturating_sub(last);
        (elapsed < self.min_spacing).then(|| self.min_spacing - elapsed)
    }

    /// Remaining wait until the oldest admission leaves the trailing window,
    /// when the window is full.
    pub fn quota_wait(&self, now: Duration) -> Option<Duration> {
        if self.admitted.len() < self.quota {
            return None;
        }
        let oldest = *self.admitted.front()?;
        let elapsed = now.saturating_sub(oldest);
        (elapsed < WINDOW).then(|| WINDOW - elapsed)
    }

    /// Record an admission at `now`, evicting anything beyond the quota.
    pub fn record(&mut self, now: Duration) {
        self.admitted.push_back(now);
        while self.admitted.len() > self.quota {
            self.admitted.pop_front();
        }
    }

    /// Admission timestamps currently held, oldest first.
    pub fn admitted(&self) -> impl Iterator<Item = Duration> + '_ {
        self.admitted.iter().copied()
    }
}
