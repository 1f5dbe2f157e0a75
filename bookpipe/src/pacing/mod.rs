//! Rate-limited, retrying invocation of outbound calls.
//!
//! Every call site that shares a [`PacedCaller`] shares one quota. Before each
//! attempt the caller waits for admission: first for the minimum spacing since
//! the previous admission, then, if the trailing minute is full, for the oldest
//! admission to age out. Failed attempts back off exponentially and are
//! admitted again before retrying.

mod clock;
mod window;

pub use clock::{Clock, ManualClock, TokioClock};
pub use window::{RateWindow, WINDOW};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;

/// Default base for exponential backoff: sleeps of 1s, 2s, 4s, ...
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Result of invoking a call with retries.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    /// Every attempt failed; `reason` is the last failure.
    Exhausted { attempts: u32, reason: String },
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Exhausted { .. } => None,
        }
    }
}

/// One attempt in flight.
struct CallAttempt {
    number: u32,
    started_at: Duration,
}

/// Paces outbound calls to a per-minute quota and retries failures.
pub struct PacedCaller {
    window: Mutex<RateWindow>,
    clock: Arc<dyn Clock>,
    backoff_base: f64,
}

impl PacedCaller {
    pub fn new(calls_per_minute: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            window: Mutex::new(RateWindow::new(calls_per_minute)),
            clock,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// A caller pacing against real time.
    pub fn realtime(calls_per_minute: u32) -> Self {
        Self::new(calls_per_minute, Arc::new(TokioClock::new()))
    }

    pub fn with_backoff_base(mut self, backoff_base: f64) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Sleep before retrying after failed attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let seconds = self.backoff_base.powi(attempt as i32);
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }

    /// Wait until a call may proceed under the quota, then record it.
    ///
    /// The window stays locked across the waits so concurrent callers are
    /// admitted strictly one after another.
    async fn admit(&self) -> Duration {
        let mut window = self.window.lock().await;

        let mut now = self.clock.now();
        if let Some(wait) = window.spacing_wait(now) {
            debug!("Rate limiting: waiting {:.1}s", wait.as_secs_f64());
            self.clock.sleep(wait).await;
            now = self.clock.now();
        }
        if let Some(wait) = window.quota_wait(now) {
            debug!(
                "Quota of {}/min reached: waiting {:.1}s",
                window.quota(),
                wait.as_secs_f64()
            );
            self.clock.sleep(wait).await;
            now = self.clock.now();
        }

        window.record(now);
        now
    }

    /// Run `call` until it succeeds or `max_attempts` attempts have failed.
    ///
    /// Each attempt is admitted through the rate window first. Failures are
    /// logged against `label` and never propagate; the caller decides what an
    /// exhausted outcome means. A `max_attempts` of zero still makes one attempt.
    pub async fn invoke<T, F, Fut>(&self, label: &str, max_attempts: u32, mut call: F) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let attempts = max_attempts.max(1);
        let mut reason = String::new();

        for number in 0..attempts {
            let attempt = CallAttempt {
                number,
                started_at: self.admit().await,
            };

            match call().await {
                Ok(value) => {
                    if attempt.number > 0 {
                        debug!("{}: succeeded on attempt {}", label, attempt.number + 1);
                    }
                    return CallOutcome::Success(value);
                }
                Err(err) => {
                    reason = format!("{:#}", err);
                    let elapsed = self.clock.now().saturating_sub(attempt.started_at);
                    warn!(
                        "{}: attempt {}/{} failed after {:.1}s: {}",
                        label,
                        attempt.number + 1,
                        attempts,
                        elapsed.as_secs_f64(),
                        reason
                    );

                    if attempt.number + 1 < attempts {
                        self.clock.sleep(self.backoff(attempt.number)).await;
                    }
                }
            }
        }

        CallOutcome::Exhausted { attempts, reason }
    }

    /// Admission timestamps currently in the window, oldest first.
    pub async fn admitted(&self) -> Vec<Duration> {
        self.window.lock().await.admitted().collect()
    }
}
