//! Bounded polling until a precondition holds.
//!
//! The control plane of a new cluster comes up asynchronously. Attempts are
//! cheap and readiness arrives within seconds, so the prober polls on a
//! fixed (optionally jittered) interval instead of backing off.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// How often and how patiently to poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub steps: u32,
    /// Pause between attempts
    pub interval: Duration,
    /// Fraction of `interval` added at random, 0.1 means up to +10 %
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            steps: 20,
            interval: Duration::from_millis(500),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(steps: u32, interval: Duration) -> Self {
        Self {
            steps,
            interval,
            jitter: 0.0,
        }
    }

    /// Pause before the next attempt. Jitter outside `0.0..=1.0` (or NaN) is
    /// clamped.
    pub fn delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter = clamp_jitter(self.jitter);
        if jitter == 0.0 {
            return self.interval;
        }
        let factor = 1.0 + rng.gen_range(0.0..=jitter);
        Duration::from_secs_f64(self.interval.as_secs_f64() * factor)
    }
}

/// Usable jitter fraction: NaN and negatives become 0, anything above 1 is 1
pub fn clamp_jitter(jitter: f64) -> f64 {
    if jitter.is_nan() {
        0.0
    } else {
        jitter.clamp(0.0, 1.0)
    }
}

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Keep polling
    Retriable,
    /// Give up and hand the error to the caller
    Terminal,
}

/// Default classification for probes against the Kubernetes API.
///
/// Missing objects, conflicts, throttling, server errors and transport
/// problems are expected while the control plane starts. Malformed or
/// unauthorized requests and broken client setup will not heal by waiting.
pub fn classify(err: &Error) -> ErrorClass {
    match err {
        Error::Kube(kube::Error::Api(resp)) => match resp.code {
            400 | 401 | 403 | 422 => ErrorClass::Terminal,
            _ => ErrorClass::Retriable,
        },
        Error::ClientInit(_) | Error::InvalidArgument(_) | Error::InvalidName { .. } => {
            ErrorClass::Terminal
        }
        _ => ErrorClass::Retriable,
    }
}

/// Run `probe` until it succeeds, a terminal error occurs or the step budget
/// is spent. Terminal errors are returned as they are. Exhausting the budget
/// yields [`Error::ReadinessTimeout`] wrapping the last error.
pub async fn wait_until<T, F, Fut, C>(
    what: &str,
    policy: &RetryPolicy,
    classify: C,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: Fn(&Error) -> ErrorClass,
{
    let steps = policy.steps.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match probe().await {
            Ok(value) => {
                debug!(what, attempt, "Precondition met");
                return Ok(value);
            }
            Err(err) => err,
        };

        if classify(&err) == ErrorClass::Terminal {
            warn!(what, attempt, error = %err, "Giving up on non-retriable error");
            return Err(err);
        }

        if attempt >= steps {
            warn!(what, attempt, error = %err, "Retry budget exhausted");
            return Err(Error::ReadinessTimeout {
                what: what.to_string(),
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = policy.delay(&mut rand::thread_rng());
        debug!(what, attempt, error = %err, delay_ms = delay.as_millis() as u64, "Not ready yet");
        tokio::time::sleep(delay).await;
    }
}
