//! Reconnect backoff policy.
//!
//! Delays grow exponentially from `base`, are capped at `max`, and are
//! shortened by a random fraction of up to `jitter` so that clients dropped
//! together do not reconnect in lockstep.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;

// ============================================================================
// Constants
// ============================================================================

/// Default first reconnect delay.
pub(crate) const DEFAULT_BASE: Duration = Duration::from_millis(10);

/// Default delay cap.
pub(crate) const DEFAULT_MAX: Duration = Duration::from_secs(5);

/// Default jitter fraction.
const DEFAULT_JITTER: f64 = 0.25;

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff with a cap and jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first reconnect attempt.
    pub base: Duration,

    /// Upper bound on any delay.
    pub max: Duration,

    /// Fraction in `0.0..=1.0` by which a delay may be shortened at random.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_MAX)
    }
}

impl Backoff {
    /// Creates a policy with the default jitter.
    #[inline]
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            jitter: DEFAULT_JITTER,
        }
    }

    /// Sets the jitter fraction, clamped to `0.0..=1.0`.
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Returns the un-jittered delay for a zero-based attempt number.
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Returns the jittered delay for a zero-based attempt number.
    ///
    /// Never exceeds [`Backoff::ceiling`]. A jitter outside `0.0..=1.0` is
    /// clamped and a NaN jitter counts as none.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let jitter = self.effective_jitter();
        if jitter <= 0.0 {
            return ceiling;
        }

        let shrink = rand::thread_rng().gen_range(0.0..=jitter);
        ceiling.mul_f64(1.0 - shrink)
    }

    /// Returns a copy with the jitter clamped to `0.0..=1.0`.
    #[must_use]
    pub fn sanitized(self) -> Self {
        Self {
            jitter: self.effective_jitter(),
            ..self
        }
    }

    fn effective_jitter(&self) -> f64 {
        if self.jitter.is_nan() {
            0.0
        } else {
            self.jitter.clamp(0.0, 1.0)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
