//! Exponential backoff with additive jitter.

use std::time::Duration;

use crate::config::RecoveryConfig;

const DEFAULT_MULTIPLIER: f64 = 2.0;
const MAX_MULTIPLIER: f64 = 10.0;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry unless the error's policy names one
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Upper bound of the random jitter, as a fraction of the capped delay
    pub jitter_factor: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

impl Backoff {
    /// Builds a backoff from configuration.
    ///
    /// `jitter_factor` is clamped to `[0, 1]` and `multiplier` to
    /// `[1, MAX_MULTIPLIER]`; non-finite values fall back to the defaults.
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            base_delay: config.initial_delay,
            multiplier: bounded_multiplier(config.backoff_multiplier),
            max_delay: config.max_delay,
            jitter_factor: bounded_jitter(config.jitter_factor),
        }
    }

    /// `min(base * multiplier^(attempt - 1), max_delay)`, without jitter.
    ///
    /// `attempt` is 1-based: the delay after the first failed attempt uses
    /// the base delay unchanged.
    pub fn capped_delay(&self, attempt: u32, base: Option<Duration>) -> Duration {
        let base = base.unwrap_or(self.base_delay);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = base.as_secs_f64() * bounded_multiplier(self.multiplier).powi(exponent);
        let max = self.max_delay.as_secs_f64();

        if secs.is_finite() {
            Duration::from_secs_f64(secs.clamp(0.0, max))
        } else {
            self.max_delay
        }
    }

    /// Capped delay plus uniform jitter in `[0, jitter_factor * capped)`.
    ///
    /// Jitter only ever lengthens the delay.
    pub fn delay(&self, attempt: u32, base: Option<Duration>) -> Duration {
        self.delay_with_sample(attempt, base, rand::random::<f64>())
    }

    fn delay_with_sample(&self, attempt: u32, base: Option<Duration>, sample: f64) -> Duration {
        let capped = self.capped_delay(attempt, base);
        let factor = bounded_jitter(self.jitter_factor) * sample.clamp(0.0, 1.0);
        capped.saturating_add(capped.mul_f64(factor))
    }
}

fn bounded_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() {
        multiplier.clamp(1.0, MAX_MULTIPLIER)
    } else {
        DEFAULT_MULTIPLIER
    }
}

fn bounded_jitter(jitter_factor: f64) -> f64 {
    if jitter_factor.is_finite() {
        jitter_factor.clamp(0.0, 1.0)
    } else {
        DEFAULT_JITTER_FACTOR
    }
}
