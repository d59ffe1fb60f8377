//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Reconnect backoff for exchange clients.
//!
//! The client decides how many attempts a reconnect round makes
//! ([`ExchangeConfig::reconnect_attempts`](crate::remoting::exchange::ExchangeConfig));
//! the backoff only spaces them out.

use std::time::Duration;

/// Exponential backoff between reconnect attempts.
///
/// Attempt `n` (counting from 0) waits `initial * factor^n`, capped at
/// `max`. With jitter the wait is drawn from the upper half of that delay,
/// so clients that lost the same server do not reconnect in lockstep.
///
/// # Examples
///
/// ```
/// use drpc::remoting::ExponentialBackoff;
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(2))
///     .jitter(false)
///     .build();
/// let delays: Vec<_> = backoff.delays().take(6).collect();
/// assert_eq!(delays[1], Duration::from_millis(200));
/// assert_eq!(delays[5], Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: u32,
    jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExponentialBackoff {
    /// A builder starting from 100 ms doubling up to 60 s with jitter.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder {
            backoff: Self {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(60),
                factor: 2,
                jitter: true,
            },
        }
    }

    /// The wait before attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self
            .factor
            .checked_pow(attempt)
            .and_then(|scale| self.initial.checked_mul(scale))
            .map_or(self.max, |delay| delay.min(self.max));
        if self.jitter && !capped.is_zero() {
            let half = capped / 2;
            half + half.mul_f64(rand::random::<f64>())
        } else {
            capped
        }
    }

    /// Successive waits, starting with attempt 0.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..).map(move |attempt| self.delay(attempt))
    }
}

/// Builder for [`ExponentialBackoff`].
#[derive(Debug, Clone)]
pub struct ExponentialBackoffBuilder {
    backoff: ExponentialBackoff,
}

impl ExponentialBackoffBuilder {
    /// Wait before the first attempt.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.backoff.initial = delay;
        self
    }

    /// Upper bound of any wait.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.backoff.max = delay;
        self
    }

    /// Growth per attempt; values below 1 are treated as 1.
    pub fn factor(mut self, factor: u32) -> Self {
        self.backoff.factor = factor.max(1);
        self
    }

    /// Whether waits are randomized.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.backoff.jitter = jitter;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> ExponentialBackoff {
        self.backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> ExponentialBackoffBuilder {
        ExponentialBackoff::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .jitter(false)
    }

    #[test]
    fn test_growth_is_capped() {
        let backoff = fixed().build();
        let delays: Vec<u128> = backoff.delays().take(5).map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(backoff.delay(200), Duration::from_millis(500));
    }

    #[test]
    fn test_factor_one_is_constant() {
        let backoff = fixed().factor(0).build();
        assert!(backoff.delays().take(10).all(|d| d == Duration::from_millis(100)));
    }

    #[test]
    fn test_jitter_stays_in_upper_half() {
        let backoff = fixed().jitter(true).build();
        for attempt in 0..50 {
            let bound = fixed().build().delay(attempt);
            let delay = backoff.delay(attempt);
            assert!(delay >= bound / 2 && delay <= bound, "{delay:?} outside {bound:?}");
        }
    }
}
