// src/exec/backoff.rs

use std::time::Duration;

/// First wait between termination signals.
pub const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Exponential backoff bounded by a total budget.
///
/// Yields `initial, 2*initial, 4*initial, ...` while the cumulative sum stays
/// within `timeout`; the last interval is clamped so that the yielded
/// intervals add up to exactly `timeout`. For `initial = 0.1s` and
/// `timeout = 1.0s` that is `0.1, 0.2, 0.4, 0.3`.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    elapsed: Duration,
    timeout: Duration,
    done: bool,
}

impl Backoff {
    pub fn new(initial: Duration, timeout: Duration) -> Self {
        Self {
            next: initial,
            elapsed: Duration::ZERO,
            timeout,
            done: false,
        }
    }

    /// Backoff starting at [`INITIAL_INTERVAL`].
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(INITIAL_INTERVAL, timeout)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.done {
            return None;
        }

        if self.next.is_zero() || self.elapsed + self.next >= self.timeout {
            self.done = true;
            let rest = self.timeout.saturating_sub(self.elapsed);
            self.elapsed = self.timeout;
            return Some(rest);
        }

        let current = self.next;
        self.elapsed += current;
        self.next = current * 2;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn one_second_budget() {
        let steps: Vec<_> = Backoff::with_timeout(ms(1000)).collect();
        assert_eq!(steps, vec![ms(100), ms(200), ms(400), ms(300)]);
    }

    #[test]
    fn exact_fit_does_not_add_a_zero_step() {
        let steps: Vec<_> = Backoff::with_timeout(ms(700)).collect();
        assert_eq!(steps, vec![ms(100), ms(200), ms(400)]);
    }

    #[test]
    fn budget_smaller_than_first_interval() {
        let steps: Vec<_> = Backoff::with_timeout(ms(50)).collect();
        assert_eq!(steps, vec![ms(50)]);
    }

    proptest! {
        #[test]
        fn intervals_sum_to_timeout(timeout_ms in 1u64..60_000) {
            let timeout = ms(timeout_ms);
            let steps: Vec<_> = Backoff::with_timeout(timeout).collect();

            prop_assert_eq!(steps.iter().sum::<Duration>(), timeout);
            prop_assert!(steps.iter().all(|d| !d.is_zero()));
            for pair in steps.windows(2) {
                prop_assert!(pair[1] <= pair[0] * 2);
            }
        }
    }
}
