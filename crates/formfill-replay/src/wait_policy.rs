use std::time::{Duration, Instant};

use anyhow::{bail, Result};

pub const DEFAULT_TARGET_WAIT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TARGET_POLL_INTERVAL_MS: u64 = 100;

/// Bounded wait applied to every lookup of a live target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TARGET_WAIT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(DEFAULT_TARGET_POLL_INTERVAL_MS),
        }
    }
}

impl WaitPolicy {
    pub fn from_millis(timeout_ms: u64, poll_interval_ms: u64) -> Result<Self> {
        let policy = Self {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(poll_interval_ms),
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            bail!("target wait timeout must be greater than 0");
        }
        if self.poll_interval.is_zero() {
            bail!("target poll interval must be greater than 0");
        }
        if self.poll_interval > self.timeout {
            bail!(
                "target poll interval {} ms exceeds wait timeout {} ms",
                self.poll_interval.as_millis(),
                self.timeout.as_millis()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready { value: T, attempts: usize, waited: Duration },
    TimedOut { attempts: usize, waited: Duration },
}

/// Calls `probe` until it yields a value, fails, or the deadline passes. At
/// least one attempt is always made and no sleep runs past the deadline.
pub fn poll_until<T, F>(policy: &WaitPolicy, mut probe: F) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts = 0usize;
    loop {
        attempts = attempts.saturating_add(1);
        if let Some(value) = probe()? {
            return Ok(PollOutcome::Ready {
                value,
                attempts,
                waited: started.elapsed(),
            });
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut {
                attempts,
                waited: started.elapsed(),
            });
        }
        std::thread::sleep(policy.poll_interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;

    use super::{poll_until, PollOutcome, WaitPolicy};

    fn fast_policy() -> WaitPolicy {
        WaitPolicy::from_millis(60, 5).expect("policy")
    }

    #[test]
    fn unit_ready_on_first_attempt_does_not_sleep() {
        let outcome = poll_until(&fast_policy(), || Ok(Some(7))).expect("poll");
        match outcome {
            PollOutcome::Ready {
                value, attempts, ..
            } => {
                assert_eq!(value, 7);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn functional_late_render_is_picked_up_before_timeout() {
        let mut calls = 0;
        let outcome = poll_until(&fast_policy(), || {
            calls += 1;
            Ok((calls >= 3).then_some("target"))
        })
        .expect("poll");
        assert!(matches!(
            outcome,
            PollOutcome::Ready {
                value: "target",
                attempts: 3,
                ..
            }
        ));
    }

    #[test]
    fn functional_absent_target_times_out_within_bound() {
        let policy = fast_policy();
        let outcome = poll_until::<(), _>(&policy, || Ok(None)).expect("poll");
        match outcome {
            PollOutcome::TimedOut { attempts, waited } => {
                assert!(attempts >= 2);
                assert!(waited >= policy.timeout);
                assert!(waited < policy.timeout + Duration::from_secs(1));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn regression_probe_errors_stop_polling_immediately() {
        let mut calls = 0;
        let error = poll_until::<(), _>(&fast_policy(), || {
            calls += 1;
            Err(anyhow!("backend gone"))
        })
        .expect_err("error should propagate");
        assert_eq!(calls, 1);
        assert!(error.to_string().contains("backend gone"));
    }

    #[test]
    fn unit_policy_validation_rejects_degenerate_bounds() {
        assert!(WaitPolicy::from_millis(0, 1).is_err());
        assert!(WaitPolicy::from_millis(10, 0).is_err());
        let error = WaitPolicy::from_millis(10, 20).expect_err("interval > timeout");
        assert!(error.to_string().contains("exceeds wait timeout"));
        WaitPolicy::default().validate().expect("default valid");
    }
}
