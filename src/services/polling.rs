use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Result of a single vendor status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T> {
    Pending,
    Ready(T),
    Failed(String),
}

/// How often to check and when to give up.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Call `check` until it reports a terminal step or the attempts run out.
///
/// The first check happens immediately; each following one waits
/// `policy.interval`. An `Err` from `check` ends the loop at once.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut check: F) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStep<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            sleep(policy.interval).await;
        }

        match check(attempt).await.map_err(PollError::Check)? {
            PollStep::Ready(value) => return Ok(value),
            PollStep::Failed(message) => return Err(PollError::Failed(message)),
            PollStep::Pending => {
                tracing::trace!(attempt, max_attempts = policy.max_attempts, "Still pending");
            }
        }
    }

    Err(PollError::TimedOut {
        attempts: policy.max_attempts,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("{0}")]
    Failed(String),

    #[error("Gave up after {attempts} status checks")]
    TimedOut { attempts: u32 },

    #[error(transparent)]
    Check(E),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn returns_value_once_ready() {
        let result: Result<&str, PollError<std::io::Error>> = poll_until(fast(10), |attempt| async move {
            Ok(if attempt < 3 {
                PollStep::Pending
            } else {
                PollStep::Ready("done")
            })
        })
        .await;

        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), PollError<std::io::Error>> = poll_until(fast(4), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollStep::Pending) }
        })
        .await;

        assert!(matches!(result, Err(PollError::TimedOut { attempts: 4 })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn vendor_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), PollError<std::io::Error>> = poll_until(fast(10), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollStep::Failed("NSFW content detected".to_string())) }
        })
        .await;

        match result {
            Err(e @ PollError::Failed(_)) => assert_eq!(e.to_string(), "NSFW content detected"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn check_error_is_not_retried() {
        let result: Result<(), PollError<std::io::Error>> = poll_until(fast(10), |_| async {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "connection reset"))
        })
        .await;

        assert!(matches!(result, Err(PollError::Check(_))));
    }

    #[test]
    fn zero_attempts_still_checks_once() {
        assert_eq!(PollPolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }
}
