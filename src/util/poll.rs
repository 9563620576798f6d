use std::{
    fmt,
    future::Future,
    task::{Context, Poll},
    thread,
    time::{Duration, Instant},
};

use futures::task::noop_waker_ref;

use crate::model::fs::FsError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub enum PollError<E> {
    Failed(E),
    DeadlineExceeded,
}

impl<E: fmt::Display> PollError<E> {
    /// Collapses into an `FsError`, prefixing store failures with `what`.
    pub fn into_fs_error(self, what: &str) -> FsError {
        match self {
            PollError::Failed(err) => FsError::store(format!("{}, {}", what, err)),
            PollError::DeadlineExceeded => FsError::DeadlineExceeded {
                op: what.to_string(),
            },
        }
    }
}

/// Turns an optional timeout into the deadline for a single store call.
pub fn deadline_from(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}

pub fn poll_until_ready_error<Fut, T, E>(
    future: Fut,
    deadline: Option<Instant>,
) -> Result<T, PollError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match poll_until_ready(future, deadline) {
        None => Err(PollError::DeadlineExceeded),
        Some(result) => result.map_err(PollError::Failed),
    }
}

/// Drives `future` to completion on the calling thread. Returns `None` when
/// `deadline` passes first; the future is dropped at that point.
pub fn poll_until_ready<Fut, T>(future: Fut, deadline: Option<Instant>) -> Option<T>
where
    Fut: Future<Output = T>,
{
    let mut future = Box::pin(future);
    let mut context = Context::from_waker(noop_waker_ref());

    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(result) => {
                return Some(result);
            }
            Poll::Pending => {
                if let Some(deadline) = deadline {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline - now));
                } else {
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future;

    use super::*;

    #[test]
    fn test_ready_future() {
        let result = poll_until_ready(future::ready(7), None);
        assert_eq!(result, Some(7));
    }

    #[test]
    fn test_ready_error_future() {
        let result: Result<u8, PollError<String>> =
            poll_until_ready_error(future::ready(Err("boom".to_string())), None);

        assert!(matches!(result, Err(PollError::Failed(msg)) if msg == "boom"));
    }

    #[test]
    fn test_pending_future_hits_deadline() {
        let deadline = Some(Instant::now() + Duration::from_millis(30));
        let result: Result<(), PollError<String>> =
            poll_until_ready_error(future::pending(), deadline);

        assert!(matches!(result, Err(PollError::DeadlineExceeded)));
    }

    #[test]
    fn test_ready_wins_over_expired_deadline() {
        let deadline = Some(Instant::now() - Duration::from_millis(1));
        let result = poll_until_ready(future::ready("done"), deadline);

        assert_eq!(result, Some("done"));
    }

    #[test]
    fn test_into_fs_error() {
        let err = PollError::Failed("denied").into_fs_error("failed to list_objects at: d/");
        assert_eq!(err.to_string(), "failed to list_objects at: d/, denied");

        let err = PollError::<String>::DeadlineExceeded.into_fs_error("head_object");
        assert!(matches!(err, FsError::DeadlineExceeded { op } if op == "head_object"));
    }

    #[test]
    fn test_deadline_from() {
        assert_eq!(deadline_from(None), None);

        let before = Instant::now();
        let deadline = deadline_from(Some(Duration::from_secs(5))).unwrap();
        assert!(deadline >= before + Duration::from_secs(5));
    }
}
