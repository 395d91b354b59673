//! Bounded wait for a rendered page's content-ready signal.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Whether the ready signal was observed before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    TimedOut,
}

/// Poll `check` until it reports ready or `timeout` elapses.
///
/// Check errors count as "not ready yet". A timeout is not an error: the
/// caller proceeds with whatever content the page has.
pub async fn wait_until_ready<P, Fut, E>(
    mut check: P,
    timeout: Duration,
    poll_interval: Duration,
) -> ReadyState
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if matches!(check().await, Ok(true)) {
            return ReadyState::Ready;
        }
        let now = Instant::now();
        if now >= deadline {
            return ReadyState::TimedOut;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}
