//! # Bounded Retry
//!
//! Poll a fallible async operation at a fixed interval until it succeeds or a time
//! budget runs out.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Call `operation` until it returns `Ok`, sleeping `interval` between attempts.
///
/// Once `timeout` has elapsed since the first call, the error of the last attempt is
/// returned. An attempt that is already running is always awaited to completion; the
/// timeout is only checked between attempts.
pub async fn until_success<T, E, F, Fut>(
    mut operation: F,
    timeout: Duration,
    interval: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if started.elapsed() >= timeout {
                    warn!(
                        attempt,
                        timeout_secs = timeout.as_secs(),
                        error = %e,
                        "Giving up after timeout"
                    );
                    return Err(e);
                }
                debug!(attempt, error = %e, "Attempt failed, retrying");
                sleep(interval).await;
            }
        }
    }
}
