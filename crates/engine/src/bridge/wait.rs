use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError<E> {
    TimedOut { waited: Duration },
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for WaitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::TimedOut { waited } => {
                write!(f, "condition not met after {} ms", waited.as_millis())
            }
            WaitError::Failed(err) => err.fmt(f),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for WaitError<E> {}

/// Polls `check` every `interval` until it yields `true`, it fails, or
/// `timeout` has elapsed. `check` always runs at least once. Returns the
/// number of polls taken.
pub fn wait_for_predicate<E>(
    interval: Duration,
    timeout: Duration,
    mut check: impl FnMut() -> Result<bool, E>,
) -> Result<u32, WaitError<E>> {
    let started = Instant::now();
    let mut polls = 0u32;
    loop {
        polls = polls.saturating_add(1);
        if check().map_err(WaitError::Failed)? {
            return Ok(polls);
        }
        let waited = started.elapsed();
        if waited >= timeout {
            return Err(WaitError::TimedOut { waited });
        }
        thread::sleep(interval.min(timeout - waited));
    }
}
