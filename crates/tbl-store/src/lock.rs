use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::error::{StoreError, StoreResult};

const BACKOFF: Duration = Duration::from_micros(50);

/// Acquire a read guard or give up at `timeout`.
pub(crate) fn read_within<'a, T>(
    lock: &'a RwLock<T>,
    timeout: Duration,
    op: &'static str,
) -> StoreResult<RwLockReadGuard<'a, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match lock.try_read() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::LockPoisoned),
            Err(TryLockError::WouldBlock) => wait_or_timeout(deadline, timeout, op)?,
        }
    }
}

/// Acquire a write guard or give up at `timeout`.
pub(crate) fn write_within<'a, T>(
    lock: &'a RwLock<T>,
    timeout: Duration,
    op: &'static str,
) -> StoreResult<RwLockWriteGuard<'a, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match lock.try_write() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::LockPoisoned),
            Err(TryLockError::WouldBlock) => wait_or_timeout(deadline, timeout, op)?,
        }
    }
}

fn wait_or_timeout(deadline: Instant, timeout: Duration, op: &'static str) -> StoreResult<()> {
    if Instant::now() >= deadline {
        return Err(StoreError::Timeout {
            op,
            timeout_ms: timeout.as_millis() as u64,
        });
    }
    std::thread::sleep(BACKOFF);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncontended_lock_is_acquired() {
        let lock = RwLock::new(1);
        assert_eq!(*read_within(&lock, Duration::from_millis(10), "get").unwrap(), 1);
        *write_within(&lock, Duration::from_millis(10), "put").unwrap() = 2;
        assert_eq!(*lock.read().unwrap(), 2);
    }

    #[test]
    fn held_lock_times_out() {
        let lock = RwLock::new(0);
        let _held = lock.write().unwrap();
        let err = write_within(&lock, Duration::from_millis(5), "compare_and_swap").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout {
                op: "compare_and_swap",
                timeout_ms: 5
            }
        ));
        assert!(err.is_retryable());
        assert!(read_within(&lock, Duration::from_millis(5), "get").is_err());
    }
}
