use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Timestamp of an audit event.
///
/// Combines a wall-clock component with a logical counter so that events in
/// one log are strictly ordered even when the clock stalls or steps back.
///
/// Ordering: `unix_ms` → `logical` (total order).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTime {
    /// Wall-clock milliseconds since UNIX epoch.
    pub unix_ms: u64,
    /// Logical counter for events at the same wall-clock millisecond.
    pub logical: u32,
}

impl EventTime {
    pub const fn new(unix_ms: u64, logical: u32) -> Self {
        Self { unix_ms, logical }
    }

    /// The zero time.
    pub const fn zero() -> Self {
        Self {
            unix_ms: 0,
            logical: 0,
        }
    }

    /// Next timestamp for a log whose last event is `previous`, given a
    /// fresh clock reading.
    ///
    /// If the clock moved forward the reading is used as-is; otherwise the
    /// previous wall-clock component is kept and the logical counter bumped.
    pub fn next_after(previous: Option<&Self>, now_ms: u64) -> Self {
        match previous {
            None => Self::new(now_ms, 0),
            Some(prev) if now_ms > prev.unix_ms => Self::new(now_ms, 0),
            Some(prev) => Self::new(prev.unix_ms, prev.logical.saturating_add(1)),
        }
    }

    /// Returns `true` if this time is strictly after `other`.
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }

    /// Wall-clock component as a UTC datetime.
    pub fn to_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.unix_ms as i64)
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.unix_ms
            .cmp(&other.unix_ms)
            .then(self.logical.cmp(&other.logical))
    }
}

impl fmt::Debug for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventTime({}ms.{})", self.unix_ms, self.logical)
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(
                f,
                "{}+{}",
                dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                self.logical
            ),
            None => write!(f, "{}.{}", self.unix_ms, self.logical),
        }
    }
}

/// Wall-clock source, supplied by the surrounding application.
pub trait Clock: Send + Sync {
    /// Milliseconds since UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// The operating system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
