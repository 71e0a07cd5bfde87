//! Monotonic time and identifier minting, injected into every component
//! that needs either rather than calling `Utc::now()` / `Uuid::new_v4()`
//! ad hoc (spec §9 design note on process-wide state).

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of wall-clock time. Exists so tests can inject a fake clock
/// instead of depending on real time passing.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns a fixed instant, advanced manually by
/// tests.
#[derive(Debug)]
pub struct FakeClock {
    current: std::sync::Mutex<DateTime<Utc>>,
}

impl FakeClock {
    /// Create a fake clock starting at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: std::sync::Mutex::new(start),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.current.lock().expect("fake clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().expect("fake clock mutex poisoned")
    }
}

/// Mints strictly monotonic `u64` IDs for Memory records and totally
/// ordered `u64` IDs for Safety checkpoints. UUIDs (task ids, subtask
/// ids) don't need ordering and are minted directly via `Uuid::new_v4()`.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator that starts minting from 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next strictly increasing ID.
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Mint a random task/subtask/checkpoint identifier. Kept as an
    /// associated function (not tied to `self`) since uniqueness, not
    /// ordering, is all that's required here.
    pub fn new_uuid() -> Uuid {
        Uuid::new_v4()
    }
}
