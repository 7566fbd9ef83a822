//! Per-room logical clock.
//!
//! A monotone counter used as the LWW tie-breaker and the broadcast-ordering
//! authority for a single room. See spec §4.1.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single clock reading.
///
/// `Clock(0)` is reserved as the "unstamped" sentinel used by inverse-op
/// computation (spec §4.3): an inverse that restores a field to "missing"
/// carries clock 0 so the replaying layer knows to stamp it with a fresh
/// value rather than trust the literal zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Clock(pub u64);

impl Clock {
    pub const ZERO: Clock = Clock(0);

    #[must_use]
    pub fn is_unstamped(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A room's logical clock.
///
/// Advances on every local-originated op (`tick`) and on receipt of any
/// remote op (`merge`). Invariant 4 (spec §3): the room clock strictly
/// exceeds every clock stored in its tree at all times — `merge` and `tick`
/// both enforce this by construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalClock {
    current: u64,
}

impl LogicalClock {
    #[must_use]
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Current reading without advancing.
    #[must_use]
    pub fn current(&self) -> Clock {
        Clock(self.current)
    }

    /// Advance for a locally-originated op and return the new stamp.
    pub fn tick(&mut self) -> Clock {
        self.current += 1;
        Clock(self.current)
    }

    /// Advance past an incoming clock reading and return the new stamp.
    ///
    /// `max(local, incoming) + 1` — this both catches the clock up to any
    /// remote value it has fallen behind and guarantees the new stamp is
    /// still strictly greater than anything seen so far.
    pub fn merge(&mut self, incoming: Clock) -> Clock {
        self.current = self.current.max(incoming.0) + 1;
        Clock(self.current)
    }
}
