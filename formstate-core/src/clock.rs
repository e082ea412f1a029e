//! Timestamps and async tokens.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hybrid logical timestamp: wall-clock milliseconds plus a counter that
/// breaks ties inside one millisecond.
///
/// Stamps minted by [`Stamp::now`] are strictly increasing within a process,
/// so "finished after started" comparisons hold even on coarse clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    wall_ms: i64,
    counter: u32,
}

static LAST_STAMP: Mutex<Stamp> = Mutex::new(Stamp {
    wall_ms: 0,
    counter: 0,
});

impl Stamp {
    /// Builds a stamp from raw parts.
    #[must_use]
    pub const fn new(wall_ms: i64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    /// Mints the next stamp.
    #[must_use]
    pub fn now() -> Self {
        let wall_ms = Utc::now().timestamp_millis();
        let mut last = LAST_STAMP.lock().unwrap_or_else(PoisonError::into_inner);
        let next = if wall_ms > last.wall_ms {
            Self::new(wall_ms, 0)
        } else {
            Self::new(last.wall_ms, last.counter.saturating_add(1))
        };
        *last = next;
        next
    }

    /// Wall-clock milliseconds since the Unix epoch.
    #[must_use]
    pub fn wall_ms(&self) -> i64 {
        self.wall_ms
    }

    /// Tie-breaking counter within the millisecond.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Wall-clock part as a UTC datetime.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.wall_ms)
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.wall_ms, self.counter)
    }
}

/// Identifies one asynchronous validation run.
///
/// A new token is minted every time async validation starts on a path; a
/// completion is only applied when it carries the path's current token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AsyncToken(Uuid);

impl AsyncToken {
    /// Mints a random token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AsyncToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AsyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
