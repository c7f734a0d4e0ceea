//! The stored unit and its staleness rule.
//!
//! Every backend persists the same JSON shape:
//!
//! ```text
//! { "value": <payload>, "timestamp": <ms since epoch>, "staleTime": <ms or -1> }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel persisted for records that never go stale.
pub const NEVER_STALE: i64 = -1;

/// Staleness window of a cache record.
///
/// Persisted as an integer number of milliseconds, with `-1` meaning
/// [`StaleTime::Never`]. Any other negative value is rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum StaleTime {
    /// The record is never evicted by time.
    Never,
    /// The record is stale once strictly more than this window has elapsed.
    After(Duration),
}

impl StaleTime {
    /// Create a staleness window from milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self::After(Duration::from_millis(millis))
    }

    /// Create a staleness window from seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self::After(Duration::from_secs(secs))
    }

    /// Returns true for the permanent sentinel.
    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }

    /// The window in milliseconds, or `None` for [`StaleTime::Never`].
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            Self::Never => None,
            Self::After(window) => Some(u64::try_from(window.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Whether a record written at `timestamp` is stale at `now`.
    ///
    /// Strict comparison: at exactly `timestamp + window` the record is
    /// still fresh. A clock that moved backwards yields a fresh record.
    pub fn is_stale(&self, timestamp: i64, now: i64) -> bool {
        match self.as_millis() {
            None => false,
            Some(window) => {
                let elapsed = now.saturating_sub(timestamp);
                elapsed > 0 && elapsed as u64 > window
            }
        }
    }
}

impl From<Duration> for StaleTime {
    fn from(window: Duration) -> Self {
        Self::After(window)
    }
}

impl From<StaleTime> for i64 {
    fn from(stale_time: StaleTime) -> Self {
        match stale_time.as_millis() {
            None => NEVER_STALE,
            Some(millis) => i64::try_from(millis).unwrap_or(i64::MAX),
        }
    }
}

/// Raised when a persisted staleness value is neither `-1` nor non-negative.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid staleTime {0}: expected -1 or a non-negative number of milliseconds")]
pub struct InvalidStaleTime(pub i64);

impl TryFrom<i64> for StaleTime {
    type Error = InvalidStaleTime;

    fn try_from(millis: i64) -> Result<Self, Self::Error> {
        match millis {
            NEVER_STALE => Ok(Self::Never),
            m if m >= 0 => Ok(Self::from_millis(m as u64)),
            m => Err(InvalidStaleTime(m)),
        }
    }
}

/// A cached value together with its write time and staleness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord<T> {
    pub value: T,
    /// Write time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub stale_time: StaleTime,
}

impl<T> CacheRecord<T> {
    pub fn new(value: T, timestamp: i64, stale_time: StaleTime) -> Self {
        Self {
            value,
            timestamp,
            stale_time,
        }
    }

    /// Whether this record must be treated as absent at `now`.
    pub fn is_stale_at(&self, now: i64) -> bool {
        self.stale_time.is_stale(self.timestamp, now)
    }

    /// Consume the record and return the cached value.
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Serialize> CacheRecord<T> {
    /// Encode to the persisted JSON shape.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

impl<T: serde::de::DeserializeOwned> CacheRecord<T> {
    /// Decode from the persisted JSON shape.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
