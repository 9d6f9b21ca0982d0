//! Per-entry expiration policy.
//!
//! [`EntryOptions`] is the policy a caller attaches to a get-or-create call.
//! It is applied only when the call actually inserts a new entry; joining an
//! existing entry never changes that entry's policy.
//!
//! ```
//! use std::time::Duration;
//! use taskcache_core::EntryOptions;
//!
//! let options = EntryOptions::new()
//!     .time_to_live(Duration::from_secs(60))
//!     .sliding_expiration(Duration::from_secs(10));
//! assert!(options.validate().is_ok());
//! ```
//!
//! Options deserialize from configuration with human readable durations:
//!
//! ```
//! use std::time::Duration;
//! use taskcache_core::EntryOptions;
//!
//! let options: EntryOptions =
//!     serde_json::from_str(r#"{ "time_to_live": "5m", "expire_on_completion": true }"#).unwrap();
//! assert_eq!(options.time_to_live, Some(Duration::from_secs(300)));
//! assert!(options.expire_on_completion);
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned by [`EntryOptions::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// A relative duration was zero.
    #[error("{field} must be a positive duration")]
    ZeroDuration {
        /// Name of the offending option.
        field: &'static str,
    },
}

/// Expiration policy of a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOptions {
    /// Wall-clock instant after which the entry expires.
    #[serde(default)]
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Lifetime of the entry counted from its insertion (e.g. "30s", "5m").
    #[serde(default, with = "humantime_serde")]
    pub time_to_live: Option<Duration>,
    /// How long the entry may stay unread before it expires.
    ///
    /// Never extends the lifetime past the absolute expiration.
    #[serde(default, with = "humantime_serde")]
    pub sliding_expiration: Option<Duration>,
    /// Evict the entry as soon as its computation finishes, successfully or not.
    #[serde(default)]
    pub expire_on_completion: bool,
}

impl EntryOptions {
    /// Options without any expiration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the wall-clock expiration instant.
    pub fn absolute_expiration(self, at: DateTime<Utc>) -> Self {
        Self {
            absolute_expiration: Some(at),
            ..self
        }
    }

    /// Sets the lifetime relative to insertion.
    pub fn time_to_live(self, ttl: Duration) -> Self {
        Self {
            time_to_live: Some(ttl),
            ..self
        }
    }

    /// Sets the idle timeout.
    pub fn sliding_expiration(self, idle: Duration) -> Self {
        Self {
            sliding_expiration: Some(idle),
            ..self
        }
    }

    /// Enables or disables eviction on completion.
    pub fn expire_on_completion(self, enabled: bool) -> Self {
        Self {
            expire_on_completion: enabled,
            ..self
        }
    }

    /// Checks that relative durations are positive.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.time_to_live.is_some_and(|ttl| ttl.is_zero()) {
            return Err(OptionsError::ZeroDuration {
                field: "time_to_live",
            });
        }
        if self.sliding_expiration.is_some_and(|idle| idle.is_zero()) {
            return Err(OptionsError::ZeroDuration {
                field: "sliding_expiration",
            });
        }
        Ok(())
    }

    /// Resolves the policy into store-level durations as of `now`.
    ///
    /// An absolute expiration already in the past resolves to a zero lifetime.
    pub fn expiration(&self, now: DateTime<Utc>) -> Expiration {
        let until_deadline = self
            .absolute_expiration
            .map(|deadline| (deadline - now).to_std().unwrap_or(Duration::ZERO));
        let time_to_live = match (until_deadline, self.time_to_live) {
            (Some(deadline), Some(ttl)) => Some(deadline.min(ttl)),
            (deadline, ttl) => deadline.or(ttl),
        };
        Expiration {
            time_to_live,
            time_to_idle: self.sliding_expiration,
        }
    }
}

/// Expiration of a single store entry, relative to its insertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expiration {
    /// Lifetime counted from insertion.
    pub time_to_live: Option<Duration>,
    /// Idle timeout counted from the last read.
    pub time_to_idle: Option<Duration>,
}

impl Expiration {
    /// Entry never expires on its own.
    pub const NEVER: Self = Self {
        time_to_live: None,
        time_to_idle: None,
    };

    /// Returns `true` if neither a lifetime nor an idle timeout is set.
    pub fn is_never(&self) -> bool {
        self.time_to_live.is_none() && self.time_to_idle.is_none()
    }

    /// Time until expiry of an entry that was just inserted or read.
    ///
    /// `remaining_ttl` is what is left of the lifetime at that moment.
    pub fn next_expiry(&self, remaining_ttl: Option<Duration>) -> Option<Duration> {
        match (remaining_ttl, self.time_to_idle) {
            (Some(ttl), Some(idle)) => Some(ttl.min(idle)),
            (ttl, idle) => ttl.or(idle),
        }
    }
}
