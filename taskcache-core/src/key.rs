//! Cache key type.
//!
//! A [`CacheKey`] is a non-empty string identifying one cache entry. Keys are
//! validated once, at construction, so every cache and store operation that
//! receives a `CacheKey` can assume it is well formed.
//!
//! ```
//! use taskcache_core::{CacheKey, KeyError};
//!
//! let key = CacheKey::new("user:42").unwrap();
//! assert_eq!(key.as_str(), "user:42");
//!
//! assert_eq!(CacheKey::new(""), Err(KeyError::Empty));
//! ```
//!
//! [`CacheKey`] wraps a [`SmolStr`], so short keys (≤23 bytes) are stored
//! inline and cloning a long key only bumps a reference count.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;
use thiserror::Error;

/// Error returned when a string cannot be used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key was empty.
    #[error("cache key must not be empty")]
    Empty,
}

/// Key of a single cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Creates a key, rejecting the empty string.
    pub fn new(key: impl Into<SmolStr>) -> Result<Self, KeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(key))
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for CacheKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheKey> for SmolStr {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
