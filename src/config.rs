//! Configuration Module
//!
//! Handles construction options for a cache container, with defaults and
//! loading from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Default capacity of a bounded (LRU) container.
pub const DEFAULT_CAPACITY: usize = 512;

// == Eviction Mode ==
/// How the container bounds its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionMode {
    /// Entries stay until removed or purged
    #[default]
    None,
    /// Least recently used entries are evicted once `capacity` is exceeded
    Lru,
}

impl FromStr for EvictionMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(EvictionMode::None),
            "lru" => Ok(EvictionMode::Lru),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EvictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionMode::None => f.write_str("none"),
            EvictionMode::Lru => f.write_str("lru"),
        }
    }
}

/// Cache container configuration.
///
/// The key codec is not part of this struct since it is typed over the
/// loader's parameters; set it through [`CacheBuilder`](crate::CacheBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum resident keys under LRU eviction, 0 = unbounded
    pub capacity: usize,
    /// Eviction strategy
    pub eviction: EvictionMode,
    /// Allow callers to abandon cold waits with a cancellation token
    pub cancellation_support: bool,
    /// Expiry applied after an ordinary load error, None = the cache ttl
    pub error_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `LCACHE_CAPACITY` - Bounded capacity (default: 512)
    /// - `LCACHE_EVICTION` - `none` or `lru` (default: none)
    /// - `LCACHE_CANCELLATION_SUPPORT` - `true`/`false`/`1`/`0` (default: false)
    /// - `LCACHE_ERROR_TTL_MS` - Error expiry in milliseconds (default: unset)
    ///
    /// Unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    pub(crate) fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            capacity: var("LCACHE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capacity),
            eviction: var("LCACHE_EVICTION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.eviction),
            cancellation_support: var("LCACHE_CANCELLATION_SUPPORT")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.cancellation_support),
            error_ttl: var("LCACHE_ERROR_TTL_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .or(defaults.error_ttl),
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.error_ttl == Some(Duration::ZERO) {
            return Err(CacheError::InvalidConfig(
                "error_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Capacity enforced on the index, None when nothing is evicted.
    pub fn effective_capacity(&self) -> Option<usize> {
        match self.eviction {
            EvictionMode::Lru if self.capacity > 0 => Some(self.capacity),
            _ => None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            eviction: EvictionMode::None,
            cancellation_support: false,
            error_ttl: None,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
