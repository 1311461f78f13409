//! Environment overrides for runtime settings.
//!
//! ```ignore
//! use jaycore::env::{env_get, env_millis};
//!
//! let cap: usize = env_get("JAYCORE_MAX_CONNECTIONS", 1024);
//! let poll = env_millis("JAYCORE_POLL_TIMEOUT_MS", Duration::from_millis(100));
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parses `key` as `T`, falling back to `default` when unset or malformed.
#[inline]
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    env_get_opt(key).unwrap_or(default)
}

/// Parses `key` as `T`. `None` when unset or malformed.
#[inline]
pub fn env_get_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Reads `key` verbatim, falling back to `default`.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// A duration given in milliseconds.
pub fn env_millis(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key).map_or(default, Duration::from_millis)
}

/// A duration given in microseconds.
pub fn env_micros(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key).map_or(default, Duration::from_micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_falls_back() {
        let val: usize = env_get("__JAYCORE_TEST_UNSET__", 42);
        assert_eq!(val, 42);
        assert_eq!(env_get_opt::<u16>("__JAYCORE_TEST_UNSET__"), None);
        assert_eq!(env_get_str("__JAYCORE_TEST_UNSET__", "x"), "x");
        assert_eq!(
            env_millis("__JAYCORE_TEST_UNSET__", Duration::from_millis(7)),
            Duration::from_millis(7)
        );
    }

    #[test]
    fn set_values_parse() {
        unsafe {
            std::env::set_var("__JAYCORE_TEST_NUM__", " 250 ");
            std::env::set_var("__JAYCORE_TEST_BAD__", "lots");
        }
        assert_eq!(env_get("__JAYCORE_TEST_NUM__", 0u32), 250);
        assert_eq!(env_millis("__JAYCORE_TEST_NUM__", Duration::ZERO), Duration::from_millis(250));
        assert_eq!(env_micros("__JAYCORE_TEST_NUM__", Duration::ZERO), Duration::from_micros(250));
        assert_eq!(env_get("__JAYCORE_TEST_BAD__", 9u32), 9);
        unsafe {
            std::env::remove_var("__JAYCORE_TEST_NUM__");
            std::env::remove_var("__JAYCORE_TEST_BAD__");
        }
    }
}
