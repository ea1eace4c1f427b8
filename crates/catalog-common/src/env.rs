//! Typed environment variable lookups
//!
//! Unset variables fall back to a default; set but unparsable values are
//! reported instead of being silently replaced.

use std::str::FromStr;

use crate::error::{CatalogError, Result};

/// Read `key` and parse it, returning `default` when the variable is unset
pub fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

/// Read `key` and parse it, failing when the variable is unset
pub fn required<T>(key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).map_err(|_| CatalogError::Missing(key.to_string()))?;
    parse_value(key, &raw)
}

/// Parse a raw setting value, attributing failures to `key`
pub fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| CatalogError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
