//! Environment variable access for config builders.
//!
//! Builders read through an [`EnvSource`] so tests can supply a map instead
//! of mutating the process environment.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ConfigError;

/// Prefix for every wangchain-specific variable.
pub const ENV_PREFIX: &str = "WANGCHAIN_";

/// A variable lookup function.
pub struct EnvSource<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvSource<'a> {
    /// Wraps a lookup function.
    pub fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }

    /// Returns the trimmed value of `name`, treating empty as unset.
    pub fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Returns the value of `WANGCHAIN_<suffix>`.
    pub fn prefixed(&self, suffix: &str) -> Option<String> {
        self.get(&format!("{ENV_PREFIX}{suffix}"))
    }

    /// Parses `WANGCHAIN_<suffix>` into `T`.
    pub fn parse<T>(&self, suffix: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let var = format!("{ENV_PREFIX}{suffix}");
        self.get(&var)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::Env {
                    var: var.clone(),
                    message: format!("cannot parse '{raw}': {e}"),
                })
            })
            .transpose()
    }

    /// Parses `WANGCHAIN_<suffix>` as a boolean flag.
    pub fn flag(&self, suffix: &str) -> Result<Option<bool>, ConfigError> {
        let var = format!("{ENV_PREFIX}{suffix}");
        self.get(&var)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Env {
                    var: var.clone(),
                    message: format!("expected a boolean, got '{raw}'"),
                }),
            })
            .transpose()
    }
}

/// Reads from the real process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
