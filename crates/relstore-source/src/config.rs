//! Source configuration.
//!
//! Read from environment variables, falling back to defaults:
//! - `RELSTORE_DB_PATH`: SQLite database file path (default: "relstore.db")
//! - `RELSTORE_RAISE_NOT_FOUND`: default for `raiseNotFoundExceptions`
//! - `RELSTORE_FULL_RESPONSE`: default for `fullResponse`

use serde::{Deserialize, Serialize};

use relstore_core::TransformOptions;

/// Settings for a [`Source`](crate::Source).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub db_path: String,
    /// Default for transforms that do not set `raiseNotFoundExceptions`.
    pub raise_not_found_exceptions: bool,
    /// Default for transforms that do not set `fullResponse`.
    pub full_response: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            db_path: "relstore.db".to_string(),
            raise_not_found_exceptions: false,
            full_response: false,
        }
    }
}

impl SourceConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        SourceConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, one variable at a time.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SourceConfig::default();
        SourceConfig {
            db_path: lookup("RELSTORE_DB_PATH").unwrap_or(defaults.db_path),
            raise_not_found_exceptions: lookup("RELSTORE_RAISE_NOT_FOUND")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.raise_not_found_exceptions),
            full_response: lookup("RELSTORE_FULL_RESPONSE")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.full_response),
        }
    }

    /// Transform options every update starts from.
    pub fn default_options(&self) -> TransformOptions {
        TransformOptions::new()
            .with_raise_not_found_exceptions(self.raise_not_found_exceptions)
            .with_full_response(self.full_response)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_without_environment() {
        let config = SourceConfig::from_lookup(|_| None);
        assert_eq!(config, SourceConfig::default());
        assert!(!config.default_options().raises_not_found());
    }

    #[test]
    fn reads_every_variable() {
        let env: HashMap<&str, &str> = [
            ("RELSTORE_DB_PATH", "/tmp/x.db"),
            ("RELSTORE_RAISE_NOT_FOUND", "true"),
            ("RELSTORE_FULL_RESPONSE", "0"),
        ]
        .into_iter()
        .collect();
        let config = SourceConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.db_path, "/tmp/x.db");
        assert!(config.raise_not_found_exceptions);
        assert!(!config.full_response);
    }

    #[test]
    fn caller_options_win_over_config() {
        let config = SourceConfig {
            full_response: true,
            ..SourceConfig::default()
        };
        let options = TransformOptions::new()
            .with_full_response(false)
            .layered_over(&config.default_options());
        assert!(!options.wants_full_response());
    }
}
