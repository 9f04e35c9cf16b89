//! Environment-variable parsing helpers
//!
//! Both role configs are built once at startup from recognized env
//! keys and injected; nothing in the core reads the environment after
//! that.

use std::env;

use thiserror::Error;

/// Malformed or missing configuration; fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}: {detail}")]
    Invalid { key: String, detail: String },

    #[error("{0} is required")]
    Missing(String),

    #[error("PKI path error: {0}")]
    Pki(String),
}

/// Read an optional string key, treating empty values as unset.
pub fn env_str(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Read a boolean key; accepts true/false, 1/0, yes/no in any case.
pub fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = env_str(key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            key: key.to_string(),
            detail: format!("expected a boolean, got {:?}", other),
        }),
    }
}

/// Read a numeric key.
pub fn env_u16(key: &str, default: u16) -> Result<u16, ConfigError> {
    let Some(raw) = env_str(key) else {
        return Ok(default);
    };
    raw.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        detail: format!("expected a port number, got {:?}", raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        std::env::set_var("V2G_TEST_BOOL", "Yes");
        assert!(env_bool("V2G_TEST_BOOL", false).unwrap());
        std::env::set_var("V2G_TEST_BOOL", "0");
        assert!(!env_bool("V2G_TEST_BOOL", true).unwrap());
        std::env::set_var("V2G_TEST_BOOL", "maybe");
        assert!(env_bool("V2G_TEST_BOOL", false).is_err());
        std::env::remove_var("V2G_TEST_BOOL");
        assert!(env_bool("V2G_TEST_BOOL", true).unwrap());
    }
}
