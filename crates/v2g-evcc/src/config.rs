//! EVCC configuration from recognized environment keys

use std::path::PathBuf;

use v2g_core::config::{env_bool, env_str, ConfigError};
use v2g_core::dialect::{namespace, AppProtocol};

/// Immutable EVCC settings, built once at startup and injected.
#[derive(Debug, Clone)]
pub struct EvccConfig {
    /// NIC bound for SDP and the HLC connection
    pub iface: String,
    /// Request TLS in the SDPRequest
    pub use_tls: bool,
    /// Reject any SECC endpoint that is not TLS
    pub enforce_tls: bool,
    /// Use the simulator controller instead of a real one
    pub controller_sim: bool,
    /// Filesystem root of certificates and keys
    pub pki_path: PathBuf,
    /// Protocols offered in SupportedAppProtocolReq, priority order
    pub supported_protocols: Vec<AppProtocol>,
}

impl EvccConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let iface = env_str("NETWORK_INTERFACE").unwrap_or_else(|| "eth0".to_string());
        let use_tls = env_bool("EVCC_USE_TLS", true)?;
        let enforce_tls = env_bool("EVCC_ENFORCE_TLS", false)?;
        if enforce_tls && !use_tls {
            return Err(ConfigError::Invalid {
                key: "EVCC_ENFORCE_TLS".to_string(),
                detail: "cannot enforce TLS while EVCC_USE_TLS is false".to_string(),
            });
        }
        let controller_sim = env_bool("EVCC_CONTROLLER_SIM", false)?;
        let pki_path = env_str("PKI_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("pki"));

        Ok(Self {
            iface,
            use_tls,
            enforce_tls,
            controller_sim,
            pki_path,
            supported_protocols: default_protocols(),
        })
    }
}

/// -20 preferred, -2 as fallback.
pub fn default_protocols() -> Vec<AppProtocol> {
    vec![
        AppProtocol {
            namespace: namespace::ISO_20_COMMON.to_string(),
            version_major: 1,
            version_minor: 0,
            schema_id: 1,
            priority: 1,
        },
        AppProtocol {
            namespace: namespace::ISO_2.to_string(),
            version_major: 2,
            version_minor: 0,
            schema_id: 2,
            priority: 2,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforce_without_use_is_rejected() {
        std::env::set_var("EVCC_USE_TLS", "false");
        std::env::set_var("EVCC_ENFORCE_TLS", "true");
        assert!(EvccConfig::from_env().is_err());
        std::env::remove_var("EVCC_USE_TLS");
        std::env::remove_var("EVCC_ENFORCE_TLS");
    }
}
