//! SECC configuration from recognized environment keys

use std::path::PathBuf;

use v2g_core::config::{env_bool, env_str, env_u16, ConfigError};
use v2g_core::dialect::Dialect;
use v2g_core::messages::common::PaymentOption;

/// Immutable SECC settings, built once at startup and injected.
#[derive(Debug, Clone)]
pub struct SeccConfig {
    /// NIC bound for SDP and the HLC listeners
    pub iface: String,
    /// Refuse SDP requests that ask for plain TCP
    pub enforce_tls: bool,
    /// Use the simulator controller instead of a real one
    pub controller_sim: bool,
    /// Filesystem root of certificates and keys
    pub pki_path: PathBuf,
    /// Offered protocols, priority order
    pub supported_dialects: Vec<Dialect>,
    /// Offered payment options; PnC is withheld on plain-TCP sessions
    pub supported_auth_options: Vec<PaymentOption>,
    /// Whether energy transfer is free of charge
    pub free_charging_service: bool,
    /// Whether certificate installation is offered to the EV
    pub allow_cert_install_service: bool,
    /// Optional external session mirror
    pub redis: Option<RedisEndpoint>,
}

#[derive(Debug, Clone)]
pub struct RedisEndpoint {
    pub host: String,
    pub port: u16,
}

impl SeccConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let iface = env_str("NETWORK_INTERFACE").unwrap_or_else(|| "eth0".to_string());
        let enforce_tls = env_bool("SECC_ENFORCE_TLS", false)?;
        let controller_sim = env_bool("SECC_CONTROLLER_SIM", false)?;
        let pki_path = env_str("PKI_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("pki"));
        let free_charging_service = env_bool("FREE_CHARGING_SERVICE", false)?;
        let allow_cert_install_service = env_bool("ALLOW_CERT_INSTALL_SERVICE", true)?;

        let redis = env_str("REDIS_HOST").map(|host| {
            Ok::<_, ConfigError>(RedisEndpoint {
                host,
                port: env_u16("REDIS_PORT", 6379)?,
            })
        });
        let redis = match redis {
            Some(r) => Some(r?),
            None => None,
        };

        Ok(Self {
            iface,
            enforce_tls,
            controller_sim,
            pki_path,
            supported_dialects: vec![Dialect::Iso20, Dialect::Iso2],
            supported_auth_options: vec![PaymentOption::ExternalPayment, PaymentOption::Contract],
            free_charging_service,
            allow_cert_install_service,
            redis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_endpoint_needs_host_only() {
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_PORT");
        let config = SeccConfig::from_env().unwrap();
        assert!(config.redis.is_none());

        std::env::set_var("REDIS_HOST", "cache.local");
        let config = SeccConfig::from_env().unwrap();
        let redis = config.redis.unwrap();
        assert_eq!(redis.host, "cache.local");
        assert_eq!(redis.port, 6379);
        std::env::remove_var("REDIS_HOST");
    }
}
