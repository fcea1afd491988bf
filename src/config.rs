//! Server configuration module
//! Handles the hub, heartbeat and rate limiting parameters of the server

use crate::constants::{
    DEFAULT_API_RATE, DEFAULT_AUTH_RATE, DEFAULT_HEARTBEAT_INTERVAL_SECS,
    DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS_PER_USER,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MESSAGING_RATE, DEFAULT_OUTBOUND_QUEUE_CAPACITY,
    DEFAULT_PORT, DEFAULT_RECLAIM_INTERVAL_SECS, DEFAULT_UPLOAD_RATE, DEFAULT_WRITE_TIMEOUT_SECS,
};
use crate::core::rate_limiter::EndpointClass;
use crate::error::{Result, RustyHubError};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Connection hub parameters, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum live connections per user before the oldest is evicted
    pub max_connections_per_user: usize,
    /// Period after which the writer sends a ping if nothing else went out
    pub heartbeat_interval: Duration,
    /// Read deadline; a peer silent for this long is considered dead
    pub heartbeat_timeout: Duration,
    /// Deadline applied to every transport write
    pub write_timeout: Duration,
    /// Capacity of each connection's outbound queue
    pub outbound_queue_capacity: usize,
    /// Largest inbound frame accepted on the socket
    pub max_frame_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: DEFAULT_MAX_CONNECTIONS_PER_USER,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_connections_per_user == 0 {
            return Err(RustyHubError::ConfigError(
                "max connections per user must be at least 1".to_string(),
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(RustyHubError::ConfigError(
                "outbound queue capacity must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() || self.write_timeout.is_zero() {
            return Err(RustyHubError::ConfigError(
                "heartbeat interval and write timeout must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(RustyHubError::ConfigError(format!(
                "heartbeat timeout ({:?}) must be longer than the heartbeat interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            )));
        }
        Ok(())
    }
}

/// Refill rate and burst capacity of one endpoint class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassLimit {
    /// Tokens added per second
    pub rate_per_sec: f64,
    /// Bucket capacity
    pub burst: u32,
}

impl ClassLimit {
    pub const fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self { rate_per_sec, burst }
    }
}

/// Per-class token bucket settings
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub auth: ClassLimit,
    pub api: ClassLimit,
    pub upload: ClassLimit,
    pub messaging: ClassLimit,
    /// How often idle buckets are swept
    pub reclaim_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            auth: ClassLimit::new(DEFAULT_AUTH_RATE.0, DEFAULT_AUTH_RATE.1),
            api: ClassLimit::new(DEFAULT_API_RATE.0, DEFAULT_API_RATE.1),
            upload: ClassLimit::new(DEFAULT_UPLOAD_RATE.0, DEFAULT_UPLOAD_RATE.1),
            messaging: ClassLimit::new(DEFAULT_MESSAGING_RATE.0, DEFAULT_MESSAGING_RATE.1),
            reclaim_interval: Duration::from_secs(DEFAULT_RECLAIM_INTERVAL_SECS),
        }
    }
}

impl RateLimitSettings {
    pub fn limit_for(&self, class: EndpointClass) -> ClassLimit {
        match class {
            EndpointClass::Auth => self.auth,
            EndpointClass::Api => self.api,
            EndpointClass::Upload => self.upload,
            EndpointClass::Messaging => self.messaging,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for class in EndpointClass::ALL {
            let limit = self.limit_for(class);
            if limit.burst == 0 {
                return Err(RustyHubError::ConfigError(format!(
                    "{} burst must be at least 1",
                    class
                )));
            }
            if !limit.rate_per_sec.is_finite() || limit.rate_per_sec <= 0.0 {
                return Err(RustyHubError::ConfigError(format!(
                    "{} rate must be a positive number of tokens per second",
                    class
                )));
            }
        }
        if self.reclaim_interval.is_zero() {
            return Err(RustyHubError::ConfigError(
                "rate limiter reclaim interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JWT secret used to validate session tokens
    pub jwt_secret: String,
    pub hub: HubConfig,
    pub rate_limits: RateLimitSettings,
    /// Development mode (relaxes nothing security related, only logging)
    pub development_mode: bool,
}

impl ServerConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            jwt_secret: "test-jwt-secret-only-for-unit-tests-never-use-in-production".to_string(),
            hub: HubConfig::default(),
            rate_limits: RateLimitSettings::default(),
            development_mode: true,
        }
    }

    /// Validate that a secret meets security requirements
    fn validate_secret(secret: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(RustyHubError::ConfigError(
                "JWT secret must be at least 32 characters long".to_string(),
            ));
        }

        // Check for insecure default or example values
        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "test-secret",
            "default",
            "secret",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.contains(pattern) {
                return Err(RustyHubError::ConfigError(format!(
                    "JWT secret contains insecure pattern '{}'. Please use a secure random secret generated with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RustyHubError::ConfigError(
                "JWT secret should contain mixed characters (letters, numbers, symbols) for security"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("RUSTY_HUB_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env_or("RUSTY_HUB_PORT", DEFAULT_PORT);

        let jwt_secret = env::var("RUSTY_HUB_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                RustyHubError::ConfigError(
                    "JWT_SECRET environment variable is required for security. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_secret(&jwt_secret)?;

        let hub = HubConfig {
            max_connections_per_user: env_or(
                "RUSTY_HUB_MAX_CONN_PER_USER",
                DEFAULT_MAX_CONNECTIONS_PER_USER,
            ),
            heartbeat_interval: Duration::from_secs(env_or(
                "RUSTY_HUB_HEARTBEAT_INTERVAL",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            )),
            heartbeat_timeout: Duration::from_secs(env_or(
                "RUSTY_HUB_HEARTBEAT_TIMEOUT",
                DEFAULT_HEARTBEAT_TIMEOUT_SECS,
            )),
            write_timeout: Duration::from_secs(env_or(
                "RUSTY_HUB_WRITE_TIMEOUT",
                DEFAULT_WRITE_TIMEOUT_SECS,
            )),
            outbound_queue_capacity: env_or(
                "RUSTY_HUB_QUEUE_CAPACITY",
                DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            ),
            max_frame_size: env_or("RUSTY_HUB_MAX_FRAME_SIZE", DEFAULT_MAX_FRAME_SIZE),
        };
        hub.validate()?;

        let rate_limits = RateLimitSettings {
            auth: class_limit_from_env("AUTH", DEFAULT_AUTH_RATE),
            api: class_limit_from_env("API", DEFAULT_API_RATE),
            upload: class_limit_from_env("UPLOAD", DEFAULT_UPLOAD_RATE),
            messaging: class_limit_from_env("MESSAGING", DEFAULT_MESSAGING_RATE),
            reclaim_interval: Duration::from_secs(env_or(
                "RUSTY_HUB_RATE_RECLAIM_INTERVAL",
                DEFAULT_RECLAIM_INTERVAL_SECS,
            )),
        };
        rate_limits.validate()?;

        let development_mode = env::var("RUSTY_HUB_DEVELOPMENT_MODE")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            host,
            port,
            jwt_secret,
            hub,
            rate_limits,
            development_mode,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn class_limit_from_env(class: &str, default: (f64, u32)) -> ClassLimit {
    ClassLimit::new(
        env_or(&format!("RUSTY_HUB_RATE_{}_PER_SEC", class), default.0),
        env_or(&format!("RUSTY_HUB_RATE_{}_BURST", class), default.1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_testing_works_in_tests() {
        let config = ServerConfig::for_testing();
        assert!(config.jwt_secret.contains("test"));
        assert!(config.development_mode);
        assert!(config.hub.validate().is_ok());
        assert!(config.rate_limits.validate().is_ok());
    }

    #[test]
    fn test_from_env_requires_secret() {
        env::remove_var("RUSTY_HUB_JWT_SECRET");
        env::remove_var("JWT_SECRET");

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_weak_secrets_rejected() {
        assert!(ServerConfig::validate_secret("short").is_err());
        assert!(ServerConfig::validate_secret("my-super-secret-value-that-is-long-enough").is_err());
        assert!(ServerConfig::validate_secret("abcdefghijklmnopqrstuvwxyzabcdefgh").is_err());
        assert!(ServerConfig::validate_secret("Zq7!vR2#pL9@xW4$kT1%mN8^bC3&hJ6*").is_ok());
    }

    #[test]
    fn test_hub_config_rejects_inverted_heartbeat() {
        let config = HubConfig {
            heartbeat_interval: Duration::from_secs(60),
            heartbeat_timeout: Duration::from_secs(30),
            ..HubConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hub_config_rejects_zero_cap_and_queue() {
        let zero_cap = HubConfig {
            max_connections_per_user: 0,
            ..HubConfig::default()
        };
        assert!(zero_cap.validate().is_err());

        let zero_queue = HubConfig {
            outbound_queue_capacity: 0,
            ..HubConfig::default()
        };
        assert!(zero_queue.validate().is_err());
    }

    #[test]
    fn test_rate_limit_settings_per_class() {
        let settings = RateLimitSettings::default();
        assert_eq!(settings.limit_for(EndpointClass::Auth).burst, DEFAULT_AUTH_RATE.1);
        assert!(
            settings.limit_for(EndpointClass::Auth).rate_per_sec
                < settings.limit_for(EndpointClass::Api).rate_per_sec
        );

        let broken = RateLimitSettings {
            upload: ClassLimit::new(0.0, 10),
            ..RateLimitSettings::default()
        };
        assert!(broken.validate().is_err());
    }
}
