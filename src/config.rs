//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatekeeperError, Result};

/// Prefix for environment variable overrides, e.g.
/// `GATEKEEPER__RATE_LIMITING__MAX_REQUESTS=50`.
const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Authentication gate configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Length of one counting window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per client per window; 0 disables limiting
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// How often expired windows are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Key clients by the left-most `X-Forwarded-For` entry instead of
    /// the peer address. Only enable behind a trusted proxy.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            sweep_interval_secs: default_sweep_interval(),
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitingConfig {
    /// The window length as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// The sweep period as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_window_ms() -> u64 {
    10 * 60 * 1000
}

fn default_max_requests() -> u64 {
    100
}

fn default_sweep_interval() -> u64 {
    60
}

/// Authentication gate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Tokens accepted by the bundled static-token authenticator
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl GatekeeperConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `GATEKEEPER__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config: GatekeeperConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.tokens")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.window_ms == 0 {
            return Err(GatekeeperError::Config(
                "rate_limiting.window_ms must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(GatekeeperError::Config(
                "rate_limiting.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Mutex, MutexGuard};
    use std::io::Write;

    /// Serializes tests that read or write `GATEKEEPER__*` variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Holds the env lock with every `GATEKEEPER__*` variable removed, then
    /// restores the previous values on drop.
    struct IsolatedEnv {
        saved: Vec<(String, String)>,
        _guard: MutexGuard<'static, ()>,
    }

    impl IsolatedEnv {
        fn new() -> Self {
            let guard = ENV_LOCK.lock();
            let prefix = format!("{ENV_PREFIX}__");
            let saved: Vec<(String, String)> = std::env::vars()
                .filter(|(name, _)| name.starts_with(&prefix))
                .collect();
            for (name, _) in &saved {
                std::env::remove_var(name);
            }
            Self {
                saved,
                _guard: guard,
            }
        }

        fn set(&self, name: &str, value: &str) {
            std::env::set_var(name, value);
        }
    }

    impl Drop for IsolatedEnv {
        fn drop(&mut self) {
            let prefix = format!("{ENV_PREFIX}__");
            let set: Vec<String> = std::env::vars()
                .map(|(name, _)| name)
                .filter(|name| name.starts_with(&prefix))
                .collect();
            for name in set {
                std::env::remove_var(name);
            }
            for (name, value) in &self.saved {
                std::env::set_var(name, value);
            }
        }
    }

    #[test]
    fn test_defaults_match_ten_minute_window() {
        let config = GatekeeperConfig::default();
        assert_eq!(config.rate_limiting.window_ms, 600_000);
        assert_eq!(config.rate_limiting.max_requests, 100);
        assert_eq!(config.rate_limiting.window(), Duration::from_secs(600));
        assert!(!config.rate_limiting.trust_forwarded_for);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
rate_limiting:
  max_requests: 5
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limiting.max_requests, 5);
        assert_eq!(config.rate_limiting.window_ms, 600_000);
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = r#"
rate_limiting:
  window_ms: 0
"#;
        let err = GatekeeperConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, GatekeeperError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let result = GatekeeperConfig::from_yaml("server: [not, a, map");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let _env = IsolatedEnv::new();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  http_addr: \"0.0.0.0:8088\"\nauth:\n  tokens: [\"abc\"]"
        )
        .unwrap();

        let config = tokio_test::assert_ok!(GatekeeperConfig::load(Some(file.path())));
        assert_eq!(config.server.http_addr.port(), 8088);
        assert_eq!(config.auth.tokens, vec!["abc".to_string()]);

        let config = GatekeeperConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.http_addr.port(), 8088);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let _env = IsolatedEnv::new();
        let config = GatekeeperConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_env_overrides_file_and_defaults() {
        let env = IsolatedEnv::new();
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "rate_limiting:\n  max_requests: 50\n  window_ms: 1000").unwrap();

        env.set("GATEKEEPER__RATE_LIMITING__MAX_REQUESTS", "7");
        env.set("GATEKEEPER__RATE_LIMITING__TRUST_FORWARDED_FOR", "true");
        env.set("GATEKEEPER__AUTH__TOKENS", "a,b");

        let config = GatekeeperConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.rate_limiting.max_requests, 7);
        assert_eq!(config.rate_limiting.window_ms, 1000);
        assert!(config.rate_limiting.trust_forwarded_for);
        assert_eq!(config.auth.tokens, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_env_override_is_validated() {
        let env = IsolatedEnv::new();
        env.set("GATEKEEPER__RATE_LIMITING__SWEEP_INTERVAL_SECS", "0");

        let err = GatekeeperConfig::load(None).unwrap_err();
        assert!(matches!(err, GatekeeperError::Config(_)));
    }
}
