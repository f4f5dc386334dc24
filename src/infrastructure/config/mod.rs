use serde::{Deserialize, Serialize};
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

/// Runtime mode for the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    #[serde(alias = "local", alias = "dev")]
    Development,
    #[serde(alias = "prod")]
    Production,
}

impl RuntimeMode {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(format!("Invalid runtime mode: {s}. Valid values: development, production")),
        }
    }
}

/// Gateway configuration, built once at start-up and shared by `Arc`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub auth: AuthConfig,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Base URL of the dashboard frontend; allowed requests are proxied here
    pub upstream_url: Option<String>,
    pub max_upload_size: u64, // bytes
}

/// Security toggles and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct SecurityConfig {
    /// Turns off both the generic validator and the XSS detector
    pub disable_security_monitoring: bool,
    pub bypass_rate_limit: bool,
    pub bypass_xss_detection: bool,
    pub bypass_https_check: bool,
    /// Enforce the HTTPS cookie transport check outside production
    pub force_secure_cookies: bool,
    /// Honor `X-Forwarded-Proto` when deciding whether a request came in over HTTPS
    pub trust_forwarded_proto: bool,
    pub max_body_bytes: u64,
    /// Minimum gap between two requests from one client; 0 disables the check
    pub rapid_request_threshold_ms: u64,
    pub slow_request_threshold_ms: u64,
    /// Reject clients that keep tripping the other checks
    pub block_repeat_offenders: bool,
}

/// Session handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub login_path: String,
    pub max_session_age_secs: u64,
    pub verify_signatures: bool,
    pub jwt_secret: Option<String>,
}

/// External monitoring endpoint for production security events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl AppConfig {
    /// Load configuration based on runtime mode
    ///
    /// # Errors
    /// Returns an error if environment variables are present but invalid
    pub fn load() -> Result<Self, config::ConfigError> {
        // Detect runtime mode from environment (default: development)
        let mode = std::env::var("RUN_MODE")
            .unwrap_or_else(|_| "development".to_string())
            .parse::<RuntimeMode>()
            .map_err(config::ConfigError::Message)?;

        Self::load_for_mode(mode)
    }

    /// Load configuration for a specific runtime mode
    ///
    /// # Errors
    /// Returns an error if environment variables are present but invalid
    pub fn load_for_mode(mode: RuntimeMode) -> Result<Self, config::ConfigError> {
        let log_format = match mode {
            RuntimeMode::Development => "pretty",
            RuntimeMode::Production => "json",
        };

        let settings = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("EDGE_GATEWAY").separator("__").try_parsing(true),
            )
            .set_default("mode", mode.to_string())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("server.upstream_url", None::<String>)?
            .set_default("server.max_upload_size", 50_000_000)? // 50MB
            .set_default("security.disable_security_monitoring", false)?
            .set_default("security.bypass_rate_limit", false)?
            .set_default("security.bypass_xss_detection", false)?
            .set_default("security.bypass_https_check", false)?
            .set_default("security.force_secure_cookies", false)?
            .set_default("security.trust_forwarded_proto", true)?
            .set_default("security.max_body_bytes", 10 * 1024 * 1024)?
            .set_default("security.rapid_request_threshold_ms", 100)?
            .set_default("security.slow_request_threshold_ms", 1000)?
            .set_default("security.block_repeat_offenders", true)?
            .set_default("auth.login_path", "/login")?
            .set_default("auth.max_session_age_secs", 24 * 60 * 60)?
            .set_default("auth.verify_signatures", false)?
            .set_default("auth.jwt_secret", None::<String>)?
            .set_default("monitoring.endpoint", None::<String>)?
            .set_default("monitoring.timeout_ms", 2000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", log_format)?
            .build()?;

        settings.try_deserialize()
    }

    /// Configuration with every default applied for the given mode, ignoring the environment
    pub fn defaults_for(mode: RuntimeMode) -> Self {
        Self {
            mode,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                request_timeout_secs: 30,
                upstream_url: None,
                max_upload_size: 50_000_000,
            },
            security: SecurityConfig::default(),
            auth: AuthConfig {
                login_path: "/login".to_string(),
                max_session_age_secs: 24 * 60 * 60,
                verify_signatures: false,
                jwt_secret: None,
            },
            monitoring: MonitoringConfig { endpoint: None, timeout_ms: 2000 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: match mode {
                    RuntimeMode::Development => LogFormat::Pretty,
                    RuntimeMode::Production => LogFormat::Json,
                },
            },
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            disable_security_monitoring: false,
            bypass_rate_limit: false,
            bypass_xss_detection: false,
            bypass_https_check: false,
            force_secure_cookies: false,
            trust_forwarded_proto: true,
            max_body_bytes: 10 * 1024 * 1024,
            rapid_request_threshold_ms: 100,
            slow_request_threshold_ms: 1000,
            block_repeat_offenders: true,
        }
    }
}

impl SecurityConfig {
    pub fn rapid_request_threshold(&self) -> Duration {
        Duration::from_millis(self.rapid_request_threshold_ms)
    }

    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_threshold_ms)
    }
}

impl ServerConfig {
    /// Get the socket address for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl MonitoringConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
