//! Server configuration

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port (API + WebSocket endpoints)
    pub http_port: u16,
    /// Path to the redb database file
    pub data_path: String,
    /// HMAC key for entry digests and verification tokens
    pub chain_secret: String,
    /// Session lifetime in minutes
    pub session_ttl_minutes: i64,
    /// Per-index retention bound (entries kept per subject and globally)
    pub retention_limit: usize,
    /// Seconds between WebSocket heartbeats
    pub heartbeat_interval_secs: u64,
    /// Ledger gateway base URL; unset disables anchoring
    pub ledger_endpoint: Option<String>,
    /// Environment: development | staging | production
    pub environment: String,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8001),
            data_path: std::env::var("DATA_PATH").unwrap_or_else(|_| "data/chainlog.redb".into()),
            chain_secret: Self::require_secret("CHAIN_SECRET", &environment)?,
            session_ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            retention_limit: std::env::var("RETENTION_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            heartbeat_interval_secs: std::env::var("HEARTBEAT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            ledger_endpoint: std::env::var("LEDGER_ENDPOINT")
                .ok()
                .filter(|s| !s.is_empty()),
            environment,
        })
    }
}
