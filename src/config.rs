/// Configuration management for the Reprompt backend
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub llm: LlmConfig,
    pub credits: CreditsConfig,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Account id(s) allowed to use the admin credit top-up endpoint
    /// (comma-separated in the environment)
    pub admin_ids: Vec<String>,
}

/// Completion provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Anonymous credit pool bounds. The credit allowances themselves
/// (anonymous, daily, signup bonus, per-mode costs) are fixed constants in
/// the credits module and intentionally not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Maximum number of tracked anonymous callers before the oldest
    /// entry is evicted
    pub anonymous_max_entries: usize,
    /// Seconds of inactivity after which an anonymous entry may be pruned
    pub anonymous_idle_expiry_secs: u64,
    /// Days of prompt history kept before the retention sweep deletes rows
    pub history_retention_days: i64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub authenticated_rps: u32,
    pub unauthenticated_rps: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("REPROMPT_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("REPROMPT_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ApiError::Validation("Invalid port number".to_string()))?;
        let version = env::var("REPROMPT_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("REPROMPT_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("REPROMPT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("reprompt.sqlite"));

        let jwt_secret = env::var("REPROMPT_JWT_SECRET")
            .map_err(|_| ApiError::Validation("JWT secret required".to_string()))?;

        // Parse admin account ids from comma-separated list
        let admin_ids = env::var("REPROMPT_ADMIN_IDS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let llm_api_url = env::var("REPROMPT_LLM_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
        let llm_api_key = env::var("REPROMPT_LLM_API_KEY")
            .map_err(|_| ApiError::Validation("LLM API key required".to_string()))?;
        let llm_model = env::var("REPROMPT_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let llm_temperature = env::var("REPROMPT_LLM_TEMPERATURE")
            .unwrap_or_else(|_| "0.7".to_string())
            .parse()
            .unwrap_or(0.7);
        let llm_max_tokens = env::var("REPROMPT_LLM_MAX_TOKENS")
            .unwrap_or_else(|_| "1024".to_string())
            .parse()
            .unwrap_or(1024);

        let anonymous_max_entries = env::var("REPROMPT_ANON_POOL_MAX_ENTRIES")
            .unwrap_or_else(|_| "100000".to_string())
            .parse()
            .unwrap_or(100_000);
        let anonymous_idle_expiry_secs = env::var("REPROMPT_ANON_POOL_IDLE_EXPIRY_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .unwrap_or(86_400);
        let history_retention_days = env::var("REPROMPT_HISTORY_RETENTION_DAYS")
            .unwrap_or_else(|_| "90".to_string())
            .parse()
            .unwrap_or(90);

        let rate_limit_enabled = env::var("REPROMPT_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let authenticated_rps = env::var("REPROMPT_RATE_LIMIT_AUTHENTICATED_RPS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);
        let unauthenticated_rps = env::var("REPROMPT_RATE_LIMIT_UNAUTHENTICATED_RPS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let burst_size = env::var("REPROMPT_RATE_LIMIT_BURST_SIZE")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                admin_ids,
            },
            llm: LlmConfig {
                api_url: llm_api_url,
                api_key: llm_api_key,
                model: llm_model,
                temperature: llm_temperature,
                max_tokens: llm_max_tokens,
            },
            credits: CreditsConfig {
                anonymous_max_entries,
                anonymous_idle_expiry_secs,
                history_retention_days,
            },
            rate_limit: RateLimitSettings {
                enabled: rate_limit_enabled,
                authenticated_rps,
                unauthenticated_rps,
                burst_size,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ApiError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(ApiError::Validation("LLM API key cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8080,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                data_directory: "./data".into(),
                database: "./data/reprompt.sqlite".into(),
            },
            authentication: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                admin_ids: vec![],
            },
            llm: LlmConfig {
                api_url: "https://api.openai.com/v1/chat/completions".to_string(),
                api_key: "test-key".to_string(),
                model: "gpt-4o-mini".to_string(),
                temperature: 0.7,
                max_tokens: 1024,
            },
            credits: CreditsConfig {
                anonymous_max_entries: 100_000,
                anonymous_idle_expiry_secs: 86_400,
                history_retention_days: 90,
            },
            rate_limit: RateLimitSettings {
                enabled: true,
                authenticated_rps: 50,
                unauthenticated_rps: 10,
                burst_size: 20,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_jwt_secret() {
        let mut config = test_config();
        config.authentication.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_hostname() {
        let mut config = test_config();
        config.service.hostname = String::new();
        assert!(config.validate().is_err());
    }
}
