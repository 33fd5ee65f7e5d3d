//! Application configuration

use std::env;

/// Which conversation store backs the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub frontend_url: String, // CORS origin of the salon web app

    // Database
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Room access
    pub access_secret: String,
    pub staff_token: String,
    pub enforce_room_access: bool,

    // AI suggestions
    pub ai_suggestions_url: Option<String>,
    pub ai_suggestions_api_key: Option<String>,
    pub ai_suggestions_timeout_ms: u64,

    // Logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = match env::var("SUPPORT_STORE")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            _ => {
                return Err(ConfigError::Invalid(
                    "SUPPORT_STORE must be either 'postgres' or 'memory'",
                ))
            }
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let enforce_room_access = env::var("SUPPORT_ENFORCE_ROOM_ACCESS")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            // Database
            store_backend,
            database_url,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Room access
            access_secret: {
                let secret = env::var("SUPPORT_ACCESS_SECRET")
                    .map_err(|_| ConfigError::Missing("SUPPORT_ACCESS_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SUPPORT_ACCESS_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            staff_token: {
                let token = env::var("SUPPORT_STAFF_TOKEN").unwrap_or_default();
                if enforce_room_access && token.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SUPPORT_STAFF_TOKEN must be at least 32 characters when room access is enforced",
                    ));
                }
                token
            },
            enforce_room_access,

            // AI suggestions
            ai_suggestions_url: env::var("AI_SUGGESTIONS_URL").ok().filter(|u| !u.is_empty()),
            ai_suggestions_api_key: env::var("AI_SUGGESTIONS_API_KEY").ok().filter(|k| !k.is_empty()),
            ai_suggestions_timeout_ms: env::var("AI_SUGGESTIONS_TIMEOUT_MS")
                .unwrap_or_else(|_| "15000".to_string())
                .parse()
                .unwrap_or(15000),

            // Logging
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
impl Config {
    /// In-memory configuration for router and socket tests
    pub(crate) fn for_tests(enforce_room_access: bool) -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            frontend_url: "http://localhost:5173".into(),
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 5,
            access_secret: "test-access-secret-must-be-at-least-32-characters".into(),
            staff_token: "test-staff-token-must-be-at-least-32-characters".into(),
            enforce_room_access,
            ai_suggestions_url: None,
            ai_suggestions_api_key: None,
            ai_suggestions_timeout_ms: 2000,
            log_json: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: &[&str] = &[
        "SUPPORT_STORE",
        "DATABASE_URL",
        "SUPPORT_ACCESS_SECRET",
        "SUPPORT_STAFF_TOKEN",
        "SUPPORT_ENFORCE_ROOM_ACCESS",
        "AI_SUGGESTIONS_URL",
        "LOG_FORMAT",
    ];

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        cleanup_config();
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "SUPPORT_ACCESS_SECRET",
            "test-access-secret-must-be-at-least-32-characters",
        );
        env::set_var(
            "SUPPORT_STAFF_TOKEN",
            "test-staff-token-must-be-at-least-32-characters",
        );
    }

    fn cleanup_config() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_minimal_config_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
        assert!(config.enforce_room_access);
        assert!(config.ai_suggestions_url.is_none());
        assert_eq!(config.ai_suggestions_timeout_ms, 15000);
        assert!(!config.log_json);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_postgres_requires_database_url() {
        setup_minimal_config();
        env::remove_var("DATABASE_URL");

        match Config::from_env() {
            Err(ConfigError::Missing("DATABASE_URL")) => {}
            other => panic!("Expected Missing(DATABASE_URL), got: {:?}", other),
        }

        // The memory store runs without a database
        env::set_var("SUPPORT_STORE", "memory");
        let config = Config::from_env().unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.database_url.is_none());

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_secret_strength_validation() {
        setup_minimal_config();

        env::set_var("SUPPORT_ACCESS_SECRET", "short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        env::set_var(
            "SUPPORT_ACCESS_SECRET",
            "test-access-secret-must-be-at-least-32-characters",
        );
        env::set_var("SUPPORT_STAFF_TOKEN", "short");
        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        // Staff token strength only matters while access is enforced
        env::set_var("SUPPORT_ENFORCE_ROOM_ACCESS", "false");
        let config = Config::from_env().unwrap();
        assert!(!config.enforce_room_access);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_unknown_store_backend_rejected() {
        setup_minimal_config();
        env::set_var("SUPPORT_STORE", "sqlite");

        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
