//! Client session configuration

use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::error::{ClientError, ClientResult};

/// Which side of the conversation this client speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientRole {
    /// Customer chat widget
    Customer,
    /// Staff support console
    Staff,
}

impl ClientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientRole::Customer => "customer",
            ClientRole::Staff => "staff",
        }
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the relay, e.g. `ws://localhost:3000/ws`
    pub url: String,
    /// REST base, e.g. `http://localhost:3000/api/v1`
    pub api_url: String,
    pub role: ClientRole,
    /// Staff token for staff sessions
    pub token: Option<String>,

    pub connect_timeout: Duration,
    pub reconnection_attempts: usize,
    pub reconnection_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000/ws".to_string(),
            api_url: "http://localhost:3000/api/v1".to_string(),
            role: ClientRole::Customer,
            token: None,
            connect_timeout: Duration::from_secs(10),
            reconnection_attempts: 5,
            reconnection_delay: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let role = match env::var("SUPPORT_CLIENT_ROLE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "staff" => ClientRole::Staff,
            _ => ClientRole::Customer,
        };

        Self {
            url: env::var("SUPPORT_WS_URL").unwrap_or(defaults.url),
            api_url: env::var("SUPPORT_API_URL").unwrap_or(defaults.api_url),
            role,
            token: env::var("SUPPORT_STAFF_TOKEN").ok().filter(|t| !t.is_empty()),
            connect_timeout: env::var("SUPPORT_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.connect_timeout),
            reconnection_attempts: env::var("SUPPORT_RECONNECT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reconnection_attempts),
            reconnection_delay: env::var("SUPPORT_RECONNECT_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnection_delay),
        }
    }

    /// Socket URL with the session role and token as query parameters
    pub fn endpoint(&self) -> ClientResult<Url> {
        let mut params = vec![("role", self.role.as_str())];
        if let Some(token) = &self.token {
            params.push(("token", token.as_str()));
        }
        Url::parse_with_params(&self.url, &params)
            .map_err(|e| ClientError::Transport(format!("invalid socket url: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ALL_VARS: &[&str] = &[
        "SUPPORT_WS_URL",
        "SUPPORT_API_URL",
        "SUPPORT_CLIENT_ROLE",
        "SUPPORT_STAFF_TOKEN",
        "SUPPORT_CONNECT_TIMEOUT_MS",
        "SUPPORT_RECONNECT_ATTEMPTS",
        "SUPPORT_RECONNECT_DELAY_MS",
    ];

    fn cleanup() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        cleanup();
        let config = ClientConfig::from_env();

        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnection_attempts, 5);
        assert_eq!(config.reconnection_delay, Duration::from_secs(1));
        assert_eq!(config.role, ClientRole::Customer);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        cleanup();
        env::set_var("SUPPORT_WS_URL", "wss://chat.example.com/ws");
        env::set_var("SUPPORT_CLIENT_ROLE", "staff");
        env::set_var("SUPPORT_STAFF_TOKEN", "abc");
        env::set_var("SUPPORT_RECONNECT_ATTEMPTS", "2");
        env::set_var("SUPPORT_CONNECT_TIMEOUT_MS", "250");

        let config = ClientConfig::from_env();
        assert_eq!(config.url, "wss://chat.example.com/ws");
        assert_eq!(config.role, ClientRole::Staff);
        assert_eq!(config.reconnection_attempts, 2);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));

        cleanup();
    }

    #[test]
    fn test_endpoint_carries_role_and_token() {
        let config = ClientConfig {
            role: ClientRole::Staff,
            token: Some("s3cret token".into()),
            ..ClientConfig::default()
        };

        let url = config.endpoint().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.query(), Some("role=staff&token=s3cret+token"));
    }
}
