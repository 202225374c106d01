use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub websocket_url: String,
    pub reconnect_delay: Duration,
    pub typing_throttle: Duration,
    pub typing_expiry: Duration,
    pub history_page_size: u32,
    pub max_message_length: usize,
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            websocket_url: env::var("WEBSOCKET_URL").unwrap_or(defaults.websocket_url),
            reconnect_delay: Duration::from_millis(parsed("RECONNECT_DELAY_MS", 1000)),
            typing_throttle: Duration::from_millis(parsed("TYPING_THROTTLE_MS", 200)),
            typing_expiry: Duration::from_millis(parsed("TYPING_EXPIRY_MS", 3000)),
            history_page_size: parsed("HISTORY_PAGE_SIZE", 20),
            max_message_length: parsed("MAX_MESSAGE_LENGTH", defaults.max_message_length),
        }
    }

    /// Both endpoints must be absolute URLs with the expected schemes.
    pub fn validate(&self) -> anyhow::Result<()> {
        let api = Url::parse(&self.api_base_url)?;
        if !matches!(api.scheme(), "http" | "https") {
            anyhow::bail!("API_BASE_URL must be http(s), got {}", api.scheme());
        }
        let ws = Url::parse(&self.websocket_url)?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            anyhow::bail!("WEBSOCKET_URL must be ws(s), got {}", ws.scheme());
        }
        if self.history_page_size == 0 {
            anyhow::bail!("HISTORY_PAGE_SIZE must be positive");
        }
        if self.max_message_length == 0 {
            anyhow::bail!("MAX_MESSAGE_LENGTH must be positive");
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            websocket_url: "ws://127.0.0.1:8081".to_string(),
            reconnect_delay: Duration::from_millis(1000),
            typing_throttle: Duration::from_millis(200),
            typing_expiry: Duration::from_millis(3000),
            history_page_size: 20,
            max_message_length: 2048,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_swapped_schemes() {
        let mut config = ClientConfig::default();
        config.websocket_url = "http://127.0.0.1:8081".to_string();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.api_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_message_length_is_refused() {
        let config = ClientConfig { max_message_length: 0, ..ClientConfig::default() };
        assert!(config.validate().is_err());
    }
}
