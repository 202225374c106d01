use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub websocket_port: u16,
    pub database_url: String,
    pub log_level: String,
    pub max_message_length: usize,
    pub max_page_size: u32,
    pub presence_grace: Duration,
    pub typing_min_interval: Duration,
    pub auth_timeout: Duration,
    pub session_check_interval: Duration,
    pub redis_url: Option<String>, // fan-out tra istanze, opzionale
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port: u16 = parsed("SERVER_PORT", 8080);
        Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port,
            websocket_port: parsed("WEBSOCKET_PORT", port.wrapping_add(1)),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/linkup_chat.db".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            max_message_length: parsed("MAX_MESSAGE_LENGTH", 2048),
            max_page_size: parsed("MAX_PAGE_SIZE", 100),
            presence_grace: Duration::from_millis(parsed("PRESENCE_GRACE_MS", 2000)),
            typing_min_interval: Duration::from_millis(parsed("TYPING_MIN_INTERVAL_MS", 200)),
            auth_timeout: Duration::from_secs(parsed("AUTH_TIMEOUT_SECS", 30)),
            session_check_interval: Duration::from_secs(parsed("SESSION_CHECK_SECS", 60)),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn websocket_addr(&self) -> String {
        format!("{}:{}", self.host, self.websocket_port)
    }
}

impl Default for ServerConfig {
    /// Same values `from_env` falls back to, without touching the environment.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            websocket_port: 8081,
            database_url: "sqlite::memory:".to_string(),
            log_level: "info".to_string(),
            max_message_length: 2048,
            max_page_size: 100,
            presence_grace: Duration::from_millis(2000),
            typing_min_interval: Duration::from_millis(200),
            auth_timeout: Duration::from_secs(30),
            session_check_interval: Duration::from_secs(60),
            redis_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.websocket_port, cfg.port + 1);
        assert_eq!(cfg.presence_grace, Duration::from_secs(2));
        assert_eq!(cfg.typing_min_interval, Duration::from_millis(200));
        assert_eq!(cfg.http_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn parsed_falls_back_on_garbage() {
        std::env::set_var("LINKUP_TEST_GARBAGE", "not-a-number");
        assert_eq!(parsed::<u32>("LINKUP_TEST_GARBAGE", 7), 7);
    }
}
