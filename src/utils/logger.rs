use chrono::Utc;
use std::io::Write;

/// Install the global `env_logger`.
///
/// `RUST_LOG` wins when set; otherwise `level` (usually `LOG_LEVEL`) is used.
/// Calling it twice is harmless, which keeps tests that share a process happy.
pub fn init(level: &str) {
    let mut builder = if std::env::var("RUST_LOG").is_ok() {
        env_logger::Builder::from_default_env()
    } else {
        let mut b = env_logger::Builder::new();
        b.parse_filters(level);
        b
    };

    let _ = builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}:{}] {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}

/// First characters of a credential, for log lines.
pub fn redact(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{}…", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_keeps_only_a_prefix() {
        assert_eq!(redact("abcdefghijklmnop"), "abcdefgh…");
        assert_eq!(redact("abc"), "abc…");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init("info");
        init("debug");
    }
}
