use log::{debug, info};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        info!("[DB] Connecting to {}", database_url);

        // Estrae il path del file dall'URL per creare la directory se serve
        let file_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        let file_path = file_path.split('?').next().unwrap_or(file_path);

        if !file_path.starts_with(":memory:") {
            if let Some(parent) = std::path::Path::new(file_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;
                    debug!("[DB] Created directory {:?}", parent);
                }
            }
        }

        let url = if database_url.contains('?') || file_path.starts_with(":memory:") {
            database_url.to_string()
        } else {
            format!("{}?mode=rwc", database_url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        info!("[DB] Connection pool ready");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database, already migrated.
    ///
    /// The connection must never be recycled, otherwise the data goes with it.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Users
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Sessions (emesse da un servizio esterno, qui solo validate)
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Connections: directed request edge, status pending/accepted/rejected
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id INTEGER NOT NULL,
                receiver_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at INTEGER NOT NULL,
                responded_at INTEGER
            );
        "#).execute(&self.pool).await?;

        sqlx::query(r#"
            CREATE INDEX IF NOT EXISTS idx_connections_pair
                ON connections (requester_id, receiver_id);
        "#).execute(&self.pool).await?;

        // al massimo un arco per coppia, in qualunque direzione
        sqlx::query(r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_connections_unordered_pair
                ON connections (MIN(requester_id, receiver_id), MAX(requester_id, receiver_id));
        "#).execute(&self.pool).await?;

        // Direct messages
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id INTEGER NOT NULL,
                receiver_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                sent_at INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0
            );
        "#).execute(&self.pool).await?;

        sqlx::query(r#"
            CREATE INDEX IF NOT EXISTS idx_chat_messages_pair
                ON chat_messages (sender_id, receiver_id, sent_at);
        "#).execute(&self.pool).await?;

        Ok(())
    }
}
