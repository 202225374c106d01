// Ispezione del database e seed di utenti/sessioni per lo sviluppo
use clap::Parser;
use linkup_chat::common::models::Timestamp;
use linkup_chat::server::{auth, config::ServerConfig, database::Database, users};
use sqlx::Row;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "db_inspect")]
struct Args {
    /// Defaults to DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,
    /// Create the user if missing and print a fresh session token for it
    #[arg(long)]
    seed_user: Option<String>,
    #[arg(long, default_value_t = 7)]
    session_days: u64,
    #[arg(long, default_value_t = 10)]
    last: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let db_url = args.database_url.unwrap_or_else(|| ServerConfig::from_env().database_url);
    println!("Connecting to {}", db_url);
    let db = Database::connect(&db_url).await?;
    db.migrate().await?;

    if let Some(name) = args.seed_user {
        let user_id = match users::find_by_username(&db, &name).await? {
            Some(identity) => identity.user_id,
            None => users::create_user(&db, &name).await?,
        };
        let ttl = Duration::from_secs(args.session_days * 24 * 3600);
        let token = auth::register_session(&db, user_id, ttl).await?;
        println!("user {} (id {}) token {}", name, user_id, token);
        return Ok(());
    }

    println!("\n-- users --");
    let rows = sqlx::query("SELECT id, username, created_at FROM users ORDER BY id")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: i64 = r.try_get("id").unwrap_or(0);
        let username: String = r.try_get("username").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("id={} username={} created_at={}", id, username, Timestamp::from_unix(created_at));
    }

    println!("\n-- connections --");
    let rows = sqlx::query("SELECT id, requester_id, receiver_id, status, created_at FROM connections ORDER BY id")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: i64 = r.try_get("id").unwrap_or(0);
        let requester: i64 = r.try_get("requester_id").unwrap_or(0);
        let receiver: i64 = r.try_get("receiver_id").unwrap_or(0);
        let status: String = r.try_get("status").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("id={} {} -> {} status={} created_at={}", id, requester, receiver, status, Timestamp::from_unix(created_at));
    }

    println!("\n-- chat_messages (last {}) --", args.last);
    let rows = sqlx::query("SELECT id, sender_id, receiver_id, content, sent_at, is_read FROM chat_messages ORDER BY sent_at DESC, id DESC LIMIT ?")
        .bind(args.last)
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: i64 = r.try_get("id").unwrap_or(0);
        let sender: i64 = r.try_get("sender_id").unwrap_or(0);
        let receiver: i64 = r.try_get("receiver_id").unwrap_or(0);
        let content: String = r.try_get("content").unwrap_or_default();
        let sent_at: i64 = r.try_get("sent_at").unwrap_or(0);
        let is_read: i64 = r.try_get("is_read").unwrap_or(0);
        println!(
            "id={} {} -> {} len={} sent_at={} read={}",
            id, sender, receiver, content.chars().count(), Timestamp::from_unix(sent_at), is_read != 0
        );
    }

    Ok(())
}
