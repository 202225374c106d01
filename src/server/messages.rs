// Messaggi diretti: invio, storico paginato, conferma di lettura
use log::{debug, info};
use sqlx::Row;

use crate::common::error::{ChatError, ChatResult};
use crate::common::models::{HistoryPage, Message, Timestamp, UserId};
use crate::server::connections;
use crate::server::database::Database;

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        content: row.get("content"),
        timestamp: Timestamp::from_unix(row.get("sent_at")),
        read: row.get::<i64, _>("is_read") != 0,
    }
}

pub fn validate_content(content: &str, max_len: usize) -> ChatResult<()> {
    if content.trim().is_empty() {
        return Err(ChatError::Validation("message content must not be empty".into()));
    }
    if content.chars().count() > max_len {
        return Err(ChatError::Validation(format!("message longer than {} characters", max_len)));
    }
    Ok(())
}

/// Persist a message. The connection check and the insert share one
/// transaction, so a concurrent disconnect cannot slip in between.
pub async fn send_message(
    db: &Database,
    sender: UserId,
    receiver: UserId,
    content: &str,
    max_len: usize,
) -> ChatResult<Message> {
    if sender == receiver {
        return Err(ChatError::Validation("cannot message yourself".into()));
    }
    validate_content(content, max_len)?;

    let mut tx = db.pool.begin().await?;
    if !connections::are_connected_in(&mut *tx, sender, receiver).await? {
        return Err(ChatError::Forbidden("users are not connected".into()));
    }
    let sent_at = Timestamp::now();
    let res = sqlx::query(
        "INSERT INTO chat_messages (sender_id, receiver_id, content, sent_at, is_read) VALUES (?, ?, ?, ?, 0)",
    )
    .bind(sender)
    .bind(receiver)
    .bind(content)
    .bind(sent_at.unix())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let id = res.last_insert_rowid();
    info!("[MSG] Stored message {} from {} to {}", id, sender, receiver);
    Ok(Message {
        id,
        sender_id: sender,
        receiver_id: receiver,
        content: content.to_string(),
        timestamp: sent_at,
        read: false,
    })
}

/// Page `page` of the conversation between `user` and `other`, page 0 being
/// the newest. Messages come back oldest first within the page.
pub async fn fetch_history(
    db: &Database,
    user: UserId,
    other: UserId,
    page: u32,
    size: u32,
) -> ChatResult<HistoryPage> {
    if size == 0 {
        return Err(ChatError::Validation("page size must be positive".into()));
    }
    if !connections::are_connected(db, user, other).await? {
        return Err(ChatError::Forbidden("users are not connected".into()));
    }

    let total: i64 = sqlx::query(
        "SELECT COUNT(*) AS total FROM chat_messages
         WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)",
    )
    .bind(user)
    .bind(other)
    .bind(other)
    .bind(user)
    .fetch_one(&db.pool)
    .await?
    .get("total");

    let offset = i64::from(page) * i64::from(size);
    let rows = sqlx::query(
        "SELECT id, sender_id, receiver_id, content, sent_at, is_read FROM chat_messages
         WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)
         ORDER BY sent_at DESC, id DESC
         LIMIT ? OFFSET ?",
    )
    .bind(user)
    .bind(other)
    .bind(other)
    .bind(user)
    .bind(i64::from(size))
    .bind(offset)
    .fetch_all(&db.pool)
    .await?;

    let mut messages: Vec<Message> = rows.iter().map(row_to_message).collect();
    messages.reverse();

    // anche una conversazione vuota ha raggiunto l'inizio
    let reached_start = offset + i64::from(size) >= total;
    debug!(
        "[MSG] History {}<->{} page {} size {}: {} of {} (start reached: {})",
        user, other, page, size, messages.len(), total, reached_start
    );
    Ok(HistoryPage { messages, reached_start })
}

/// Mark every unread message from `other` to `reader` as read. Idempotent.
pub async fn mark_read(db: &Database, reader: UserId, other: UserId) -> ChatResult<u64> {
    let res = sqlx::query(
        "UPDATE chat_messages SET is_read = 1 WHERE receiver_id = ? AND sender_id = ? AND is_read = 0",
    )
    .bind(reader)
    .bind(other)
    .execute(&db.pool)
    .await?;
    if res.rows_affected() > 0 {
        info!("[MSG] {} read {} messages from {}", reader, res.rows_affected(), other);
    }
    Ok(res.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::connections::{accept, send_request};
    use crate::server::users::create_user;

    async fn connected_pair() -> (Database, UserId, UserId) {
        let db = Database::in_memory().await.unwrap();
        let a = create_user(&db, "alice").await.unwrap();
        let b = create_user(&db, "bob").await.unwrap();
        let id = send_request(&db, a, b).await.unwrap();
        accept(&db, b, id).await.unwrap();
        (db, a, b)
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let db = Database::in_memory().await.unwrap();
        let a = create_user(&db, "alice").await.unwrap();
        let b = create_user(&db, "bob").await.unwrap();
        let err = send_message(&db, a, b, "hi", 2048).await.unwrap_err();
        assert!(matches!(err, ChatError::Forbidden(_)));
    }

    #[tokio::test]
    async fn blank_or_oversized_content_is_rejected() {
        let (db, a, b) = connected_pair().await;
        assert!(matches!(send_message(&db, a, b, "   ", 2048).await, Err(ChatError::Validation(_))));
        assert!(matches!(send_message(&db, a, b, "abcdef", 5).await, Err(ChatError::Validation(_))));
        assert!(send_message(&db, a, b, "abcde", 5).await.is_ok());
    }

    #[tokio::test]
    async fn history_pages_are_newest_first_and_oldest_first_inside() {
        let (db, a, b) = connected_pair().await;
        let mut ids = Vec::new();
        for i in 0..25 {
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            ids.push(send_message(&db, from, to, &format!("m{}", i), 2048).await.unwrap().id);
        }

        let page0 = fetch_history(&db, a, b, 0, 20).await.unwrap();
        assert_eq!(page0.messages.len(), 20);
        assert!(!page0.reached_start);
        assert_eq!(page0.messages.first().unwrap().id, ids[5]);
        assert_eq!(page0.messages.last().unwrap().id, ids[24]);

        let page1 = fetch_history(&db, b, a, 1, 20).await.unwrap();
        assert_eq!(page1.messages.len(), 5);
        assert!(page1.reached_start);
        assert_eq!(page1.messages[0].id, ids[0]);
    }

    #[tokio::test]
    async fn empty_conversation_reports_start_reached() {
        let (db, a, b) = connected_pair().await;
        let page = fetch_history(&db, a, b, 0, 20).await.unwrap();
        assert!(page.messages.is_empty());
        assert!(page.reached_start);
    }

    #[tokio::test]
    async fn exact_multiple_of_page_size_reaches_start_on_last_full_page() {
        let (db, a, b) = connected_pair().await;
        for i in 0..20 {
            send_message(&db, a, b, &format!("m{}", i), 2048).await.unwrap();
        }
        assert!(fetch_history(&db, a, b, 0, 20).await.unwrap().reached_start);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_directional() {
        let (db, a, b) = connected_pair().await;
        send_message(&db, a, b, "one", 2048).await.unwrap();
        send_message(&db, a, b, "two", 2048).await.unwrap();
        send_message(&db, b, a, "back", 2048).await.unwrap();

        assert_eq!(mark_read(&db, b, a).await.unwrap(), 2);
        assert_eq!(mark_read(&db, b, a).await.unwrap(), 0);
        let page = fetch_history(&db, a, b, 0, 20).await.unwrap();
        let unread_for_a: Vec<_> = page.messages.iter().filter(|m| m.receiver_id == a && !m.read).collect();
        assert_eq!(unread_for_a.len(), 1);
    }
}
