// Richieste di connessione e lista delle conversazioni
use log::info;
use sqlx::{Row, SqliteConnection};

use crate::common::error::{ChatError, ChatResult};
use crate::common::models::{
    ConnectionId, ConnectionRequest, ConversationSummary, RequestStatus, Timestamp, UserId,
};
use crate::server::database::Database;
use crate::server::users;

struct ConnectionRow {
    requester_id: UserId,
    receiver_id: UserId,
    status: RequestStatus,
}

async fn load(db: &Database, connection_id: ConnectionId) -> ChatResult<ConnectionRow> {
    let row = sqlx::query("SELECT requester_id, receiver_id, status FROM connections WHERE id = ?")
        .bind(connection_id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("connection {}", connection_id)))?;
    let status: String = row.get("status");
    Ok(ConnectionRow {
        requester_id: row.get("requester_id"),
        receiver_id: row.get("receiver_id"),
        status: RequestStatus::from_db(&status)
            .ok_or_else(|| ChatError::Transient(format!("unknown connection status '{}'", status)))?,
    })
}

/// Create a pending edge `requester -> target`.
///
/// Any existing edge between the two, in either direction and in any state,
/// blocks a new one: rejections are final.
pub async fn send_request(db: &Database, requester: UserId, target: UserId) -> ChatResult<ConnectionId> {
    if requester == target {
        return Err(ChatError::Validation("cannot connect to yourself".into()));
    }
    if !users::user_exists(db, target).await? {
        return Err(ChatError::NotFound(format!("user {}", target)));
    }

    let mut tx = db.pool.begin().await?;
    let existing = sqlx::query(
        "SELECT status FROM connections
         WHERE (requester_id = ? AND receiver_id = ?) OR (requester_id = ? AND receiver_id = ?)",
    )
    .bind(requester)
    .bind(target)
    .bind(target)
    .bind(requester)
    .fetch_optional(&mut *tx)
    .await?;
    if let Some(row) = existing {
        let status: String = row.get("status");
        return Err(ChatError::Conflict(format!("a {} connection already exists", status)));
    }

    let res = sqlx::query(
        "INSERT INTO connections (requester_id, receiver_id, status, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(requester)
    .bind(target)
    .bind(RequestStatus::Pending.as_str())
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        let duplicate = e
            .as_database_error()
            .map(|d| d.is_unique_violation())
            .unwrap_or(false);
        if duplicate {
            ChatError::Conflict("a connection between these users already exists".into())
        } else {
            ChatError::from(e)
        }
    })?;
    tx.commit().await?;

    let id = res.last_insert_rowid();
    info!("[CONN] Request {} from {} to {}", id, requester, target);
    Ok(id)
}

async fn resolve(db: &Database, user: UserId, connection_id: ConnectionId, to: RequestStatus) -> ChatResult<UserId> {
    let conn = load(db, connection_id).await?;
    if conn.receiver_id != user {
        return Err(ChatError::Forbidden("only the receiver can answer a request".into()));
    }
    if conn.status != RequestStatus::Pending {
        return Err(ChatError::Conflict(format!("request already {}", conn.status.as_str())));
    }
    // la clausola sullo stato evita una doppia risposta concorrente
    let res = sqlx::query("UPDATE connections SET status = ?, responded_at = ? WHERE id = ? AND status = 'pending'")
        .bind(to.as_str())
        .bind(chrono::Utc::now().timestamp())
        .bind(connection_id)
        .execute(&db.pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ChatError::Conflict("request already answered".into()));
    }
    info!("[CONN] Request {} {} by {}", connection_id, to.as_str(), user);
    Ok(conn.requester_id)
}

/// Returns the requester id.
pub async fn accept(db: &Database, user: UserId, connection_id: ConnectionId) -> ChatResult<UserId> {
    resolve(db, user, connection_id, RequestStatus::Accepted).await
}

pub async fn reject(db: &Database, user: UserId, connection_id: ConnectionId) -> ChatResult<UserId> {
    resolve(db, user, connection_id, RequestStatus::Rejected).await
}

/// Remove an accepted connection. Either participant may do it; returns the partner.
pub async fn disconnect(db: &Database, user: UserId, connection_id: ConnectionId) -> ChatResult<UserId> {
    let conn = load(db, connection_id).await?;
    let partner = if conn.requester_id == user {
        conn.receiver_id
    } else if conn.receiver_id == user {
        conn.requester_id
    } else {
        return Err(ChatError::Forbidden("not a participant of this connection".into()));
    };
    if conn.status != RequestStatus::Accepted {
        return Err(ChatError::Conflict(format!("connection is {}", conn.status.as_str())));
    }
    sqlx::query("DELETE FROM connections WHERE id = ?")
        .bind(connection_id)
        .execute(&db.pool)
        .await?;
    info!("[CONN] Connection {} removed by {}", connection_id, user);
    Ok(partner)
}

pub async fn pending_requests(db: &Database, user: UserId) -> ChatResult<Vec<ConnectionRequest>> {
    let rows = sqlx::query(
        "SELECT c.id, c.requester_id, u.username, c.created_at
         FROM connections c JOIN users u ON u.id = c.requester_id
         WHERE c.receiver_id = ? AND c.status = 'pending'
         ORDER BY c.created_at DESC, c.id DESC",
    )
    .bind(user)
    .fetch_all(&db.pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| ConnectionRequest {
            connection_id: r.get("id"),
            requester_id: r.get("requester_id"),
            requester_name: r.get("username"),
            sent_at: Timestamp::from_unix(r.get("created_at")),
        })
        .collect())
}

/// Accepted connections of `user`, already in conversation order.
/// `is_online` is left false; presence is not stored here.
pub async fn list_connections(db: &Database, user: UserId) -> ChatResult<Vec<ConversationSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS connection_id,
               CASE WHEN c.requester_id = ? THEN c.receiver_id ELSE c.requester_id END AS partner_id,
               u.username AS username,
               COALESCE(c.responded_at, c.created_at) AS connected_at,
               (SELECT MAX(m.sent_at) FROM chat_messages m
                 WHERE (m.sender_id = c.requester_id AND m.receiver_id = c.receiver_id)
                    OR (m.sender_id = c.receiver_id AND m.receiver_id = c.requester_id)) AS last_sent,
               (SELECT COUNT(*) FROM chat_messages m
                 WHERE m.receiver_id = ? AND m.is_read = 0
                   AND m.sender_id = CASE WHEN c.requester_id = ? THEN c.receiver_id ELSE c.requester_id END) AS unread
        FROM connections c
        JOIN users u ON u.id = CASE WHEN c.requester_id = ? THEN c.receiver_id ELSE c.requester_id END
        WHERE c.status = 'accepted' AND (c.requester_id = ? OR c.receiver_id = ?)
        ORDER BY (last_sent IS NULL), last_sent DESC, connected_at DESC, partner_id ASC, connection_id ASC
        "#,
    )
    .bind(user)
    .bind(user)
    .bind(user)
    .bind(user)
    .bind(user)
    .bind(user)
    .fetch_all(&db.pool)
    .await?;

    Ok(rows
        .iter()
        .map(|r| ConversationSummary {
            connection_id: r.get("connection_id"),
            user_id: r.get("partner_id"),
            username: r.get("username"),
            connected_at: Timestamp::from_unix(r.get("connected_at")),
            last_message_sent_at: r.get::<Option<i64>, _>("last_sent").map(Timestamp::from_unix),
            unread_count: r.get::<i64, _>("unread").max(0) as u32,
            is_online: false,
        })
        .collect())
}

pub async fn are_connected_in(conn: &mut SqliteConnection, a: UserId, b: UserId) -> ChatResult<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM connections
         WHERE status = 'accepted'
           AND ((requester_id = ? AND receiver_id = ?) OR (requester_id = ? AND receiver_id = ?))",
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .fetch_optional(conn)
    .await?;
    Ok(row.is_some())
}

pub async fn are_connected(db: &Database, a: UserId, b: UserId) -> ChatResult<bool> {
    let mut conn = db.pool.acquire().await?;
    are_connected_in(&mut *conn, a, b).await
}

/// Ids of every user with an accepted connection to `user`.
pub async fn partner_ids(db: &Database, user: UserId) -> ChatResult<Vec<UserId>> {
    let rows = sqlx::query(
        "SELECT CASE WHEN requester_id = ? THEN receiver_id ELSE requester_id END AS partner_id
         FROM connections
         WHERE status = 'accepted' AND (requester_id = ? OR receiver_id = ?)",
    )
    .bind(user)
    .bind(user)
    .bind(user)
    .fetch_all(&db.pool)
    .await?;
    Ok(rows.iter().map(|r| r.get("partner_id")).collect())
}
