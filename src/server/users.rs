// Gestione utenti: creazione (per seed e test) e lookup
use log::info;
use sqlx::Row;

use crate::common::error::{ChatError, ChatResult};
use crate::common::models::{Identity, UserId};
use crate::server::database::Database;

pub async fn create_user(db: &Database, username: &str) -> ChatResult<UserId> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ChatError::Validation("username must not be empty".into()));
    }
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
        .bind(username)
        .bind(now)
        .execute(&db.pool)
        .await
        .map_err(|e| {
            let taken = e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false);
            if taken {
                ChatError::Conflict(format!("username '{}' already taken", username))
            } else {
                ChatError::from(e)
            }
        })?;
    let id = result.last_insert_rowid();
    info!("[USERS] Created user {} ({})", id, username);
    Ok(id)
}

pub async fn find_user(db: &Database, user_id: UserId) -> ChatResult<Identity> {
    let row = sqlx::query("SELECT id, username FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("user {}", user_id)))?;
    Ok(Identity { user_id: row.get("id"), username: row.get("username") })
}

pub async fn find_by_username(db: &Database, username: &str) -> ChatResult<Option<Identity>> {
    let row = sqlx::query("SELECT id, username FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&db.pool)
        .await?;
    Ok(row.map(|r| Identity { user_id: r.get("id"), username: r.get("username") }))
}

pub async fn user_exists(db: &Database, user_id: UserId) -> ChatResult<bool> {
    let row = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_username_is_a_conflict() {
        let db = Database::in_memory().await.unwrap();
        let id = create_user(&db, "alice").await.unwrap();
        assert_eq!(find_user(&db, id).await.unwrap().username, "alice");
        let err = create_user(&db, "alice").await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        assert!(matches!(find_user(&db, 99).await, Err(ChatError::NotFound(_))));
        assert!(find_by_username(&db, "ghost").await.unwrap().is_none());
        assert!(!user_exists(&db, 99).await.unwrap());
    }
}
