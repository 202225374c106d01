// Validazione delle sessioni bearer ed estrattore per le route HTTP
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use log::{debug, info};
use sqlx::Row;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::common::error::{ChatError, ChatResult};
use crate::common::models::UserId;
use crate::server::database::Database;
use crate::server::state::AppState;
use crate::utils::logger::redact;

/// Resolve a bearer credential to its user, `None` when unknown or expired.
pub async fn validate_session(db: &Database, session_token: &str) -> ChatResult<Option<UserId>> {
    let now = chrono::Utc::now().timestamp();
    let row = sqlx::query("SELECT user_id FROM sessions WHERE session_token = ? AND expires_at > ?")
        .bind(session_token)
        .bind(now)
        .fetch_optional(&db.pool)
        .await?;
    match row {
        Some(row) => Ok(Some(row.get("user_id"))),
        None => {
            debug!("[AUTH] Session {} not found or expired", redact(session_token));
            Ok(None)
        }
    }
}

/// Store a session for `user_id`. Issuing credentials is someone else's job;
/// this exists for seeding and tests.
pub async fn register_session(db: &Database, user_id: UserId, ttl: Duration) -> ChatResult<String> {
    let token = uuid::Uuid::new_v4().simple().to_string();
    let now = chrono::Utc::now().timestamp();
    sqlx::query("INSERT INTO sessions (session_token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(now)
        .bind(now + ttl.as_secs() as i64)
        .execute(&db.pool)
        .await?;
    info!("[AUTH] Registered session {} for user {}", redact(&token), user_id);
    Ok(token)
}

pub async fn revoke_session(db: &Database, session_token: &str) -> ChatResult<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE session_token = ?")
        .bind(session_token)
        .execute(&db.pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Authenticated caller of an HTTP route.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub token: String,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let state = state.ok_or_else(|| ChatError::Transient("application state missing".into()))?;
            let token = token.ok_or(ChatError::AuthExpired)?;
            let user_id = validate_session(&state.db, &token)
                .await?
                .ok_or(ChatError::AuthExpired)?;
            Ok(AuthUser { user_id, token })
        })
    }
}
