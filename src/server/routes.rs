use actix_web::{delete, get, post, web, HttpResponse};
use log::debug;
use serde::Deserialize;
use tokio::time::Instant;

use crate::common::error::ChatError;
use crate::common::events::{ChannelEvent, ReadReceiptEvent, TypingEvent};
use crate::common::models::{
    ConnectionId, SendMessageRequest, SendMessageResponse, TypingRequest, UserId, DEFAULT_PAGE_SIZE,
};
use crate::server::auth::{revoke_session, AuthUser};
use crate::server::state::AppState;
use crate::server::{connections, messages, users};

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

// ==================== Identity ====================

/// GET /me
#[get("/me")]
pub async fn whoami(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ChatError> {
    let identity = users::find_user(&state.db, user.user_id).await?;
    Ok(HttpResponse::Ok().json(identity))
}

/// POST /logout
/// Revokes the caller's credential and closes the user's push channels.
#[post("/logout")]
pub async fn logout(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ChatError> {
    revoke_session(&state.db, &user.token).await?;
    let closed = state.hub.disconnect_user(user.user_id).await;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out",
        "closedChannels": closed
    })))
}

// ==================== Connections ====================

/// GET /connections/requests
#[get("/connections/requests")]
pub async fn pending_requests(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ChatError> {
    let requests = connections::pending_requests(&state.db, user.user_id).await?;
    Ok(HttpResponse::Ok().json(requests))
}

/// GET /connections
#[get("/connections")]
pub async fn list_connections(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ChatError> {
    let mut list = connections::list_connections(&state.db, user.user_id).await?;
    for summary in list.iter_mut() {
        summary.is_online = state.presence.is_online(summary.user_id).await;
    }
    Ok(HttpResponse::Ok().json(list))
}

/// POST /connections/request/{targetUserId}
#[post("/connections/request/{target}")]
pub async fn send_request(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<UserId>,
) -> Result<HttpResponse, ChatError> {
    let id = connections::send_request(&state.db, user.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Connection request sent",
        "connectionId": id
    })))
}

/// POST /connections/accept/{id}
#[post("/connections/accept/{id}")]
pub async fn accept_request(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<ConnectionId>,
) -> Result<HttpResponse, ChatError> {
    connections::accept(&state.db, user.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Connection accepted" })))
}

/// POST /connections/reject/{id}
#[post("/connections/reject/{id}")]
pub async fn reject_request(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<ConnectionId>,
) -> Result<HttpResponse, ChatError> {
    connections::reject(&state.db, user.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Connection rejected" })))
}

/// DELETE /connections/{id}
#[delete("/connections/{id}")]
pub async fn remove_connection(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<ConnectionId>,
) -> Result<HttpResponse, ChatError> {
    connections::disconnect(&state.db, user.user_id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Connection removed" })))
}

// ==================== Messages ====================

/// GET /messages/{friendId}?page&size
#[get("/messages/{friend_id}")]
pub async fn history(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<UserId>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ChatError> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or(DEFAULT_PAGE_SIZE).min(state.config.max_page_size);
    let result = messages::fetch_history(&state.db, user.user_id, path.into_inner(), page, size).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// POST /messages/send
/// Publishes to the receiver and to the sender's own sessions.
#[post("/messages/send")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ChatError> {
    let message = messages::send_message(
        &state.db,
        user.user_id,
        body.receiver_id,
        &body.content,
        state.config.max_message_length,
    )
    .await?;

    let event = ChannelEvent::NewMessage(message.clone());
    state.hub.publish(message.receiver_id, &event).await;
    state.hub.publish(message.sender_id, &event).await;

    Ok(HttpResponse::Ok().json(SendMessageResponse {
        message: "Message sent".to_string(),
        data: message,
    }))
}

/// POST /messages/read/{friendId}
/// Idempotent; the read receipt goes to the reader's own sessions.
#[post("/messages/read/{friend_id}")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<UserId>,
) -> Result<HttpResponse, ChatError> {
    let friend_id = path.into_inner();
    let updated = messages::mark_read(&state.db, user.user_id, friend_id).await?;
    state
        .hub
        .publish(user.user_id, &ChannelEvent::ReadReceipt(ReadReceiptEvent { sender_id: friend_id }))
        .await;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Messages marked as read",
        "updated": updated
    })))
}

/// POST /messages/typing
/// Throttled per (sender, receiver); a throttled call still succeeds.
#[post("/messages/typing")]
pub async fn typing(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<TypingRequest>,
) -> Result<HttpResponse, ChatError> {
    let receiver = body.receiver_id;
    if receiver == user.user_id {
        return Err(ChatError::Validation("cannot notify yourself".into()));
    }
    if !connections::are_connected(&state.db, user.user_id, receiver).await? {
        return Err(ChatError::Forbidden("users are not connected".into()));
    }

    let accepted = {
        let mut throttle = state.typing.lock().await;
        let now = Instant::now();
        throttle.prune(now);
        throttle.try_acquire(&(user.user_id, receiver), now)
    };
    if accepted {
        let event = ChannelEvent::Typing(TypingEvent { sender_id: user.user_id, is_typing: true });
        state.hub.publish(receiver, &event).await;
    } else {
        debug!("[HTTP] Typing {} -> {} throttled", user.user_id, receiver);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "ok" })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(whoami)
        .service(logout)
        .service(pending_requests)
        .service(list_connections)
        .service(send_request)
        .service(accept_request)
        .service(reject_request)
        .service(remove_connection)
        .service(history)
        .service(send_message)
        .service(mark_read)
        .service(typing);
}
