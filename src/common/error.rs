// Tassonomia degli errori condivisa tra client e server
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

/// Failure classes of every chat operation.
///
/// The server turns them into HTTP statuses; the client rebuilds them from
/// the status it receives, so both sides reason about the same five cases.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("session expired or invalid")]
    AuthExpired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("temporarily unavailable: {0}")]
    Transient(String),
}

impl ChatError {
    pub fn status_code(&self) -> u16 {
        match self {
            ChatError::AuthExpired => 401,
            ChatError::NotFound(_) => 404,
            ChatError::Forbidden(_) => 403,
            ChatError::Validation(_) => 400,
            ChatError::Conflict(_) => 409,
            ChatError::Transient(_) => 503,
        }
    }

    /// Rebuild an error from a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        match status {
            401 => ChatError::AuthExpired,
            403 => ChatError::Forbidden(detail),
            404 => ChatError::NotFound(detail),
            400 | 422 => ChatError::Validation(detail),
            409 => ChatError::Conflict(detail),
            _ => ChatError::Transient(format!("HTTP {}: {}", status, detail)),
        }
    }

    /// Worth retrying as is; every other class needs a different request.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }

    /// The message without the class prefix, as carried in response bodies.
    pub fn detail(&self) -> String {
        match self {
            ChatError::AuthExpired => "session expired or invalid".to_string(),
            ChatError::NotFound(d)
            | ChatError::Forbidden(d)
            | ChatError::Validation(d)
            | ChatError::Conflict(d)
            | ChatError::Transient(d) => d.clone(),
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ChatError::NotFound("row not found".to_string()),
            other => ChatError::Transient(format!("database error: {}", other)),
        }
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return ChatError::from_status(status.as_u16(), &e.to_string());
        }
        ChatError::Transient(format!("network error: {}", e))
    }
}

#[cfg(feature = "server")]
impl actix_web::ResponseError for ChatError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(ChatError::status_code(self))
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        if let ChatError::Transient(detail) = self {
            log::warn!("[HTTP] transient failure: {}", detail);
        }
        actix_web::HttpResponse::build(actix_web::ResponseError::status_code(self))
            .json(serde_json::json!({ "error": self.detail() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_round_trips_through_http() {
        let cases = vec![
            ChatError::AuthExpired,
            ChatError::NotFound("x".into()),
            ChatError::Forbidden("x".into()),
            ChatError::Validation("x".into()),
            ChatError::Conflict("x".into()),
        ];
        for err in cases {
            let rebuilt = ChatError::from_status(err.status_code(), r#"{"error":"x"}"#);
            assert_eq!(rebuilt, err);
        }
    }

    #[test]
    fn unknown_status_is_transient() {
        let err = ChatError::from_status(502, "bad gateway");
        assert!(err.is_transient());
        assert_eq!(ChatError::from_status(500, "").status_code(), 503);
    }

    #[cfg(feature = "server")]
    #[actix_web::test]
    async fn response_body_rebuilds_the_same_error() {
        use actix_web::ResponseError;

        let err = ChatError::Conflict("request already accepted".into());
        let resp = err.error_response();
        let status = resp.status().as_u16();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let body = std::str::from_utf8(&body).unwrap();
        assert_eq!(body, r#"{"error":"request already accepted"}"#);
        assert_eq!(ChatError::from_status(status, body), err);
        assert_eq!(ChatError::from_status(status, body).to_string(), "conflict: request already accepted");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ChatError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ChatError::NotFound(_)));
    }
}
