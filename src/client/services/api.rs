// Client HTTP verso le API di messaggistica
use async_trait::async_trait;
use log::debug;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::client::models::session::SessionContext;
use crate::common::error::{ChatError, ChatResult};
use crate::common::models::{
    ConnectionId, ConnectionRequest, ConversationSummary, HistoryPage, Identity, Message,
    SendMessageRequest, SendMessageResponse, TypingRequest, UserId,
};

/// Paginated conversation history, page 0 being the newest.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn fetch_history(&self, other: UserId, page: u32, size: u32) -> ChatResult<HistoryPage>;
}

/// Every request/response call the messenger makes.
#[async_trait]
pub trait ChatApi: HistoryStore {
    async fn whoami(&self) -> ChatResult<Identity>;
    /// Revoke the credential on the server and close its push channels.
    async fn logout(&self) -> ChatResult<()>;
    async fn pending_requests(&self) -> ChatResult<Vec<ConnectionRequest>>;
    async fn connections(&self) -> ChatResult<Vec<ConversationSummary>>;
    async fn send_message(&self, receiver: UserId, content: &str) -> ChatResult<Message>;
    async fn mark_read(&self, other: UserId) -> ChatResult<()>;
    async fn notify_typing(&self, receiver: UserId) -> ChatResult<()>;
    async fn send_request(&self, target: UserId) -> ChatResult<ConnectionId>;
    async fn accept_request(&self, connection_id: ConnectionId) -> ChatResult<()>;
    async fn reject_request(&self, connection_id: ConnectionId) -> ChatResult<()>;
    async fn remove_connection(&self, connection_id: ConnectionId) -> ChatResult<()>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedConnection {
    connection_id: ConnectionId,
}

/// [`ChatApi`] over HTTP, authenticated with the current session's bearer token.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn request(&self, method: Method, path: &str) -> ChatResult<RequestBuilder> {
        let token = self.session.token().ok_or(ChatError::AuthExpired)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("[HTTP] {} {}", method, url);
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn check(resp: Response) -> ChatResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ChatError::from_status(status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(builder: RequestBuilder) -> ChatResult<T> {
        let resp = Self::check(builder.send().await?).await?;
        resp.json::<T>()
            .await
            .map_err(|e| ChatError::Transient(format!("invalid response body: {}", e)))
    }

    async fn empty(builder: RequestBuilder) -> ChatResult<()> {
        Self::check(builder.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for HttpApi {
    async fn fetch_history(&self, other: UserId, page: u32, size: u32) -> ChatResult<HistoryPage> {
        let builder = self
            .request(Method::GET, &format!("/messages/{}", other))?
            .query(&[("page", page), ("size", size)]);
        Self::json(builder).await
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn whoami(&self) -> ChatResult<Identity> {
        Self::json(self.request(Method::GET, "/me")?).await
    }

    async fn logout(&self) -> ChatResult<()> {
        Self::empty(self.request(Method::POST, "/logout")?).await
    }

    async fn pending_requests(&self) -> ChatResult<Vec<ConnectionRequest>> {
        Self::json(self.request(Method::GET, "/connections/requests")?).await
    }

    async fn connections(&self) -> ChatResult<Vec<ConversationSummary>> {
        Self::json(self.request(Method::GET, "/connections")?).await
    }

    async fn send_message(&self, receiver: UserId, content: &str) -> ChatResult<Message> {
        let body = SendMessageRequest { receiver_id: receiver, content: content.to_string() };
        let resp: SendMessageResponse = Self::json(self.request(Method::POST, "/messages/send")?.json(&body)).await?;
        Ok(resp.data)
    }

    async fn mark_read(&self, other: UserId) -> ChatResult<()> {
        Self::empty(self.request(Method::POST, &format!("/messages/read/{}", other))?).await
    }

    async fn notify_typing(&self, receiver: UserId) -> ChatResult<()> {
        let body = TypingRequest { receiver_id: receiver };
        Self::empty(self.request(Method::POST, "/messages/typing")?.json(&body)).await
    }

    async fn send_request(&self, target: UserId) -> ChatResult<ConnectionId> {
        let created: CreatedConnection =
            Self::json(self.request(Method::POST, &format!("/connections/request/{}", target))?).await?;
        Ok(created.connection_id)
    }

    async fn accept_request(&self, connection_id: ConnectionId) -> ChatResult<()> {
        Self::empty(self.request(Method::POST, &format!("/connections/accept/{}", connection_id))?).await
    }

    async fn reject_request(&self, connection_id: ConnectionId) -> ChatResult<()> {
        Self::empty(self.request(Method::POST, &format!("/connections/reject/{}", connection_id))?).await
    }

    async fn remove_connection(&self, connection_id: ConnectionId) -> ChatResult<()> {
        Self::empty(self.request(Method::DELETE, &format!("/connections/{}", connection_id))?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calls_without_a_token_fail_before_the_network() {
        let api = HttpApi::new("http://127.0.0.1:9", SessionContext::new());
        assert_eq!(api.whoami().await.unwrap_err(), ChatError::AuthExpired);
        assert_eq!(api.fetch_history(2, 0, 20).await.unwrap_err(), ChatError::AuthExpired);
    }

    #[test]
    fn base_url_is_normalised() {
        let api = HttpApi::new("http://host:8080/", SessionContext::new());
        assert_eq!(api.base_url, "http://host:8080");
    }
}
