// Orchestratore lato client: unisce risposte HTTP, eventi push e stato locale
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::client::config::ClientConfig;
use crate::client::models::chat_view::{ChatView, ViewPhase, Viewport};
use crate::client::models::conversations::{Conversation, ConversationList};
use crate::client::models::session::SessionContext;
use crate::client::models::timeline::{OutgoingDraft, TimelineEntry};
use crate::client::models::typing::TypingIndicator;
use crate::client::services::api::ChatApi;
use crate::client::services::websocket_client::ChannelNotice;
use crate::common::error::{ChatError, ChatResult};
use crate::common::events::ChannelEvent;
use crate::common::models::{
    ConnectionId, ConnectionRequest, ConversationSummary, Identity, Message, Timestamp, UserId,
};
use crate::common::throttle::Throttle;

const ROW_HEIGHT: f64 = 24.0;
const PANE_HEIGHT: f64 = 480.0;

struct MessengerState {
    conversations: ConversationList,
    requests: Vec<ConnectionRequest>,
    view: ChatView,
    typing: TypingIndicator,
    typing_throttle: Throttle<UserId>,
    action_loading: bool,
    notice: Option<String>,
    channel_connected: bool,
}

impl MessengerState {
    fn new(config: &ClientConfig) -> Self {
        Self {
            conversations: ConversationList::new(),
            requests: Vec::new(),
            view: ChatView::new(ROW_HEIGHT, PANE_HEIGHT),
            typing: TypingIndicator::new(config.typing_expiry),
            typing_throttle: Throttle::new(config.typing_throttle),
            action_loading: false,
            notice: None,
            channel_connected: false,
        }
    }

    fn reset(&mut self) {
        self.conversations.clear();
        self.requests.clear();
        self.view.close();
        self.typing.clear();
        self.action_loading = false;
        self.channel_connected = false;
    }
}

/// Read-only copy of what the UI needs to draw.
#[derive(Debug, Clone)]
pub struct MessengerSnapshot {
    pub conversations: Vec<Conversation>,
    pub total_unread: u32,
    pub requests: Vec<ConnectionRequest>,
    pub open_partner: Option<UserId>,
    pub phase: ViewPhase,
    pub loading_older: bool,
    pub reached_start: bool,
    pub timeline: Vec<TimelineEntry>,
    pub viewport: Viewport,
    pub typing: Vec<UserId>,
    pub action_loading: bool,
    pub notice: Option<String>,
    pub channel_connected: bool,
}

/// Client reconciliation layer.
///
/// Every network call runs without holding the state lock, so channel events
/// keep flowing while a request is in flight. Results that come back after
/// the session changed are dropped.
pub struct Messenger<A: ChatApi> {
    api: Arc<A>,
    session: SessionContext,
    config: ClientConfig,
    state: Arc<Mutex<MessengerState>>,
}

impl<A: ChatApi> Clone for Messenger<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            session: self.session.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<A: ChatApi + 'static> Messenger<A> {
    pub fn new(api: Arc<A>, session: SessionContext, config: ClientConfig) -> Self {
        let state = MessengerState::new(&config);
        Self { api, session, config, state: Arc::new(Mutex::new(state)) }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub async fn snapshot(&self) -> MessengerSnapshot {
        let st = self.state.lock().await;
        MessengerSnapshot {
            conversations: st.conversations.items().to_vec(),
            total_unread: st.conversations.total_unread(),
            requests: st.requests.clone(),
            open_partner: st.view.partner(),
            phase: st.view.phase(),
            loading_older: st.view.is_loading_older(),
            reached_start: st.view.reached_start(),
            timeline: st.view.timeline().entries().to_vec(),
            viewport: st.view.viewport(),
            typing: st.typing.typing_users(Instant::now()),
            action_loading: st.action_loading,
            notice: st.notice.clone(),
            channel_connected: st.channel_connected,
        }
    }

    pub async fn dismiss_notice(&self) {
        self.state.lock().await.notice = None;
    }

    /// Record a failure. An expired credential ends the session; anything
    /// else becomes a dismissible notice.
    async fn absorb(&self, err: &ChatError) {
        match err {
            ChatError::AuthExpired => {
                warn!("[MESSENGER] Credential expired, logging out");
                self.logout().await;
            }
            other => {
                self.state.lock().await.notice = Some(other.to_string());
            }
        }
    }

    async fn guarded<T>(&self, epoch: u64, result: ChatResult<T>) -> ChatResult<Option<T>> {
        if !self.session.is_current(epoch) {
            debug!("[MESSENGER] Dropping response of a previous session");
            return Ok(None);
        }
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                self.absorb(&e).await;
                Err(e)
            }
        }
    }

    /// Sign in with a credential and resolve who it belongs to, once.
    pub async fn start_session(&self, token: impl Into<String>) -> ChatResult<Identity> {
        self.state.lock().await.reset();
        let epoch = self.session.login(token);
        let identity = match self.guarded(epoch, self.api.whoami().await).await? {
            Some(identity) => identity,
            None => return Err(ChatError::AuthExpired),
        };
        if !self.session.set_identity(epoch, identity.clone()) {
            return Err(ChatError::AuthExpired);
        }
        info!("[MESSENGER] Signed in as {} ({})", identity.username, identity.user_id);
        self.refresh_all().await?;
        Ok(identity)
    }

    /// Explicit sign-out: revoke the credential on the server, then drop
    /// the local session whatever the outcome.
    pub async fn sign_out(&self) {
        if self.session.token().is_some() {
            if let Err(e) = self.api.logout().await {
                warn!("[MESSENGER] Server-side logout failed: {}", e);
            }
        }
        self.logout().await;
    }

    /// Local teardown only; used when the server already refused the credential.
    pub async fn logout(&self) {
        self.session.logout();
        let mut st = self.state.lock().await;
        st.reset();
        st.notice = None;
    }

    /// Full refetch of conversations and pending requests.
    /// Events pushed while the fetch is in flight are replayed on top of it.
    pub async fn refresh_all(&self) -> ChatResult<()> {
        let epoch = self.session.epoch();
        let ticket = self.state.lock().await.conversations.begin_sync();
        let fetched = self.fetch_lists().await;
        let fetched = match self.guarded(epoch, fetched).await {
            Ok(Some(fetched)) => fetched,
            Ok(None) => {
                self.state.lock().await.conversations.cancel_sync(ticket);
                return Ok(());
            }
            Err(e) => {
                self.state.lock().await.conversations.cancel_sync(ticket);
                return Err(e);
            }
        };
        let (list, requests) = fetched;
        let mut st = self.state.lock().await;
        let open = st.view.partner();
        st.conversations.finish_sync(ticket, list, open);
        st.requests = requests;
        Ok(())
    }

    async fn fetch_lists(&self) -> ChatResult<(Vec<ConversationSummary>, Vec<ConnectionRequest>)> {
        let list = self.api.connections().await?;
        let requests = self.api.pending_requests().await?;
        Ok((list, requests))
    }

    async fn send_read_receipt(&self, partner: UserId) {
        let epoch = self.session.epoch();
        let res = self.api.mark_read(partner).await;
        if let Err(e) = self.guarded(epoch, res).await {
            debug!("[MESSENGER] Read receipt for {} failed: {}", partner, e);
        }
    }

    /// Enter a conversation: acknowledge unread messages, load page 0.
    pub async fn open_conversation(&self, partner: UserId) -> ChatResult<()> {
        let epoch = self.session.epoch();
        let (ticket, needs_receipt) = {
            let mut st = self.state.lock().await;
            if st.conversations.get(partner).is_none() {
                return Err(ChatError::NotFound(format!("no conversation with {}", partner)));
            }
            let needs_receipt = st.conversations.open(partner);
            (st.view.open(partner), needs_receipt)
        };
        if needs_receipt {
            self.send_read_receipt(partner).await;
        }

        let page = self.api.fetch_history(partner, 0, self.config.history_page_size).await;
        match self.guarded(epoch, page).await {
            Ok(Some(page)) => {
                let mut st = self.state.lock().await;
                if st.view.apply_initial(ticket, page) {
                    st.view.take_scroll_to_bottom();
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.state.lock().await.view.fail_initial(ticket);
                Err(e)
            }
        }
    }

    pub async fn close_conversation(&self) {
        self.state.lock().await.view.close();
    }

    /// Scroll position reported by the UI.
    pub async fn scroll_to(&self, top: f64) {
        self.state.lock().await.view.scroll_to(top);
    }

    /// Fetch the next older page when the view sits at the top. Returns
    /// whether a page was loaded.
    pub async fn load_older(&self) -> ChatResult<bool> {
        let epoch = self.session.epoch();
        let (ticket, page_index, partner) = {
            let mut st = self.state.lock().await;
            let Some(partner) = st.view.partner() else {
                return Ok(false);
            };
            match st.view.begin_load_older() {
                Some((ticket, page_index)) => (ticket, page_index, partner),
                None => return Ok(false),
            }
        };
        let page = self.api.fetch_history(partner, page_index, self.config.history_page_size).await;
        match self.guarded(epoch, page).await {
            Ok(Some(page)) => Ok(self.state.lock().await.view.apply_older(ticket, page)),
            Ok(None) => Ok(false),
            Err(e) => {
                self.state.lock().await.view.fail_older(ticket);
                Err(e)
            }
        }
    }

    /// Send to the open conversation with an optimistic local echo.
    pub async fn send(&self, content: &str) -> ChatResult<Uuid> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::Validation("message is empty".into()));
        }
        let limit = self.config.max_message_length;
        if content.chars().count() > limit {
            return Err(ChatError::Validation(format!("message longer than {} characters", limit)));
        }

        let epoch = self.session.epoch();
        let (partner, temp_id) = {
            let mut st = self.state.lock().await;
            let Some(partner) = st.view.partner() else {
                return Err(ChatError::Validation("no conversation is open".into()));
            };
            if st.action_loading {
                return Err(ChatError::Conflict("another action is in progress".into()));
            }
            st.action_loading = true;
            let draft = OutgoingDraft::new(partner, content);
            let temp_id = draft.temp_id;
            st.view.timeline_mut().push_pending(draft);
            st.view.content_changed();
            st.conversations.on_local_send(partner, Timestamp::now());
            (partner, temp_id)
        };

        let result = self.api.send_message(partner, content).await;
        if !self.session.is_current(epoch) {
            return Ok(temp_id);
        }
        let mut st = self.state.lock().await;
        st.action_loading = false;
        let same_view = st.view.partner() == Some(partner);
        match result {
            Ok(message) => {
                if same_view {
                    st.view.timeline_mut().confirm(temp_id, message.clone());
                    st.view.content_changed();
                }
                st.conversations.on_local_send(partner, message.timestamp);
                Ok(temp_id)
            }
            Err(err) => {
                if same_view {
                    st.view.timeline_mut().reject(temp_id, err.to_string());
                }
                drop(st);
                self.absorb(&err).await;
                Err(err)
            }
        }
    }

    pub async fn dismiss_rejected(&self, temp_id: Uuid) -> bool {
        let mut st = self.state.lock().await;
        let removed = st.view.timeline_mut().dismiss(temp_id);
        st.view.content_changed();
        removed
    }

    /// Tell the open conversation's partner we are typing. Throttled, and
    /// failures are ignored.
    pub async fn notify_typing(&self) {
        let Some(me) = self.session.user_id() else {
            return;
        };
        let partner = {
            let mut st = self.state.lock().await;
            let Some(partner) = st.view.partner() else {
                return;
            };
            if !st.typing_throttle.try_acquire(&me, Instant::now()) {
                return;
            }
            partner
        };
        if let Err(e) = self.api.notify_typing(partner).await {
            debug!("[MESSENGER] Typing notice to {} failed: {}", partner, e);
        }
    }

    async fn gated<F, Fut>(&self, call: F) -> ChatResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ChatResult<()>>,
    {
        let epoch = self.session.epoch();
        {
            let mut st = self.state.lock().await;
            if st.action_loading {
                return Err(ChatError::Conflict("another action is in progress".into()));
            }
            st.action_loading = true;
        }
        let result = call().await;
        if !self.session.is_current(epoch) {
            return Ok(());
        }
        self.state.lock().await.action_loading = false;
        self.guarded(epoch, result).await?;
        self.refresh_all().await
    }

    pub async fn accept_request(&self, connection_id: ConnectionId) -> ChatResult<()> {
        let api = self.api.clone();
        self.gated(|| async move { api.accept_request(connection_id).await }).await
    }

    pub async fn reject_request(&self, connection_id: ConnectionId) -> ChatResult<()> {
        let api = self.api.clone();
        self.gated(|| async move { api.reject_request(connection_id).await }).await
    }

    pub async fn send_request(&self, target: UserId) -> ChatResult<ConnectionId> {
        let epoch = self.session.epoch();
        let res = self.api.send_request(target).await;
        self.guarded(epoch, res).await?.ok_or(ChatError::AuthExpired)
    }

    pub async fn remove_connection(&self, connection_id: ConnectionId) -> ChatResult<()> {
        let epoch = self.session.epoch();
        let res = self.api.remove_connection(connection_id).await;
        if self.guarded(epoch, res).await?.is_none() {
            return Ok(());
        }
        let mut st = self.state.lock().await;
        if let Some(removed) = st.conversations.remove(connection_id) {
            if st.view.partner() == Some(removed.partner_id) {
                st.view.close();
            }
        }
        Ok(())
    }

    /// Apply one push-channel event.
    pub async fn handle_event(&self, event: ChannelEvent) {
        let Some(me) = self.session.user_id() else {
            return;
        };
        match event {
            ChannelEvent::NewMessage(message) => self.on_pushed_message(me, message).await,
            ChannelEvent::Typing(t) => {
                let mut st = self.state.lock().await;
                if t.is_typing {
                    st.typing.on_typing(t.sender_id, Instant::now());
                } else {
                    st.typing.on_message(t.sender_id);
                }
            }
            ChannelEvent::ReadReceipt(r) => {
                self.state.lock().await.conversations.on_read_receipt(r.sender_id);
            }
            ChannelEvent::Presence(p) => {
                self.state.lock().await.conversations.on_presence(p.user_id, p.is_online);
            }
        }
    }

    async fn on_pushed_message(&self, me: UserId, message: Message) {
        if !message.involves(me) {
            return;
        }
        let partner = message.partner_of(me);
        let (effect, open) = {
            let mut st = self.state.lock().await;
            st.typing.on_message(message.sender_id);
            let open = st.view.partner();
            let effect = st.conversations.on_message(&message, me, open);
            if open == Some(partner) {
                st.view.push_live(message);
            }
            (effect, open)
        };
        if effect.needs_read_receipt && open == Some(partner) {
            self.send_read_receipt(partner).await;
        }
        if !effect.known {
            // conversazione appena nata (richiesta accettata altrove)
            if let Err(e) = self.refresh_all().await {
                debug!("[MESSENGER] Refresh after unknown sender failed: {}", e);
            }
        }
    }

    /// React to channel state changes. A reconnect may have missed events,
    /// so the list and the open conversation's newest page are refetched.
    pub async fn handle_notice(&self, notice: ChannelNotice) {
        match notice {
            ChannelNotice::Event(event) => self.handle_event(event).await,
            ChannelNotice::Connected { reconnect } => {
                self.state.lock().await.channel_connected = true;
                if reconnect {
                    info!("[MESSENGER] Channel back, resynchronising");
                    if let Err(e) = self.resync().await {
                        debug!("[MESSENGER] Resync failed: {}", e);
                    }
                }
            }
            ChannelNotice::Disconnected => {
                self.state.lock().await.channel_connected = false;
            }
            ChannelNotice::AuthRejected => {
                self.absorb(&ChatError::AuthExpired).await;
            }
        }
    }

    async fn resync(&self) -> ChatResult<()> {
        self.refresh_all().await?;
        let epoch = self.session.epoch();
        let partner = {
            let st = self.state.lock().await;
            match (st.view.partner(), st.view.phase()) {
                (Some(p), ViewPhase::Ready) => p,
                _ => return Ok(()),
            }
        };
        let page = self.api.fetch_history(partner, 0, self.config.history_page_size).await;
        if let Some(page) = self.guarded(epoch, page).await? {
            let mut st = self.state.lock().await;
            if st.view.partner() == Some(partner) {
                let added = st.view.timeline_mut().merge_tail(page.messages);
                st.view.content_changed();
                debug!("[MESSENGER] Resync added {} messages", added);
            }
        }
        Ok(())
    }
}
