use std::sync::Arc;
use tokio::sync::watch;

use crate::common::models::{Identity, UserId};

/// Credential and resolved identity of the signed-in user.
///
/// `epoch` grows on every login and logout; async work remembers the epoch it
/// started under and drops its result if the session moved on meanwhile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: Option<String>,
    pub identity: Option<Identity>,
    pub epoch: u64,
}

impl Session {
    /// A push channel may only be open in this state.
    pub fn is_ready(&self) -> bool {
        self.token.is_some() && self.identity.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.identity.as_ref().map(|i| i.user_id)
    }
}

/// Shared handle on the current [`Session`]; every change is broadcast to
/// subscribers through a watch channel.
#[derive(Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Session>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().token.clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.tx.borrow().user_id()
    }

    /// Start a new session with an unresolved identity; returns its epoch.
    pub fn login(&self, token: impl Into<String>) -> u64 {
        let token = token.into();
        let mut epoch = 0;
        self.tx.send_modify(|s| {
            s.epoch += 1;
            s.token = Some(token);
            s.identity = None;
            epoch = s.epoch;
        });
        epoch
    }

    /// Attach the identity resolved for `epoch`. Refused when stale.
    pub fn set_identity(&self, epoch: u64, identity: Identity) -> bool {
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch || s.token.is_none() {
                return false;
            }
            s.identity = Some(identity);
            true
        })
    }

    pub fn logout(&self) {
        self.tx.send_modify(|s| {
            s.epoch += 1;
            s.token = None;
            s.identity = None;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(id: UserId) -> Identity {
        Identity { user_id: id, username: format!("u{}", id) }
    }

    #[test]
    fn identity_for_a_stale_epoch_is_refused() {
        let ctx = SessionContext::new();
        let first = ctx.login("t1");
        let second = ctx.login("t2");
        assert!(!ctx.set_identity(first, ident(1)));
        assert!(!ctx.snapshot().is_ready());
        assert!(ctx.set_identity(second, ident(2)));
        assert_eq!(ctx.user_id(), Some(2));
    }

    #[test]
    fn logout_clears_and_invalidates() {
        let ctx = SessionContext::new();
        let epoch = ctx.login("tok");
        ctx.set_identity(epoch, ident(3));
        ctx.logout();
        assert!(!ctx.is_current(epoch));
        assert_eq!(ctx.token(), None);
        assert!(!ctx.set_identity(epoch, ident(3)));
    }

    #[tokio::test]
    async fn subscribers_are_notified_of_changes() {
        let ctx = SessionContext::new();
        let mut rx = ctx.subscribe();
        let epoch = ctx.login("tok");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().token.as_deref(), Some("tok"));
        ctx.set_identity(epoch, ident(4));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_ready());
    }
}
