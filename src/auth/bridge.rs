//! Mirrors the identity provider's session into app-wide state.
//!
//! [`SessionBridge`] is the only writer; everything else reads through a
//! cloned [`SessionContext`].

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::auth::session::{AuthEvent, CurrentUser, IdentityProvider, Session};
use crate::backend::AuthProvider;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Restoring,
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            SessionState::Authenticated(session) => Some(&session.user),
            _ => None,
        }
    }

    fn from_event(event: AuthEvent) -> Self {
        match event {
            AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
                SessionState::Authenticated(session)
            }
            AuthEvent::SignedOut => SessionState::Unauthenticated,
        }
    }
}

/// Read-only view of the current session, handed to every component that
/// needs to know who is acting.
#[derive(Clone)]
pub struct SessionContext {
    rx: watch::Receiver<SessionState>,
}

impl SessionContext {
    /// A context pinned to one state, not backed by any bridge.
    pub fn fixed(state: SessionState) -> Self {
        let (_tx, rx) = watch::channel(state);
        Self { rx }
    }

    pub fn state(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.rx.borrow().user().cloned()
    }

    pub fn require_user(&self) -> AppResult<CurrentUser> {
        self.current_user().ok_or(AppError::Unauthenticated)
    }

    /// Wait for the next state change.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

pub struct SessionBridge {
    auth: Arc<dyn AuthProvider>,
    tx: Arc<watch::Sender<SessionState>>,
    listener: Option<JoinHandle<()>>,
}

impl SessionBridge {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let (tx, _) = watch::channel(SessionState::Restoring);
        Self {
            auth,
            tx: Arc::new(tx),
            listener: None,
        }
    }

    pub fn context(&self) -> SessionContext {
        SessionContext {
            rx: self.tx.subscribe(),
        }
    }

    /// Restore any previous session and start following provider events.
    pub async fn start(&mut self) -> SessionState {
        self.tx.send_replace(SessionState::Restoring);

        // Subscribe before restoring so no event is missed in between.
        let events = self.auth.subscribe();

        let restored = match self.auth.get_session().await {
            Ok(Some(session)) => {
                tracing::info!("Restored session for {}", session.user.id);
                SessionState::Authenticated(session)
            }
            Ok(None) => SessionState::Unauthenticated,
            Err(e) => {
                tracing::warn!("Could not restore session: {}", e);
                SessionState::Unauthenticated
            }
        };
        self.tx.send_replace(restored.clone());

        self.stop_listener();
        self.listener = Some(tokio::spawn(follow_events(events, self.tx.clone())));
        restored
    }

    pub async fn sign_in(
        &self,
        provider: IdentityProvider,
        id_token: &str,
    ) -> AppResult<CurrentUser> {
        let session = self
            .auth
            .sign_in_with_id_token(provider, id_token)
            .await
            .map_err(AppError::from_remote)?;
        let user = session.user.clone();
        self.tx.send_replace(SessionState::Authenticated(session));
        Ok(user)
    }

    pub async fn sign_out(&self) -> AppResult<()> {
        self.auth.sign_out().await?;
        self.tx.send_replace(SessionState::Unauthenticated);
        Ok(())
    }

    /// Stop following provider events.
    pub fn shutdown(&mut self) {
        self.stop_listener();
    }

    fn stop_listener(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

impl Drop for SessionBridge {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

async fn follow_events(
    mut events: broadcast::Receiver<AuthEvent>,
    tx: Arc<watch::Sender<SessionState>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let state = SessionState::from_event(event);
                tracing::debug!(
                    "Session changed: {}",
                    state.user().map(|u| u.id.as_str()).unwrap_or("signed out")
                );
                tx.send_replace(state);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} session events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
