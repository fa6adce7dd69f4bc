//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the registry of browser sessions.

use crate::config::Config;
use chrono::{DateTime, Utc};
use manuscript_core::{ConversionGateway, CredentialStore, SessionContext};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Sessions)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub credentials: Arc<CredentialStore>,
    /// `None` when no generation-service key is configured.
    pub gateway: Option<Arc<ConversionGateway>>,
    pub sessions: Arc<SessionRegistry>,
}

//=========================================================================================
// SessionRegistry (One Entry Per Logged-In Browser)
//=========================================================================================

/// A session's context. The mutex is held for the whole of each action, so a
/// session never runs two generation calls at once.
pub type SessionHandle = Arc<Mutex<SessionContext>>;

struct SessionEntry {
    context: SessionHandle,
    expires_at: DateTime<Utc>,
}

/// In-process map from the session cookie to its context.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    ttl: chrono::Duration,
}

impl SessionRegistry {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Registers a logged-in context and returns its new session ID.
    pub async fn insert(&self, context: SessionContext) -> Uuid {
        let id = Uuid::new_v4();
        let entry = SessionEntry {
            context: Arc::new(Mutex::new(context)),
            expires_at: Utc::now() + self.ttl,
        };
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, entry| entry.expires_at > Utc::now());
        sessions.insert(id, entry);
        id
    }

    /// Looks up a live session. Expired entries are dropped on the way.
    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(entry) if entry.expires_at > Utc::now() => {
                    return Some(entry.context.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        debug!("Session {} expired.", id);
        self.sessions.write().await.remove(&id);
        None
    }

    pub async fn remove(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.context)
    }
}
