//! Session storage: owns each session's [`AgentState`] across turns.
//!
//! A turn borrows the state through a [`SessionGuard`], which holds the
//! session's lock until it is dropped. Turns on the same session therefore
//! serialize, while different sessions proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::state::AgentState;

/// Unique identifier for a conversation session.
pub type SessionId = String;

/// Exclusive access to one session's state for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<AgentState>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a new, empty session.
    async fn create_session(&self) -> anyhow::Result<SessionInfo>;

    /// Wait for exclusive access to a session's state.
    async fn acquire(&self, session_id: &SessionId) -> anyhow::Result<SessionGuard>;

    async fn delete_session(&self, session_id: &SessionId) -> anyhow::Result<()>;

    async fn list_sessions(&self) -> anyhow::Result<Vec<SessionInfo>>;
}

struct SessionEntry {
    info: SessionInfo,
    state: Arc<Mutex<AgentState>>,
}

/// In-memory session store. State does not survive a process restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self) -> anyhow::Result<SessionInfo> {
        let info = SessionInfo {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on session store"))?;
        sessions.insert(
            info.id.clone(),
            SessionEntry {
                info: info.clone(),
                state: Arc::new(Mutex::new(AgentState::new())),
            },
        );
        tracing::debug!(session_id = %info.id, "Created session");
        Ok(info)
    }

    async fn acquire(&self, session_id: &SessionId) -> anyhow::Result<SessionGuard> {
        let state = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on session store"))?;
            sessions
                .get(session_id)
                .map(|entry| entry.state.clone())
                .ok_or_else(|| anyhow::anyhow!("Unknown session: {session_id}"))?
        };
        Ok(state.lock_owned().await)
    }

    async fn delete_session(&self, session_id: &SessionId) -> anyhow::Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on session store"))?;
        sessions.remove(session_id);
        tracing::debug!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    async fn list_sessions(&self) -> anyhow::Result<Vec<SessionInfo>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on session store"))?;
        let mut infos: Vec<_> = sessions.values().map(|entry| entry.info.clone()).collect();
        infos.sort_by_key(|info| info.created_at);
        Ok(infos)
    }
}
