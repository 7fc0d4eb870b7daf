//! In-memory debate storage.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::session::DebateSession;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct DebateStore {
    sessions: Arc<DashMap<Uuid, DebateSession>>,
}

impl DebateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: DebateSession) -> Uuid {
        let id = session.id;
        self.sessions.insert(id, session);
        id
    }

    /// Snapshot of the session.
    pub fn get(&self, id: Uuid) -> Result<DebateSession> {
        self.sessions
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or_else(|| not_found(id))
    }

    /// Runs `f` under the entry lock. Must not await.
    pub fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut DebateSession) -> Result<T>) -> Result<T> {
        let mut entry = self.sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        f(entry.value_mut())
    }

    pub fn remove(&self, id: Uuid) -> Option<DebateSession> {
        self.sessions.remove(&id).map(|(_, v)| v)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn not_found(id: Uuid) -> Error {
    Error::Session(format!("debate {} not found", id))
}
