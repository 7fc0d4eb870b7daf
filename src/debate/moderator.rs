//! Drives debates turn by turn through the resilient completion client.

use futures::future::join_all;
use uuid::Uuid;

use super::persona::Persona;
use super::prompt::build_request;
use super::session::{Argument, DebateSession};
use super::store::DebateStore;
use crate::client::CompletionClient;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct Moderator {
    client: CompletionClient,
    store: DebateStore,
}

impl Moderator {
    pub fn new(client: CompletionClient) -> Self {
        Self::with_store(client, DebateStore::new())
    }

    pub fn with_store(client: CompletionClient, store: DebateStore) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    pub fn store(&self) -> &DebateStore {
        &self.store
    }

    pub fn start(
        &self,
        topic: impl Into<String>,
        first: Persona,
        second: Persona,
        total_turns: u32,
    ) -> Result<Uuid> {
        let session = DebateSession::new(topic, first, second, total_turns)?;
        tracing::info!(
            debate_id = %session.id,
            topic = %session.topic,
            first = %session.personas[0].name,
            second = %session.personas[1].name,
            total_turns,
            "Debate started"
        );
        Ok(self.store.insert(session))
    }

    /// Generates and records the next argument.
    ///
    /// A failed completion leaves the session untouched, so the same turn can
    /// be retried later. While the circuit is open this fails immediately
    /// with [`Error::CircuitOpen`].
    pub async fn next_argument(&self, id: Uuid) -> Result<Argument> {
        let snapshot = self.store.get(id)?;
        if snapshot.is_finished() {
            return Err(Error::Session(format!("debate {} is finished", id)));
        }

        let request = build_request(&snapshot);
        let text = match self.client.complete(request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(
                    debate_id = %id,
                    turn = snapshot.turn,
                    speaker = %snapshot.speaker().name,
                    error = %e,
                    "Argument generation failed"
                );
                return Err(e);
            }
        };

        let argument = self.store.update(id, |session| {
            session.record_turn(snapshot.turn, text, snapshot.pending_curveball.clone())
        })?;
        tracing::debug!(
            debate_id = %id,
            turn = argument.turn,
            speaker = %argument.speaker,
            phase = %argument.phase,
            "Argument recorded"
        );
        Ok(argument)
    }

    /// Advances several debates concurrently. Results keep the order of `ids`.
    pub async fn next_arguments(&self, ids: &[Uuid]) -> Vec<Result<Argument>> {
        join_all(ids.iter().map(|&id| self.next_argument(id))).await
    }

    /// Plays the remaining turns of a debate and returns the arguments added.
    /// Stops at the first failure; turns recorded before it are kept.
    pub async fn run(&self, id: Uuid) -> Result<Vec<Argument>> {
        let mut added = Vec::new();
        while !self.store.get(id)?.is_finished() {
            added.push(self.next_argument(id).await?);
        }
        Ok(added)
    }

    pub fn curveball(&self, id: Uuid, text: impl Into<String>) -> Result<()> {
        self.store.update(id, |session| session.inject_curveball(text))?;
        tracing::info!(debate_id = %id, "Curveball injected");
        Ok(())
    }

    pub fn session(&self, id: Uuid) -> Result<DebateSession> {
        self.store.get(id)
    }
}
