//! Debate session state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::persona::Persona;
use crate::{Error, Result};

/// Turns at the start (and end) of a debate spent on opening (closing)
/// statements.
pub const OPENING_TURNS: u32 = 2;
pub const CLOSING_TURNS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    Opening,
    Rebuttal,
    Closing,
    Finished,
}

impl DebatePhase {
    /// Opening wins over Closing when a short debate has both.
    pub fn for_turn(turn: u32, total_turns: u32) -> Self {
        if turn >= total_turns {
            DebatePhase::Finished
        } else if turn < OPENING_TURNS {
            DebatePhase::Opening
        } else if turn >= total_turns.saturating_sub(CLOSING_TURNS) {
            DebatePhase::Closing
        } else {
            DebatePhase::Rebuttal
        }
    }

    pub(crate) fn instruction(&self) -> &'static str {
        match self {
            DebatePhase::Opening => "Give your opening statement. Lay out your position clearly.",
            DebatePhase::Rebuttal => {
                "Rebut your opponent's most recent argument directly, then strengthen your own case."
            }
            DebatePhase::Closing => {
                "Give your closing statement. Summarise why your position should prevail."
            }
            DebatePhase::Finished => "The debate is over.",
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebatePhase::Opening => write!(f, "opening"),
            DebatePhase::Rebuttal => write!(f, "rebuttal"),
            DebatePhase::Closing => write!(f, "closing"),
            DebatePhase::Finished => write!(f, "finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub speaker: String,
    pub phase: DebatePhase,
    pub turn: u32,
    pub text: String,
    /// Curveball the speaker had to address, if one was pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curveball: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub id: Uuid,
    pub topic: String,
    pub personas: [Persona; 2],
    pub total_turns: u32,
    pub turn: u32,
    pub arguments: Vec<Argument>,
    pub pending_curveball: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(topic: impl Into<String>, first: Persona, second: Persona, total_turns: u32) -> Result<Self> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(Error::InvalidRequest("debate topic must not be empty".into()));
        }
        if total_turns == 0 {
            return Err(Error::InvalidRequest("a debate needs at least one turn".into()));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            topic,
            personas: [first, second],
            total_turns,
            turn: 0,
            arguments: Vec::new(),
            pending_curveball: None,
            created_at: Utc::now(),
        })
    }

    pub fn phase(&self) -> DebatePhase {
        DebatePhase::for_turn(self.turn, self.total_turns)
    }

    pub fn is_finished(&self) -> bool {
        self.phase() == DebatePhase::Finished
    }

    /// Personas alternate, starting with the first.
    pub fn speaker(&self) -> &Persona {
        &self.personas[(self.turn % 2) as usize]
    }

    pub fn opponent(&self) -> &Persona {
        &self.personas[((self.turn + 1) % 2) as usize]
    }

    /// Queues a twist for the next speaker. A newer curveball replaces an
    /// unanswered one.
    pub fn inject_curveball(&mut self, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidRequest("curveball must not be empty".into()));
        }
        if self.is_finished() {
            return Err(Error::Session(format!("debate {} is finished", self.id)));
        }
        self.pending_curveball = Some(text.trim().to_string());
        Ok(())
    }

    /// Records the current speaker's argument, consuming any pending
    /// curveball, and advances the turn.
    pub fn record(&mut self, text: impl Into<String>) -> Result<Argument> {
        let answered = self.pending_curveball.clone();
        self.record_turn(self.turn, text, answered)
    }

    /// Records an argument generated from a snapshot taken at `turn`.
    ///
    /// Fails if another argument was recorded for that turn in the meantime.
    /// Only the curveball the speaker actually saw is cleared; one injected
    /// during generation stays pending for the next speaker.
    pub fn record_turn(
        &mut self,
        turn: u32,
        text: impl Into<String>,
        answered: Option<String>,
    ) -> Result<Argument> {
        let phase = self.phase();
        if phase == DebatePhase::Finished {
            return Err(Error::Session(format!("debate {} is finished", self.id)));
        }
        if turn != self.turn {
            return Err(Error::Session(format!(
                "turn {} of debate {} was already taken",
                turn, self.id
            )));
        }

        if answered.is_some() && self.pending_curveball == answered {
            self.pending_curveball = None;
        }
        let argument = Argument {
            speaker: self.speaker().name.clone(),
            phase,
            turn,
            text: text.into(),
            curveball: answered,
        };
        self.arguments.push(argument.clone());
        self.turn += 1;
        Ok(argument)
    }
}
