//! Turn-based debates between two personas.
//!
//! The [`Moderator`] keeps sessions in a [`DebateStore`] and asks the
//! [`CompletionClient`](crate::CompletionClient) for each argument. Generation
//! happens outside the store lock; a turn is recorded only if nobody else
//! recorded it first.

mod moderator;
mod persona;
mod prompt;
mod session;
mod store;

pub use moderator::Moderator;
pub use persona::{Persona, builtin_personas, contrarian, find_persona, optimist, pragmatist, skeptic};
pub use prompt::{TRANSCRIPT_WINDOW, build_prompt, build_request};
pub use session::{Argument, CLOSING_TURNS, DebatePhase, DebateSession, OPENING_TURNS};
pub use store::DebateStore;
