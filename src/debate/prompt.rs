//! Prompt construction for the current speaker.

use std::fmt::Write;

use super::session::DebateSession;
use crate::client::CompletionRequest;

/// Most recent arguments quoted back to the speaker.
pub const TRANSCRIPT_WINDOW: usize = 6;

/// Returns `(system, user)` prompts for whoever speaks next.
pub fn build_prompt(session: &DebateSession) -> (String, String) {
    let speaker = session.speaker();
    let opponent = session.opponent();

    let system = format!(
        "You are {name}, a debater.\nStance: {stance}\nStyle: {style}\n\
         Stay in character. Answer in one or two short paragraphs without headings.",
        name = speaker.name,
        stance = speaker.stance,
        style = speaker.style,
    );

    let mut user = format!(
        "Debate topic: {}\nYour opponent is {}.\n",
        session.topic, opponent.name
    );

    let skip = session.arguments.len().saturating_sub(TRANSCRIPT_WINDOW);
    if !session.arguments.is_empty() {
        user.push_str("\nTranscript so far:\n");
        for argument in session.arguments.iter().skip(skip) {
            let _ = writeln!(user, "[{}] {}: {}", argument.phase, argument.speaker, argument.text);
        }
    }

    if let Some(curveball) = &session.pending_curveball {
        let _ = write!(
            user,
            "\nThe moderator has introduced a curveball you must address: {}\n",
            curveball
        );
    }

    let _ = write!(user, "\n{}", session.phase().instruction());
    (system, user)
}

pub fn build_request(session: &DebateSession) -> CompletionRequest {
    let (system, user) = build_prompt(session);
    CompletionRequest::new(user).with_system(system)
}
