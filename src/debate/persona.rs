//! Built-in debate personas.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    /// Position the persona argues from, phrased as an instruction.
    pub stance: String,
    pub style: String,
}

impl Persona {
    pub fn new(
        name: impl Into<String>,
        stance: impl Into<String>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stance: stance.into(),
            style: style.into(),
        }
    }
}

/// Optimist - sees the upside first.
pub fn optimist() -> Persona {
    Persona::new(
        "Optimist",
        "Argue for the benefits and opportunities of the proposition.",
        "Warm and energetic, backs claims with hopeful but concrete examples.",
    )
}

/// Skeptic - demands evidence.
pub fn skeptic() -> Persona {
    Persona::new(
        "Skeptic",
        "Question the proposition and expose weak evidence or hidden costs.",
        "Calm and precise, asks pointed questions before conceding anything.",
    )
}

/// Pragmatist - cares about what works.
pub fn pragmatist() -> Persona {
    Persona::new(
        "Pragmatist",
        "Weigh trade-offs and argue for the most workable middle ground.",
        "Plain-spoken, focuses on cost, feasibility and implementation detail.",
    )
}

/// Contrarian - takes the opposite of whatever was just said.
pub fn contrarian() -> Persona {
    Persona::new(
        "Contrarian",
        "Take the opposing side of the previous speaker's strongest point.",
        "Provocative and witty, reframes the question in unexpected ways.",
    )
}

pub fn builtin_personas() -> Vec<Persona> {
    vec![optimist(), skeptic(), pragmatist(), contrarian()]
}

/// Case-insensitive lookup among [`builtin_personas`].
pub fn find_persona(name: &str) -> Option<Persona> {
    let name = name.trim();
    builtin_personas()
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}
