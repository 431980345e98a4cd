//! Voice command interpretation
//!
//! Maps a transcript and the current [`SessionState`] to a new state and the
//! [`Action`] the session loop should perform. Matching is case-insensitive and
//! evaluated in a fixed priority order (stop, turn on, pause, wake prefix) so a
//! transcript carrying several trigger phrases always resolves the same way.

use crate::{Error, Result};

/// Mutable session state, owned by the session loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    /// Whether questions are answered
    pub enabled: bool,
}

impl SessionState {
    /// Create a state with the given enabled flag
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Intent recognized in a single transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interrupt current speech
    Stop,
    /// Enable answering
    TurnOn,
    /// Disable answering
    Pause,
    /// Addressed to the assistant; the remainder may be empty
    Ask(String),
    /// Not addressed to the assistant
    Noise,
}

/// What the session loop should do after a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Cancel the active utterance, if any
    CancelSpeech,
    /// Speak a fixed acknowledgement
    Speak(String),
    /// Send the question to the completion backend and speak the reply
    AskQuestion(String),
    /// Nothing to do
    NoOp,
}

/// Trigger phrases recognized in transcripts
///
/// Phrases are stored normalized (lowercase, punctuation folded to single
/// spaces). Construct with [`Triggers::new`] to get validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triggers {
    stop: String,
    turn_on: String,
    pause: String,
    wake_prefix: String,
}

impl Triggers {
    /// Build a validated trigger set
    ///
    /// # Errors
    ///
    /// Returns error if a phrase is empty, or if one command phrase contains
    /// another (the contained-in phrase could never win under priority order)
    pub fn new(stop: &str, turn_on: &str, pause: &str, wake_prefix: &str) -> Result<Self> {
        let triggers = Self {
            stop: normalize(stop),
            turn_on: normalize(turn_on),
            pause: normalize(pause),
            wake_prefix: wake_prefix.trim().to_lowercase(),
        };

        let named = [
            ("stop", &triggers.stop),
            ("turn_on", &triggers.turn_on),
            ("pause", &triggers.pause),
            ("wake_prefix", &triggers.wake_prefix),
        ];
        if let Some((name, _)) = named.iter().find(|(_, phrase)| phrase.is_empty()) {
            return Err(Error::Config(format!("trigger phrase '{name}' is empty")));
        }

        let commands = &named[..3];
        for (i, (a_name, a)) in commands.iter().enumerate() {
            for (b_name, b) in &commands[i + 1..] {
                if a.contains(b.as_str()) || b.contains(a.as_str()) {
                    return Err(Error::Config(format!(
                        "trigger phrases '{a_name}' and '{b_name}' overlap"
                    )));
                }
            }
        }

        Ok(triggers)
    }

    /// Normalized stop phrase
    #[must_use]
    pub fn stop(&self) -> &str {
        &self.stop
    }

    /// Normalized turn-on phrase
    #[must_use]
    pub fn turn_on(&self) -> &str {
        &self.turn_on
    }

    /// Normalized pause phrase
    #[must_use]
    pub fn pause(&self) -> &str {
        &self.pause
    }

    /// Lowercased wake prefix
    #[must_use]
    pub fn wake_prefix(&self) -> &str {
        &self.wake_prefix
    }

    /// Whether the transcript opens with the wake prefix as a whole token
    #[must_use]
    pub fn addresses(&self, transcript: &str) -> bool {
        strip_prefix_token(transcript.trim(), &self.wake_prefix).is_some()
    }
}

impl Default for Triggers {
    fn default() -> Self {
        Self {
            stop: "sovra stop".to_string(),
            turn_on: "sovra turn on".to_string(),
            pause: "sovra pause".to_string(),
            wake_prefix: "sovra".to_string(),
        }
    }
}

/// Spoken acknowledgements for state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgements {
    /// Spoken when answering is switched on
    pub turned_on: String,
    /// Spoken when turn-on is heard while already on
    pub already_on: String,
    /// Spoken when answering is paused
    pub paused: String,
}

impl Default for Acknowledgements {
    fn default() -> Self {
        Self {
            turned_on: "Sovra is now on and listening.".to_string(),
            already_on: "Sovra is already on.".to_string(),
            paused: "Sovra is now paused.".to_string(),
        }
    }
}

impl Command {
    /// Classify a transcript
    ///
    /// Order matters: the stop phrase is checked before anything else, and the
    /// wake prefix is only considered when no command phrase matched.
    #[must_use]
    pub fn parse(transcript: &str, triggers: &Triggers) -> Self {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Self::Noise;
        }

        let normalized = normalize(transcript);
        if normalized.contains(triggers.stop()) {
            return Self::Stop;
        }
        if normalized.contains(triggers.turn_on()) {
            return Self::TurnOn;
        }
        if normalized.contains(triggers.pause()) {
            return Self::Pause;
        }

        strip_prefix_token(transcript, triggers.wake_prefix()).map_or(Self::Noise, |rest| {
            let remainder = rest.trim_start_matches(|c: char| !c.is_alphanumeric()).trim_end();
            Self::Ask(remainder.to_string())
        })
    }
}

/// Pure decision function over transcripts
#[derive(Debug, Clone, Default)]
pub struct CommandInterpreter {
    triggers: Triggers,
    acks: Acknowledgements,
}

impl CommandInterpreter {
    /// Create an interpreter
    #[must_use]
    pub const fn new(triggers: Triggers, acks: Acknowledgements) -> Self {
        Self { triggers, acks }
    }

    /// Configured triggers
    #[must_use]
    pub const fn triggers(&self) -> &Triggers {
        &self.triggers
    }

    /// Decide the next state and action for a transcript
    #[must_use]
    pub fn interpret(&self, transcript: &str, state: SessionState) -> (SessionState, Action) {
        match Command::parse(transcript, &self.triggers) {
            Command::Stop => (state, Action::CancelSpeech),
            Command::TurnOn => {
                let ack = if state.enabled {
                    &self.acks.already_on
                } else {
                    &self.acks.turned_on
                };
                (SessionState::new(true), Action::Speak(ack.clone()))
            }
            Command::Pause => {
                if state.enabled {
                    (SessionState::new(false), Action::Speak(self.acks.paused.clone()))
                } else {
                    (state, Action::NoOp)
                }
            }
            Command::Ask(question) if !question.is_empty() && state.enabled => {
                (state, Action::AskQuestion(question))
            }
            Command::Ask(_) | Command::Noise => (state, Action::NoOp),
        }
    }
}

/// Lowercase and fold punctuation runs into single spaces
///
/// Apostrophes are kept so contractions survive ("what's").
fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .to_lowercase();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Return the text following `prefix` if the transcript starts with it as a
/// whole token (so "sovra" does not match "sovrano")
pub(crate) fn strip_prefix_token<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.to_lowercase() != prefix {
        return None;
    }

    let rest = &text[prefix.len()..];
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() => None,
        _ => Some(rest),
    }
}
