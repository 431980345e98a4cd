//! Sovra - always-listening voice co-host
//!
//! This library provides the core of the Sovra voice loop:
//! - Audio capture and playback (cpal)
//! - Speech-to-text and text-to-speech over HTTP
//! - Voice command interpretation (stop, turn on, pause, questions)
//! - Interruptible, serialized speech output
//! - Remote chat completion for answering questions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌────────────────────┐
//! │ AudioCapture │──▶│ Transcriber │──▶│ CommandInterpreter │
//! └──────────────┘   └─────────────┘   └─────────┬──────────┘
//!                                                │ Action
//!                   ┌────────────────────────────┼───────────────┐
//!                   ▼                            ▼               ▼
//!          ┌───────────────────┐        ┌───────────────┐    (no-op)
//!          │ SpeakerController │◀───────│   Completer   │
//!          └─────────┬─────────┘        └───────────────┘
//!                    ▼
//!            ┌───────────────┐
//!            │  Synthesizer  │  (background task, cancellable)
//!            └───────────────┘
//! ```
//!
//! [`SessionLoop`] owns the cycle and the [`SessionState`]; speech runs
//! concurrently so a stop command can interrupt it mid-sentence.

pub mod command;
pub mod completion;
pub mod config;
pub mod error;
pub mod session;
pub mod speaker;
pub mod voice;

pub use command::{Acknowledgements, Action, Command, CommandInterpreter, SessionState, Triggers};
pub use completion::{Completer, CompletionClient};
pub use config::Config;
pub use error::{CompletionError, Error, Result};
pub use session::{Pace, SessionLoop};
pub use speaker::{SpeakerController, SpeakingStatus, SpeechId, SpeechRequest};
