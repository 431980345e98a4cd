//! The listening loop
//!
//! Each cycle captures one chunk, transcribes it, interprets the transcript
//! against the current [`SessionState`], and dispatches the resulting
//! [`Action`]. Speech runs in the background on the [`SpeakerController`], so
//! the loop keeps listening while it talks and can hear a stop command.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::command::{Action, CommandInterpreter, SessionState};
use crate::completion::Completer;
use crate::config::SessionConfig;
use crate::speaker::SpeakerController;
use crate::voice::{AudioSource, Transcriber};
use crate::Result;

/// Delay class chosen at the end of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Ordinary pacing before the next capture
    Short,
    /// Speech was started; wait it out before listening again
    Cooldown,
    /// A device failed; back off before retrying
    Backoff,
}

impl Pace {
    /// Concrete delay for this pace
    #[must_use]
    pub const fn delay(self, config: &SessionConfig) -> Duration {
        match self {
            Self::Short => config.pacing,
            Self::Cooldown => config.cooldown,
            Self::Backoff => config.backoff,
        }
    }
}

/// Drives capture, recognition, interpretation, and speech
pub struct SessionLoop {
    source: Box<dyn AudioSource>,
    recognizer: Arc<dyn Transcriber>,
    completer: Arc<dyn Completer>,
    speaker: SpeakerController,
    interpreter: CommandInterpreter,
    config: SessionConfig,
    state: SessionState,
}

impl SessionLoop {
    /// Assemble a session loop
    #[must_use]
    pub fn new(
        source: Box<dyn AudioSource>,
        recognizer: Arc<dyn Transcriber>,
        completer: Arc<dyn Completer>,
        speaker: SpeakerController,
        interpreter: CommandInterpreter,
        config: SessionConfig,
    ) -> Self {
        Self {
            source,
            recognizer,
            completer,
            speaker,
            interpreter,
            state: SessionState::new(config.start_enabled),
            config,
        }
    }

    /// Current session state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The speaker this loop drives
    #[must_use]
    pub const fn speaker(&self) -> &SpeakerController {
        &self.speaker
    }

    /// Run until `shutdown` fires, then silence any active speech
    ///
    /// # Errors
    ///
    /// Never fails today; every cycle error is logged and recovered. The
    /// `Result` leaves room for fatal conditions.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(enabled = self.state.enabled, "session loop started");

        loop {
            let pace = tokio::select! {
                () = shutdown.cancelled() => break,
                pace = self.run_cycle() => pace,
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(pace.delay(&self.config)) => {}
            }
        }

        tracing::info!("shutdown requested");
        self.speaker.shutdown().await;
        Ok(())
    }

    /// Run one capture-to-dispatch cycle and report how to pace the next one
    #[allow(clippy::future_not_send)]
    pub async fn run_cycle(&mut self) -> Pace {
        let samples = match self.source.capture_chunk(self.config.listen_window).await {
            Ok(samples) => samples,
            Err(e) if e.is_device() => {
                tracing::error!(error = %e, "capture failed, backing off");
                return Pace::Backoff;
            }
            Err(e) => {
                tracing::warn!(error = %e, "capture failed");
                return Pace::Short;
            }
        };

        let sample_rate = self.source.sample_rate();
        let transcript = match self.recognizer.transcribe(&samples, sample_rate).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                return Pace::Short;
            }
        };

        if transcript.trim().is_empty() {
            return Pace::Short;
        }

        self.handle_transcript(&transcript).await
    }

    /// Interpret a transcript, commit the new state, and dispatch the action
    #[allow(clippy::future_not_send)]
    pub async fn handle_transcript(&mut self, transcript: &str) -> Pace {
        let (next, action) = self.interpreter.interpret(transcript, self.state);

        if self.config.suppress_while_speaking
            && action != Action::CancelSpeech
            && self.speaker.is_busy()
        {
            tracing::debug!(transcript, ?action, "ignoring transcript while speaking");
            return Pace::Short;
        }

        if next != self.state {
            tracing::info!(enabled = next.enabled, "session state changed");
        }
        self.state = next;

        self.dispatch(action, transcript).await
    }

    #[allow(clippy::future_not_send)]
    async fn dispatch(&self, action: Action, transcript: &str) -> Pace {
        match action {
            Action::CancelSpeech => {
                tracing::info!(transcript, "voice command: stop");
                self.speaker.cancel();
                Pace::Short
            }
            Action::Speak(text) => {
                tracing::info!(transcript, reply = %text, "voice command");
                self.speaker.speak(text);
                Pace::Cooldown
            }
            Action::AskQuestion(question) => {
                tracing::info!(%question, "question");
                match self.completer.complete(&question).await {
                    Ok(answer) => {
                        tracing::info!(%answer, "answer");
                        self.speaker.speak(answer);
                        Pace::Cooldown
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "completion failed");
                        Pace::Short
                    }
                }
            }
            Action::NoOp => {
                if !self.state.enabled && self.interpreter.triggers().addresses(transcript) {
                    tracing::info!("addressed while paused; say the turn-on phrase first");
                }
                Pace::Short
            }
        }
    }
}
