//! Shared test utilities
//!
//! In-memory stand-ins for the microphone, recognizer, completion backend,
//! and speech output, so the session can be driven without hardware or
//! network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sovra::config::SessionConfig;
use sovra::voice::{AudioSource, Synthesizer, Transcriber};
use sovra::{
    Acknowledgements, CommandInterpreter, Completer, CompletionError, Error, Result,
    SessionLoop, SpeakerController, Triggers,
};

/// Session timings short enough for tests
#[must_use]
pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        listen_window: Duration::from_millis(5),
        cooldown: Duration::from_millis(10),
        pacing: Duration::from_millis(1),
        backoff: Duration::from_millis(20),
        start_enabled: true,
        suppress_while_speaking: true,
    }
}

/// Interpreter with the default triggers and acknowledgements
#[must_use]
pub fn default_interpreter() -> CommandInterpreter {
    CommandInterpreter::new(Triggers::default(), Acknowledgements::default())
}

/// Audio source that replays queued chunks, then yields silence
pub struct ScriptedSource {
    chunks: VecDeque<Result<Vec<f32>>>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(chunks: Vec<Result<Vec<f32>>>) -> Self {
        Self {
            chunks: chunks.into(),
        }
    }

    /// Source that only ever yields silence
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait(?Send)]
impl AudioSource for ScriptedSource {
    async fn capture_chunk(&mut self, duration: Duration) -> Result<Vec<f32>> {
        tokio::time::sleep(duration).await;
        self.chunks.pop_front().unwrap_or_else(|| Ok(vec![0.0; 160]))
    }

    fn sample_rate(&self) -> u32 {
        16000
    }
}

/// Recognizer that replays queued transcripts, then hears nothing
#[derive(Default)]
pub struct ScriptedTranscriber {
    transcripts: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedTranscriber {
    #[must_use]
    pub fn new(transcripts: Vec<Result<String>>) -> Self {
        Self {
            transcripts: Mutex::new(transcripts.into()),
        }
    }

    /// Recognizer hearing each phrase once, in order
    #[must_use]
    pub fn hearing(phrases: &[&str]) -> Self {
        Self::new(phrases.iter().map(|p| Ok((*p).to_string())).collect())
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _samples: &[f32], _sample_rate: u32) -> Result<String> {
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Completion backend with a fixed answer, or a transport failure when `None`
pub struct FakeCompleter {
    answer: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompleter {
    #[must_use]
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            answer: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completer for FakeCompleter {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer.clone().ok_or_else(|| {
            Error::Completion(CompletionError::Transport("connection refused".to_string()))
        })
    }
}

/// What a [`RecordingSynthesizer`] observed
#[derive(Default)]
pub struct SpeechLog {
    spoken: Mutex<Vec<String>>,
    chunks: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    cancelled: AtomicUsize,
    finished: AtomicUsize,
}

impl SpeechLog {
    /// Texts whose playback started, in order
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    /// Audio chunks emitted across all utterances
    pub fn chunks(&self) -> usize {
        self.chunks.load(Ordering::SeqCst)
    }

    /// Utterances producing audio right now
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of utterances ever producing audio at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Utterances stopped by their cancellation token
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Utterances that played to the end
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Synthesizer that "plays" a fixed number of 5ms chunks per utterance
pub struct RecordingSynthesizer {
    chunks_per_utterance: usize,
    log: Arc<SpeechLog>,
}

impl RecordingSynthesizer {
    #[must_use]
    pub fn new(chunks_per_utterance: usize) -> (Self, Arc<SpeechLog>) {
        let log = Arc::new(SpeechLog::default());
        let synth = Self {
            chunks_per_utterance,
            log: Arc::clone(&log),
        };
        (synth, log)
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        self.log.spoken.lock().unwrap().push(text.to_string());
        let now = self.log.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_active.fetch_max(now, Ordering::SeqCst);

        let mut interrupted = false;
        for _ in 0..self.chunks_per_utterance {
            tokio::select! {
                () = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                () = tokio::time::sleep(Duration::from_millis(5)) => {}
            }
            self.log.chunks.fetch_add(1, Ordering::SeqCst);
        }

        self.log.active.fetch_sub(1, Ordering::SeqCst);
        if interrupted {
            self.log.cancelled.fetch_add(1, Ordering::SeqCst);
        } else {
            self.log.finished.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Speaker backed by a [`RecordingSynthesizer`]
#[must_use]
pub fn recording_speaker(chunks_per_utterance: usize) -> (SpeakerController, Arc<SpeechLog>) {
    let (synth, log) = RecordingSynthesizer::new(chunks_per_utterance);
    (SpeakerController::new(Arc::new(synth)), log)
}

/// Fully faked session loop
pub struct Harness {
    pub session: SessionLoop,
    pub completer: Arc<FakeCompleter>,
    pub log: Arc<SpeechLog>,
}

impl Harness {
    #[must_use]
    pub fn new(
        source: ScriptedSource,
        transcriber: ScriptedTranscriber,
        completer: FakeCompleter,
        chunks_per_utterance: usize,
        config: SessionConfig,
    ) -> Self {
        let completer = Arc::new(completer);
        let (speaker, log) = recording_speaker(chunks_per_utterance);
        let session = SessionLoop::new(
            Box::new(source),
            Arc::new(transcriber),
            Arc::clone(&completer) as Arc<dyn Completer>,
            speaker,
            default_interpreter(),
            config,
        );
        Self {
            session,
            completer,
            log,
        }
    }

    /// Harness driven by direct transcripts rather than audio
    #[must_use]
    pub fn with_answer(answer: &str, chunks_per_utterance: usize) -> Self {
        Self::new(
            ScriptedSource::silent(),
            ScriptedTranscriber::default(),
            FakeCompleter::answering(answer),
            chunks_per_utterance,
            fast_session_config(),
        )
    }
}

/// Wait for the speaker to go idle, failing the test after a second
pub async fn settle(speaker: &SpeakerController) {
    tokio::time::timeout(Duration::from_secs(1), speaker.wait_until_idle())
        .await
        .expect("speaker should go idle");
}
