//! Serialized, interruptible speech output
//!
//! [`SpeakerController`] owns the single "currently speaking" slot. Every
//! utterance runs on its own task with its own cancellation token, and a
//! playback gate guarantees that at most one task produces audio at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::voice::Synthesizer;

/// How long shutdown waits for the active utterance to release the speaker
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Poll interval for [`SpeakerController::wait_until_idle`]
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Monotonic utterance identifier
pub type SpeechId = u64;

/// A submitted utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Unique id, increasing with each submission
    pub id: SpeechId,
    /// Text being spoken
    pub text: String,
}

/// Snapshot of the speaking slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpeakingStatus {
    /// Whether an utterance is active
    pub is_speaking: bool,
    /// Id of the active utterance
    pub current_id: Option<SpeechId>,
}

struct Active {
    id: SpeechId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Slot {
    next_id: SpeechId,
    active: Option<Active>,
}

/// Serializes speech through one active utterance at a time
pub struct SpeakerController {
    synth: Arc<dyn Synthesizer>,
    slot: Arc<Mutex<Slot>>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl SpeakerController {
    /// Create a controller around a synthesis backend
    #[must_use]
    pub fn new(synth: Arc<dyn Synthesizer>) -> Self {
        Self {
            synth,
            slot: Arc::new(Mutex::new(Slot::default())),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Start speaking `text` on a background task and return immediately
    ///
    /// An utterance that is still active is cancelled first; the new one
    /// starts once the old one has released the speaker.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime
    pub fn speak(&self, text: impl Into<String>) -> SpeechRequest {
        let text = text.into();
        let cancel = CancellationToken::new();

        let mut slot = lock(&self.slot);
        slot.next_id += 1;
        let id = slot.next_id;

        let previous = slot.active.replace(Active {
            id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            tracing::debug!(superseded = previous.id, id, "superseding active utterance");
            previous.cancel.cancel();
        }

        tokio::spawn(run_utterance(
            Arc::clone(&self.synth),
            StatusGuard {
                slot: Arc::clone(&self.slot),
                id,
            },
            Arc::clone(&self.gate),
            text.clone(),
            cancel,
        ));
        drop(slot);

        tracing::debug!(id, "speech queued");
        SpeechRequest { id, text }
    }

    /// Stop the active utterance mid-sentence
    ///
    /// Returns `false` (and does nothing else) when nothing is being spoken.
    pub fn cancel(&self) -> bool {
        let active = lock(&self.slot).active.take();

        match active {
            Some(active) => {
                tracing::info!(id = active.id, "interrupting speech");
                active.cancel.cancel();
                true
            }
            None => {
                tracing::info!("cancel requested, but nothing is being spoken");
                false
            }
        }
    }

    /// Whether an utterance is active
    #[must_use]
    pub fn is_busy(&self) -> bool {
        lock(&self.slot).active.is_some()
    }

    /// Current speaking status
    #[must_use]
    pub fn status(&self) -> SpeakingStatus {
        let current_id = lock(&self.slot).active.as_ref().map(|a| a.id);
        SpeakingStatus {
            is_speaking: current_id.is_some(),
            current_id,
        }
    }

    /// Wait until no utterance is active
    pub async fn wait_until_idle(&self) {
        while self.is_busy() {
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Cancel any active speech and wait for the speaker to go quiet
    pub async fn shutdown(&self) {
        if self.is_busy() {
            self.cancel();
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, self.gate.lock())
            .await
            .is_err()
        {
            tracing::warn!("speech task did not stop within shutdown grace period");
        }
    }
}

/// Clears the speaking slot when an utterance task ends, however it ends
///
/// Only clears the slot if it still holds this utterance, so a superseded
/// task finishing late never marks a newer utterance idle.
struct StatusGuard {
    slot: Arc<Mutex<Slot>>,
    id: SpeechId,
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.active.as_ref().is_some_and(|a| a.id == self.id) {
            slot.active = None;
            tracing::debug!(id = self.id, "speech finished");
        }
    }
}

async fn run_utterance(
    synth: Arc<dyn Synthesizer>,
    guard: StatusGuard,
    gate: Arc<tokio::sync::Mutex<()>>,
    text: String,
    cancel: CancellationToken,
) {
    let id = guard.id;

    let _permit = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(id, "cancelled before playback started");
            return;
        }
        permit = gate.lock_owned() => permit,
    };

    if cancel.is_cancelled() {
        return;
    }

    if let Err(e) = synth.speak(&text, &cancel).await {
        tracing::error!(id, error = %e, "speech synthesis failed");
    }

    drop(guard);
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
