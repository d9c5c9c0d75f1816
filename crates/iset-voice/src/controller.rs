//! Voice capture state machine.
//!
//! Phases move `Idle -> Listening -> Stopping -> Sending -> Idle`, with
//! `Stopping -> Idle` when nothing was heard and `Error` reachable whenever
//! the recognizer fails. A user stop and the recognizer's end-of-speech both
//! go through `stop`, and only the first one out of `Listening` does anything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use iset_chat::SubmissionPipeline;
use iset_core::config::VoiceConfig;
use iset_core::events::{ConversationEvent, EventBus};
use iset_core::types::{InputSource, Turn, VoicePhase};

use crate::error::VoiceError;
use crate::recognizer::{Availability, SpeechEvent, SpeechRecognizer};

/// What ended a listening phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    User,
    EndOfSpeech,
    Timeout,
}

/// Result of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Already listening; the open stream is kept.
    AlreadyListening,
    /// A transcript is being finalized or sent.
    Busy,
}

/// Result of `stop`.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// Not listening, nothing to stop.
    Ignored,
    /// The transcript was empty. No turn was created.
    NothingDetected,
    /// The transcript went through the pipeline. The turn may have failed.
    Submitted(Turn),
}

#[derive(Debug)]
struct Capture {
    phase: VoicePhase,
    transcript: String,
}

struct Inner {
    recognizer: Arc<dyn SpeechRecognizer>,
    pipeline: SubmissionPipeline,
    events: EventBus,
    config: VoiceConfig,
    capture: Mutex<Capture>,
    phase_tx: watch::Sender<VoicePhase>,
}

/// Drives one speech-recognition stream at a time into the submission
/// pipeline. Clones share the same capture.
#[derive(Clone)]
pub struct VoiceCaptureController {
    inner: Arc<Inner>,
}

impl VoiceCaptureController {
    pub fn new(
        recognizer: Arc<dyn SpeechRecognizer>,
        pipeline: SubmissionPipeline,
        config: VoiceConfig,
    ) -> Self {
        let events = pipeline.store().events().clone();
        let (phase_tx, _) = watch::channel(VoicePhase::Idle);
        Self {
            inner: Arc::new(Inner {
                recognizer,
                pipeline,
                events,
                config,
                capture: Mutex::new(Capture {
                    phase: VoicePhase::Idle,
                    transcript: String::new(),
                }),
                phase_tx,
            }),
        }
    }

    fn capture(&self) -> MutexGuard<'_, Capture> {
        self.inner
            .capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> VoicePhase {
        self.capture().phase
    }

    /// Interim transcript collected so far.
    pub fn transcript(&self) -> String {
        self.capture().transcript.clone()
    }

    /// Watch phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<VoicePhase> {
        self.inner.phase_tx.subscribe()
    }

    fn set_phase(&self, capture: &mut Capture, to: VoicePhase) -> Result<(), VoiceError> {
        let from = capture.phase;
        if !from.can_transition_to(&to) {
            tracing::warn!(%from, %to, "Rejected voice transition");
            return Err(VoiceError::InvalidTransition { from, to });
        }
        capture.phase = to;
        tracing::debug!("Voice phase: {} -> {}", from, to);
        self.inner.phase_tx.send_replace(to);
        self.inner
            .events
            .publish(ConversationEvent::VoicePhaseChanged { from, to });
        Ok(())
    }

    fn fail(&self, err: VoiceError) -> VoiceError {
        self.inner.events.error(err.user_message());
        err
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Open a recognition stream.
    ///
    /// Permission is checked before the phase changes. Calling this while
    /// already listening keeps the existing stream.
    pub fn start(&self) -> Result<StartOutcome, VoiceError> {
        let mut capture = self.capture();
        match capture.phase {
            VoicePhase::Listening => {
                tracing::debug!("Voice start ignored, already listening");
                return Ok(StartOutcome::AlreadyListening);
            }
            VoicePhase::Stopping | VoicePhase::Sending => {
                tracing::debug!(phase = %capture.phase, "Voice start ignored, busy");
                return Ok(StartOutcome::Busy);
            }
            VoicePhase::Idle | VoicePhase::Error => {}
        }

        match self.inner.recognizer.availability() {
            Availability::Available => {}
            Availability::PermissionDenied => return Err(self.fail(VoiceError::PermissionDenied)),
            Availability::Unsupported => return Err(self.fail(VoiceError::Unsupported)),
        }

        if let Err(reason) = self.inner.recognizer.start(&self.inner.config.language) {
            let err = VoiceError::Recognizer(reason);
            if capture.phase != VoicePhase::Error {
                self.set_phase(&mut capture, VoicePhase::Error)?;
            }
            return Err(self.fail(err));
        }

        capture.transcript.clear();
        self.set_phase(&mut capture, VoicePhase::Listening)?;
        tracing::info!(language = %self.inner.config.language, "Voice capture started");
        Ok(StartOutcome::Started)
    }

    // =========================================================================
    // Recognizer events
    // =========================================================================

    /// Replace the transcript buffer. Ignored outside `Listening`.
    pub fn on_interim(&self, text: impl Into<String>) {
        let mut capture = self.capture();
        if capture.phase == VoicePhase::Listening {
            capture.transcript = text.into();
        } else {
            tracing::debug!(phase = %capture.phase, "Interim transcript ignored");
        }
    }

    /// The recognizer failed. Releases the stream and drops the transcript.
    pub fn on_error(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut capture = self.capture();
            if !matches!(capture.phase, VoicePhase::Listening | VoicePhase::Stopping) {
                tracing::debug!(phase = %capture.phase, %reason, "Recognizer error ignored");
                return;
            }
            capture.transcript.clear();
            if self.set_phase(&mut capture, VoicePhase::Error).is_err() {
                return;
            }
        }
        self.inner.recognizer.stop();
        tracing::warn!(%reason, "Speech recognition failed");
        self.fail(VoiceError::Recognizer(reason));
    }

    /// Feed one recognizer event.
    pub async fn handle(&self, event: SpeechEvent) -> Result<StopOutcome, VoiceError> {
        match event {
            SpeechEvent::Interim(text) => {
                self.on_interim(text);
                Ok(StopOutcome::Ignored)
            }
            SpeechEvent::EndOfSpeech => self.stop(StopTrigger::EndOfSpeech).await,
            SpeechEvent::Error(reason) => {
                self.on_error(reason);
                Ok(StopOutcome::Ignored)
            }
        }
    }

    // =========================================================================
    // Stop
    // =========================================================================

    /// Close the stream and send what was heard.
    ///
    /// Only the first stop out of `Listening` acts; later ones return
    /// `Ignored`. The controller is back in `Idle` with an empty buffer when
    /// this returns, whatever happened to the submission.
    pub async fn stop(&self, trigger: StopTrigger) -> Result<StopOutcome, VoiceError> {
        let transcript = {
            let mut capture = self.capture();
            if capture.phase != VoicePhase::Listening {
                tracing::debug!(?trigger, phase = %capture.phase, "Voice stop ignored");
                return Ok(StopOutcome::Ignored);
            }
            self.set_phase(&mut capture, VoicePhase::Stopping)?;
            std::mem::take(&mut capture.transcript)
        };
        self.inner.recognizer.stop();
        tracing::info!(?trigger, chars = transcript.chars().count(), "Voice capture stopped");

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            {
                let mut capture = self.capture();
                self.set_phase(&mut capture, VoicePhase::Idle)?;
            }
            self.inner.events.info("Nothing was detected");
            return Ok(StopOutcome::NothingDetected);
        }

        let submission = {
            let mut capture = self.capture();
            self.set_phase(&mut capture, VoicePhase::Sending)?;
            // Appends the turn before the lock is released.
            self.inner.pipeline.submit(transcript, InputSource::Voice)
        };
        let result = submission.await;

        {
            let mut capture = self.capture();
            capture.transcript.clear();
            self.set_phase(&mut capture, VoicePhase::Idle)?;
        }
        match result {
            Ok(turn) => Ok(StopOutcome::Submitted(turn)),
            Err(err) => Err(VoiceError::Submission(err)),
        }
    }

    /// Leave the `Error` phase without starting a new stream.
    pub fn reset(&self) {
        let mut capture = self.capture();
        if capture.phase == VoicePhase::Error {
            let _ = self.set_phase(&mut capture, VoicePhase::Idle);
        }
    }

    // =========================================================================
    // Event pump
    // =========================================================================

    /// Pump recognizer events until the listening phase ends.
    ///
    /// Stops with `Timeout` once `voice.max_listen_secs` have passed and with
    /// `EndOfSpeech` if the event channel closes. Returns the outcome of the
    /// stop this pump issued, or `None` if something else ended the phase.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<SpeechEvent>,
    ) -> Result<Option<StopOutcome>, VoiceError> {
        let max_listen = Duration::from_secs(self.inner.config.max_listen_secs);
        let deadline = tokio::time::Instant::now() + max_listen;
        let mut phase = self.subscribe_phase();

        loop {
            if self.phase() != VoicePhase::Listening {
                return Ok(None);
            }
            tokio::select! {
                event = events.recv() => match event {
                    Some(SpeechEvent::EndOfSpeech) => {
                        return self.stop(StopTrigger::EndOfSpeech).await.map(Some);
                    }
                    Some(event) => {
                        self.handle(event).await?;
                    }
                    None => {
                        tracing::debug!("Recognizer channel closed");
                        return self.stop(StopTrigger::EndOfSpeech).await.map(Some);
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::info!(max_listen_secs = max_listen.as_secs(), "Voice capture timed out");
                    return self.stop(StopTrigger::Timeout).await.map(Some);
                }
                _ = phase.changed() => {}
            }
        }
    }
}
