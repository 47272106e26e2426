use crate::capture::device::{AudioAnalyser, DeviceProvider, MediaStream, SpeechSession, TranscriptSink};
use crate::capture::sampling::{CancelToken, FrameClock, SamplingLoop};
use crate::capture::{
    lock_shared, AcquireGuard, AcquisitionError, CaptureEvent, CaptureState, Lifecycle, SessionId,
    StartOutcome,
};
use crate::config::{SpeechSettings, DEFAULT_ANALYSER_WINDOW, DEFAULT_EVENT_CAPACITY};
use crate::emotion::{EmotionVector, TextScorer};
use crate::signal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

const LOG_TARGET: &str = "capture::audio";

/// Sent on every sampling tick while a microphone session is active.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AudioUpdate {
    pub session: SessionId,
    /// Roughly 0..1, may exceed 1 on clipping input.
    pub energy: f32,
    /// `None` while no speech recognizer is attached or nothing was recognized yet.
    pub transcript: Option<String>,
}

impl AudioUpdate {
    /// Scores the transcript; a missing transcript scores as empty text.
    pub fn transcript_emotion(&self, scorer: &dyn TextScorer) -> EmotionVector {
        scorer.score(self.transcript.as_deref().unwrap_or(""))
    }
}

type SharedAnalyser = Arc<Mutex<Option<Box<dyn AudioAnalyser>>>>;

/// Handles owned by one microphone session. Released together, in order.
struct AudioSession {
    id: SessionId,
    stream: Option<Box<dyn MediaStream>>,
    analyser: SharedAnalyser,
    speech: Option<Box<dyn SpeechSession>>,
    transcript: watch::Receiver<Option<String>>,
    sampler: Option<SamplingLoop>,
}

impl AudioSession {
    /// Cancels the sampler and waits out a tick in flight, so nothing is sent afterwards.
    fn halt_sampling(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
        }
        drop(lock_shared(&self.analyser));
    }

    fn release(&mut self) {
        self.halt_sampling();

        if let Some(mut speech) = self.speech.take() {
            if let Err(e) = speech.stop() {
                tracing::warn!(target: LOG_TARGET, session = %self.id, error = %e, "ignoring speech teardown fault");
            }
        }

        let analyser = lock_shared(&self.analyser).take();
        if let Some(mut analyser) = analyser {
            if let Err(e) = analyser.close() {
                tracing::warn!(target: LOG_TARGET, session = %self.id, error = %e, "ignoring analyser teardown fault");
            }
        }

        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            tracing::debug!(target: LOG_TARGET, session = %self.id, device = stream.label(), "microphone released");
        }
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Microphone capture manager: at most one [`AudioSession`] at a time.
pub struct AudioCapture {
    provider: Arc<dyn DeviceProvider>,
    clock: Arc<dyn FrameClock>,
    speech: SpeechSettings,
    window: usize,
    lifecycle: Lifecycle<AudioUpdate>,
    session: Option<AudioSession>,
}

impl AudioCapture {
    pub fn new(provider: Arc<dyn DeviceProvider>, clock: Arc<dyn FrameClock>) -> Self {
        Self {
            provider,
            clock,
            speech: SpeechSettings::default(),
            window: DEFAULT_ANALYSER_WINDOW,
            lifecycle: Lifecycle::new("audio", DEFAULT_EVENT_CAPACITY),
            session: None,
        }
    }

    pub fn with_speech_settings(mut self, speech: SpeechSettings) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_analyser_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.lifecycle = Lifecycle::new("audio", capacity);
        self
    }

    pub fn state(&self) -> CaptureState {
        self.lifecycle.state()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent<AudioUpdate>> {
        self.lifecycle.subscribe()
    }

    /// Acquires the microphone and starts sampling. A no-op while a session is running.
    ///
    /// Failures are logged and broadcast as [`CaptureEvent::StartFailed`]; the manager is
    /// back in [`CaptureState::Idle`] and a later call may retry.
    pub async fn start(&mut self) -> StartOutcome {
        if let Some(id) = self.current_session() {
            tracing::debug!(target: LOG_TARGET, session = %id, "start ignored, session already running");
            return StartOutcome::AlreadyRunning(id);
        }
        if self.state() != CaptureState::Idle {
            tracing::debug!(target: LOG_TARGET, state = %self.state(), "start ignored, not idle");
            return StartOutcome::Failed;
        }

        let guard = AcquireGuard::begin(&mut self.lifecycle);
        let session = match Self::acquire(self.provider.as_ref(), &self.speech).await {
            Ok(session) => session,
            Err(e) => {
                guard.fail(&e);
                return StartOutcome::Failed;
            }
        };

        let id = session.id;
        let analyser = Arc::clone(&session.analyser);
        let transcript = session.transcript.clone();
        self.session = Some(session);
        guard.activate();

        let sampler = self.spawn_sampler(id, analyser, transcript);
        if let Some(session) = self.session.as_mut() {
            session.sampler = Some(sampler);
        }
        tracing::info!(target: LOG_TARGET, session = %id, "audio capture active");
        StartOutcome::Started(id)
    }

    async fn acquire(
        provider: &dyn DeviceProvider,
        speech_settings: &SpeechSettings,
    ) -> Result<AudioSession, AcquisitionError> {
        let mut stream = provider.acquire_audio().await?;

        let analyser = match provider.audio_analyser(stream.as_ref()) {
            Ok(a) => a,
            Err(e) => {
                stream.stop_tracks();
                return Err(e);
            }
        };

        let (sink, transcript) = TranscriptSink::new();
        let speech = match provider.speech_session(speech_settings) {
            Some(mut speech) => match speech.start(sink) {
                Ok(()) => Some(speech),
                Err(e) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "speech recognition failed to start, continuing without transcript");
                    None
                }
            },
            None => {
                tracing::debug!(target: LOG_TARGET, "speech recognition unsupported, continuing without transcript");
                None
            }
        };

        Ok(AudioSession {
            id: SessionId::next(),
            stream: Some(stream),
            analyser: Arc::new(Mutex::new(Some(analyser))),
            speech,
            transcript,
            sampler: None,
        })
    }

    fn spawn_sampler(
        &self,
        id: SessionId,
        analyser: SharedAnalyser,
        transcript: watch::Receiver<Option<String>>,
    ) -> SamplingLoop {
        let events = self.lifecycle.sender();
        let mut window: Vec<f32> = Vec::with_capacity(self.window);

        SamplingLoop::spawn(Arc::clone(&self.clock), move |token: &CancelToken| {
            // Held through the send: stop() takes this lock after cancelling.
            let mut guard = lock_shared(&analyser);
            let Some(a) = guard.as_mut() else {
                return;
            };
            if token.is_cancelled() {
                return;
            }
            a.read_time_domain(&mut window);
            let update = AudioUpdate {
                session: id,
                energy: signal::energy(&window, a.signal_format()),
                transcript: transcript.borrow().clone(),
            };
            let _ = events.send(CaptureEvent::Update(update));
        })
    }

    /// Stops whatever session is running. A no-op when idle.
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.halt_sampling();
        self.lifecycle.transition(CaptureState::Stopping);
        session.release();
        self.lifecycle.transition(CaptureState::Idle);
        tracing::info!(target: LOG_TARGET, session = %session.id, "audio capture stopped");
    }

    /// Stops `id` if it is the running session. Returns whether anything was stopped.
    pub fn stop_session(&mut self, id: SessionId) -> bool {
        if self.current_session() != Some(id) {
            tracing::debug!(target: LOG_TARGET, session = %id, "stop ignored, not the running session");
            return false;
        }
        self.stop();
        true
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
