//! The surface a presentation layer talks to.

use crate::capture::{
    AudioCapture, AudioUpdate, CaptureEvent, CaptureState, DeviceProvider, FrameClock,
    IntervalFrameClock, SessionId, StartOutcome, VideoCapture, VideoUpdate,
};
use crate::config::EngineConfig;
use crate::emotion::{EmotionVector, Lexicon, TextScorer};
use crate::pixel::{self, RasterSource};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Owns one audio and one video capture manager plus the text and image scorers.
pub struct AffectEngine {
    config: EngineConfig,
    scorer: Arc<dyn TextScorer>,
    audio: AudioCapture,
    video: VideoCapture,
}

impl AffectEngine {
    /// Ticks at `config.refresh`.
    pub fn new(config: EngineConfig, provider: Arc<dyn DeviceProvider>) -> Self {
        let clock = Arc::new(IntervalFrameClock::new(config.refresh));
        Self::with_clock(config, provider, clock)
    }

    pub fn with_clock(
        config: EngineConfig,
        provider: Arc<dyn DeviceProvider>,
        clock: Arc<dyn FrameClock>,
    ) -> Self {
        let audio = AudioCapture::new(Arc::clone(&provider), Arc::clone(&clock))
            .with_speech_settings(config.speech.clone())
            .with_analyser_window(config.analyser_window)
            .with_event_capacity(config.event_capacity);
        let video = VideoCapture::new(provider, clock)
            .with_raster_width(config.raster_width)
            .with_event_capacity(config.event_capacity);

        tracing::debug!(
            refresh_hz = config.refresh.hz,
            raster_width = config.raster_width.get(),
            speech_lang = %config.speech.lang.as_str(),
            "affect engine ready"
        );

        Self {
            config,
            scorer: Arc::new(Lexicon::default()),
            audio,
            video,
        }
    }

    pub fn with_text_scorer(mut self, scorer: Arc<dyn TextScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn text_scorer(&self) -> &dyn TextScorer {
        self.scorer.as_ref()
    }

    pub fn score_text(&self, text: &str) -> EmotionVector {
        self.scorer.score(text)
    }

    /// Single shot. An unreadable source scores neutral.
    pub fn score_image(&self, source: &mut dyn RasterSource) -> EmotionVector {
        pixel::score_raster(source, self.config.raster_width.get())
    }

    pub async fn start_audio_capture(&mut self) -> StartOutcome {
        self.audio.start().await
    }

    pub fn stop_audio_capture(&mut self, handle: SessionId) -> bool {
        self.audio.stop_session(handle)
    }

    pub fn subscribe_audio(&self) -> broadcast::Receiver<CaptureEvent<AudioUpdate>> {
        self.audio.subscribe()
    }

    pub fn audio_state(&self) -> CaptureState {
        self.audio.state()
    }

    pub async fn start_video_capture(&mut self) -> StartOutcome {
        self.video.start().await
    }

    pub fn stop_video_capture(&mut self, handle: SessionId) -> bool {
        self.video.stop_session(handle)
    }

    pub fn subscribe_video(&self) -> broadcast::Receiver<CaptureEvent<VideoUpdate>> {
        self.video.subscribe()
    }

    pub fn video_state(&self) -> CaptureState {
        self.video.state()
    }

    /// Stops both managers. Safe to call when nothing is running.
    pub fn stop_all(&mut self) {
        self.audio.stop();
        self.video.stop();
    }
}
