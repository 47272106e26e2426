//! Scripted device provider for capture tests.

use crate::capture::{
    AcquisitionError, AudioAnalyser, DeviceProvider, FrameSource, MediaStream, SpeechSession,
    TeardownError, TranscriptSink,
};
use crate::config::SpeechSettings;
use crate::pixel::{RasterError, RasterSource};
use crate::signal::SignalFormat;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::{Rgba, RgbaImage};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct DeviceLog {
    pub acquire_attempts: AtomicUsize,
    pub audio_acquired: AtomicUsize,
    pub audio_released: AtomicUsize,
    pub analysers_closed: AtomicUsize,
    pub video_acquired: AtomicUsize,
    pub video_released: AtomicUsize,
    pub frame_sources_closed: AtomicUsize,
    pub speech_started: AtomicUsize,
    pub speech_stopped: AtomicUsize,
}

impl DeviceLog {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum SpeechMode {
    Unsupported,
    Working(Vec<String>),
    FailsToStart,
    FailsToStop(Vec<String>),
}

#[derive(Clone)]
pub(crate) struct MockProvider {
    pub log: Arc<DeviceLog>,
    pub audio_failure: Option<AcquisitionError>,
    pub analyser_failure: Option<AcquisitionError>,
    pub video_failure: Option<AcquisitionError>,
    pub frame_source_failure: Option<AcquisitionError>,
    /// Scripted acquisition failures and hangs apply to the first attempt only.
    pub fail_first_attempt_only: bool,
    /// Device acquisition never resolves.
    pub hang_on_acquire: bool,
    /// Blocks the sampling thread inside every analyser read.
    pub analyser_delay: Duration,
    pub speech: SpeechMode,
    /// Peak distance from 128 of the square wave the analyser reports.
    pub audio_amplitude: u8,
    /// `None` makes every frame read fail.
    pub frame: Option<RgbaImage>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            log: Arc::new(DeviceLog::default()),
            audio_failure: None,
            analyser_failure: None,
            video_failure: None,
            frame_source_failure: None,
            fail_first_attempt_only: false,
            hang_on_acquire: false,
            analyser_delay: Duration::ZERO,
            speech: SpeechMode::Unsupported,
            audio_amplitude: 64,
            frame: Some(RgbaImage::from_pixel(64, 48, Rgba([255, 255, 255, 255]))),
        }
    }
}

struct MockStream {
    kind: &'static str,
    log: Arc<DeviceLog>,
    stopped: bool,
}

impl MediaStream for MockStream {
    fn label(&self) -> &str {
        self.kind
    }

    fn stop_tracks(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let counter = match self.kind {
            "audio" => &self.log.audio_released,
            _ => &self.log.video_released,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MockAnalyser {
    log: Arc<DeviceLog>,
    amplitude: u8,
    delay: Duration,
}

impl AudioAnalyser for MockAnalyser {
    fn signal_format(&self) -> SignalFormat {
        SignalFormat::BYTE_TIME_DOMAIN
    }

    fn read_time_domain(&mut self, out: &mut Vec<f32>) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        out.clear();
        let hi = 128.0 + f32::from(self.amplitude);
        let lo = 128.0 - f32::from(self.amplitude);
        out.extend((0..128).map(|i| if i % 2 == 0 { hi } else { lo }));
    }

    fn close(&mut self) -> Result<(), TeardownError> {
        self.log.analysers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockFrames {
    log: Arc<DeviceLog>,
    frame: Option<RgbaImage>,
}

impl RasterSource for MockFrames {
    fn read_raster(&mut self) -> Result<RgbaImage, RasterError> {
        self.frame
            .clone()
            .ok_or_else(|| RasterError::FrameUnavailable("scripted failure".into()))
    }
}

impl FrameSource for MockFrames {
    fn close(&mut self) -> Result<(), TeardownError> {
        self.log.frame_sources_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSpeech {
    log: Arc<DeviceLog>,
    mode: SpeechMode,
}

impl SpeechSession for MockSpeech {
    fn start(&mut self, sink: TranscriptSink) -> Result<(), AcquisitionError> {
        match &self.mode {
            SpeechMode::Working(results) | SpeechMode::FailsToStop(results) => {
                self.log.speech_started.fetch_add(1, Ordering::SeqCst);
                sink.publish(results);
                Ok(())
            }
            SpeechMode::FailsToStart => Err(AcquisitionError::Denied),
            SpeechMode::Unsupported => Err(AcquisitionError::Unsupported("speech".into())),
        }
    }

    fn stop(&mut self) -> Result<(), TeardownError> {
        self.log.speech_stopped.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SpeechMode::FailsToStop(_) => Err(TeardownError::new("speech session", "already aborted")),
            _ => Ok(()),
        }
    }
}

impl MockProvider {
    /// Counts the attempt; true when scripted behavior applies to it.
    fn scripted_attempt(&self) -> bool {
        let attempt = self.log.acquire_attempts.fetch_add(1, Ordering::SeqCst);
        !self.fail_first_attempt_only || attempt == 0
    }

    async fn scripted_acquire(
        &self,
        failure: &Option<AcquisitionError>,
    ) -> Result<(), AcquisitionError> {
        if !self.scripted_attempt() {
            return Ok(());
        }
        if self.hang_on_acquire {
            futures::future::pending::<()>().await;
        }
        match failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl DeviceProvider for MockProvider {
    fn acquire_audio(&self) -> BoxFuture<'_, Result<Box<dyn MediaStream>, AcquisitionError>> {
        async move {
            if let Err(e) = self.scripted_acquire(&self.audio_failure).await {
                return Err(e);
            }
            self.log.audio_acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockStream {
                kind: "audio",
                log: Arc::clone(&self.log),
                stopped: false,
            }) as Box<dyn MediaStream>)
        }
        .boxed()
    }

    fn audio_analyser(
        &self,
        stream: &dyn MediaStream,
    ) -> Result<Box<dyn AudioAnalyser>, AcquisitionError> {
        assert!(stream.as_any().downcast_ref::<MockStream>().is_some());
        if let Some(e) = &self.analyser_failure {
            return Err(e.clone());
        }
        Ok(Box::new(MockAnalyser {
            log: Arc::clone(&self.log),
            amplitude: self.audio_amplitude,
            delay: self.analyser_delay,
        }))
    }

    fn acquire_video(&self) -> BoxFuture<'_, Result<Box<dyn MediaStream>, AcquisitionError>> {
        async move {
            if let Err(e) = self.scripted_acquire(&self.video_failure).await {
                return Err(e);
            }
            self.log.video_acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockStream {
                kind: "video",
                log: Arc::clone(&self.log),
                stopped: false,
            }) as Box<dyn MediaStream>)
        }
        .boxed()
    }

    fn frame_source(
        &self,
        _stream: &dyn MediaStream,
    ) -> Result<Box<dyn FrameSource>, AcquisitionError> {
        if let Some(e) = &self.frame_source_failure {
            return Err(e.clone());
        }
        Ok(Box::new(MockFrames {
            log: Arc::clone(&self.log),
            frame: self.frame.clone(),
        }))
    }

    fn speech_session(&self, _settings: &SpeechSettings) -> Option<Box<dyn SpeechSession>> {
        match self.speech {
            SpeechMode::Unsupported => None,
            _ => Some(Box::new(MockSpeech {
                log: Arc::clone(&self.log),
                mode: self.speech.clone(),
            })),
        }
    }
}
