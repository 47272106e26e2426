use crate::capture::device::{DeviceProvider, FrameSource, MediaStream};
use crate::capture::sampling::{CancelToken, FrameClock, SamplingLoop};
use crate::capture::{
    lock_shared, AcquireGuard, AcquisitionError, CaptureEvent, CaptureState, Lifecycle, SessionId,
    StartOutcome,
};
use crate::config::{RasterWidth, DEFAULT_EVENT_CAPACITY};
use crate::emotion::EmotionVector;
use crate::pixel;
use crate::util::RateLimitedWarn;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

const LOG_TARGET: &str = "capture::video";
const FRAME_WARN_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct VideoUpdate {
    pub session: SessionId,
    pub scores: EmotionVector,
}

type SharedFrames = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

struct VideoSession {
    id: SessionId,
    stream: Option<Box<dyn MediaStream>>,
    frames: SharedFrames,
    sampler: Option<SamplingLoop>,
}

impl VideoSession {
    fn halt_sampling(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            sampler.cancel();
        }
        drop(lock_shared(&self.frames));
    }

    fn release(&mut self) {
        self.halt_sampling();

        let frames = lock_shared(&self.frames).take();
        if let Some(mut frames) = frames {
            if let Err(e) = frames.close() {
                tracing::warn!(target: LOG_TARGET, session = %self.id, error = %e, "ignoring frame source teardown fault");
            }
        }

        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            tracing::debug!(target: LOG_TARGET, session = %self.id, device = stream.label(), "camera released");
        }
    }
}

impl Drop for VideoSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Camera capture manager. Each tick downsamples the current frame and scores it.
pub struct VideoCapture {
    provider: Arc<dyn DeviceProvider>,
    clock: Arc<dyn FrameClock>,
    raster_width: RasterWidth,
    lifecycle: Lifecycle<VideoUpdate>,
    session: Option<VideoSession>,
}

impl VideoCapture {
    pub fn new(provider: Arc<dyn DeviceProvider>, clock: Arc<dyn FrameClock>) -> Self {
        Self {
            provider,
            clock,
            raster_width: RasterWidth::default(),
            lifecycle: Lifecycle::new("video", DEFAULT_EVENT_CAPACITY),
            session: None,
        }
    }

    pub fn with_raster_width(mut self, width: RasterWidth) -> Self {
        self.raster_width = width;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.lifecycle = Lifecycle::new("video", capacity);
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

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent<VideoUpdate>> {
        self.lifecycle.subscribe()
    }

    /// Acquires the camera and starts per-frame scoring. A no-op while a session is running.
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
        let session = match Self::acquire(self.provider.as_ref()).await {
            Ok(session) => session,
            Err(e) => {
                guard.fail(&e);
                return StartOutcome::Failed;
            }
        };

        let id = session.id;
        let frames = Arc::clone(&session.frames);
        self.session = Some(session);
        guard.activate();

        let sampler = self.spawn_sampler(id, frames);
        if let Some(session) = self.session.as_mut() {
            session.sampler = Some(sampler);
        }
        tracing::info!(target: LOG_TARGET, session = %id, "video capture active");
        StartOutcome::Started(id)
    }

    async fn acquire(provider: &dyn DeviceProvider) -> Result<VideoSession, AcquisitionError> {
        let mut stream = provider.acquire_video().await?;

        let frames = match provider.frame_source(stream.as_ref()) {
            Ok(f) => f,
            Err(e) => {
                stream.stop_tracks();
                return Err(e);
            }
        };

        Ok(VideoSession {
            id: SessionId::next(),
            stream: Some(stream),
            frames: Arc::new(Mutex::new(Some(frames))),
            sampler: None,
        })
    }

    fn spawn_sampler(&self, id: SessionId, frames: SharedFrames) -> SamplingLoop {
        let events = self.lifecycle.sender();
        let width = self.raster_width.get();
        let mut frame_warn = RateLimitedWarn::new(FRAME_WARN_INTERVAL);

        SamplingLoop::spawn(Arc::clone(&self.clock), move |token: &CancelToken| {
            // Held through the send: stop() takes this lock after cancelling.
            let mut guard = lock_shared(&frames);
            let Some(f) = guard.as_mut() else {
                return;
            };
            if token.is_cancelled() {
                return;
            }
            let scores = match f.read_raster() {
                Ok(raster) => pixel::estimate(&pixel::downsample(&raster, width)),
                Err(e) => {
                    match frame_warn.admit() {
                        Some(suppressed) => {
                            tracing::warn!(target: LOG_TARGET, session = %id, error = %e, suppressed, "frame unreadable, reporting neutral");
                        }
                        None => {
                            tracing::debug!(target: LOG_TARGET, session = %id, error = %e, "frame unreadable, reporting neutral");
                        }
                    }
                    EmotionVector::neutral()
                }
            };
            let _ = events.send(CaptureEvent::Update(VideoUpdate {
                session: id,
                scores,
            }));
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
        tracing::info!(target: LOG_TARGET, session = %session.id, "video capture stopped");
    }

    /// Stops `id` if it is the running session. Returns whether anything was stopped.
    pub fn stop_session(&mut self, id: SessionId) -> bool {
        if self.current_session() != Some(id) {
            return false;
        }
        self.stop();
        true
    }
}

impl Drop for VideoCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sampling::IntervalFrameClock;
    use crate::capture::testing::{DeviceLog, MockProvider};
    use crate::emotion::EmotionLabel;
    use image::{Rgba, RgbaImage};

    fn manager(provider: &MockProvider) -> VideoCapture {
        VideoCapture::new(
            Arc::new(provider.clone()),
            Arc::new(IntervalFrameClock::default()),
        )
    }

    fn updates(rx: &mut broadcast::Receiver<CaptureEvent<VideoUpdate>>) -> Vec<VideoUpdate> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let CaptureEvent::Update(u) = ev {
                out.push(u);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_scored_while_active() {
        let provider = MockProvider {
            frame: Some(RgbaImage::from_pixel(640, 480, Rgba([255, 255, 255, 255]))),
            ..MockProvider::default()
        };
        let mut video = manager(&provider);
        let mut rx = video.subscribe();
        let id = video.start().await.session().expect("started");

        tokio::time::sleep(Duration::from_millis(40)).await;
        let got = updates(&mut rx);
        assert!(!got.is_empty());
        for u in &got {
            assert_eq!(u.session, id);
            assert!(u.scores.joy > u.scores.sadness);
            assert_eq!(u.scores.neutral, 0.2);
        }

        video.stop();
        assert_eq!(DeviceLog::get(&provider.log.video_acquired), 1);
        assert_eq!(DeviceLog::get(&provider.log.video_released), 1);
        assert_eq!(DeviceLog::get(&provider.log.frame_sources_closed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_frames_degrade_to_neutral() {
        let provider = MockProvider {
            frame: None,
            ..MockProvider::default()
        };
        let mut video = manager(&provider);
        let mut rx = video.subscribe();
        video.start().await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let got = updates(&mut rx);
        assert!(!got.is_empty());
        assert!(got.iter().all(|u| u.scores == EmotionVector::neutral()));
        assert_eq!(got[0].scores.dominant(), EmotionLabel::Neutral);
    }

    #[tokio::test]
    async fn camera_failure_returns_to_idle() {
        let provider = MockProvider {
            video_failure: Some(AcquisitionError::Unavailable("no camera".into())),
            ..MockProvider::default()
        };
        let mut video = manager(&provider);
        let mut rx = video.subscribe();

        assert_eq!(video.start().await, StartOutcome::Failed);
        assert_eq!(video.state(), CaptureState::Idle);

        let mut saw_active = false;
        let mut saw_failure = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                CaptureEvent::StateChanged(CaptureState::Active) => saw_active = true,
                CaptureEvent::StartFailed { reason } => {
                    assert!(reason.contains("no camera"));
                    saw_failure = true;
                }
                _ => {}
            }
        }
        assert!(!saw_active);
        assert!(saw_failure);
        assert_eq!(DeviceLog::get(&provider.log.video_released), 0);
    }

    #[tokio::test]
    async fn frame_source_failure_releases_camera() {
        let provider = MockProvider {
            frame_source_failure: Some(AcquisitionError::Unavailable("playback refused".into())),
            ..MockProvider::default()
        };
        let mut video = manager(&provider);

        assert_eq!(video.start().await, StartOutcome::Failed);
        assert_eq!(DeviceLog::get(&provider.log.video_acquired), 1);
        assert_eq!(DeviceLog::get(&provider.log.video_released), 1);
        assert_eq!(DeviceLog::get(&provider.log.frame_sources_closed), 0);
    }

    #[tokio::test]
    async fn second_start_keeps_one_camera() {
        let provider = MockProvider::default();
        let mut video = manager(&provider);
        let first = video.start().await;
        assert_eq!(
            video.start().await,
            StartOutcome::AlreadyRunning(first.session().expect("started"))
        );
        assert_eq!(DeviceLog::get(&provider.log.video_acquired), 1);

        video.stop();
        video.stop();
        assert_eq!(DeviceLog::get(&provider.log.video_released), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_start_leaves_no_camera_behind() {
        let provider = MockProvider {
            hang_on_acquire: true,
            fail_first_attempt_only: true,
            ..MockProvider::default()
        };
        let mut video = manager(&provider);

        let timed_out = tokio::time::timeout(Duration::from_millis(10), video.start()).await;
        assert!(timed_out.is_err());
        assert_eq!(video.state(), CaptureState::Idle);

        video.stop();
        assert!(matches!(video.start().await, StartOutcome::Started(_)));
        video.stop();
        assert_eq!(DeviceLog::get(&provider.log.video_acquired), 1);
        assert_eq!(DeviceLog::get(&provider.log.video_released), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_is_reported_once_stopping() {
        let mut video = manager(&MockProvider::default());
        let mut rx = video.subscribe();
        video.start().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        video.stop();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        let stopping = events
            .iter()
            .position(|e| *e == CaptureEvent::StateChanged(CaptureState::Stopping))
            .expect("stopping broadcast");
        assert!(events[stopping..]
            .iter()
            .all(|e| !matches!(e, CaptureEvent::Update(_))));
    }

    #[tokio::test]
    async fn dropping_the_manager_releases_the_camera() {
        let provider = MockProvider::default();
        {
            let mut video = manager(&provider);
            video.start().await;
        }
        assert_eq!(DeviceLog::get(&provider.log.video_released), 1);
        assert_eq!(DeviceLog::get(&provider.log.frame_sources_closed), 1);
    }
}
