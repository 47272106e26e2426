use crate::capture::{AcquisitionError, TeardownError};
use crate::config::SpeechSettings;
use crate::pixel::RasterSource;
use crate::signal::SignalFormat;
use futures::future::BoxFuture;
use std::any::Any;
use tokio::sync::watch;

/// An open device stream. Revoking its tracks releases the device.
pub trait MediaStream: 'static {
    fn label(&self) -> &str;

    /// Stops every track. Must tolerate repeated calls.
    fn stop_tracks(&mut self);

    fn as_any(&self) -> &dyn Any;
}

/// Analysis context attached to an audio stream.
pub trait AudioAnalyser: Send {
    fn signal_format(&self) -> SignalFormat;

    /// Replaces `out` with the most recent time-domain window.
    fn read_time_domain(&mut self, out: &mut Vec<f32>);

    fn close(&mut self) -> Result<(), TeardownError>;
}

/// Frame grabber attached to a camera stream.
pub trait FrameSource: RasterSource + Send {
    fn close(&mut self) -> Result<(), TeardownError> {
        Ok(())
    }
}

/// Optional speech-to-text sub-session of an audio capture.
pub trait SpeechSession: Send {
    fn start(&mut self, sink: TranscriptSink) -> Result<(), AcquisitionError>;

    fn stop(&mut self) -> Result<(), TeardownError>;
}

/// Where a speech session publishes its running transcript.
#[derive(Clone, Debug)]
pub struct TranscriptSink {
    tx: watch::Sender<Option<String>>,
}

impl TranscriptSink {
    pub(crate) fn new() -> (Self, watch::Receiver<Option<String>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Publishes the best alternative of every result so far, joined by single spaces.
    pub fn publish<S: AsRef<str>>(&self, results: &[S]) {
        let text = results
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(" ");
        self.tx.send_replace(Some(text));
    }
}

/// Host capabilities a capture manager needs.
///
/// Secondary handles (analyser, frame source) are requested only after the primary stream
/// was acquired, and are handed that stream.
pub trait DeviceProvider: Send + Sync {
    fn acquire_audio(&self) -> BoxFuture<'_, Result<Box<dyn MediaStream>, AcquisitionError>>;

    fn audio_analyser(
        &self,
        stream: &dyn MediaStream,
    ) -> Result<Box<dyn AudioAnalyser>, AcquisitionError>;

    fn acquire_video(&self) -> BoxFuture<'_, Result<Box<dyn MediaStream>, AcquisitionError>>;

    fn frame_source(
        &self,
        stream: &dyn MediaStream,
    ) -> Result<Box<dyn FrameSource>, AcquisitionError>;

    /// `None` when the host has no speech recognition.
    fn speech_session(&self, _settings: &SpeechSettings) -> Option<Box<dyn SpeechSession>> {
        None
    }
}
