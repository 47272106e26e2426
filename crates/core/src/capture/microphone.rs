//! Default-input-device microphone backed by cpal (through rodio's re-export).
//!
//! The input callback downmixes every frame to mono and keeps the most recent `window`
//! samples. The analyser hands that window to the sampling loop in full-scale `f32`.

use crate::capture::device::{AudioAnalyser, DeviceProvider, FrameSource, MediaStream};
use crate::capture::{lock_shared, AcquisitionError, TeardownError};
use crate::config::DEFAULT_ANALYSER_WINDOW;
use crate::signal::SignalFormat;
use crate::util::RingBuffer;
use futures::future::BoxFuture;
use futures::FutureExt;
use rodio::cpal;
use rodio::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::cpal::{BuildStreamError, SampleFormat, Stream, StreamConfig};
use std::any::Any;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "capture::microphone";

type SharedWindow = Arc<Mutex<RingBuffer<f32>>>;

/// Opens the host's default input device.
#[derive(Clone, Debug)]
pub struct CpalDeviceProvider {
    window: usize,
}

impl CpalDeviceProvider {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    fn open_default_input(&self) -> Result<MicrophoneStream, AcquisitionError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AcquisitionError::Unavailable("no default input device".to_owned()))?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed input>".to_owned());

        let supported = device
            .default_input_config()
            .map_err(|e| AcquisitionError::Unavailable(format!("{device_name}: {e}")))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = usize::from(config.channels.max(1));

        tracing::debug!(
            target: LOG_TARGET,
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels,
            format = ?sample_format,
            "opening input stream"
        );

        let window: SharedWindow = Arc::new(Mutex::new(RingBuffer::new(self.window)));
        let stream = match sample_format {
            SampleFormat::F32 => {
                let window = Arc::clone(&window);
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _| push_frames(&window, data, channels, |s| s),
                    log_stream_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let window = Arc::clone(&window);
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _| push_frames(&window, data, channels, i16_to_f32),
                    log_stream_error,
                    None,
                )
            }
            SampleFormat::U16 => {
                let window = Arc::clone(&window);
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _| push_frames(&window, data, channels, u16_to_f32),
                    log_stream_error,
                    None,
                )
            }
            other => {
                return Err(AcquisitionError::Unsupported(format!(
                    "input sample format {other:?}"
                )))
            }
        }
        .map_err(|e| build_error(&device_name, e))?;

        stream
            .play()
            .map_err(|e| AcquisitionError::Unavailable(format!("{device_name}: {e}")))?;

        Ok(MicrophoneStream {
            stream: Some(stream),
            window,
            device_name,
        })
    }
}

impl Default for CpalDeviceProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSER_WINDOW)
    }
}

impl DeviceProvider for CpalDeviceProvider {
    fn acquire_audio(&self) -> BoxFuture<'_, Result<Box<dyn MediaStream>, AcquisitionError>> {
        async move {
            self.open_default_input().map(|stream| {
                tracing::info!(target: LOG_TARGET, device = %stream.device_name, "microphone opened");
                Box::new(stream) as Box<dyn MediaStream>
            })
        }
        .boxed()
    }

    fn audio_analyser(
        &self,
        stream: &dyn MediaStream,
    ) -> Result<Box<dyn AudioAnalyser>, AcquisitionError> {
        let mic = stream
            .as_any()
            .downcast_ref::<MicrophoneStream>()
            .ok_or_else(|| {
                AcquisitionError::Unsupported(format!("analyser for foreign stream {}", stream.label()))
            })?;
        Ok(Box::new(MicrophoneAnalyser {
            window: Arc::clone(&mic.window),
            closed: false,
        }))
    }

    fn acquire_video(&self) -> BoxFuture<'_, Result<Box<dyn MediaStream>, AcquisitionError>> {
        async { Err(AcquisitionError::Unsupported("camera capture".to_owned())) }.boxed()
    }

    fn frame_source(
        &self,
        _stream: &dyn MediaStream,
    ) -> Result<Box<dyn FrameSource>, AcquisitionError> {
        Err(AcquisitionError::Unsupported("camera frames".to_owned()))
    }
}

struct MicrophoneStream {
    stream: Option<Stream>,
    window: SharedWindow,
    device_name: String,
}

impl MediaStream for MicrophoneStream {
    fn label(&self) -> &str {
        &self.device_name
    }

    fn stop_tracks(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(target: LOG_TARGET, error = %e, "pause before close failed");
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MicrophoneAnalyser {
    window: SharedWindow,
    closed: bool,
}

impl AudioAnalyser for MicrophoneAnalyser {
    fn signal_format(&self) -> SignalFormat {
        SignalFormat::FLOAT
    }

    fn read_time_domain(&mut self, out: &mut Vec<f32>) {
        if self.closed {
            out.clear();
            return;
        }
        lock_shared(&self.window).copy_into(out);
    }

    fn close(&mut self) -> Result<(), TeardownError> {
        if self.closed {
            return Err(TeardownError::new("analyser", "already closed"));
        }
        self.closed = true;
        lock_shared(&self.window).clear();
        Ok(())
    }
}

fn push_frames<T: Copy>(
    window: &Mutex<RingBuffer<f32>>,
    data: &[T],
    channels: usize,
    to_f32: fn(T) -> f32,
) {
    let mut window = lock_shared(window);
    window.extend(data.chunks(channels).map(|frame| downmix(frame, to_f32)));
}

fn downmix<T: Copy>(frame: &[T], to_f32: fn(T) -> f32) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32
}

fn i16_to_f32(s: i16) -> f32 {
    f32::from(s) / 32768.0
}

fn u16_to_f32(s: u16) -> f32 {
    (f32::from(s) - 32768.0) / 32768.0
}

fn build_error(device_name: &str, e: BuildStreamError) -> AcquisitionError {
    match e {
        BuildStreamError::StreamConfigNotSupported => {
            AcquisitionError::Unsupported(format!("{device_name}: stream config"))
        }
        other => AcquisitionError::Unavailable(format!("{device_name}: {other}")),
    }
}

fn log_stream_error(err: cpal::StreamError) {
    tracing::warn!(target: LOG_TARGET, error = %err, "input stream error");
}
