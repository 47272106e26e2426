//! Color and brightness heuristics over RGBA rasters.

mod file;

use crate::emotion::EmotionVector;
use image::imageops::{self, FilterType};
use image::RgbaImage;

pub use file::ImageFile;

/// Pixels between samples in the packed RGBA stream.
pub const SAMPLE_STRIDE: usize = 8;

/// Upper bound on the area [`downsample`] produces.
pub const MAX_DOWNSAMPLED_PIXELS: u32 = 1 << 20;

const CHANNEL_MAX: f32 = 255.0;
const NEUTRAL_FLOOR: f32 = 0.2;

#[derive(thiserror::Error, Debug)]
pub enum RasterError {
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("raster source was already consumed")]
    Consumed,

    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),
}

/// Anything that can hand over an RGBA raster: a decoded image, a camera frame grabber.
pub trait RasterSource {
    fn read_raster(&mut self) -> Result<RgbaImage, RasterError>;
}

/// Resizes to `width` pixels wide keeping the aspect ratio (height at least 1).
///
/// The output never exceeds [`MAX_DOWNSAMPLED_PIXELS`]; very tall inputs are squashed
/// vertically to fit. Zero-area input stays zero-area so that [`estimate`] reports it
/// as degenerate.
pub fn downsample(raster: &RgbaImage, width: u32) -> RgbaImage {
    let (w, h) = raster.dimensions();
    if w == 0 || h == 0 || width == 0 {
        return RgbaImage::new(0, 0);
    }
    let width = width.min(MAX_DOWNSAMPLED_PIXELS);
    let max_height = (MAX_DOWNSAMPLED_PIXELS / width).max(1);
    let height = ((h as f64 / w as f64) * width as f64)
        .round()
        .clamp(1.0, max_height as f64) as u32;
    imageops::resize(raster, width, height, FilterType::Triangle)
}

/// Scores a raster from its mean color.
pub fn estimate(raster: &RgbaImage) -> EmotionVector {
    estimate_rgba(raster.as_raw())
}

/// Same as [`estimate`] over a packed RGBA byte stream. Trailing partial pixels are ignored.
pub fn estimate_rgba(rgba: &[u8]) -> EmotionVector {
    let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
    for px in rgba.chunks_exact(4).step_by(SAMPLE_STRIDE) {
        r += u64::from(px[0]);
        g += u64::from(px[1]);
        b += u64::from(px[2]);
        count += 1;
    }
    if count == 0 {
        return EmotionVector::neutral();
    }

    let n = count as f32;
    let (r, g, b) = (r as f32 / n, g as f32 / n, b as f32 / n);

    let brightness = (r + g + b) / 3.0 / CHANNEL_MAX;
    let warmness = (r - b + CHANNEL_MAX) / (2.0 * CHANNEL_MAX);
    let coolness = 1.0 - warmness;

    EmotionVector {
        joy: (0.7 * brightness + 0.6 * warmness).max(0.0),
        anger: (0.9 * warmness - 0.2 * coolness).max(0.0),
        sadness: (0.8 * coolness + 0.4 * (1.0 - brightness)).max(0.0),
        fear: (0.6 * (1.0 - brightness) + 0.3 * coolness).max(0.0),
        surprise: (0.8 * (0.5 - brightness).abs()).max(0.0),
        neutral: NEUTRAL_FLOOR,
    }
}

/// Reads, downsamples and scores a raster, surfacing read failures.
pub fn try_score_raster(
    source: &mut dyn RasterSource,
    width: u32,
) -> Result<EmotionVector, RasterError> {
    let raster = source.read_raster()?;
    Ok(estimate(&downsample(&raster, width)))
}

/// [`try_score_raster`] that degrades to the neutral vector when the raster cannot be read.
pub fn score_raster(source: &mut dyn RasterSource, width: u32) -> EmotionVector {
    match try_score_raster(source, width) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "raster unreadable, reporting neutral");
            EmotionVector::neutral()
        }
    }
}
