//! Loudness estimation for live audio windows.

use serde::{Deserialize, Serialize};

/// Where silence sits in a sample stream and how far a full-scale swing reaches from it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SignalFormat {
    pub zero_reference: f64,
    pub full_scale: f64,
}

impl SignalFormat {
    /// Unsigned 8-bit time-domain bytes centered on 128, as analyser nodes report them.
    pub const BYTE_TIME_DOMAIN: Self = Self {
        zero_reference: 128.0,
        full_scale: 128.0,
    };

    pub const PCM_I16: Self = Self {
        zero_reference: 0.0,
        full_scale: 32_768.0,
    };

    pub const FLOAT: Self = Self {
        zero_reference: 0.0,
        full_scale: 1.0,
    };

    fn is_usable(&self) -> bool {
        self.full_scale.is_finite() && self.full_scale > 0.0 && self.zero_reference.is_finite()
    }
}

/// RMS of the centered samples divided by full scale.
///
/// Returns 0 for an empty window or a format that is not finite with a positive full scale.
/// The result is not clamped:
/// clipped input can read slightly above 1.
pub fn energy<T>(samples: &[T], format: SignalFormat) -> f32
where
    T: Copy + Into<f64>,
{
    if samples.is_empty() || !format.is_usable() {
        return 0.0;
    }

    let sum: f64 = samples
        .iter()
        .map(|s| {
            let v = (*s).into() - format.zero_reference;
            v * v
        })
        .sum();

    ((sum / samples.len() as f64).sqrt() / format.full_scale) as f32
}
