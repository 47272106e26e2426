mod lexicon;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use lexicon::{Lexicon, LexiconError};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Joy,
    Anger,
    Sadness,
    Fear,
    Surprise,
    Neutral,
}

impl EmotionLabel {
    /// Enumeration order. Also the tie-break order for [`EmotionVector::dominant`].
    pub const ALL: [EmotionLabel; 6] = [
        EmotionLabel::Joy,
        EmotionLabel::Anger,
        EmotionLabel::Sadness,
        EmotionLabel::Fear,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative score per emotion label. Every label is always present.
///
/// Scores are not normalized; heuristics land roughly in `[0, 3]`. Use
/// [`EmotionVector::percent_of_max`] for display.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionVector {
    pub joy: f32,
    pub anger: f32,
    pub sadness: f32,
    pub fear: f32,
    pub surprise: f32,
    pub neutral: f32,
}

impl EmotionVector {
    pub const fn zero() -> Self {
        Self {
            joy: 0.0,
            anger: 0.0,
            sadness: 0.0,
            fear: 0.0,
            surprise: 0.0,
            neutral: 0.0,
        }
    }

    /// `{0, 0, 0, 0, 0, 1}`: the answer when there is nothing to analyze.
    pub const fn neutral() -> Self {
        Self {
            neutral: 1.0,
            ..Self::zero()
        }
    }

    pub fn get(&self, label: EmotionLabel) -> f32 {
        match label {
            EmotionLabel::Joy => self.joy,
            EmotionLabel::Anger => self.anger,
            EmotionLabel::Sadness => self.sadness,
            EmotionLabel::Fear => self.fear,
            EmotionLabel::Surprise => self.surprise,
            EmotionLabel::Neutral => self.neutral,
        }
    }

    fn slot_mut(&mut self, label: EmotionLabel) -> &mut f32 {
        match label {
            EmotionLabel::Joy => &mut self.joy,
            EmotionLabel::Anger => &mut self.anger,
            EmotionLabel::Sadness => &mut self.sadness,
            EmotionLabel::Fear => &mut self.fear,
            EmotionLabel::Surprise => &mut self.surprise,
            EmotionLabel::Neutral => &mut self.neutral,
        }
    }

    /// Returns a copy with `label` set to `score`. Negative scores clamp to zero.
    pub fn with(mut self, label: EmotionLabel, score: f32) -> Self {
        *self.slot_mut(label) = score.max(0.0);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        EmotionLabel::ALL.iter().map(move |l| (*l, self.get(*l)))
    }

    pub fn max_score(&self) -> f32 {
        self.iter().map(|(_, s)| s).fold(0.0, f32::max)
    }

    /// Label with the strictly highest score; the first label in enumeration order wins ties.
    pub fn dominant(&self) -> EmotionLabel {
        let mut best = (EmotionLabel::Joy, self.joy);
        for (label, score) in self.iter().skip(1) {
            if score > best.1 {
                best = (label, score);
            }
        }
        best.0
    }

    /// Each score as a rounded percentage of the vector maximum (all zero when the max is zero).
    pub fn percent_of_max(&self) -> [(EmotionLabel, u32); 6] {
        let max = self.max_score();
        EmotionLabel::ALL.map(|label| {
            let pct = if max <= 0.0 {
                0
            } else {
                (self.get(label) / max * 100.0).round() as u32
            };
            (label, pct)
        })
    }
}

/// Turns text into an [`EmotionVector`].
///
/// [`Lexicon`] is the local implementation. Remote recognition services would plug in here.
pub trait TextScorer: Send + Sync {
    fn score(&self, text: &str) -> EmotionVector;
}
