use crate::emotion::{EmotionLabel, EmotionVector, TextScorer};

const JOY: &[&str] = &[
    "happy", "joy", "love", "excited", "great", "wonderful", "amazing", "glad", "delight",
];
const ANGER: &[&str] = &["angry", "mad", "furious", "annoyed", "hate", "irritated", "rage"];
const SADNESS: &[&str] = &[
    "sad", "down", "unhappy", "depressed", "blue", "lonely", "heartbroken",
];
const FEAR: &[&str] = &["afraid", "scared", "terrified", "nervous", "anxious", "worried"];
const SURPRISE: &[&str] = &["surprised", "shocked", "wow", "unexpected", "astonished"];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LexiconError {
    #[error("neutral is not scored from keywords")]
    NeutralKeywords,
    #[error("keyword list for {0} contains an empty keyword")]
    EmptyKeyword(EmotionLabel),
}

/// Keyword-counting text scorer.
///
/// Matching is case-insensitive and substring based, so `"mad"` also counts inside
/// `"madrid"`. Each keyword contributes its number of non-overlapping occurrences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lexicon {
    entries: Vec<(EmotionLabel, Vec<String>)>,
}

impl Lexicon {
    pub fn new<I, W>(entries: I) -> Result<Self, LexiconError>
    where
        I: IntoIterator<Item = (EmotionLabel, W)>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        let mut out = Vec::new();
        for (label, words) in entries {
            if label == EmotionLabel::Neutral {
                return Err(LexiconError::NeutralKeywords);
            }
            let mut keywords = Vec::new();
            for w in words {
                let w = w.into().to_lowercase();
                if w.is_empty() {
                    return Err(LexiconError::EmptyKeyword(label));
                }
                keywords.push(w);
            }
            out.push((label, keywords));
        }
        Ok(Self { entries: out })
    }

    pub fn keywords(&self, label: EmotionLabel) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(l, _)| *l == label)
            .flat_map(|(_, words)| words.iter().map(String::as_str))
    }

    pub fn score(&self, text: &str) -> EmotionVector {
        if text.trim().is_empty() {
            return EmotionVector::neutral();
        }

        let lowered = text.to_lowercase();
        let mut scores = EmotionVector::zero();
        for (label, words) in &self.entries {
            let hits: usize = words.iter().map(|w| lowered.matches(w.as_str()).count()).sum();
            let current = scores.get(*label);
            scores = scores.with(*label, current + hits as f32);
        }
        scores
    }
}

impl Default for Lexicon {
    fn default() -> Self {
        let table = [
            (EmotionLabel::Joy, JOY),
            (EmotionLabel::Anger, ANGER),
            (EmotionLabel::Sadness, SADNESS),
            (EmotionLabel::Fear, FEAR),
            (EmotionLabel::Surprise, SURPRISE),
        ];
        Self {
            entries: table
                .iter()
                .map(|(label, words)| (*label, words.iter().map(|w| (*w).to_owned()).collect()))
                .collect(),
        }
    }
}

impl TextScorer for Lexicon {
    fn score(&self, text: &str) -> EmotionVector {
        Lexicon::score(self, text)
    }
}
