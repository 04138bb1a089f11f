use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::classifier::Backend;

/// Number of emotion classes produced by the classifier.
pub const EMOTION_COUNT: usize = 7;

/// Raw classifier output, one score per [`Emotion`] in id order.
pub type Scores = [f32; EMOTION_COUNT];

/// Facial emotion categories, in the classifier's output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    /// All emotions, indexed by id.
    pub const ALL: [Emotion; EMOTION_COUNT] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Stable numeric id (0–6), matching the `emotion_id` library column.
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Emotion> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
            Emotion::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion label: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    /// Case-insensitive match on the display label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|e| e.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

impl Serialize for Emotion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Interpreted classifier output for a single image.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub emotion: Emotion,
    /// Highest score in `scores`.
    pub confidence: f32,
    pub scores: Scores,
    /// Which classifier produced the scores.
    pub backend: Backend,
}

impl Prediction {
    /// Confidence as a percentage string with two decimals, e.g. `"87.34%"`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", f64::from(self.confidence) * 100.0)
    }

    /// True when the scores came from the simulated stand-in.
    pub fn is_simulated(&self) -> bool {
        self.backend == Backend::Simulated
    }
}
