//! moodmate-core — Facial emotion classification and mood-based music picks.
//!
//! Normalizes face images to the 48x48 grayscale tensor the FER classifier
//! expects, runs the classifier via ONNX Runtime (or a simulated stand-in),
//! and samples songs tagged with the predicted emotion from a CSV library.

pub mod classifier;
pub mod library;
pub mod preprocess;
pub mod types;

use std::path::PathBuf;

pub use classifier::{Backend, OnnxClassifier, Predictor, SimulatedClassifier};
pub use library::{MusicLibrary, Recommendation, Selection, Song};
pub use types::{Emotion, Prediction, Scores};

const MODEL_FILE: &str = "models/moodmate_final_model.onnx";
const MUSIC_FILE: &str = "data/processed_music.csv";

/// Directory holding the running executable, or the working directory if
/// it cannot be resolved.
fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Default location of the emotion classifier model.
pub fn default_model_path() -> PathBuf {
    base_dir().join(MODEL_FILE)
}

/// Default location of the music library CSV.
pub fn default_music_path() -> PathBuf {
    base_dir().join(MUSIC_FILE)
}
