//! FER emotion classifier via ONNX Runtime, with a simulated fallback.
//!
//! The ONNX backend expects a `(1, 48, 48, 1)` NHWC float tensor and emits
//! seven class scores. When the model cannot be loaded the service runs in
//! simulation mode: scores are uniform random noise.

use crate::types::{Emotion, Prediction, Scores, EMOTION_COUNT};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rand::Rng;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("classifier returned a non-finite score at index {0}")]
    NonFiniteScore(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Which implementation is producing scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Onnx,
    Simulated,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Onnx => "onnx",
            Backend::Simulated => "simulated",
        }
    }
}

/// Tensor in, seven scores out.
pub trait Predictor: Send {
    fn backend(&self) -> Backend;
    fn predict(&mut self, input: &Array4<f32>) -> Result<Scores, ClassifierError>;
}

/// ONNX-backed emotion classifier.
pub struct OnnxClassifier {
    session: Session,
}

impl OnnxClassifier {
    /// Load the emotion ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded emotion model"
        );

        Ok(Self { session })
    }
}

impl Predictor for OnnxClassifier {
    fn backend(&self) -> Backend {
        Backend::Onnx
    }

    fn predict(&mut self, input: &Array4<f32>) -> Result<Scores, ClassifierError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("score extraction: {e}")))?;

        raw.try_into().map_err(|_| {
            ClassifierError::InferenceFailed(format!(
                "expected {EMOTION_COUNT} class scores, got {}",
                raw.len()
            ))
        })
    }
}

/// Stand-in used when no model is available. Scores are uniform in [0, 1).
#[derive(Debug, Default)]
pub struct SimulatedClassifier;

impl Predictor for SimulatedClassifier {
    fn backend(&self) -> Backend {
        Backend::Simulated
    }

    fn predict(&mut self, _input: &Array4<f32>) -> Result<Scores, ClassifierError> {
        let mut rng = rand::thread_rng();
        Ok(std::array::from_fn(|_| rng.gen::<f32>()))
    }
}

/// Load the ONNX model, or fall back to simulation mode if that fails.
///
/// Called once at startup; the returned backend is fixed for the process.
pub fn load_or_simulate(model_path: &Path) -> Box<dyn Predictor> {
    match OnnxClassifier::load(model_path) {
        Ok(classifier) => Box::new(classifier),
        Err(e) => {
            tracing::warn!(
                path = %model_path.display(),
                error = %e,
                "emotion model incompatible or missing; switching to simulation mode"
            );
            Box::new(SimulatedClassifier)
        }
    }
}

/// Pick the highest-scoring emotion. Ties go to the lowest id.
pub fn interpret(scores: &Scores, backend: Backend) -> Result<Prediction, ClassifierError> {
    if let Some(idx) = scores.iter().position(|s| !s.is_finite()) {
        return Err(ClassifierError::NonFiniteScore(idx));
    }

    let mut best_idx = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best_idx] {
            best_idx = i;
        }
    }

    Ok(Prediction {
        emotion: Emotion::ALL[best_idx],
        confidence: scores[best_idx],
        scores: *scores,
        backend,
    })
}
