use moodmate_core::classifier::{self, Backend, ClassifierError, Predictor};
use moodmate_core::preprocess::{self, PreprocessError};
use moodmate_core::Prediction;
use ndarray::Array4;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("request processing panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Classify {
        input: Array4<f32>,
        reply: oneshot::Sender<Result<Prediction, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    backend: Backend,
}

impl EngineHandle {
    /// Normalize a base64 image payload and classify the emotion it shows.
    ///
    /// Decoding and resizing run on the blocking pool, so a bad payload
    /// fails without queueing behind inference for other requests.
    pub async fn analyze(&self, payload: String) -> Result<Prediction, EngineError> {
        let input = tokio::task::spawn_blocking(move || preprocess::normalize(&payload))
            .await
            .map_err(|e| match e.try_into_panic() {
                Ok(payload) => EngineError::Panicked(panic_message(payload.as_ref())),
                Err(e) => EngineError::Panicked(e.to_string()),
            })??;

        self.classify(input).await
    }

    /// Classify an already normalized `(1, 48, 48, 1)` tensor.
    pub async fn classify(&self, input: Array4<f32>) -> Result<Prediction, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Classify {
                input,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Backend chosen at startup; fixed for the life of the engine.
    pub fn backend(&self) -> Backend {
        self.backend
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the predictor (ONNX sessions need `&mut` to run) and
/// runs inference one request at a time until every handle is dropped.
/// A panic inside the predictor fails only the request that caused it.
pub fn spawn_engine(
    mut predictor: Box<dyn Predictor>,
    queue: usize,
) -> Result<EngineHandle, EngineError> {
    let backend = predictor.backend();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue.max(1));

    std::thread::Builder::new()
        .name("moodmate-engine".into())
        .spawn(move || {
            tracing::info!(backend = backend.as_str(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Classify { input, reply } => {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            run_classify(predictor.as_mut(), &input)
                        }))
                        .unwrap_or_else(|payload| {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(error = %message, "predictor panicked");
                            Err(EngineError::Panicked(message))
                        });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, backend })
}

fn run_classify(predictor: &mut dyn Predictor, input: &Array4<f32>) -> Result<Prediction, EngineError> {
    let scores = predictor.predict(input)?;
    let prediction = classifier::interpret(&scores, predictor.backend())?;

    tracing::debug!(
        emotion = %prediction.emotion,
        confidence = prediction.confidence,
        backend = prediction.backend.as_str(),
        "classify: prediction"
    );

    Ok(prediction)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use moodmate_core::classifier::SimulatedClassifier;
    use moodmate_core::{Emotion, Scores};
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    struct Fixed(Scores);

    impl Predictor for Fixed {
        fn backend(&self) -> Backend {
            Backend::Onnx
        }

        fn predict(&mut self, _input: &Array4<f32>) -> Result<Scores, ClassifierError> {
            Ok(self.0)
        }
    }

    /// Blocks for a fixed time before answering Neutral.
    struct Slow(Duration);

    impl Predictor for Slow {
        fn backend(&self) -> Backend {
            Backend::Onnx
        }

        fn predict(&mut self, _input: &Array4<f32>) -> Result<Scores, ClassifierError> {
            std::thread::sleep(self.0);
            Ok([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0])
        }
    }

    /// Panics on the first call, answers Happy afterwards.
    struct PanicsOnce {
        calls: usize,
    }

    impl Predictor for PanicsOnce {
        fn backend(&self) -> Backend {
            Backend::Onnx
        }

        fn predict(&mut self, _input: &Array4<f32>) -> Result<Scores, ClassifierError> {
            self.calls += 1;
            if self.calls == 1 {
                panic!("session blew up");
            }
            Ok([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0])
        }
    }

    fn white_png_base64() -> String {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        base64::engine::general_purpose::STANDARD.encode(buf)
    }

    #[tokio::test]
    async fn test_analyze_uses_predictor() {
        let scores = [0.0, 0.0, 0.0, 0.0, 0.0, 0.9, 0.1];
        let engine = spawn_engine(Box::new(Fixed(scores)), 4).unwrap();
        assert_eq!(engine.backend(), Backend::Onnx);

        let p = engine.analyze(white_png_base64()).await.unwrap();
        assert_eq!(p.emotion, Emotion::Surprise);
        assert!((p.confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_analyze_simulated_backend() {
        let engine = spawn_engine(Box::new(SimulatedClassifier), 4).unwrap();
        assert_eq!(engine.backend(), Backend::Simulated);
        let p = engine.analyze(white_png_base64()).await.unwrap();
        assert!(p.is_simulated());
    }

    #[tokio::test]
    async fn test_analyze_bad_payload() {
        let engine = spawn_engine(Box::new(SimulatedClassifier), 4).unwrap();
        let err = engine.analyze("%%%".to_string()).await.unwrap_err();
        assert!(matches!(err, EngineError::Preprocess(PreprocessError::Base64(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bad_payload_does_not_wait_for_inference() {
        let engine = spawn_engine(Box::new(Slow(Duration::from_millis(1500))), 4).unwrap();

        let busy = engine.clone();
        let slow = tokio::spawn(async move { busy.analyze(white_png_base64()).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let err = engine.analyze("%%%".to_string()).await.unwrap_err();
        assert!(matches!(err, EngineError::Preprocess(_)));
        assert!(
            started.elapsed() < Duration::from_millis(1000),
            "bad payload waited {:?}",
            started.elapsed()
        );

        let p = slow.await.unwrap().unwrap();
        assert_eq!(p.emotion, Emotion::Neutral);
    }

    #[tokio::test]
    async fn test_engine_survives_predictor_panic() {
        let engine = spawn_engine(Box::new(PanicsOnce { calls: 0 }), 4).unwrap();

        let err = engine.analyze(white_png_base64()).await.unwrap_err();
        match err {
            EngineError::Panicked(message) => assert!(message.contains("session blew up")),
            other => panic!("expected Panicked, got {other:?}"),
        }

        let p = engine.analyze(white_png_base64()).await.unwrap();
        assert_eq!(p.emotion, Emotion::Happy);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static str"), "static str");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
