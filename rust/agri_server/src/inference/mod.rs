//! Inference collaborators consumed by the HTTP layer.
//!
//! Handlers only see the two traits below; the ONNX Runtime implementations
//! are wired in by the binary and tests inject their own.

pub mod crop;
pub mod disease;

use std::path::Path;

use ort::session::{builder::GraphOptimizationLevel, Session};
use thiserror::Error;

pub use crop::OnnxCropRecommender;
pub use disease::OnnxDiseaseDetector;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Invalid features: {0}")]
    InvalidFeatures(String),

    #[error("Invalid image: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model error: {0}")]
    Model(String),
}

/// Flattens any ONNX Runtime failure into a model error.
pub(crate) fn ort_error(err: impl std::fmt::Display) -> InferenceError {
    InferenceError::Model(format!("ORT error: {}", err))
}

impl From<ndarray::ShapeError> for InferenceError {
    fn from(err: ndarray::ShapeError) -> Self {
        InferenceError::Model(format!("Shape error: {}", err))
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        InferenceError::Image(err.to_string())
    }
}

/// Tabular crop recommendation: seven soil and weather readings in, crop label out.
pub trait CropRecommender: Send + Sync {
    fn predict_crop(&self, features: &[f64]) -> Result<String, InferenceError>;
}

/// Image-based disease classification. The result is passed to the client untouched.
pub trait DiseaseDetector: Send + Sync {
    fn predict(&self, image_path: &Path) -> Result<serde_json::Value, InferenceError>;
}

pub(crate) fn load_session(path: &str, intra_threads: usize) -> Result<Session, InferenceError> {
    if !Path::new(path).exists() {
        return Err(InferenceError::Model(format!("model file not found at {}", path)));
    }

    let session = Session::builder()
        .map_err(ort_error)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(ort_error)?
        .with_intra_threads(intra_threads.max(1))
        .map_err(ort_error)?
        .commit_from_file(path)
        .map_err(ort_error)?;

    Ok(session)
}

/// Index of the highest score, ignoring NaNs.
pub(crate) fn argmax(scores: &[f32]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_highest_score() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[f32::NAN, 0.3, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn error_messages_carry_context() {
        let err = InferenceError::InvalidFeatures("expected 7 values, got 2".to_string());
        assert_eq!(err.to_string(), "Invalid features: expected 7 values, got 2");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(InferenceError::from(io), InferenceError::Io(_)));
    }

    #[test]
    fn missing_model_file_is_reported() {
        let err = load_session("/definitely/not/here.onnx", 1).err().unwrap();
        assert!(err.to_string().contains("model file not found"));
    }
}
