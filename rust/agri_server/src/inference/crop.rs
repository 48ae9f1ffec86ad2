use std::sync::Mutex;

use common::CropModelConfig;
use ndarray::Array2;
use ort::{session::Session, value::Value};
use tracing::info;

use super::{argmax, load_session, ort_error, CropRecommender, InferenceError};

pub const FEATURE_NAMES: [&str; 7] = [
    "nitrogen",
    "phosphorus",
    "potassium",
    "temperature",
    "humidity",
    "ph",
    "rainfall",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Checks arity and finiteness and narrows to the model's input precision.
pub fn validate_features(features: &[f64]) -> Result<[f32; FEATURE_COUNT], InferenceError> {
    if features.len() != FEATURE_COUNT {
        return Err(InferenceError::InvalidFeatures(format!(
            "expected {} values [{}], got {}",
            FEATURE_COUNT,
            FEATURE_NAMES.join(", "),
            features.len()
        )));
    }

    let mut row = [0.0f32; FEATURE_COUNT];
    for (idx, (&value, name)) in features.iter().zip(FEATURE_NAMES).enumerate() {
        if !value.is_finite() {
            return Err(InferenceError::InvalidFeatures(format!(
                "{} must be a finite number, got {}",
                name, value
            )));
        }
        row[idx] = value as f32;
    }

    Ok(row)
}

pub struct OnnxCropRecommender {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    labels: Vec<String>,
}

impl OnnxCropRecommender {
    pub fn load(config: &CropModelConfig) -> Result<Self, InferenceError> {
        if config.labels.is_empty() {
            return Err(InferenceError::Model("crop model has no labels configured".to_string()));
        }

        let session = load_session(&config.path, config.intra_threads)?;
        info!(
            "✓ Crop model loaded from {} ({} labels)",
            config.path,
            config.labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            labels: config.labels.clone(),
        })
    }

    fn scores(&self, row: [f32; FEATURE_COUNT]) -> Result<Vec<f32>, InferenceError> {
        let input = Array2::from_shape_vec((1, FEATURE_COUNT), row.to_vec())?;
        let input_value = Value::from_array(input).map_err(ort_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Model("crop session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(ort_error)?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::Model(format!("crop model has no output named {}", self.output_name))
        })?;
        let (_, data) = output.try_extract_tensor::<f32>().map_err(ort_error)?;

        Ok(data.to_vec())
    }
}

impl CropRecommender for OnnxCropRecommender {
    fn predict_crop(&self, features: &[f64]) -> Result<String, InferenceError> {
        let row = validate_features(features)?;
        let scores = self.scores(row)?;

        let idx = argmax(&scores)
            .ok_or_else(|| InferenceError::Model("crop model returned no scores".to_string()))?;

        self.labels
            .get(idx)
            .cloned()
            .ok_or_else(|| InferenceError::Model(format!("class index {} has no label", idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_seven_readings_in_order() {
        let row = validate_features(&[90.0, 42.0, 43.0, 20.8, 82.0, 6.5, 202.9]).unwrap();
        assert_eq!(row[0], 90.0);
        assert_eq!(row[5], 6.5);
        assert_eq!(row[6], 202.9f32);
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = validate_features(&[1.0, 2.0]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("expected 7 values"));
        assert!(message.contains("got 2"));

        assert!(validate_features(&[0.0; 8]).is_err());
        assert!(validate_features(&[]).is_err());
    }

    #[test]
    fn rejects_non_finite_readings() {
        let err = validate_features(&[1.0, 2.0, 3.0, 4.0, f64::NAN, 6.0, 7.0]).unwrap_err();
        assert!(err.to_string().contains("humidity"));
    }

    #[test]
    fn empty_label_table_is_rejected_before_loading() {
        let config = CropModelConfig {
            path: "models/crop.onnx".to_string(),
            input_name: "float_input".to_string(),
            output_name: "probabilities".to_string(),
            intra_threads: 1,
            labels: Vec::new(),
        };
        assert!(OnnxCropRecommender::load(&config).is_err());
    }
}
