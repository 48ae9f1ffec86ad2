//! Plant disease classifier over an ONNX image model.
//!
//! Images are decoded from their bytes (the staged file name carries no
//! reliable format hint), resized to a square input, normalised with ImageNet
//! statistics into NCHW layout, and scored. Labels follow the PlantVillage
//! `Plant___Condition` convention.

use std::path::Path;
use std::sync::Mutex;

use common::DiseaseModelConfig;
use image::{imageops::FilterType, DynamicImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::Serialize;
use tracing::info;

use super::{load_session, ort_error, DiseaseDetector, InferenceError};

/// ImageNet normalization mean values (RGB)
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Serialize)]
pub struct RankedDisease {
    pub disease: String,
    pub confidence: f32,
}

/// JSON shape returned by `POST /disease_detection/predict`.
#[derive(Debug, Clone, Serialize)]
pub struct DiseasePrediction {
    pub disease: String,
    pub plant: String,
    pub is_healthy: bool,
    pub confidence: f32,
    pub top_predictions: Vec<RankedDisease>,
}

/// Plant part of a `Plant___Condition` label.
pub fn plant_name(label: &str) -> &str {
    label.split("___").next().unwrap_or(label)
}

/// True only when the condition part of a `Plant___Condition` label is `healthy`.
pub fn is_healthy(label: &str) -> bool {
    label
        .split_once("___")
        .map(|(_, condition)| condition.eq_ignore_ascii_case("healthy"))
        .unwrap_or(false)
}

/// Resize and normalise into a flat CHW buffer.
pub fn preprocess(image: &DynamicImage, size: u32) -> Vec<f32> {
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let num_pixels = (size * size) as usize;

    let mut normalized = vec![0.0f32; 3 * num_pixels];
    for (i, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            normalized[channel * num_pixels + i] =
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }

    normalized
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return exps;
    }
    exps.into_iter().map(|x| x / sum).collect()
}

/// Orders class probabilities and keeps the best `top_k` (at least one).
pub fn rank(
    probabilities: &[f32],
    labels: &[String],
    top_k: usize,
) -> Result<DiseasePrediction, InferenceError> {
    if probabilities.len() != labels.len() {
        return Err(InferenceError::Model(format!(
            "disease model returned {} scores for {} labels",
            probabilities.len(),
            labels.len()
        )));
    }

    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

    let top_predictions: Vec<RankedDisease> = indexed
        .iter()
        .take(top_k.max(1))
        .map(|&(idx, confidence)| RankedDisease {
            disease: labels[idx].clone(),
            confidence,
        })
        .collect();

    let best = top_predictions
        .first()
        .cloned()
        .ok_or_else(|| InferenceError::Model("disease model returned no scores".to_string()))?;

    Ok(DiseasePrediction {
        plant: plant_name(&best.disease).to_string(),
        is_healthy: is_healthy(&best.disease),
        disease: best.disease,
        confidence: best.confidence,
        top_predictions,
    })
}

pub struct OnnxDiseaseDetector {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    image_size: u32,
    top_k: usize,
    apply_softmax: bool,
    labels: Vec<String>,
}

impl OnnxDiseaseDetector {
    pub fn load(config: &DiseaseModelConfig) -> Result<Self, InferenceError> {
        if config.labels.is_empty() {
            return Err(InferenceError::Model(
                "disease model has no labels configured".to_string(),
            ));
        }

        let session = load_session(&config.path, config.intra_threads)?;
        info!(
            "✓ Disease model loaded from {} ({} labels, {}px input)",
            config.path,
            config.labels.len(),
            config.image_size
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            image_size: config.image_size,
            top_k: config.top_k,
            apply_softmax: config.apply_softmax,
            labels: config.labels.clone(),
        })
    }

    fn scores(&self, image: &DynamicImage) -> Result<Vec<f32>, InferenceError> {
        let size = self.image_size as usize;
        let pixels = preprocess(image, self.image_size);
        let input = Array4::from_shape_vec((1, 3, size, size), pixels)?;
        let input_value = Value::from_array(input).map_err(ort_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| InferenceError::Model("disease session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(ort_error)?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::Model(format!(
                "disease model has no output named {}",
                self.output_name
            ))
        })?;
        let (_, data) = output.try_extract_tensor::<f32>().map_err(ort_error)?;

        Ok(data.to_vec())
    }
}

impl DiseaseDetector for OnnxDiseaseDetector {
    fn predict(&self, image_path: &Path) -> Result<serde_json::Value, InferenceError> {
        let bytes = std::fs::read(image_path)?;
        let image = image::load_from_memory(&bytes)?;

        let scores = self.scores(&image)?;
        let probabilities = if self.apply_softmax {
            softmax(&scores)
        } else {
            scores
        };

        let prediction = rank(&probabilities, &self.labels, self.top_k)?;
        serde_json::to_value(prediction).map_err(|e| InferenceError::Model(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn labels() -> Vec<String> {
        vec![
            "Tomato___Early_blight".to_string(),
            "Tomato___healthy".to_string(),
            "Potato___Late_blight".to_string(),
        ]
    }

    #[test]
    fn label_helpers() {
        assert_eq!(plant_name("Corn_(maize)___Common_rust_"), "Corn_(maize)");
        assert_eq!(plant_name("Background_without_leaves"), "Background_without_leaves");
        assert!(is_healthy("Apple___healthy"));
        assert!(!is_healthy("Apple___Black_rot"));
        assert!(!is_healthy("Plant___unhealthy"));
        assert!(!is_healthy("Background_without_leaves"));
    }

    #[test]
    fn softmax_is_a_distribution() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn rank_orders_and_truncates() {
        let prediction = rank(&[0.2, 0.7, 0.1], &labels(), 2).unwrap();

        assert_eq!(prediction.disease, "Tomato___healthy");
        assert_eq!(prediction.plant, "Tomato");
        assert!(prediction.is_healthy);
        assert_eq!(prediction.confidence, 0.7);
        assert_eq!(prediction.top_predictions.len(), 2);
        assert_eq!(prediction.top_predictions[1].disease, "Tomato___Early_blight");
    }

    #[test]
    fn rank_rejects_label_mismatch() {
        assert!(rank(&[0.5, 0.5], &labels(), 3).is_err());
    }

    #[test]
    fn preprocess_produces_chw_layout() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let tensor = preprocess(&image, 4);

        assert_eq!(tensor.len(), 3 * 4 * 4);
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((tensor[0] - red).abs() < 1e-5);
        assert!((tensor[16] - green).abs() < 1e-5);
    }
}
