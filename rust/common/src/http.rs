use serde::{Deserialize, Serialize};

pub const SERVICE_NAME: &str = "Smart Agriculture AI API";
pub const API_VERSION: &str = "1.0.0";

pub const CROP_PREDICT_PATH: &str = "/crop_rec/predict";
pub const DISEASE_PREDICT_PATH: &str = "/disease_detection/predict";
pub const HEALTH_PATH: &str = "/health";
pub const DOCS_PATH: &str = "/docs";
pub const INFO_PATH: &str = "/info";

/// Multipart field carrying the uploaded image.
pub const UPLOAD_FIELD: &str = "file";
pub const NOT_AN_IMAGE: &str = "File must be an image";

/// Body of `POST /crop_rec/predict`.
///
/// Order: nitrogen, phosphorus, potassium, temperature, humidity, pH, rainfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropRecRequest {
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropRecResponse {
    pub crop: String,
}

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelAvailability {
    pub crop_recommendation: String,
    pub disease_detection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models: ModelAvailability,
    pub version: String,
}

impl HealthResponse {
    /// The static health report; collaborators are never called.
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            models: ModelAvailability {
                crop_recommendation: "available".to_string(),
                disease_detection: "available".to_string(),
            },
            version: API_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointIndex {
    pub crop_recommendation: String,
    pub disease_detection: String,
    pub health: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub endpoints: EndpointIndex,
    pub docs: String,
}

impl Default for RootResponse {
    fn default() -> Self {
        Self {
            message: SERVICE_NAME.to_string(),
            endpoints: EndpointIndex {
                crop_recommendation: CROP_PREDICT_PATH.to_string(),
                disease_detection: DISEASE_PREDICT_PATH.to_string(),
                health: HEALTH_PATH.to_string(),
            },
            docs: DOCS_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub crop_requests: u64,
    pub disease_requests: u64,
    pub failed_requests: u64,
    pub crop_model: Option<String>,
    pub disease_model: Option<String>,
    pub cpu_count: usize,
    pub memory_rss_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn health_has_fixed_shape() {
        let value = serde_json::to_value(HealthResponse::healthy()).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "healthy",
                "models": {
                    "crop_recommendation": "available",
                    "disease_detection": "available"
                },
                "version": "1.0.0"
            })
        );
    }

    #[test]
    fn root_lists_endpoints_and_docs() {
        let value = serde_json::to_value(RootResponse::default()).unwrap();
        assert_eq!(value["message"], "Smart Agriculture AI API");
        assert_eq!(value["endpoints"]["crop_recommendation"], "/crop_rec/predict");
        assert_eq!(value["endpoints"]["disease_detection"], "/disease_detection/predict");
        assert_eq!(value["endpoints"]["health"], "/health");
        assert_eq!(value["docs"], "/docs");
    }

    #[test]
    fn crop_request_rejects_non_numeric_features() {
        let parsed: Result<CropRecRequest, _> =
            serde_json::from_str(r#"{"features": [1.0, "two"]}"#);
        assert!(parsed.is_err());

        let parsed: CropRecRequest = serde_json::from_str(r#"{"features": [90, 42.5]}"#).unwrap();
        assert_eq!(parsed.features, vec![90.0, 42.5]);
    }
}
