use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub crop_model: CropModelConfig,
    pub disease_model: DiseaseModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where uploaded images are staged; the OS temp dir when unset.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upload_dir: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropModelConfig {
    pub path: String,
    #[serde(default = "default_crop_input")]
    pub input_name: String,
    #[serde(default = "default_crop_output")]
    pub output_name: String,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    /// Class labels in the order of the model's score vector.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseModelConfig {
    pub path: String,
    #[serde(default = "default_image_input")]
    pub input_name: String,
    #[serde(default = "default_image_output")]
    pub output_name: String,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Set when the model emits logits rather than probabilities.
    #[serde(default = "default_apply_softmax")]
    pub apply_softmax: bool,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchEndpoint {
    Crop,
    Disease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub warmup: WarmupConfig,
    pub crop_features: Vec<f64>,
    pub image_path: String,
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    pub enabled: bool,
    pub num_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub endpoint: BenchEndpoint,
    pub concurrency: usize,
    pub num_requests: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_crop_input() -> String {
    "float_input".to_string()
}

fn default_crop_output() -> String {
    "probabilities".to_string()
}

fn default_image_input() -> String {
    "input".to_string()
}

fn default_image_output() -> String {
    "output".to_string()
}

fn default_image_size() -> u32 {
    224
}

fn default_top_k() -> usize {
    3
}

fn default_apply_softmax() -> bool {
    true
}

fn default_intra_threads() -> usize {
    1
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }
}

impl BenchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
crop_model:
  path: models/crop.onnx
  labels: [rice, maize]
disease_model:
  path: models/disease.onnx
  labels: [Tomato___healthy]
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();

        assert_eq!(config.server.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.server.upload_dir(), std::env::temp_dir());
        assert_eq!(config.crop_model.input_name, "float_input");
        assert_eq!(config.crop_model.labels, vec!["rice", "maize"]);
        assert_eq!(config.disease_model.image_size, 224);
        assert_eq!(config.disease_model.top_k, 3);
        assert!(config.disease_model.apply_softmax);
    }

    #[test]
    fn server_block_overrides_defaults() {
        let yaml = format!(
            "server:\n  host: 127.0.0.1\n  port: 9100\n  upload_dir: /var/tmp/agri\n{MINIMAL}"
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:9100");
        assert_eq!(config.server.upload_dir(), PathBuf::from("/var/tmp/agri"));
    }

    #[test]
    fn missing_model_section_is_an_error() {
        assert!(AppConfig::from_yaml("server:\n  port: 8000\n").is_err());
    }

    #[test]
    fn shipped_configs_parse() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config");

        let app = AppConfig::load(root.join("agri.yaml")).unwrap();
        assert_eq!(app.crop_model.labels.len(), 22);
        assert_eq!(app.disease_model.labels.len(), 38);

        let bench = BenchConfig::load(root.join("bench.yaml")).unwrap();
        assert_eq!(bench.crop_features.len(), 7);
        assert!(!bench.scenarios.is_empty());
    }

    #[test]
    fn bench_endpoint_is_lowercase() {
        let scenario: ScenarioConfig = serde_yaml::from_str(
            "name: crop_c4\nendpoint: crop\nconcurrency: 4\nnum_requests: 100\n",
        )
        .unwrap();
        assert_eq!(scenario.endpoint, BenchEndpoint::Crop);
    }
}
