pub mod config;
pub mod http;
pub mod stats;

pub use config::{AppConfig, BenchConfig, BenchEndpoint, CropModelConfig, DiseaseModelConfig};
pub use http::{
    CropRecRequest, CropRecResponse, ErrorResponse, HealthResponse, InfoResponse, RootResponse,
};
pub use stats::LatencySummary;
