use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sysinfo::System;

use crate::inference::{CropRecommender, DiseaseDetector};

/// Model file locations reported by `/info`.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    pub crop: Option<String>,
    pub disease: Option<String>,
}

pub struct AppState {
    pub crop: Arc<dyn CropRecommender>,
    pub disease: Arc<dyn DiseaseDetector>,
    pub upload_dir: PathBuf,
    pub model_paths: ModelPaths,
    pub started_at: Instant,
    pub crop_requests: AtomicU64,
    pub disease_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub system: tokio::sync::Mutex<System>,
}

impl AppState {
    pub fn new(
        crop: Arc<dyn CropRecommender>,
        disease: Arc<dyn DiseaseDetector>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            crop,
            disease,
            upload_dir: upload_dir.into(),
            model_paths: ModelPaths::default(),
            started_at: Instant::now(),
            crop_requests: AtomicU64::new(0),
            disease_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            system: tokio::sync::Mutex::new(System::new()),
        }
    }

    pub fn with_model_paths(mut self, model_paths: ModelPaths) -> Self {
        self.model_paths = model_paths;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub(crate) fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }
}

pub type SharedState = Arc<AppState>;
