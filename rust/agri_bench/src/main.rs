use anyhow::{Context, Result};
use common::config::ScenarioConfig;
use common::http::{CROP_PREDICT_PATH, DISEASE_PREDICT_PATH, HEALTH_PATH, INFO_PATH, UPLOAD_FIELD};
use common::{BenchConfig, BenchEndpoint, CropRecRequest, CropRecResponse, LatencySummary};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use reqwest::blocking::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioResult {
    scenario_name: String,
    endpoint: BenchEndpoint,
    concurrency: usize,
    num_requests: usize,
    latency_ms: LatencySummary,
    throughput_qps: f64,
    total_duration_sec: f64,
    errors: usize,
    error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BenchReport {
    server_url: String,
    server_info: serde_json::Value,
    results: HashMap<String, ScenarioResult>,
    timestamp: String,
}

struct SampleImage {
    bytes: Vec<u8>,
    file_name: String,
    mime: &'static str,
}

impl SampleImage {
    fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read sample image {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("sample.jpg")
            .to_string();
        let mime = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
            Some(ext) if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") => {
                "image/jpeg"
            }
            Some(ext) if ext.eq_ignore_ascii_case("webp") => "image/webp",
            _ => "application/octet-stream",
        };

        Ok(Self {
            bytes,
            file_name,
            mime,
        })
    }
}

struct BenchClient {
    server_url: String,
    client: reqwest::blocking::Client,
    crop_features: Vec<f64>,
    image: SampleImage,
}

impl BenchClient {
    fn new(server_url: String, crop_features: Vec<f64>, image: SampleImage) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            server_url,
            client,
            crop_features,
            image,
        })
    }

    fn wait_for_server(&self, timeout_secs: u64) -> Result<()> {
        let health_url = format!("{}{}", self.server_url, HEALTH_PATH);
        let start = Instant::now();

        println!("Waiting for server at {}...", self.server_url);

        while start.elapsed().as_secs() < timeout_secs {
            if let Ok(response) = self.client.get(&health_url).send() {
                if response.status().is_success() {
                    println!("✓ Server is ready!");
                    return Ok(());
                }
            }
            std::thread::sleep(Duration::from_secs(2));
        }

        anyhow::bail!("✗ Server failed to start within {}s", timeout_secs)
    }

    fn get_server_info(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}{}", self.server_url, INFO_PATH))
            .send()
            .context("Failed to get server info")?;

        let info: serde_json::Value = response.json()?;
        Ok(info)
    }

    fn predict_crop(&self) -> Result<String> {
        let request = CropRecRequest {
            features: self.crop_features.clone(),
        };

        let response = self
            .client
            .post(format!("{}{}", self.server_url, CROP_PREDICT_PATH))
            .json(&request)
            .send()
            .context("Failed to send crop request")?;

        if !response.status().is_success() {
            anyhow::bail!("Server returned error: {}", response.status());
        }

        let result: CropRecResponse = response.json()?;
        Ok(result.crop)
    }

    fn predict_disease(&self) -> Result<serde_json::Value> {
        let part = Part::bytes(self.image.bytes.clone())
            .file_name(self.image.file_name.clone())
            .mime_str(self.image.mime)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(format!("{}{}", self.server_url, DISEASE_PREDICT_PATH))
            .multipart(form)
            .send()
            .context("Failed to send disease request")?;

        if !response.status().is_success() {
            anyhow::bail!("Server returned error: {}", response.status());
        }

        Ok(response.json()?)
    }

    fn call(&self, endpoint: BenchEndpoint) -> Result<()> {
        match endpoint {
            BenchEndpoint::Crop => self.predict_crop().map(|_| ()),
            BenchEndpoint::Disease => self.predict_disease().map(|_| ()),
        }
    }

    fn warmup(&self, num_iterations: usize) -> Result<()> {
        println!("\nWarming up server ({} iterations per endpoint)...", num_iterations);

        let pb = progress_bar(num_iterations as u64 * 2, "{msg} [{bar:40.cyan/blue}] {pos}/{len}")?;
        pb.set_message("Warmup");

        let mut errors = 0;
        for endpoint in [BenchEndpoint::Crop, BenchEndpoint::Disease] {
            for _ in 0..num_iterations {
                if self.call(endpoint).is_err() {
                    errors += 1;
                }
                pb.inc(1);
            }
        }

        pb.finish_with_message("✓ Warmup complete");

        if errors > 0 {
            println!(
                "⚠ Warning: {}/{} warmup requests failed",
                errors,
                num_iterations * 2
            );
        }

        Ok(())
    }

    fn run_scenario(&self, scenario: &ScenarioConfig) -> Result<ScenarioResult> {
        println!("\n{}", "=".repeat(70));
        println!("Scenario: {}", scenario.name);
        println!("  Endpoint: {:?}", scenario.endpoint);
        println!("  Concurrency: {}", scenario.concurrency);
        println!("  Requests: {}", scenario.num_requests);
        println!("{}", "=".repeat(70));

        let errors = Arc::new(AtomicUsize::new(0));
        let latencies = Arc::new(Mutex::new(Vec::with_capacity(scenario.num_requests)));

        let pb = progress_bar(
            scenario.num_requests as u64,
            "{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )?;
        pb.set_message("Running");

        let start_time = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(scenario.concurrency.max(1))
            .build()?;

        pool.install(|| {
            (0..scenario.num_requests).into_par_iter().for_each(|_| {
                let request_start = Instant::now();

                match self.call(scenario.endpoint) {
                    Ok(()) => {
                        let latency = request_start.elapsed().as_secs_f64() * 1000.0;
                        if let Ok(mut samples) = latencies.lock() {
                            samples.push(latency);
                        }
                    }
                    Err(_) => {
                        errors.fetch_add(1, Ordering::SeqCst);
                    }
                }

                pb.inc(1);
            });
        });

        let total_duration = start_time.elapsed().as_secs_f64();
        pb.finish_with_message("✓ Complete");

        let samples = latencies
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default();
        let latency_ms = LatencySummary::from_samples(&samples);

        let error_count = errors.load(Ordering::SeqCst);
        let successful_requests = scenario.num_requests.saturating_sub(error_count);
        let throughput_qps = if total_duration > 0.0 {
            successful_requests as f64 / total_duration
        } else {
            0.0
        };
        let error_rate = if scenario.num_requests > 0 {
            error_count as f64 / scenario.num_requests as f64
        } else {
            0.0
        };

        let result = ScenarioResult {
            scenario_name: scenario.name.clone(),
            endpoint: scenario.endpoint,
            concurrency: scenario.concurrency,
            num_requests: scenario.num_requests,
            latency_ms,
            throughput_qps,
            total_duration_sec: total_duration,
            errors: error_count,
            error_rate,
        };

        println!("\nResults:");
        println!("  Total duration: {:.2}s", result.total_duration_sec);
        println!("  Throughput: {:.2} req/s", result.throughput_qps);
        println!("  Latency (mean): {:.2}ms", result.latency_ms.mean);
        println!("  Latency (p50): {:.2}ms", result.latency_ms.median);
        println!("  Latency (p95): {:.2}ms", result.latency_ms.p95);
        println!("  Latency (p99): {:.2}ms", result.latency_ms.p99);
        println!("  Errors: {}", result.errors);
        println!("  Error rate: {:.2}%", result.error_rate * 100.0);

        Ok(result)
    }

    fn run(&self, config: &BenchConfig) -> Result<BenchReport> {
        let server_info = self.get_server_info()?;
        println!("\nServer Info:");
        println!("{}", serde_json::to_string_pretty(&server_info)?);

        let crop = self.predict_crop().context("Crop sanity request failed")?;
        println!("Sample crop recommendation: {}", crop);

        if config.warmup.enabled {
            self.warmup(config.warmup.num_requests)?;
        }

        let mut results = HashMap::new();
        for scenario in &config.scenarios {
            let result = self.run_scenario(scenario)?;
            results.insert(scenario.name.clone(), result);
        }

        Ok(BenchReport {
            server_url: self.server_url.clone(),
            server_info,
            results,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

fn progress_bar(len: u64, template: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

fn main() -> Result<()> {
    println!("========================================================================");
    println!("Smart Agriculture API Load Client");
    println!("========================================================================");

    let server_url = env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let config_path = env::var("BENCH_CONFIG").unwrap_or_else(|_| "config/bench.yaml".to_string());
    let results_dir = env::var("RESULTS_DIR").unwrap_or_else(|_| "results".to_string());

    println!("Server URL: {}", server_url);
    println!("Config: {}", config_path);

    let config = BenchConfig::load(&config_path)
        .with_context(|| format!("Failed to load bench configuration from {}", config_path))?;
    let image = SampleImage::load(Path::new(&config.image_path))?;

    let client = BenchClient::new(server_url, config.crop_features.clone(), image)?;
    client.wait_for_server(120)?;

    let report = client.run(&config)?;

    let output_dir = Path::new(&results_dir);
    fs::create_dir_all(output_dir)?;

    let output_path = output_dir.join("report.json");
    fs::write(&output_path, serde_json::to_string_pretty(&report)?)?;

    println!("\n========================================================================");
    println!("Load run complete!");
    println!("Results saved to: {}", output_path.display());
    println!("========================================================================");

    Ok(())
}
