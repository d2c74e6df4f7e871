use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::env;
use std::time::Duration;
use tracing::{error, info, warn};

const TEMPERATURE_THRESHOLD: f64 = 50.0;
const BATTERY_THRESHOLD: i32 = 50;

#[derive(Debug, Serialize)]
struct ConfigureDeviceBody {
    temperature_threshold: f64,
    battery_threshold: i32,
}

#[derive(Debug, Serialize)]
struct RecordMetricBody {
    temperature: f64,
    battery: i32,
    timestamp: DateTime<Utc>,
}

#[tokio::main]
async fn main() {
    let server_url = env::var("SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let num_devices: usize = env::var("DEVICES")
        .unwrap_or_else(|_| "100".to_string())
        .parse()
        .unwrap_or(100);
    let interval_ms: u64 = env::var("INTERVAL_MS")
        .unwrap_or_else(|_| "100".to_string())
        .parse()
        .unwrap_or(100);

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting IoT Device Simulator");
    info!(
        "Server: {}, Devices: {}, Interval: {}ms",
        server_url, num_devices, interval_ms
    );

    let session_id = uuid::Uuid::new_v4().to_string();
    let session_id = session_id.split('-').next().unwrap_or("sim").to_string();

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    // Configure thresholds for every device before generating metrics
    info!("Configuring {} devices", num_devices);
    for i in 0..num_devices {
        let device_id = device_id(&session_id, i);
        let url = format!("{}/api/v1/devices/{}/config", server_url, device_id);
        let body = ConfigureDeviceBody {
            temperature_threshold: TEMPERATURE_THRESHOLD,
            battery_threshold: BATTERY_THRESHOLD,
        };
        match client.post(&url).json(&body).send().await {
            Ok(res) if res.status().is_success() => {}
            Ok(res) => warn!("Configure {} failed: {}", device_id, res.status()),
            Err(e) => warn!("Configure {} failed: {}", device_id, e),
        }
    }

    info!("Publishing metrics, press Ctrl-C to stop");

    for i in 0..num_devices {
        let client = client.clone();
        let server_url = server_url.clone();
        let device_id = device_id(&session_id, i);

        tokio::spawn(async move {
            let url = format!("{}/api/v1/devices/{}/metrics", server_url, device_id);
            loop {
                let body = random_metric();
                match client.post(&url).json(&body).send().await {
                    Ok(res) if res.status().is_success() => {}
                    Ok(res) => warn!("Record {} metric failed: {}", device_id, res.status()),
                    Err(e) => warn!("Record {} metric failed: {}", device_id, e),
                }
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        });
    }

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received shutdown signal");
    }
    info!("Shutting down");
}

fn device_id(session_id: &str, i: usize) -> String {
    format!("session-{}-device-{}", session_id, i)
}

// Values are spread around the configured thresholds so roughly half of
// the reported metrics trigger an alert.
fn random_metric() -> RecordMetricBody {
    let mut rng = rand::thread_rng();
    RecordMetricBody {
        temperature: rng.gen_range(0.0..TEMPERATURE_THRESHOLD * 2.0),
        battery: rng.gen_range(0..=BATTERY_THRESHOLD * 2).min(100),
        timestamp: Utc::now(),
    }
}
