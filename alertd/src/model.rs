use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-device alerting thresholds. A device has at most one active config,
/// upserted in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub temperature_threshold: f64,
    pub battery_threshold: i32,
}

/// A single telemetry reading reported by a device. Written once, never
/// updated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    pub temperature: f64,
    pub battery: i32,
    #[serde(rename = "timestamp")]
    pub time: DateTime<Utc>,
}

/// A recorded threshold breach, produced as a side effect of a metric write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub reason: AlertReason,
    pub description: String,
    #[serde(rename = "timestamp")]
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertReason {
    TemperatureHigh,
    BatteryLow,
}

impl AlertReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertReason::TemperatureHigh => "TEMPERATURE_HIGH",
            AlertReason::BatteryLow => "BATTERY_LOW",
        }
    }
}

impl fmt::Display for AlertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEMPERATURE_HIGH" => Ok(AlertReason::TemperatureHigh),
            "BATTERY_LOW" => Ok(AlertReason::BatteryLow),
            other => Err(format!("unknown alert reason '{other}'")),
        }
    }
}

/// Optional time bounds applied to a query. Bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ConfigureDeviceRequest {
    pub device_id: String,
    pub temperature_threshold: f64,
    pub battery_threshold: i32,
}

#[derive(Debug, Clone)]
pub struct RecordMetricRequest {
    pub device_id: String,
    pub temperature: f64,
    pub battery: i32,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct GetDeviceAlertsRequest {
    pub device_id: String,
    pub timeframe: Timeframe,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetDeviceAlertsResponse {
    pub alerts: Vec<Alert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetDeviceMetricsRequest {
    pub device_id: String,
    pub timeframe: Timeframe,
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GetDeviceMetricsResponse {
    pub metrics: Vec<Metric>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}
