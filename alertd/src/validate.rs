use crate::errors::{Error, Result};
use crate::model::{
    ConfigureDeviceRequest, GetDeviceAlertsRequest, GetDeviceMetricsRequest, RecordMetricRequest,
    Timeframe,
};
use std::fmt;

pub const MIN_TEMPERATURE: f64 = -10000.00;
pub const MAX_TEMPERATURE: f64 = 10000.00;
pub const MIN_BATTERY: i32 = 0;
pub const MAX_BATTERY: i32 = 100;

/// Field-level violations accumulated while validating a single request.
/// A request is rejected before any persistence when one or more exist.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldViolations(Vec<(String, String)>);

impl FieldViolations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push((field.to_string(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(field, _)| field.as_str())
    }

    pub fn details(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect()
    }

    fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for FieldViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request: {}", self.details().join("; "))
    }
}

pub fn configure_device(req: &ConfigureDeviceRequest) -> Result<()> {
    let mut v = FieldViolations::new();
    if is_blank(&req.device_id) {
        v.add("device_id", "must not be blank");
    }
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&req.temperature_threshold) {
        v.add(
            "temperature_threshold",
            format!("must be between {MIN_TEMPERATURE:.2} and {MAX_TEMPERATURE:.2}"),
        );
    }
    if !(MIN_BATTERY..=MAX_BATTERY).contains(&req.battery_threshold) {
        v.add(
            "battery_threshold",
            format!("must be between {MIN_BATTERY} and {MAX_BATTERY}"),
        );
    }
    v.into_result()
}

pub fn record_metric(req: &RecordMetricRequest) -> Result<()> {
    let mut v = FieldViolations::new();
    if is_blank(&req.device_id) {
        v.add("device_id", "must not be blank");
    }
    if req.timestamp.is_none() {
        v.add("timestamp", "must not be empty");
    }
    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&req.temperature) {
        v.add(
            "temperature",
            format!("must be between {MIN_TEMPERATURE:.2} and {MAX_TEMPERATURE:.2}"),
        );
    }
    if !(MIN_BATTERY..=MAX_BATTERY).contains(&req.battery) {
        v.add(
            "battery",
            format!("must be between {MIN_BATTERY} and {MAX_BATTERY}"),
        );
    }
    v.into_result()
}

pub fn get_device_alerts(req: &GetDeviceAlertsRequest) -> Result<()> {
    paged_query(&req.device_id, &req.timeframe)
}

pub fn get_device_metrics(req: &GetDeviceMetricsRequest) -> Result<()> {
    paged_query(&req.device_id, &req.timeframe)
}

fn paged_query(device_id: &str, timeframe: &Timeframe) -> Result<()> {
    let mut v = FieldViolations::new();
    if is_blank(device_id) {
        v.add("device_id", "must not be blank");
    }
    if let (Some(start), Some(end)) = (timeframe.start, timeframe.end) {
        if start > end {
            v.add("timeframe.start", "must be before timeframe.end");
        }
    }
    v.into_result()
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
