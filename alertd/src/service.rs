use crate::errors::{Error, Result};
use crate::metrics::{ALERTS_TRIGGERED_TOTAL, METRICS_RECORDED_TOTAL};
use crate::model::{
    Alert, AlertReason, ConfigureDeviceRequest, GetDeviceAlertsRequest, GetDeviceAlertsResponse,
    GetDeviceMetricsRequest, GetDeviceMetricsResponse, Metric, RecordMetricRequest,
    ThresholdConfig,
};
use crate::pagination::{decode_page_token, encode_page_token, TokenContext};
use crate::repo::{PageOptions, Repository};
use crate::validate;
use std::sync::Arc;
use tracing::info;

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 250;

/// Orchestrates threshold configuration, metric recording with alert
/// evaluation, and paginated alert/metric queries. Holds no state beyond
/// the repository handle; every call is validate → persist → evaluate →
/// respond.
#[derive(Clone)]
pub struct Service {
    repo: Arc<dyn Repository>,
}

impl Service {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Upserts the device's threshold config. Idempotent.
    pub async fn configure_device(&self, req: ConfigureDeviceRequest) -> Result<()> {
        validate::configure_device(&req)?;

        let config = ThresholdConfig {
            temperature_threshold: req.temperature_threshold,
            battery_threshold: req.battery_threshold,
        };
        self.repo.upsert_device_config(&req.device_id, config).await?;

        info!(
            device_id = %req.device_id,
            temperature_threshold = req.temperature_threshold,
            battery_threshold = req.battery_threshold,
            "configured device"
        );

        Ok(())
    }

    /// Persists the metric unconditionally, then evaluates it against the
    /// device's threshold config as of this write. Each breached threshold
    /// produces one alert; the checks are independent. A device with no
    /// config records successfully with no alert.
    pub async fn record_metric(&self, req: RecordMetricRequest) -> Result<()> {
        validate::record_metric(&req)?;
        // presence enforced by validation above
        let timestamp = req.timestamp.unwrap_or_default();

        let metric = Metric {
            temperature: req.temperature,
            battery: req.battery,
            time: timestamp,
        };
        self.repo.save_device_metric(&req.device_id, metric).await?;
        METRICS_RECORDED_TOTAL.inc();

        info!(
            device_id = %req.device_id,
            temperature = req.temperature,
            battery = req.battery,
            "recorded metric"
        );

        let config = match self.repo.get_device_config(&req.device_id).await {
            Ok(config) => config,
            // no thresholds configured for the device
            Err(Error::NotFound) => return Ok(()),
            Err(err) => return Err(err),
        };

        if req.temperature > config.temperature_threshold {
            let alert = Alert {
                reason: AlertReason::TemperatureHigh,
                description: temp_high_desc(req.temperature, config.temperature_threshold),
                time: timestamp,
            };
            info!(
                device_id = %req.device_id,
                reason = %alert.reason,
                temperature = req.temperature,
                threshold = config.temperature_threshold,
                "alert triggered"
            );
            self.repo.save_device_alert(&req.device_id, alert).await?;
            ALERTS_TRIGGERED_TOTAL.inc();
        }

        if req.battery < config.battery_threshold {
            let alert = Alert {
                reason: AlertReason::BatteryLow,
                description: battery_low_desc(req.battery, config.battery_threshold),
                time: timestamp,
            };
            info!(
                device_id = %req.device_id,
                reason = %alert.reason,
                battery = req.battery,
                threshold = config.battery_threshold,
                "alert triggered"
            );
            self.repo.save_device_alert(&req.device_id, alert).await?;
            ALERTS_TRIGGERED_TOTAL.inc();
        }

        Ok(())
    }

    /// Serves one page of the device's alerts in descending (time, id)
    /// order. A supplied page token must have been issued for the same
    /// device and timeframe.
    pub async fn get_device_alerts(
        &self,
        req: GetDeviceAlertsRequest,
    ) -> Result<GetDeviceAlertsResponse> {
        validate::get_device_alerts(&req)?;

        let size = clamp_page_size(req.page_size);
        let ctx = TokenContext {
            device_id: &req.device_id,
            timeframe: req.timeframe,
        };

        let cursor = match req.page_token.as_deref() {
            Some(token) if !token.is_empty() => Some(decode_page_token(token, &ctx)?),
            _ => None,
        };

        let page = self
            .repo
            .get_device_alerts(&req.device_id, req.timeframe, PageOptions { size, cursor })
            .await?;

        let next_page_token = match page.next_cursor {
            Some(next) => Some(encode_page_token(next, &ctx)?),
            None => None,
        };

        Ok(GetDeviceAlertsResponse {
            alerts: page.items,
            next_page_token,
        })
    }

    /// Serves one page of the device's raw metrics, with the same
    /// pagination protocol as alerts.
    pub async fn get_device_metrics(
        &self,
        req: GetDeviceMetricsRequest,
    ) -> Result<GetDeviceMetricsResponse> {
        validate::get_device_metrics(&req)?;

        let size = clamp_page_size(req.page_size);
        let ctx = TokenContext {
            device_id: &req.device_id,
            timeframe: req.timeframe,
        };

        let cursor = match req.page_token.as_deref() {
            Some(token) if !token.is_empty() => Some(decode_page_token(token, &ctx)?),
            _ => None,
        };

        let page = self
            .repo
            .get_device_metrics(&req.device_id, req.timeframe, PageOptions { size, cursor })
            .await?;

        let next_page_token = match page.next_cursor {
            Some(next) => Some(encode_page_token(next, &ctx)?),
            None => None,
        };

        Ok(GetDeviceMetricsResponse {
            metrics: page.items,
            next_page_token,
        })
    }
}

fn clamp_page_size(size: Option<u32>) -> u32 {
    match size {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(s) if s > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        Some(s) => s,
    }
}

fn temp_high_desc(temperature: f64, threshold: f64) -> String {
    format!("Temperature ({temperature:.2}) exceeded configured threshold ({threshold:.2})")
}

fn battery_low_desc(battery: i32, threshold: i32) -> String {
    format!("Battery ({battery}) dropped below configured threshold ({threshold})")
}
