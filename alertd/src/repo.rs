use crate::errors::Result;
use crate::model::{Alert, Metric, ThresholdConfig, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Position in a keyset-paginated scan: the (time, id) of the last row the
/// client has seen. Scans run in descending (time, id) order, so the next
/// page starts strictly after this pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageCursor {
    pub last_time: DateTime<Utc>,
    pub last_id: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions {
    pub size: u32,
    pub cursor: Option<PageCursor>,
}

/// One page of a scan. `next_cursor` is present only when another page
/// exists.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<PageCursor>,
}

/// Durable store for device threshold configs, metrics, and alerts.
///
/// `get_device_config` returns [`Error::NotFound`](crate::errors::Error)
/// when a device has no config; callers treat that as a soft condition,
/// not a failure. Paginated reads fetch `size + 1` rows to detect whether
/// a next page exists.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn upsert_device_config(&self, device_id: &str, config: ThresholdConfig) -> Result<()>;

    async fn get_device_config(&self, device_id: &str) -> Result<ThresholdConfig>;

    async fn save_device_metric(&self, device_id: &str, metric: Metric) -> Result<()>;

    async fn get_device_metrics(
        &self,
        device_id: &str,
        timeframe: Timeframe,
        page: PageOptions,
    ) -> Result<Page<Metric>>;

    async fn save_device_alert(&self, device_id: &str, alert: Alert) -> Result<()>;

    async fn get_device_alerts(
        &self,
        device_id: &str,
        timeframe: Timeframe,
        page: PageOptions,
    ) -> Result<Page<Alert>>;
}
