use crate::errors::Error;
use crate::metrics::{HTTP_REQUESTS_TOTAL, REQUEST_LATENCY_SECONDS, THROTTLED_TOTAL};
use crate::model::{
    ConfigureDeviceRequest, GetDeviceAlertsRequest, GetDeviceAlertsResponse,
    GetDeviceMetricsRequest, GetDeviceMetricsResponse, RecordMetricRequest, Timeframe,
};
use crate::rlimit::RateLimiter;
use crate::service::Service;
use axum::{
    extract::{ConnectInfo, Path, Query, RawPathParams, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

/// How long a request may sit in the rate limiter before it is rejected
/// as throttled rather than queued indefinitely.
const RATE_LIMIT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
    service: Service,
}

/// Extracts the rate limit key from a request's path parameters. Returns
/// `None` when the request carries no device identifier, in which case the
/// middleware falls back to the peer address.
pub type RateLimitKeyFn = fn(&RawPathParams) -> Option<String>;

pub fn device_id_key(params: &RawPathParams) -> Option<String> {
    params
        .iter()
        .find(|(name, _)| *name == "device_id")
        .map(|(_, value)| value.to_string())
}

#[derive(Clone)]
struct RateLimitState {
    limiter: RateLimiter,
    key_fn: RateLimitKeyFn,
    acquire_timeout: Duration,
}

pub fn create_router(service: Service, limiter: Option<RateLimiter>) -> Router {
    let state = AppState { service };

    let mut router = Router::new()
        .route("/api/v1/devices/:device_id/config", post(configure_device))
        .route(
            "/api/v1/devices/:device_id/metrics",
            post(record_metric).get(get_device_metrics),
        )
        .route("/api/v1/devices/:device_id/alerts", get(get_device_alerts))
        .with_state(state);

    if let Some(limiter) = limiter {
        let rl_state = RateLimitState {
            limiter,
            key_fn: device_id_key,
            acquire_timeout: RATE_LIMIT_ACQUIRE_TIMEOUT,
        };
        router = router.layer(middleware::from_fn_with_state(rl_state, rate_limit));
    }

    // outermost layer: logs and measures every request, throttled ones included
    router.layer(middleware::from_fn(track_request))
}

async fn track_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_secs_f64();
    HTTP_REQUESTS_TOTAL.inc();
    REQUEST_LATENCY_SECONDS.observe(elapsed);
    info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_secs = elapsed,
        "handled request"
    );
    response
}

async fn rate_limit(
    State(state): State<RateLimitState>,
    params: RawPathParams,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let key = (state.key_fn)(&params).unwrap_or_else(|| addr.ip().to_string());
    match tokio::time::timeout(state.acquire_timeout, state.limiter.wait(&key)).await {
        Ok(()) => next.run(req).await,
        Err(_) => {
            THROTTLED_TOTAL.inc();
            StatusCode::TOO_MANY_REQUESTS.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigureDeviceBody {
    temperature_threshold: f64,
    battery_threshold: i32,
}

async fn configure_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<ConfigureDeviceBody>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .configure_device(ConfigureDeviceRequest {
            device_id,
            temperature_threshold: body.temperature_threshold,
            battery_threshold: body.battery_threshold,
        })
        .await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct RecordMetricBody {
    temperature: f64,
    battery: i32,
    timestamp: Option<DateTime<Utc>>,
}

async fn record_metric(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Json(body): Json<RecordMetricBody>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .record_metric(RecordMetricRequest {
            device_id,
            temperature: body.temperature,
            battery: body.battery,
            timestamp: body.timestamp,
        })
        .await?;
    Ok(StatusCode::CREATED)
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(rename = "timeframe.start")]
    start: Option<DateTime<Utc>>,
    #[serde(rename = "timeframe.end")]
    end: Option<DateTime<Utc>>,
    #[serde(rename = "page.size")]
    page_size: Option<u32>,
    #[serde(rename = "page.token")]
    page_token: Option<String>,
}

async fn get_device_alerts(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GetDeviceAlertsResponse>, AppError> {
    let res = state
        .service
        .get_device_alerts(GetDeviceAlertsRequest {
            device_id,
            timeframe: Timeframe {
                start: query.start,
                end: query.end,
            },
            page_size: query.page_size,
            page_token: query.page_token,
        })
        .await?;
    Ok(Json(res))
}

async fn get_device_metrics(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GetDeviceMetricsResponse>, AppError> {
    let res = state
        .service
        .get_device_metrics(GetDeviceMetricsRequest {
            device_id,
            timeframe: Timeframe {
                start: query.start,
                end: query.end,
            },
            page_size: query.page_size,
            page_token: query.page_token,
        })
        .await?;
    Ok(Json(res))
}

struct AppError(Error);

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            Error::Validation(violations) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    message: "Bad Request".to_string(),
                    details: violations.details(),
                },
            ),
            Error::InvalidPageToken => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    message: "invalid page token".to_string(),
                    details: Vec::new(),
                },
            ),
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    message: "Not Found".to_string(),
                    details: Vec::new(),
                },
            ),
            err => {
                error!("request failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorDetail {
                        message: "Internal Server Error".to_string(),
                        details: Vec::new(),
                    },
                )
            }
        };
        (status, Json(ErrorBody { error: detail })).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::FieldViolations;

    #[test]
    fn test_error_status_mapping() {
        let mut violations = FieldViolations::new();
        violations.add("device_id", "must not be blank");
        assert_eq!(
            AppError(Error::Validation(violations))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError(Error::InvalidPageToken).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError(Error::NotFound).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
