use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref HTTP_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "alertd_http_requests_total",
        "Total HTTP requests handled"
    ))
    .unwrap();
    pub static ref METRICS_RECORDED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "alertd_metrics_recorded_total",
        "Total device metrics persisted"
    ))
    .unwrap();
    pub static ref ALERTS_TRIGGERED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "alertd_alerts_triggered_total",
        "Total threshold breach alerts persisted"
    ))
    .unwrap();
    pub static ref THROTTLED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "alertd_throttled_requests_total",
        "Total requests rejected by the per-device rate limiter"
    ))
    .unwrap();
    pub static ref REQUEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "alertd_request_latency_seconds",
            "Time taken to handle an HTTP request"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .unwrap();
}

pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(METRICS_RECORDED_TOTAL.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ALERTS_TRIGGERED_TOTAL.clone()))
        .unwrap();
    REGISTRY.register(Box::new(THROTTLED_TOTAL.clone())).unwrap();
    REGISTRY
        .register(Box::new(REQUEST_LATENCY_SECONDS.clone()))
        .unwrap();
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
