use std::rc::Rc;
use std::time::{Duration, Instant};

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures::future::{ready, LocalBoxFuture, Ready};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

use crate::error::AppError;

/// Requests by matched route and status class (`2xx`, `4xx`, ...)
static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_service_http_requests_total",
            "HTTP requests by matched route and status class",
        ),
        &["route", "status_class"],
    )
    .expect("failed to create realtime_service_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_service_http_requests_total");
    counter
});

/// Handler latency. WebSocket upgrades only time the handshake.
static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "realtime_service_http_request_duration_seconds",
            "Handler latency by matched route",
        )
        .buckets(vec![0.002, 0.01, 0.05, 0.1, 0.25, 1.0]),
        &["route"],
    )
    .expect("failed to create realtime_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register realtime_service_http_request_duration_seconds");
    histogram
});

static API_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_service_api_errors_total",
            "Handler errors by route and error code",
        ),
        &["route", "code"],
    )
    .expect("failed to create realtime_service_api_errors_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_service_api_errors_total");
    counter
});

static ACTIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "realtime_service_active_sessions",
        "Open WebSocket sessions registered in the connection registry",
    )
    .expect("failed to create realtime_service_active_sessions");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register realtime_service_active_sessions");
    gauge
});

static PRESENCE_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_service_presence_transitions_total",
            "Presence signals by result (online, offline, unchanged, stale)",
        ),
        &["result"],
    )
    .expect("failed to create realtime_service_presence_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_service_presence_transitions_total");
    counter
});

static ROUTER_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_service_router_deliveries_total",
            "Live event deliveries by event type and result",
        ),
        &["event", "result"],
    )
    .expect("failed to create realtime_service_router_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_service_router_deliveries_total");
    counter
});

static PUSH_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_service_push_attempts_total",
            "Push dispatch attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create realtime_service_push_attempts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_service_push_attempts_total");
    counter
});

static NOTIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "realtime_service_notifications_total",
            "Notification fan-out results (created, suppressed, self)",
        ),
        &["type", "result"],
    )
    .expect("failed to create realtime_service_notifications_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register realtime_service_notifications_total");
    counter
});

pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

pub fn observe_http_request(route: &str, status: u16, elapsed: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, status_class(status)])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[route])
        .observe(elapsed.as_secs_f64());
}

pub fn record_api_error(route: &str, code: &str) {
    API_ERRORS_TOTAL.with_label_values(&[route, code]).inc();
}

pub fn session_opened() {
    ACTIVE_SESSIONS.inc();
}

pub fn session_closed() {
    ACTIVE_SESSIONS.dec();
}

pub fn record_presence_signal(result: &str) {
    PRESENCE_TRANSITIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_router_delivery(event: &str, delivered: bool) {
    let result = if delivered { "delivered" } else { "no_session" };
    ROUTER_DELIVERIES_TOTAL
        .with_label_values(&[event, result])
        .inc();
}

pub fn record_push_attempt(outcome: &str) {
    PUSH_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_notification(notification_type: &str, result: &str) {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[notification_type, result])
        .inc();
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Scrapes and health checks are not recorded.
const UNRECORDED_ROUTES: &[&str] = &["/metrics", "/health"];

/// Records route, status class and `AppError` code for every API request
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // Patterns, not raw paths, so user and message ids stay out of labels.
        let route = req.match_pattern();

        Box::pin(async move {
            let Some(route) = route.filter(|r| !UNRECORDED_ROUTES.contains(&r.as_str())) else {
                return service.call(req).await;
            };

            let start = Instant::now();
            let result = service.call(req).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(response) => {
                    observe_http_request(&route, response.status().as_u16(), elapsed);
                    if let Some(app_error) = response
                        .response()
                        .error()
                        .and_then(|e| e.as_error::<AppError>())
                    {
                        record_api_error(&route, app_error.code());
                    }
                }
                Err(_) => observe_http_request(&route, 500, elapsed),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App};

    #[::core::prelude::v1::test]
    fn test_status_class() {
        assert_eq!(status_class(101), "1xx");
        assert_eq!(status_class(201), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
    }

    #[actix_web::test]
    async fn test_middleware_labels_route_and_error_code() {
        let route = "/metrics-test/{id}";
        let app = test::init_service(
            App::new()
                .wrap(MetricsMiddleware)
                .route(
                    route,
                    web::get().to(|| async { Err::<HttpResponse, _>(AppError::NotFound) }),
                )
                .route("/metrics", web::get().to(serve_metrics)),
        )
        .await;

        let requests = HTTP_REQUESTS_TOTAL.with_label_values(&[route, "4xx"]);
        let errors = API_ERRORS_TOTAL.with_label_values(&[route, "NOT_FOUND"]);
        let scrapes = HTTP_REQUESTS_TOTAL.with_label_values(&["/metrics", "2xx"]);
        let (before_requests, before_errors) = (requests.get(), errors.get());

        for id in ["a", "b"] {
            let req = test::TestRequest::get().uri(&format!("/metrics-test/{id}")).to_request();
            test::call_service(&app, req).await;
        }
        let req = test::TestRequest::get().uri("/metrics").to_request();
        test::call_service(&app, req).await;

        assert_eq!(requests.get() - before_requests, 2);
        assert_eq!(errors.get() - before_errors, 2);
        assert_eq!(scrapes.get(), 0);
    }
}
