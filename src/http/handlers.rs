//! Route handlers.

use std::fmt::Write as _;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse},
};
use rand::Rng;
use serde::Deserialize;

use crate::http::server::AppState;
use crate::observability::logging::{self, LogContext};
use crate::observability::metrics::Timer;

const INDEX_PAGE: &str = r#"<html>
<head><title> httpserver study</title></head>
<body>
<h1>HttpServer Study Health URL</h1>
<p><a href="healthz">HealthCheck</a></p>
</body>
</html>"#;

#[derive(Debug, Default, Deserialize)]
pub struct HelloQuery {
    pub user: Option<String>,
}

/// Landing page, also served for every unrouted path.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Liveness probe.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        "OK\n",
    )
}

/// Greets `?user=` after a random delay and lists the request headers.
pub async fn hello(
    State(state): State<AppState>,
    Query(query): Query<HelloQuery>,
    headers: HeaderMap,
) -> String {
    let logger = logging::for_context(&LogContext::background());
    logger.info("entering hello handler");

    let timer = Timer::new();
    let delay = random_delay(state.max_delay_ms);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let body = hello_body(delay, query.user.as_deref(), &headers);

    timer.observe_total();
    logger.info(format!("Respond in {} ms", delay));
    body
}

fn random_delay(max_delay_ms: u64) -> u64 {
    const MIN_DELAY_MS: u64 = 10;
    if max_delay_ms <= MIN_DELAY_MS {
        return MIN_DELAY_MS;
    }
    rand::thread_rng().gen_range(MIN_DELAY_MS..max_delay_ms)
}

fn hello_body(delay: u64, user: Option<&str>, headers: &HeaderMap) -> String {
    let mut body = format!("delay time [{}]\n", delay);
    match user.filter(|u| !u.is_empty()) {
        Some(user) => {
            let _ = writeln!(body, "hello [{}]", user);
        }
        None => body.push_str("hello [stranger]\n"),
    }
    body.push_str("===================Details of the http request header:============\n");
    for name in headers.keys() {
        let values: Vec<_> = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        let _ = writeln!(body, "{}=[{}]", name, values.join(" "));
    }
    body
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
