//! Per-request observability middleware.
//!
//! # Responsibilities
//! - Echo a `version` header and the inbound request headers onto the response
//! - Resolve the client address (see [`client_ip`](super::client_ip))
//! - Count response bytes as they stream, without buffering
//! - Emit exactly one summary record per request
//!
//! # Design Decisions
//! - The summary is emitted when the response body ends or is dropped, so the
//!   byte count and duration cover the whole transfer
//! - A handler panic before a response exists produces no summary
//! - Headers the handler set itself are not overwritten by the echo
//! - Framing headers are never echoed; hyper would reject the response
//! - `host` is request-only and is not echoed either

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode},
};
use http_body::{Body as HttpBody, Frame, SizeHint};
use tower::{Layer, Service};

use crate::http::middleware::client_ip::resolve_client_ip;
use crate::http::X_REQUEST_ID;
use crate::observability::logging::{self, Field, LogContext, Logger};

/// Response header carrying the server version.
pub const VERSION_HEADER: &str = "version";

const UNECHOED: [HeaderName; 9] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
];

/// Layer that wraps a service with [`Observe`].
#[derive(Clone)]
pub struct ObserveLayer {
    version: HeaderValue,
    context: Arc<LogContext>,
}

impl ObserveLayer {
    /// `version` is sent back in the `version` response header. A value that
    /// is not a valid header value is replaced by `unknown`.
    pub fn new(version: &str, context: LogContext) -> Self {
        let version = HeaderValue::from_str(version).unwrap_or_else(|_| {
            tracing::warn!(version = %version, "Version is not a valid header value");
            HeaderValue::from_static("unknown")
        });
        Self {
            version,
            context: Arc::new(context),
        }
    }
}

impl<S> Layer<S> for ObserveLayer {
    type Service = Observe<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Observe {
            inner,
            version: self.version.clone(),
            context: Arc::clone(&self.context),
        }
    }
}

/// Middleware that logs one summary line per request.
#[derive(Clone)]
pub struct Observe<S> {
    inner: S,
    version: HeaderValue,
    context: Arc<LogContext>,
}

impl<S> Service<Request<Body>> for Observe<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let start = Instant::now();
        let observation = RequestObservation::from_request(&request);
        let echoed = echo_headers(request.headers());
        let logger = logging::for_context(&request_context(&self.context, request.headers()));
        let version = self.version.clone();

        // The clone may not be ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(request).await?;

            let handler_set: HashSet<HeaderName> = response.headers().keys().cloned().collect();
            let headers = response.headers_mut();
            headers.append(VERSION_HEADER, version);
            for (name, value) in echoed {
                if !handler_set.contains(&name) {
                    headers.append(name, value);
                }
            }

            let status = response.status();
            Ok(response.map(|body| {
                Body::new(ObservedBody {
                    inner: body,
                    written: 0,
                    pending: Some(Pending {
                        observation,
                        status,
                        start,
                        logger,
                    }),
                })
            }))
        })
    }
}

fn request_context(base: &LogContext, headers: &HeaderMap) -> LogContext {
    let id = headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| base.correlation_id().map(str::to_string))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    LogContext::with_correlation_id(id)
}

/// Every inbound header name with its values joined by `,`.
pub fn echo_headers(headers: &HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    headers
        .keys()
        .filter(|name| !UNECHOED.contains(name))
        .filter_map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(HeaderValue::as_bytes)
                .collect::<Vec<_>>()
                .join(&b","[..]);
            HeaderValue::from_bytes(&joined)
                .ok()
                .map(|value| (name.clone(), value))
        })
        .collect()
}

/// What is known about a request before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestObservation {
    pub method: String,
    pub uri: String,
    pub referer: String,
    pub user_agent: String,
    pub client_ip: String,
}

impl RequestObservation {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let headers = request.headers();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        Self {
            method: request.method().to_string(),
            uri: request.uri().to_string(),
            referer: header_string(headers, header::REFERER),
            user_agent: header_string(headers, header::USER_AGENT),
            client_ip: resolve_client_ip(headers, &peer),
        }
    }

    /// The eight summary fields.
    pub fn summary_fields(&self, status: StatusCode, written: u64, duration: Duration) -> [Field; 8] {
        [
            Field::new("method", self.method.as_str()),
            Field::new("uri", self.uri.as_str()),
            Field::new("referer", self.referer.as_str()),
            Field::new("user_agent", self.user_agent.as_str()),
            Field::new("client_ip", self.client_ip.as_str()),
            Field::new("status", status.as_u16()),
            Field::new("bytes_written", written),
            Field::new("duration", duration),
        ]
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

struct Pending {
    observation: RequestObservation,
    status: StatusCode,
    start: Instant,
    logger: Logger,
}

/// Response body that counts data bytes and logs the summary once.
struct ObservedBody {
    inner: Body,
    written: u64,
    pending: Option<Pending>,
}

impl ObservedBody {
    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            let fields = pending
                .observation
                .summary_fields(pending.status, self.written, pending.start.elapsed());
            pending.logger.with(fields).info("Http request info");
        }
    }
}

impl HttpBody for ObservedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.written += data.len() as u64;
                }
            }
            Poll::Ready(Some(Err(_))) | Poll::Ready(None) => this.finish(),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ObservedBody {
    fn drop(&mut self) {
        self.finish();
    }
}
