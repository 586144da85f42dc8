use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::Arc;
use tracing::warn;

use super::request::parse_request;
use super::response::{status_reason, write_handler_response, write_json_error, HeaderLines};
use crate::dispatcher::{DispatchOutcome, Dispatcher, HandlerResponse};
use crate::error::DispatchError;
use crate::middleware::MetricsMiddleware;
use crate::template::normalize;

/// Path answered from the metrics middleware once one is set.
pub const METRICS_PATH: &str = "/metrics";

/// HTTP boundary: one `AppService` clone per `may_minihttp` connection, all
/// sharing the same dispatcher.
///
/// With [`AppService::set_metrics_middleware`], `GET /metrics` is reserved:
/// it is answered before dispatch, so a route registered there is never
/// reached.
#[derive(Clone)]
pub struct AppService {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Option<Arc<MetricsMiddleware>>,
    lines: HeaderLines,
}

impl AppService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            metrics: None,
            lines: HeaderLines::default(),
        }
    }

    /// Serve `GET /metrics` from `metrics` ahead of the route table.
    pub fn set_metrics_middleware(&mut self, metrics: Arc<MetricsMiddleware>) {
        if shadows_metrics_route(&self.dispatcher) {
            warn!(
                path = METRICS_PATH,
                "A GET route matches the metrics path and will never be dispatched"
            );
        }
        self.metrics = Some(metrics);
    }
}

/// Whether a registered GET route would be hidden by the metrics endpoint.
#[must_use]
pub fn shadows_metrics_route(dispatcher: &Dispatcher) -> bool {
    dispatcher
        .table()
        .match_route(&Method::GET, METRICS_PATH)
        .is_some()
}

/// Metrics endpoint returning Prometheus text format statistics.
pub fn metrics_endpoint(res: &mut Response, metrics: &MetricsMiddleware) {
    res.status_code(200, status_reason(200));
    res.header("Content-Type: text/plain; version=0.0.4");
    res.body_vec(metrics.render().into_bytes());
}

fn error_body(err: &DispatchError) -> String {
    match err {
        DispatchError::Validation { source, .. } => source.message().to_string(),
        DispatchError::Handler { .. } => "Internal Server Error".to_string(),
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        // The previous response on this connection is already encoded.
        self.lines.clear();

        let mut request = match parse_request(req) {
            Ok(request) => request,
            Err(e) => {
                write_json_error(res, 400, json!({ "error": e.message() }));
                return Ok(());
            }
        };

        if let Some(metrics) = &self.metrics {
            if request.method == Method::GET && normalize(&request.target) == METRICS_PATH {
                metrics_endpoint(res, metrics);
                return Ok(());
            }
        }

        let mut response = HandlerResponse::new();
        match self.dispatcher.dispatch(&mut request, &mut response) {
            // SAFETY: may_minihttp encodes `res` as soon as this call returns
            // and before calling this service again, which is when `lines`
            // is next cleared.
            Ok(DispatchOutcome::Handled { .. }) => unsafe {
                write_handler_response(res, response, &mut self.lines);
            },
            Ok(DispatchOutcome::NotFound) => write_json_error(
                res,
                404,
                json!({
                    "error": "Not Found",
                    "method": request.method.as_str(),
                    "path": request.target,
                }),
            ),
            Err(e) => write_json_error(
                res,
                e.status(),
                json!({
                    "error": error_body(&e),
                    "method": request.method.as_str(),
                    "path": request.target,
                }),
            ),
        }
        Ok(())
    }
}
