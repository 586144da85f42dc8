use std::time::Duration;

use tracing::{info, warn};

use super::Middleware;
use crate::dispatcher::{DispatchOutcome, DispatchResult, HandlerRequest, HandlerResponse};

/// Emits one `request_completed` event per dispatch.
///
/// Spans cannot be held across `before`/`after` on a coroutine runtime that
/// may migrate the request between threads, so this middleware logs a single
/// event carrying everything known at the end.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn after(
        &self,
        req: &HandlerRequest,
        res: &HandlerResponse,
        result: &DispatchResult,
        latency: Duration,
    ) {
        let latency_us = latency.as_micros() as u64;
        match result {
            Ok(DispatchOutcome::Handled { route }) => info!(
                request_id = %req.request_id,
                method = %req.method,
                target = %req.target,
                route_index = route,
                status = res.status,
                latency_us,
                "request_completed"
            ),
            Ok(DispatchOutcome::NotFound) => info!(
                request_id = %req.request_id,
                method = %req.method,
                target = %req.target,
                status = 404,
                latency_us,
                "request_completed"
            ),
            Err(e) => warn!(
                request_id = %req.request_id,
                method = %req.method,
                target = %req.target,
                status = e.status(),
                phase = %e.phase(),
                latency_us,
                "request_completed"
            ),
        }
    }
}
