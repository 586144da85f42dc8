use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::dispatcher::{DispatchOutcome, DispatchResult, HandlerRequest, HandlerResponse};

/// Middleware for collecting Prometheus-compatible metrics
///
/// All counters use relaxed atomics; readings are eventually consistent.
///
/// Metrics collected:
/// - Total request count
/// - Requests that matched no route
/// - Requests rejected with a validation error
/// - Requests whose filter or handler failed
/// - Average latency (request processing time)
/// - Coroutine stack size of the last dispatching coroutine
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    not_found: AtomicUsize,
    validation_failures: AtomicUsize,
    handler_failures: AtomicUsize,
    total_latency_ns: AtomicU64,
    stack_size: AtomicUsize,
}

impl MetricsMiddleware {
    /// Create a new metrics middleware with all counters initialized to zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests processed
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn not_found_count(&self) -> usize {
        self.not_found.load(Ordering::Relaxed)
    }

    pub fn validation_failures(&self) -> usize {
        self.validation_failures.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> usize {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Calculate the average request latency
    ///
    /// Returns zero duration if no requests have been processed yet.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size.load(Ordering::Relaxed)
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);
        self.write_exposition(&mut out)
            .map(|()| out)
            .unwrap_or_default()
    }

    fn write_exposition(&self, out: &mut String) -> fmt::Result {
        let counters = [
            (
                "panrouter_requests_total",
                "Total requests dispatched",
                self.request_count(),
            ),
            (
                "panrouter_not_found_total",
                "Requests that matched no route",
                self.not_found_count(),
            ),
            (
                "panrouter_validation_failures_total",
                "Requests rejected by a validation error",
                self.validation_failures(),
            ),
            (
                "panrouter_handler_failures_total",
                "Requests whose filter or handler failed",
                self.handler_failures(),
            ),
        ];
        for (name, help, value) in counters {
            writeln!(out, "# HELP {name} {help}")?;
            writeln!(out, "# TYPE {name} counter")?;
            writeln!(out, "{name} {value}")?;
        }
        writeln!(
            out,
            "# HELP panrouter_request_latency_seconds Average dispatch latency"
        )?;
        writeln!(out, "# TYPE panrouter_request_latency_seconds gauge")?;
        writeln!(
            out,
            "panrouter_request_latency_seconds {:.6}",
            self.average_latency().as_secs_f64()
        )?;
        writeln!(
            out,
            "# HELP panrouter_coroutine_stack_bytes Stack size of the dispatching coroutine"
        )?;
        writeln!(out, "# TYPE panrouter_coroutine_stack_bytes gauge")?;
        writeln!(out, "panrouter_coroutine_stack_bytes {}", self.stack_size())
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _req: &HandlerRequest) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    fn after(
        &self,
        _req: &HandlerRequest,
        _res: &HandlerResponse,
        result: &DispatchResult,
        latency: Duration,
    ) {
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);

        match result {
            Ok(DispatchOutcome::Handled { .. }) => {}
            Ok(DispatchOutcome::NotFound) => {
                self.not_found.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_validation() => {
                self.validation_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        // record stack metrics for the current coroutine when available
        let size = if may::coroutine::is_coroutine() {
            may::coroutine::current().stack_size()
        } else {
            may::config().get_stack_size()
        };
        self.stack_size.store(size, Ordering::Relaxed);
    }
}
