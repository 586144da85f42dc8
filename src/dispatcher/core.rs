//! Dispatcher core module - hot path for request dispatch.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]

use http::Method;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::request::HandlerRequest;
use super::response::HandlerResponse;
use crate::error::DispatchError;
use crate::middleware::Middleware;
use crate::router::RouteTable;
use crate::template::normalize;

/// A request handler: a route target or a filter.
///
/// Implemented for every `Fn(&mut HandlerRequest, &mut HandlerResponse) ->
/// anyhow::Result<()>`, so plain closures work. Return a
/// [`ValidationError`](crate::error::ValidationError) to signal bad input.
pub trait Handler: Send + Sync {
    /// Handle one request.
    ///
    /// # Errors
    ///
    /// Any error aborts the remaining pipeline for this request.
    fn handle(&self, req: &mut HandlerRequest, res: &mut HandlerResponse) -> anyhow::Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, req: &mut HandlerRequest, res: &mut HandlerResponse) -> anyhow::Result<()> {
        self(req, res)
    }
}

/// Reference-counted handler shared between the route table and clones of it.
pub type SharedHandler = Arc<dyn Handler>;

/// Dispatch pipeline phase, reported in logs and in [`DispatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Matching,
    Filtering,
    Handling,
    Done,
    NotFound,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Matching => "matching",
            Phase::Filtering => "filtering",
            Phase::Handling => "handling",
            Phase::Done => "done",
            Phase::NotFound => "not_found",
        })
    }
}

/// Terminal state of a request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The route at this registration index handled the request.
    Handled {
        /// Registration index of the selected route
        route: usize,
    },
    /// No route matched. No filter or handler ran.
    NotFound,
}

impl DispatchOutcome {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            DispatchOutcome::Handled { .. } => Phase::Done,
            DispatchOutcome::NotFound => Phase::NotFound,
        }
    }
}

pub type DispatchResult = Result<DispatchOutcome, DispatchError>;

/// Routes requests through the filter chain to their handler.
///
/// Built by [`Router::build`](crate::router::Router::build). The route table is
/// read-only from here on; only observational middleware can still be added
/// before the dispatcher is shared with the server.
pub struct Dispatcher {
    table: RouteTable,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(table: RouteTable) -> Self {
        Self {
            table,
            middlewares: Vec::new(),
        }
    }

    /// Add middleware. Hooks run in the order they were added.
    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    #[must_use]
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Dispatch one request.
    ///
    /// Middleware `before` hooks run first and `after` hooks see the final
    /// result, including not-found and failed requests.
    ///
    /// # Errors
    ///
    /// [`DispatchError`] when a filter or the handler fails. The response has
    /// been reset by then; nothing the failed pipeline wrote survives.
    pub fn dispatch(&self, req: &mut HandlerRequest, res: &mut HandlerResponse) -> DispatchResult {
        for mw in &self.middlewares {
            mw.before(req);
        }

        let start = Instant::now();
        let result = self.run(req, res);
        let latency = start.elapsed();

        for mw in &self.middlewares {
            mw.after(req, res, &result, latency);
        }

        result
    }

    fn run(&self, req: &mut HandlerRequest, res: &mut HandlerResponse) -> DispatchResult {
        let request_id = req.request_id;
        // Routes and filter prefixes both see the slash-collapsed target.
        let target = normalize(&req.target);

        debug!(
            request_id = %request_id,
            method = %req.method,
            target = %req.target,
            routes = self.table.routes().len(),
            phase = %Phase::Matching,
            "Route match attempt"
        );

        let Some((index, route)) = self.table.match_route(&req.method, &target) else {
            warn!(
                request_id = %request_id,
                method = %req.method,
                target = %req.target,
                remote_addr = ?req.remote_addr,
                "Not found"
            );
            return Ok(DispatchOutcome::NotFound);
        };

        let params = route.template().extract(&target);
        debug!(
            request_id = %request_id,
            route_index = index,
            route_pattern = %route.template(),
            path_params = ?params,
            "Route matched"
        );
        req.extend_attributes(params);

        for (filter_index, filter) in self
            .table
            .filters()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.matches(&target))
        {
            debug!(
                request_id = %request_id,
                filter_index = filter_index,
                filter_prefix = %filter.prefix(),
                phase = %Phase::Filtering,
                "Running filter"
            );
            if let Err(e) = invoke(filter.handler(), req, res) {
                return Err(abort(&target, &req.method, Phase::Filtering, e, res));
            }
        }

        let start = Instant::now();
        if let Err(e) = invoke(route.handler(), req, res) {
            return Err(abort(&target, &req.method, Phase::Handling, e, res));
        }

        info!(
            request_id = %request_id,
            method = %req.method,
            target = %target,
            route_pattern = %route.template(),
            status = res.status,
            execution_time_us = start.elapsed().as_micros() as u64,
            "Request handled"
        );

        Ok(DispatchOutcome::Handled { route: index })
    }
}

/// Run a handler, turning a panic into an ordinary handler failure.
fn invoke(
    handler: &dyn Handler,
    req: &mut HandlerRequest,
    res: &mut HandlerResponse,
) -> anyhow::Result<()> {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(req, res))) {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(anyhow::anyhow!("handler panicked: {message}"))
        }
    }
}

fn abort(
    target: &str,
    method: &Method,
    phase: Phase,
    err: anyhow::Error,
    res: &mut HandlerResponse,
) -> DispatchError {
    res.reset();
    let err = DispatchError::classify(target, phase, err);
    if err.is_validation() {
        warn!(method = %method, target = %target, phase = %phase, error = %err, "Request rejected");
    } else {
        error!(method = %method, target = %target, phase = %phase, error = %err, "Handler failed");
    }
    err
}
