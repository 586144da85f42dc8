//! Route table and registration API.

use http::Method;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::info;

use super::context::ContextStack;
use crate::dispatcher::{Dispatcher, Handler, HandlerRequest, HandlerResponse, SharedHandler};
use crate::error::{PatternError, RegistrationError};
use crate::session::SessionRegistry;
use crate::template::{normalize, PathTemplate};
use crate::upgrade::{ConnectionFactory, ConnectionHandler, UpgradeBridge};

/// Methods a route can be registered for.
pub const SUPPORTED_METHODS: [Method; 4] = [Method::GET, Method::PUT, Method::POST, Method::DELETE];

/// A registered (method, template, handler) triple.
#[derive(Clone)]
pub struct Route {
    method: Method,
    template: PathTemplate,
    handler: SharedHandler,
}

impl Route {
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    #[must_use]
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn matches(&self, method: &Method, target: &str) -> bool {
        self.method == *method && self.template.matches(target)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.template.pattern())
            .finish()
    }
}

/// A registered (prefix, handler) pair run ahead of the matched route.
#[derive(Clone)]
pub struct FilterRule {
    prefix: String,
    handler: SharedHandler,
}

impl FilterRule {
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    /// String-prefix test against the slash-collapsed target, not a
    /// template match. `//admin/x` is tested as `/admin/x`, the same form
    /// routes are matched on.
    #[inline]
    #[must_use]
    pub fn matches(&self, target: &str) -> bool {
        if target.contains("//") {
            normalize(target).starts_with(self.prefix.as_str())
        } else {
            target.starts_with(self.prefix.as_str())
        }
    }
}

impl std::fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRule")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Routes and filters in registration order.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    filters: Vec<FilterRule>,
}

impl RouteTable {
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn filters(&self) -> &[FilterRule] {
        &self.filters
    }

    /// First route, in registration order, matching `method` and `target`.
    ///
    /// Linear in the number of routes; tables are small and static.
    #[must_use]
    pub fn match_route(&self, method: &Method, target: &str) -> Option<(usize, &Route)> {
        self.routes
            .iter()
            .enumerate()
            .find(|(_, r)| r.matches(method, target))
    }

    /// Filters whose prefix starts `target`, in registration order.
    pub fn filters_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a FilterRule> {
        self.filters.iter().filter(move |f| f.matches(target))
    }
}

/// Registration-phase builder for routes, filters, mounts and upgrades.
///
/// Every registration call returns `Result<&mut Router, RegistrationError>`
/// so calls chain with `?`. A malformed pattern is a startup failure; there
/// is no way to skip a route silently.
#[derive(Default)]
pub struct Router {
    table: RouteTable,
    context: ContextStack,
    upgrades: UpgradeBridge,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.routes)
            .field("filters", &self.table.filters)
            .field("upgrades", &self.upgrades.paths())
            .finish()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method` at `path`, relative to the current mount.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::UnsupportedMethod`] outside GET/PUT/POST/DELETE
    /// - [`RegistrationError::Pattern`] when the effective pattern is invalid
    pub fn register<F>(
        &mut self,
        method: Method,
        path: &str,
        handler: F,
    ) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register_shared(method, path, Arc::new(handler))
    }

    /// Register an already shared handler, e.g. a struct implementing [`Handler`].
    ///
    /// # Errors
    ///
    /// Same as [`Router::register`].
    pub fn register_shared(
        &mut self,
        method: Method,
        path: &str,
        handler: SharedHandler,
    ) -> Result<&mut Self, RegistrationError> {
        if !SUPPORTED_METHODS.contains(&method) {
            return Err(RegistrationError::UnsupportedMethod {
                method: method.to_string(),
            });
        }

        let template = PathTemplate::compile(&self.context.resolve(path))?;

        info!(
            method = %method,
            pattern = %template,
            route_index = self.table.routes.len(),
            "Route registered"
        );

        self.table.routes.push(Route {
            method,
            template,
            handler,
        });
        Ok(self)
    }

    /// # Errors
    ///
    /// [`RegistrationError::Pattern`] when the effective pattern is invalid.
    pub fn get<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(Method::GET, path, handler)
    }

    /// # Errors
    ///
    /// [`RegistrationError::Pattern`] when the effective pattern is invalid.
    pub fn put<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(Method::PUT, path, handler)
    }

    /// # Errors
    ///
    /// [`RegistrationError::Pattern`] when the effective pattern is invalid.
    pub fn post<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(Method::POST, path, handler)
    }

    /// # Errors
    ///
    /// [`RegistrationError::Pattern`] when the effective pattern is invalid.
    pub fn delete<F>(&mut self, path: &str, handler: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.register(Method::DELETE, path, handler)
    }

    /// Register a filter for every target starting with the effective `prefix`.
    ///
    /// An empty prefix at the top level filters every matched request.
    ///
    /// # Errors
    ///
    /// Never fails today; returns `Result` to chain like the other calls.
    pub fn filter<F>(&mut self, prefix: &str, handler: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn(&mut HandlerRequest, &mut HandlerResponse) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.filter_shared(prefix, Arc::new(handler))
    }

    /// # Errors
    ///
    /// Never fails today; returns `Result` to chain like the other calls.
    pub fn filter_shared(
        &mut self,
        prefix: &str,
        handler: SharedHandler,
    ) -> Result<&mut Self, RegistrationError> {
        let prefix = self.context.resolve(prefix);
        info!(
            method = "FILTER",
            pattern = %prefix,
            filter_index = self.table.filters.len(),
            "Filter registered"
        );
        self.table.filters.push(FilterRule { prefix, handler });
        Ok(self)
    }

    /// Run `f` with `path` pushed onto the context stack.
    ///
    /// The frame is popped on every exit from `f`, including errors and panics.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns.
    pub fn mount<F>(&mut self, path: &str, f: F) -> Result<&mut Self, RegistrationError>
    where
        F: FnOnce(&mut Router) -> Result<(), RegistrationError>,
    {
        self.context.push(path);
        let outcome = catch_unwind(AssertUnwindSafe(|| f(&mut *self)));
        self.context.pop();
        match outcome {
            Ok(result) => result.map(|()| self),
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Bind an upgrade endpoint at the effective `path`.
    ///
    /// `factory` is called once per accepted connection and must return a
    /// fresh handler each time.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::DuplicateUpgrade`] when the path is taken
    /// - [`RegistrationError::Pattern`] when the effective path is empty
    pub fn upgrade<F>(&mut self, path: &str, factory: F) -> Result<&mut Self, RegistrationError>
    where
        F: Fn() -> Box<dyn ConnectionHandler> + Send + Sync + 'static,
    {
        self.upgrade_shared(path, Arc::new(factory))
    }

    /// # Errors
    ///
    /// Same as [`Router::upgrade`].
    pub fn upgrade_shared(
        &mut self,
        path: &str,
        factory: ConnectionFactory,
    ) -> Result<&mut Self, RegistrationError> {
        let path = self.context.resolve(path);
        if path.is_empty() {
            return Err(PatternError::Empty.into());
        }
        self.upgrades.register(&path, factory)?;
        Ok(self)
    }

    #[must_use]
    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Registered routes in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        self.table.routes()
    }

    #[must_use]
    pub fn upgrades(&self) -> &UpgradeBridge {
        &self.upgrades
    }

    /// Registry every upgraded connection joins. HTTP handlers can capture it
    /// at registration time to reach live connections.
    #[must_use]
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(self.upgrades.sessions())
    }

    /// Print every registered route, filter and upgrade path to stdout.
    pub fn dump_routes(&self) {
        println!(
            "[routes] count={} filters={} upgrades={}",
            self.table.routes.len(),
            self.table.filters.len(),
            self.upgrades.paths().len()
        );
        for route in &self.table.routes {
            println!("[route] {}\t{}", route.method, route.template);
        }
        for filter in &self.table.filters {
            println!("[filter] {}", filter.prefix);
        }
        for path in self.upgrades.paths() {
            println!("[upgrade] {path}");
        }
    }

    /// Freeze the registrations.
    ///
    /// Consumes the router, so nothing can be registered once the dispatcher
    /// exists.
    #[must_use]
    pub fn build(self) -> (Dispatcher, UpgradeBridge) {
        info!(
            routes_count = self.table.routes.len(),
            filters_count = self.table.filters.len(),
            upgrades_count = self.upgrades.paths().len(),
            "Routing table loaded"
        );
        (Dispatcher::new(self.table), self.upgrades)
    }
}
