//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Hold an ordered list of routes, each an optional pattern plus a handler
//! - Try routes in declaration order until one handles the request
//! - Merge variables and narrow the visible path for nested handlers
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc` without locks)
//! - First match wins; a route without a pattern always matches
//! - A route whose handler declines restores the path, variables and
//!   context name it changed, so later routes see the original request
//! - Routes after a pattern-less route are unreachable; not validated

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;

use crate::error::{DispatchError, HookError};
use crate::rest::{Context, Facet, Resource, Response, Variables};
use crate::routing::matcher::{PathMatch, PathPattern, PatternError};

/// Anything that can take part in dispatch.
pub trait Handle: Send + Sync {
    /// `Ok(true)` when the request was fully handled, `Ok(false)` to let the
    /// next candidate try.
    fn handle(&self, ctx: &mut Context) -> Result<bool, DispatchError>;
}

/// Plain function handler.
pub type HandleFn = Arc<dyn Fn(&mut Context) -> Result<bool, HookError> + Send + Sync>;

/// The handler tree.
#[derive(Clone)]
pub enum Handler {
    Router(Arc<Router>),
    Resource(Arc<Resource>),
    Facet(Arc<Facet>),
    Function { name: String, f: HandleFn },
    Custom(Arc<dyn Handle>),
    /// Commits a plain 404.
    NotFound,
}

impl Handler {
    /// Wrap a bare function.
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<bool, HookError> + Send + Sync + 'static,
    {
        Handler::Function {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Router(router) => f.debug_tuple("Router").field(&router.name).finish(),
            Handler::Resource(_) => f.write_str("Resource"),
            Handler::Facet(facet) => f.debug_tuple("Facet").field(facet).finish(),
            Handler::Function { name, .. } => f.debug_tuple("Function").field(name).finish(),
            Handler::Custom(_) => f.write_str("Custom"),
            Handler::NotFound => f.write_str("NotFound"),
        }
    }
}

impl Handle for Handler {
    fn handle(&self, ctx: &mut Context) -> Result<bool, DispatchError> {
        match self {
            Handler::Router(router) => router.handle(ctx),
            Handler::Resource(resource) => resource.handle(ctx),
            Handler::Facet(facet) => facet.handle(ctx),
            Handler::Function { name, f } => f(ctx).map_err(|source| DispatchError::Handler {
                name: name.clone(),
                source,
            }),
            Handler::Custom(handle) => handle.handle(ctx),
            Handler::NotFound => {
                ctx.response = Response::with_status(StatusCode::NOT_FOUND, "Not Found");
                ctx.done = true;
                Ok(true)
            }
        }
    }
}

/// One entry of a router.
#[derive(Clone, Debug)]
pub struct Route {
    pub name: String,
    pub pattern: Option<PathPattern>,
    pub variables: Variables,
    pub handler: Handler,
}

impl Route {
    pub fn new(pattern: &str, handler: Handler) -> Result<Self, PatternError> {
        Ok(Self {
            name: String::new(),
            pattern: Some(PathPattern::parse(pattern)?),
            variables: Variables::new(),
            handler,
        })
    }

    /// A route that matches every path.
    pub fn catch_all(handler: Handler) -> Self {
        Self {
            name: String::new(),
            pattern: None,
            variables: Variables::new(),
            handler,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

impl Handle for Route {
    fn handle(&self, ctx: &mut Context) -> Result<bool, DispatchError> {
        let (captures, remainder) = match &self.pattern {
            None => (Default::default(), None),
            Some(pattern) => match pattern.matches(&ctx.path) {
                PathMatch::NoMatch => return Ok(false),
                PathMatch::RedirectTrailingSlash => {
                    redirect_trailing_slash(ctx).map_err(|source| DispatchError::Handler {
                        name: self.name.clone(),
                        source,
                    })?;
                    return Ok(true);
                }
                PathMatch::Matched { variables, remainder } => (variables, remainder),
            },
        };

        let scope = ctx.scope();
        ctx.append_name(&self.name);
        for (name, value) in &self.variables {
            ctx.variables.insert(name.clone(), value.clone());
        }
        for (name, value) in captures {
            ctx.variables.insert(name, value.into());
        }
        if let Some(remainder) = remainder {
            ctx.path = remainder;
        }

        let handled = self.handler.handle(ctx)?;
        if !handled {
            ctx.restore(scope);
        }
        Ok(handled)
    }
}

/// 301 to the same URL with a trailing slash.
fn redirect_trailing_slash(ctx: &mut Context) -> Result<(), HookError> {
    let path: Vec<String> = ctx
        .request
        .path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let mut location = format!("/{}/", path.join("/"));
    if let Some(query) = &ctx.request.raw_query {
        location.push('?');
        location.push_str(query);
    }
    tracing::debug!(context = ctx.name(), location = %location, "Redirecting to add trailing slash");
    ctx.redirect(&location, Some(301))
}

/// Ordered list of routes; first match wins.
#[derive(Clone, Debug, Default)]
pub struct Router {
    name: String,
    variables: Variables,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: Variables::new(),
            routes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variables merged into every request entering this router.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Append a route for `pattern`.
    pub fn route(self, pattern: &str, handler: Handler) -> Result<Self, PatternError> {
        Ok(self.add(Route::new(pattern, handler)?))
    }

    /// Append a pattern-less route.
    pub fn fallback(self, handler: Handler) -> Self {
        self.add(Route::catch_all(handler))
    }

    /// Append a prepared route.
    pub fn add(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Handle for Router {
    fn handle(&self, ctx: &mut Context) -> Result<bool, DispatchError> {
        let scope = ctx.scope();
        ctx.append_name(&self.name);
        for (name, value) in &self.variables {
            ctx.variables.insert(name.clone(), value.clone());
        }

        for route in &self.routes {
            if route.handle(ctx)? {
                return Ok(true);
            }
        }

        ctx.restore(scope);
        Ok(false)
    }
}
