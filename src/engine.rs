//! Dispatch engine.
//!
//! # Responsibilities
//! - Run one request through the handler tree and commit exactly one response
//! - Fall back to the not-found handler when nothing handled the request
//! - Convert fatal dispatch errors into logged 5xx responses
//! - Hand deferred requests to a second blocking task
//!
//! # Data Flow
//! ```text
//! Request
//!     → Context (cache handle, debug flag)
//!     → root Handler ─false→ not-found Handler
//!     → deferred?  yes → DeferredCompletion (runs task, then finalizes)
//!                  no  → Response
//! ```
//!
//! # Design Decisions
//! - Hook code is synchronous and may block, so `serve` runs it on the
//!   blocking pool under the handler deadline
//! - Responses are buffered in the context until committed, so a failing
//!   hook never leaves a half-written response behind; it is replaced by a 500
//! - A timed-out blocking task is not preempted; its result is discarded

use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;

use crate::cache::Cache;
use crate::error::DispatchError;
use crate::resilience::{with_deadline, Deadline};
use crate::rest::{pipeline, Context, DeferredTask, Request, Response};
use crate::routing::{Handle, Handler};

/// Result of the synchronous part of dispatch.
pub enum Outcome {
    Complete(Response),
    /// A hook deferred completion; the caller must hand this to another task.
    Deferred(DeferredCompletion),
}

/// A request whose context now belongs to a deferred task.
pub struct DeferredCompletion {
    ctx: Context,
    task: DeferredTask,
}

impl DeferredCompletion {
    /// Run the deferred task, then finalize and store the response.
    pub fn complete(self) -> Response {
        let DeferredCompletion { mut ctx, task } = self;
        let mut next = Some(task);
        while let Some(task) = next {
            if let Err(source) = task(&mut ctx) {
                let error = DispatchError::Handler {
                    name: format!("{} (deferred)", ctx.name()),
                    source,
                };
                return fail(ctx, &error);
            }
            next = ctx.take_deferred();
        }
        pipeline::complete(&mut ctx);
        ctx.into_response()
    }
}

/// Owns the handler tree and the request-facing cache.
pub struct Engine {
    root: Handler,
    not_found: Handler,
    cache: Option<Cache>,
    debug: bool,
}

impl Engine {
    pub fn new(root: Handler) -> Self {
        Self {
            root,
            not_found: Handler::NotFound,
            cache: None,
            debug: false,
        }
    }

    /// Handler consulted when the root declines a request.
    pub fn with_not_found(mut self, handler: Handler) -> Self {
        self.not_found = handler;
        self
    }

    pub fn with_cache(mut self, cache: Option<Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Run the synchronous part of dispatch on the calling thread.
    pub fn dispatch(&self, request: Request) -> Outcome {
        let mut ctx = Context::new(request).with_cache(self.cache.clone());
        ctx.debug = self.debug;

        let handled = match self.root.handle(&mut ctx) {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::debug!(path = %ctx.request.path, "No route handled request");
                self.not_found.handle(&mut ctx)
            }
            Err(e) => Err(e),
        };

        match handled {
            Err(e) => Outcome::Complete(fail(ctx, &e)),
            Ok(false) => {
                // A custom not-found handler that declines still gets a 404
                ctx.response = Response::with_status(StatusCode::NOT_FOUND, "Not Found");
                Outcome::Complete(ctx.into_response())
            }
            Ok(true) => match ctx.take_deferred() {
                Some(task) => {
                    tracing::debug!(context = ctx.name(), "Completion deferred");
                    Outcome::Deferred(DeferredCompletion { ctx, task })
                }
                None => Outcome::Complete(ctx.into_response()),
            },
        }
    }

    /// Dispatch on the blocking pool under `deadline`.
    pub async fn serve(self: Arc<Self>, request: Request, deadline: Deadline) -> Response {
        let start = Instant::now();
        let method = request.method.clone();
        let path = request.path.clone();

        let engine = self;
        let result = with_deadline(deadline, async move {
            match run_blocking(move || engine.dispatch(request)).await? {
                Outcome::Complete(response) => Ok(response),
                Outcome::Deferred(deferred) => run_blocking(move || deferred.complete()).await,
            }
        })
        .await
        .and_then(|response| response);

        match result {
            Ok(response) => {
                tracing::debug!(
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request dispatched"
                );
                response
            }
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Request aborted");
                Response::with_status(e.status(), e.status().canonical_reason().unwrap_or_default())
            }
        }
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T, DispatchError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    // Keep the request span on the blocking thread
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .map_err(|e| DispatchError::TaskAborted(e.to_string()))
}

/// Log a fatal error with its context and commit the error status.
fn fail(ctx: Context, error: &DispatchError) -> Response {
    let variables = serde_json::Value::Object(ctx.variables.clone());
    tracing::error!(
        method = %ctx.request.method,
        path = %ctx.request.path,
        context = ctx.name(),
        variables = %variables,
        content_type = ctx.response.content_type.as_deref().unwrap_or("-"),
        error = %error,
        "Dispatch failed"
    );
    let status = error.status();
    Response::with_status(status, status.canonical_reason().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MapBackend, WritePolicy};
    use crate::error::HookError;
    use crate::rest::{Facet, Representation, Resource};
    use crate::routing::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn engine(presents: Arc<AtomicUsize>) -> Engine {
        let person = Facet::new("profile").representation(
            Representation::new()
                .content_types(["text/plain"])
                .construct(|ctx| {
                    let name = ctx.variable_str("name").unwrap_or_default().to_string();
                    ctx.cache_key = format!("person:{}", name);
                    ctx.cache_duration = crate::rest::CacheDuration::For(Duration::from_secs(5));
                    ctx.add_cache_group(format!("person:{}", name));
                    Ok(())
                })
                .present(move |ctx| {
                    presents.fetch_add(1, Ordering::SeqCst);
                    let body = format!("hello {}", ctx.variable_str("name").unwrap_or_default());
                    ctx.write_str(&body);
                    Ok(())
                }),
        );
        let broken = Facet::new("broken").representation(
            Representation::new().present(|_| Err(HookError::msg("database unavailable"))),
        );
        let slow = Facet::new("slow").representation(
            Representation::new().present(|ctx| {
                std::thread::sleep(Duration::from_millis(300));
                ctx.write_str("late");
                Ok(())
            }),
        );
        let deferred = Facet::new("deferred").representation(
            Representation::new().present(|ctx| {
                ctx.defer(|ctx| {
                    ctx.write_str("finished later");
                    Ok(())
                });
                Ok(())
            }),
        );

        let resource = Resource::new("person")
            .facet("broken", broken)
            .unwrap()
            .facet("slow", slow)
            .unwrap()
            .facet("deferred", deferred)
            .unwrap()
            .facet("{name}", person)
            .unwrap();
        let root = Router::new("site")
            .route("person/*", Handler::Resource(Arc::new(resource)))
            .unwrap();

        let cache = Cache::new(
            Arc::new(MapBackend::new("map", Duration::from_secs(60))),
            WritePolicy::Synchronous,
        );
        Engine::new(Handler::Router(Arc::new(root))).with_cache(Some(cache))
    }

    fn complete(outcome: Outcome) -> Response {
        match outcome {
            Outcome::Complete(response) => response,
            Outcome::Deferred(deferred) => deferred.complete(),
        }
    }

    #[test]
    fn test_not_found() {
        let engine = engine(Arc::new(AtomicUsize::new(0)));
        let response = complete(engine.dispatch(Request::get("/nothing/here")));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_custom_not_found() {
        let engine = engine(Arc::new(AtomicUsize::new(0))).with_not_found(Handler::function("missing", |ctx| {
            ctx.response = Response::with_status(StatusCode::GONE, "gone");
            Ok(true)
        }));
        let response = complete(engine.dispatch(Request::get("/nothing")));
        assert_eq!(response.status, StatusCode::GONE);
    }

    #[test]
    fn test_hook_failure_is_500() {
        let engine = engine(Arc::new(AtomicUsize::new(0)));
        let response = complete(engine.dispatch(Request::get("/person/broken")));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, b"Internal Server Error");
    }

    #[test]
    fn test_cached_between_dispatches() {
        let presents = Arc::new(AtomicUsize::new(0));
        let engine = engine(presents.clone());

        let first = complete(engine.dispatch(Request::get("/person/alice")));
        let second = complete(engine.dispatch(Request::get("/person/alice")));
        assert_eq!(first.body, b"hello alice");
        assert_eq!(second.body, b"hello alice");
        assert_eq!(presents.load(Ordering::SeqCst), 1);

        engine.cache().unwrap().invalidate_group("person:alice");
        complete(engine.dispatch(Request::get("/person/alice")));
        assert_eq!(presents.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_deferred_completion() {
        let engine = engine(Arc::new(AtomicUsize::new(0)));
        let Outcome::Deferred(deferred) = engine.dispatch(Request::get("/person/deferred")) else {
            panic!("expected deferred outcome");
        };
        let response = deferred.complete();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"finished later");
        assert!(response.signature.is_some());
    }

    #[tokio::test]
    async fn test_serve_deferred_and_timeout() {
        let engine = Arc::new(engine(Arc::new(AtomicUsize::new(0))));

        let response = engine
            .clone()
            .serve(Request::get("/person/deferred"), Deadline::from_secs(5))
            .await;
        assert_eq!(response.body, b"finished later");

        let response = engine
            .serve(Request::get("/person/slow"), Deadline::from(Duration::from_millis(50)))
            .await;
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    }
}
