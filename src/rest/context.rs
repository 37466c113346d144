//! Per-request execution state.
//!
//! # Responsibilities
//! - Carry the request, the response under construction and the path
//!   variables merged from every matched level
//! - Carry cache directives set by hooks (key, duration, groups)
//! - Hand ownership to a deferred task when a hook asks for one
//!
//! # Design Decisions
//! - One instance per request, owned by whoever runs the pipeline; a
//!   deferred completion moves it, so the synchronous caller cannot touch it
//! - Variables are JSON values so routers can carry structured defaults

use std::fmt;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::cache::{Cache, CacheKeyBuilder};
use crate::error::HookError;
use crate::rest::{Request, Response};

/// Path variables, inner levels overriding outer ones.
pub type Variables = serde_json::Map<String, Value>;

/// Work that finishes a request after the synchronous pipeline returned.
pub type DeferredTask = Box<dyn FnOnce(&mut Context) -> Result<(), HookError> + Send>;

/// Server-side (and client-side) caching directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheDuration {
    /// Not cached, no `Cache-Control` emitted.
    #[default]
    Unset,
    /// Cached for this long; clients get the same `max-age`.
    For(Duration),
    /// Never stored; clients are told to drop their copy.
    NoStore,
}

impl CacheDuration {
    /// Negative means no-store, zero (or NaN) means unset.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs < 0.0 {
            CacheDuration::NoStore
        } else if secs > 0.0 && secs.is_finite() {
            CacheDuration::For(Duration::from_secs_f64(secs))
        } else {
            CacheDuration::Unset
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CacheDuration::For(ttl) => Some(*ttl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Scope {
    path: String,
    variables: Variables,
    name: String,
}

/// Mutable state of one request as it travels the handler tree.
pub struct Context {
    pub request: Request,
    pub response: Response,
    /// Portion of the path not yet consumed by enclosing routes.
    pub path: String,
    pub variables: Variables,
    /// Set by a hook to stop the pipeline.
    pub done: bool,
    /// Logical cache key; empty disables caching.
    pub cache_key: String,
    pub cache_duration: CacheDuration,
    pub cache_groups: Vec<String>,
    pub debug: bool,
    name: String,
    cache: Option<Cache>,
    deferred: Option<DeferredTask>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("method", &self.request.method)
            .field("path", &self.path)
            .field("variables", &self.variables)
            .field("done", &self.done)
            .field("cache_key", &self.cache_key)
            .field("cache_duration", &self.cache_duration)
            .field("cache_groups", &self.cache_groups)
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            path: request.path.clone(),
            request,
            response: Response::default(),
            variables: Variables::new(),
            done: false,
            cache_key: String::new(),
            cache_duration: CacheDuration::Unset,
            cache_groups: Vec::new(),
            debug: false,
            name: String::new(),
            cache: None,
            deferred: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Dotted name of the handler levels entered so far.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn append_name(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        if !self.name.is_empty() {
            self.name.push('.');
        }
        self.name.push_str(name);
    }

    pub(crate) fn scope(&self) -> Scope {
        Scope {
            path: self.path.clone(),
            variables: self.variables.clone(),
            name: self.name.clone(),
        }
    }

    pub(crate) fn restore(&mut self, scope: Scope) {
        self.path = scope.path;
        self.variables = scope.variables;
        self.name = scope.name;
    }

    /// A variable as text, if it is a string.
    pub fn variable_str(&self, name: &str) -> Option<&str> {
        self.variables.get(name).and_then(Value::as_str)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn write_str(&mut self, text: &str) {
        self.response.body.extend_from_slice(text.as_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.response.body.extend_from_slice(bytes);
    }

    /// Append `value` as JSON.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), HookError> {
        serde_json::to_writer(&mut self.response.body, value)?;
        Ok(())
    }

    pub fn set_signature(&mut self, signature: impl Into<String>, weak: bool) {
        self.response.signature = Some(signature.into());
        self.response.weak_signature = weak;
    }

    pub fn set_timestamp(&mut self, timestamp: OffsetDateTime) {
        self.response.timestamp = Some(timestamp);
    }

    /// Tag the stored entry with `group`. Duplicates are ignored.
    pub fn add_cache_group(&mut self, group: impl Into<String>) {
        let group = group.into();
        if !group.is_empty() && !self.cache_groups.contains(&group) {
            self.cache_groups.push(group);
        }
    }

    /// Commit a redirect and finish the pipeline. `None` means 302.
    pub fn redirect(&mut self, location: &str, status: Option<u16>) -> Result<(), HookError> {
        let code = status.unwrap_or(302);
        let status = StatusCode::from_u16(code)
            .ok()
            .filter(StatusCode::is_redirection)
            .ok_or(HookError::InvalidRedirect(code))?;
        let location = HeaderValue::from_str(location)
            .map_err(|_| HookError::msg(format!("invalid redirect location: {}", location)))?;

        self.response.status = status;
        self.response.headers.insert(header::LOCATION, location);
        self.response.body.clear();
        self.done = true;
        Ok(())
    }

    /// Finish the request on a background task instead of the caller.
    ///
    /// The pipeline stops after the current hook; the engine then moves this
    /// context into the task, which runs before the response is finalized
    /// and stored.
    pub fn defer<F>(&mut self, task: F)
    where
        F: FnOnce(&mut Context) -> Result<(), HookError> + Send + 'static,
    {
        self.deferred = Some(Box::new(task));
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    pub(crate) fn take_deferred(&mut self) -> Option<DeferredTask> {
        self.deferred.take()
    }

    /// Invalidate every cached entry tagged with `group`.
    pub fn invalidate_cache_group(&self, group: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate_group(group);
        }
    }

    /// Delete the cached entry for the current negotiated representation.
    pub fn delete_cached(&self) {
        if let (Some(cache), Some(key)) = (&self.cache, CacheKeyBuilder::derive(self)) {
            cache.delete(&key);
        }
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheKey, MapBackend, WritePolicy};
    use std::sync::Arc;

    #[test]
    fn test_cache_duration_from_secs() {
        assert_eq!(CacheDuration::from_secs_f64(-1.0), CacheDuration::NoStore);
        assert_eq!(CacheDuration::from_secs_f64(0.0), CacheDuration::Unset);
        assert_eq!(CacheDuration::from_secs_f64(f64::NAN), CacheDuration::Unset);
        assert_eq!(
            CacheDuration::from_secs_f64(5.0).ttl(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_redirect() {
        let mut ctx = Context::new(Request::get("/old"));
        ctx.write_str("partial");
        ctx.redirect("/new", None).unwrap();
        assert_eq!(ctx.response.status, StatusCode::FOUND);
        assert_eq!(ctx.response.headers[header::LOCATION], "/new");
        assert!(ctx.response.body.is_empty());
        assert!(ctx.done);

        let mut ctx = Context::new(Request::get("/old"));
        assert!(matches!(
            ctx.redirect("/new", Some(200)),
            Err(HookError::InvalidRedirect(200))
        ));
        assert!(!ctx.done);
    }

    #[test]
    fn test_scope_restore() {
        let mut ctx = Context::new(Request::get("/a/b"));
        let scope = ctx.scope();
        ctx.path = "b".into();
        ctx.set_variable("name", "alice");
        ctx.append_name("site");
        ctx.append_name("people");
        assert_eq!(ctx.name(), "site.people");
        assert_eq!(ctx.variable_str("name"), Some("alice"));

        ctx.restore(scope);
        assert_eq!(ctx.path, "a/b");
        assert!(ctx.variables.is_empty());
        assert_eq!(ctx.name(), "");
    }

    #[test]
    fn test_write_json_and_groups() {
        let mut ctx = Context::new(Request::get("/"));
        ctx.write_json(&serde_json::json!({"name": "alice"})).unwrap();
        assert_eq!(ctx.response.body, br#"{"name":"alice"}"#);

        ctx.add_cache_group("person:alice");
        ctx.add_cache_group("person:alice");
        assert_eq!(ctx.cache_groups, vec!["person:alice"]);
    }

    #[test]
    fn test_cache_helpers() {
        let backend = Arc::new(MapBackend::new("map", Duration::from_secs(10)));
        let cache = Cache::new(backend.clone(), WritePolicy::Synchronous);
        let mut ctx = Context::new(Request::get("/")).with_cache(Some(cache));
        ctx.cache_key = "person:alice".into();
        ctx.response.content_type = Some("text/plain".into());

        let key = CacheKey::from("person:alice|text/plain||");
        let entry = CacheEntry::new("v", Duration::from_secs(5)).with_groups(["people"]);
        crate::cache::CacheBackend::set(backend.as_ref(), &key, entry.clone()).unwrap();
        ctx.delete_cached();
        assert!(backend.is_empty());

        crate::cache::CacheBackend::set(backend.as_ref(), &key, entry).unwrap();
        ctx.invalidate_cache_group("people");
        assert!(backend.is_empty());
    }
}
