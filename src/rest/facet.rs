//! Facets: negotiated groups of representations.
//!
//! # Responsibilities
//! - Pick the representation serving the request method and the client's
//!   preferences
//! - Commit 404, 405 or 406 when no representation fits
//! - Seed the response with the negotiated content type, language and charset
//!
//! # Design Decisions
//! - Method support is checked before negotiation: a method no
//!   representation serves is 405 whatever the `Accept` header says, and
//!   negotiation then only considers representations serving the method
//! - The content coding is negotiated last; a client that refuses identity
//!   and every supported coding gets 406
//! - A facet that is reached always handles the request

use axum::http::{header, HeaderValue, Method, StatusCode};

use crate::error::DispatchError;
use crate::negotiation::{negotiate_among, negotiate_encoding, Preferences};
use crate::rest::{pipeline, Context, Representation, Response};
use crate::routing::Handle;

#[derive(Debug, Clone, Default)]
pub struct Facet {
    name: String,
    representations: Vec<Representation>,
}

impl Facet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            representations: Vec::new(),
        }
    }

    /// Add a representation. Declaration order breaks negotiation ties.
    pub fn representation(mut self, representation: Representation) -> Self {
        self.representations.push(representation);
        self
    }

    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    /// Methods served by at least one representation, in a stable order.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for method in self.representations.iter().flat_map(Representation::allowed_methods) {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
        methods
    }

    fn reject(&self, ctx: &mut Context, status: StatusCode, message: &str) {
        tracing::debug!(context = ctx.name(), method = %ctx.request.method, status = status.as_u16(), "Facet rejected request");
        ctx.response = Response::with_status(status, message);
        ctx.done = true;
    }
}

impl Handle for Facet {
    fn handle(&self, ctx: &mut Context) -> Result<bool, DispatchError> {
        ctx.append_name(&self.name);

        if self.representations.is_empty() {
            let status = if ctx.request.is_safe() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::METHOD_NOT_ALLOWED
            };
            self.reject(ctx, status, status.canonical_reason().unwrap_or_default());
            return Ok(true);
        }

        let method = ctx.request.method.clone();
        if !self.representations.iter().any(|r| r.supports(&method)) {
            self.reject(ctx, StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            let methods = self.allowed_methods();
            let allow: Vec<&str> = methods.iter().map(Method::as_str).collect();
            if let Ok(value) = HeaderValue::from_str(&allow.join(", ")) {
                ctx.response.headers.insert(header::ALLOW, value);
            }
            return Ok(true);
        }

        let preferences = Preferences::from_headers(&ctx.request.headers);
        let serving = self
            .representations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.supports(&method));
        let Some(negotiated) = negotiate_among(serving, &preferences) else {
            self.reject(ctx, StatusCode::NOT_ACCEPTABLE, "Not Acceptable");
            return Ok(true);
        };
        let Some(encoding) = negotiate_encoding(&preferences.encodings) else {
            self.reject(ctx, StatusCode::NOT_ACCEPTABLE, "Not Acceptable");
            return Ok(true);
        };

        tracing::debug!(
            context = ctx.name(),
            content_type = negotiated.content_type.as_deref().unwrap_or("*/*"),
            language = negotiated.language.as_deref().unwrap_or("-"),
            charset = %negotiated.charset,
            encoding = %encoding,
            "Negotiated representation"
        );

        ctx.response.content_type = negotiated.content_type;
        ctx.response.language = negotiated.language;
        ctx.response.charset = Some(negotiated.charset);
        ctx.response.encoding = encoding;

        pipeline::run(&self.representations[negotiated.index], ctx)?;
        Ok(true)
    }
}
