//! Resources: facets selected by sub-path.

use std::sync::Arc;

use crate::error::{DispatchError, PatternError};
use crate::rest::{Context, Facet};
use crate::routing::{Handle, Handler, Router};

/// A group of facets matched by path exactly like router routes.
#[derive(Clone)]
pub struct Resource {
    router: Router,
}

impl Resource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            router: Router::new(name),
        }
    }

    /// Add a facet under `pattern`, relative to the resource's path.
    pub fn facet(mut self, pattern: &str, facet: Facet) -> Result<Self, PatternError> {
        self.router = self.router.route(pattern, Handler::Facet(Arc::new(facet)))?;
        Ok(self)
    }

    /// Handler consulted when no facet matches.
    pub fn fallback(mut self, handler: Handler) -> Self {
        self.router = self.router.fallback(handler);
        self
    }
}

impl Handle for Resource {
    fn handle(&self, ctx: &mut Context) -> Result<bool, DispatchError> {
        self.router.handle(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{Representation, Request};
    use axum::http::StatusCode;

    fn resource() -> Resource {
        let text = |body: &'static str| {
            Representation::new().content_types(["text/plain"]).present(move |ctx| {
                ctx.write_str(body);
                Ok(())
            })
        };
        Resource::new("person")
            .facet("{name}/chores", Facet::new("chores").representation(text("chores")))
            .unwrap()
            .facet("{name}", Facet::new("profile").representation(text("profile")))
            .unwrap()
    }

    #[test]
    fn test_first_matching_facet_handles() {
        let mut ctx = Context::new(Request::get("/alice/chores"));
        assert!(resource().handle(&mut ctx).unwrap());
        assert_eq!(ctx.response.body, b"chores");
        assert_eq!(ctx.variable_str("name"), Some("alice"));
        assert_eq!(ctx.name(), "person.chores");
    }

    #[test]
    fn test_no_facet_is_unhandled() {
        let mut ctx = Context::new(Request::get("/alice/chores/extra"));
        assert!(!resource().handle(&mut ctx).unwrap());
        assert!(ctx.variables.is_empty());
        assert_eq!(ctx.path, "alice/chores/extra");
    }

    #[test]
    fn test_fallback() {
        let resource = resource().fallback(Handler::NotFound);
        let mut ctx = Context::new(Request::get("/a/b/c"));
        assert!(resource.handle(&mut ctx).unwrap());
        assert_eq!(ctx.response.status, StatusCode::NOT_FOUND);
    }
}
