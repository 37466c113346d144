//! Representations and their lifecycle hooks.
//!
//! # Responsibilities
//! - Declare the content types, languages and charset a representation offers
//! - Hold the fixed set of lifecycle hooks as optional function references
//! - Decide whether an HTTP method is supported by the hooks present
//!
//! # Design Decisions
//! - Hooks are a closed record of six optional slots; an empty slot means
//!   "not supported" and is checked in one place (`supports`)
//! - Immutable once registered in a facet

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::error::HookError;
use crate::rest::Context;

/// A lifecycle hook. Communicates only by mutating the context or failing.
pub type HookFn = Arc<dyn Fn(&mut Context) -> Result<(), HookError> + Send + Sync>;

/// Names of the lifecycle hooks, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Construct,
    Describe,
    Present,
    Erase,
    Modify,
    Call,
}

impl HookKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::Construct => "construct",
            HookKind::Describe => "describe",
            HookKind::Present => "present",
            HookKind::Erase => "erase",
            HookKind::Modify => "modify",
            HookKind::Call => "call",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed-shape hook record.
#[derive(Clone, Default)]
pub struct Hooks {
    pub construct: Option<HookFn>,
    pub describe: Option<HookFn>,
    pub present: Option<HookFn>,
    pub erase: Option<HookFn>,
    pub modify: Option<HookFn>,
    pub call: Option<HookFn>,
}

impl Hooks {
    /// Look up a hook slot by kind.
    pub fn get(&self, kind: HookKind) -> Option<&HookFn> {
        match kind {
            HookKind::Construct => self.construct.as_ref(),
            HookKind::Describe => self.describe.as_ref(),
            HookKind::Present => self.present.as_ref(),
            HookKind::Erase => self.erase.as_ref(),
            HookKind::Modify => self.modify.as_ref(),
            HookKind::Call => self.call.as_ref(),
        }
    }

    fn slot(&mut self, kind: HookKind) -> &mut Option<HookFn> {
        match kind {
            HookKind::Construct => &mut self.construct,
            HookKind::Describe => &mut self.describe,
            HookKind::Present => &mut self.present,
            HookKind::Erase => &mut self.erase,
            HookKind::Modify => &mut self.modify,
            HookKind::Call => &mut self.call,
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present: Vec<&str> = [
            HookKind::Construct,
            HookKind::Describe,
            HookKind::Present,
            HookKind::Erase,
            HookKind::Modify,
            HookKind::Call,
        ]
        .into_iter()
        .filter(|kind| self.get(*kind).is_some())
        .map(|kind| kind.as_str())
        .collect();
        f.debug_tuple("Hooks").field(&present).finish()
    }
}

/// A leaf handler offering one content-type/language variant of a facet.
#[derive(Debug, Clone, Default)]
pub struct Representation {
    content_types: Vec<String>,
    languages: Vec<String>,
    charset: Option<String>,
    hooks: Hooks,
}

impl Representation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content types offered, in preference order. Empty means "any".
    pub fn content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_types = types.into_iter().map(|t| t.into().to_ascii_lowercase()).collect();
        self
    }

    /// Languages offered, in preference order. Empty means "unspecified".
    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(|l| l.into().to_ascii_lowercase()).collect();
        self
    }

    /// Charset; defaults to `utf-8` when negotiated.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into().to_ascii_lowercase());
        self
    }

    /// Attach a hook of the given kind, replacing any previous one.
    pub fn hook<F>(mut self, kind: HookKind, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        *self.hooks.slot(kind) = Some(Arc::new(f));
        self
    }

    pub fn construct<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook(HookKind::Construct, f)
    }

    pub fn describe<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook(HookKind::Describe, f)
    }

    pub fn present<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook(HookKind::Present, f)
    }

    pub fn erase<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook(HookKind::Erase, f)
    }

    pub fn modify<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook(HookKind::Modify, f)
    }

    pub fn call<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.hook(HookKind::Call, f)
    }

    pub fn declared_content_types(&self) -> &[String] {
        &self.content_types
    }

    pub fn declared_languages(&self) -> &[String] {
        &self.languages
    }

    pub fn declared_charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> String {
        match self.content_types.first() {
            Some(content_type) => content_type.clone(),
            None => "*/*".to_string(),
        }
    }

    /// Whether the hooks present can serve `method`.
    pub fn supports(&self, method: &Method) -> bool {
        match *method {
            Method::GET | Method::HEAD => {
                self.hooks.describe.is_some() || self.hooks.present.is_some()
            }
            Method::DELETE => self.hooks.erase.is_some(),
            Method::PUT | Method::PATCH => self.hooks.modify.is_some(),
            _ => self.hooks.call.is_some(),
        }
    }

    /// Methods served by this representation, for the `Allow` header.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods = Vec::new();
        if self.supports(&Method::GET) {
            methods.push(Method::GET);
            methods.push(Method::HEAD);
        }
        if self.hooks.call.is_some() {
            methods.push(Method::POST);
        }
        if self.hooks.modify.is_some() {
            methods.push(Method::PUT);
            methods.push(Method::PATCH);
        }
        if self.hooks.erase.is_some() {
            methods.push(Method::DELETE);
        }
        methods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_support_follows_hooks() {
        let read_only = Representation::new()
            .content_types(["application/json"])
            .describe(|_| Ok(()))
            .present(|_| Ok(()));

        assert!(read_only.supports(&Method::GET));
        assert!(read_only.supports(&Method::HEAD));
        assert!(!read_only.supports(&Method::DELETE));
        assert!(!read_only.supports(&Method::PUT));
        assert!(!read_only.supports(&Method::POST));

        let writable = Representation::new().erase(|_| Ok(())).modify(|_| Ok(()));
        assert!(writable.supports(&Method::DELETE));
        assert!(writable.supports(&Method::PATCH));
        assert!(!writable.supports(&Method::GET));
    }

    #[test]
    fn test_allowed_methods() {
        let rep = Representation::new().present(|_| Ok(())).call(|_| Ok(()));
        assert_eq!(
            rep.allowed_methods(),
            vec![Method::GET, Method::HEAD, Method::POST]
        );
    }

    #[test]
    fn test_declarations_are_normalised() {
        let rep = Representation::new()
            .content_types(["Text/HTML"])
            .languages(["EN-us"])
            .charset("UTF-8");
        assert_eq!(rep.declared_content_types(), ["text/html"]);
        assert_eq!(rep.declared_languages(), ["en-us"]);
        assert_eq!(rep.declared_charset(), Some("utf-8"));
        assert_eq!(rep.label(), "text/html");
        assert_eq!(format!("{:?}", rep.hooks()), "Hooks([])");
    }
}
