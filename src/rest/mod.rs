//! Resources, facets and the representation lifecycle.
//!
//! # Data Flow
//! ```text
//! Router match
//!     → resource.rs (facet selected by sub-path)
//!     → facet.rs (method check, negotiation)
//!     → pipeline.rs (construct → cache replay → describe → 304 → present,
//!                    or erase / modify / call for mutating methods)
//!     → Response (buffered in Context until the engine commits it)
//! ```

pub mod conditional;
pub mod context;
pub mod facet;
pub mod pipeline;
pub mod representation;
pub mod request;
pub mod resource;
pub mod response;

pub use context::{CacheDuration, Context, DeferredTask, Variables};
pub use facet::Facet;
pub use representation::{HookFn, HookKind, Hooks, Representation};
pub use request::Request;
pub use resource::Resource;
pub use response::{Response, DEFAULT_CHARSET};
