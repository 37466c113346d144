//! Path matching and request routing.
//!
//! # Data Flow
//! ```text
//! Context (remaining path, variables)
//!     → router.rs (routes in declaration order)
//!     → matcher.rs (pattern against remaining path)
//!     → Matched: merge variables, narrow path, call handler
//!     → Handler declined or no match: restore and try the next route
//! ```
//!
//! # Design Decisions
//! - Patterns parsed once at construction, the tree is immutable afterwards
//! - No regex in the hot path (segment comparison only)
//! - First match wins

pub mod matcher;
pub mod router;

pub use matcher::{PathMatch, PathPattern, PatternError, Segment};
pub use router::{Handle, HandleFn, Handler, Route, Router};
