//! Data models for dishmatch.
//!
//! Template entries held by the store and the query-scoped values returned
//! by classification.

mod search;
mod template;

pub use search::{MatchResult, Recognition};
pub use template::{ArtifactRef, TemplateEntry};
