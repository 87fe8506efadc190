//! Tag derivation and invalidation.
//!
//! Entity kinds are declared as data ([`EntityKind`] with [`TagTemplate`]s) and
//! a single [`TagRegistry`] turns identifiers into tags and invalidates them.

mod engine;
pub mod kinds;
mod registry;

pub use engine::{EntityKind, TagIds, TagTemplate};
pub use registry::{RevalidateReport, TagRegistry, invalidate_tags};
