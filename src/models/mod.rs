//! Domain models for Canopy.
//!
//! # Core Concepts
//!
//! - [`Directory`]: structural node of the content tree. Directories nest to
//!   any depth and host features.
//! - [`Feature`]: typed content addressed by slug inside a directory, or
//!   inside a container feature (a post inside a blog). The concrete type is
//!   stored as a tag and resolved through the feature registry.
//! - [`Mutation`]: outcome of a store write, carrying [`FieldErrors`] when
//!   validation rejects it.

mod attributes;
mod directory;
mod feature;
pub mod slug;

pub use attributes::*;
pub use directory::*;
pub use feature::*;
pub use slug::{join_path, slugify};
