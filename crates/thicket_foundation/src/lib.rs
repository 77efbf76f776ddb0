//! Core types, values, fact handles, and errors for Thicket.
//!
//! This crate provides:
//! - [`Value`] - The value type stored in fact fields
//! - [`FactHandle`] - Stable identities for facts in working memory
//! - [`Fact`] and [`FactTemplate`] - Typed records and their schemas
//! - [`Type`] - Type descriptors for template validation
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod fact;
pub mod handle;
pub mod intern;
pub mod types;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use error::{Error, ErrorContext, ErrorKind, SemanticLimit};
pub use fact::{Fact, FactTemplate, FieldExtractor, FieldTemplate};
pub use handle::{EntryPointId, FactHandle};
pub use intern::{Interner, KeywordId};
pub use types::Type;
pub use value::Value;

/// Result alias used throughout the Thicket crates.
pub type Result<T> = std::result::Result<T, Error>;
