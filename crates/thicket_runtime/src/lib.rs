//! Session persistence for Thicket.
//!
//! This crate provides:
//! - Snapshot serialization and deserialization (`MessagePack`)
//! - Saving and loading whole sessions to and from files

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod serialize;

pub use serialize::{from_bytes, load_from_file, load_session, save_session, save_to_file, to_bytes};
