//! Session snapshot serialization using `MessagePack`.
//!
//! This module provides functions for saving and loading session snapshots
//! to/from bytes and files using the `MessagePack` binary format. Restoring
//! a session still needs the rule base it was taken from; rules and actions
//! are code and are never serialized.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use thicket_engine::{RuleBase, Session, SessionSnapshot};
use thicket_foundation::{Error, ErrorKind, Result};

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
}

/// Serializes a snapshot to bytes using `MessagePack` format.
///
/// Uses named serialization to preserve struct field names.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(snapshot: &SessionSnapshot) -> Result<Vec<u8>> {
    encode(snapshot)
}

/// Deserializes a snapshot from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn from_bytes(bytes: &[u8]) -> Result<SessionSnapshot> {
    decode(bytes)
}

/// Saves a snapshot to a file using `MessagePack` format.
///
/// Creates the file if it doesn't exist, or overwrites it if it does.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to,
/// or if serialization fails.
pub fn save_to_file<P: AsRef<Path>>(snapshot: &SessionSnapshot, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = to_bytes(snapshot)?;
    let file = File::create(path).map_err(|e| io_error("create", path, &e))?;

    let mut writer = BufWriter::new(file);
    writer
        .write_all(&bytes)
        .map_err(|e| io_error("write to", path, &e))?;
    writer.flush().map_err(|e| io_error("flush", path, &e))?;

    Ok(())
}

/// Loads a snapshot from a `MessagePack` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or if deserialization fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SessionSnapshot> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| io_error("open", path, &e))?;

    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| io_error("read", path, &e))?;

    from_bytes(&bytes)
}

/// Snapshots a session and saves it to a file.
///
/// # Errors
///
/// Returns an error if the snapshot cannot be taken or written.
pub fn save_session<P: AsRef<Path>>(session: &Session, path: P) -> Result<()> {
    save_to_file(&session.snapshot()?, path)
}

/// Loads a snapshot file and restores it over a rule base.
///
/// # Errors
///
/// Returns an error if the file cannot be read, or if the snapshot does not
/// belong to `rule_base`.
pub fn load_session<P: AsRef<Path>>(rule_base: Arc<RuleBase>, path: P) -> Result<Session> {
    Session::restore(rule_base, load_from_file(path)?)
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::new(ErrorKind::IoError(format!(
        "failed to {action} file '{}': {e}",
        path.display()
    )))
}
