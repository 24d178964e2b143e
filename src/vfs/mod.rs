/*
 * Copyright (C) 2026 The Sidelock Project
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! The file-space gateway: backend traits, sidecar resolution, and the
//! single error kind everything collapses to.
//!
//! The lock core never talks to a concrete backend directly. It resolves
//! file handles through an injected [`FileSystemManager`] and drives them
//! through the [`VfsFile`] operations. The manager is owned by the
//! enclosing runtime (a process-global handle pool in practice); the lock
//! core borrows it and is responsible for closing every handle it
//! resolves and, on acquire-error paths, for closing the handle's
//! parent filesystem so chronic errors cannot accumulate backend
//! connections.

use std::error::Error;
use std::io::{Read, Write};

use thiserror::Error as ThisError;

use crate::options::BackendOptions;
use crate::uri;

/// Local filesystem backend for `file://` URIs and bare paths.
pub mod local;

/// Suffix appended to a canonical URI to derive its lock sidecar.
pub const LOCK_SUFFIX: &str = ".lock";

/// Suffix appended to a canonical URI to derive its fail sidecar.
pub const FAIL_SUFFIX: &str = ".fail";

/// A failed backend operation.
///
/// Every backend failure surfaces as this one kind, wrapping the
/// operation name, the (password-masked) URI it targeted, and the
/// underlying cause. Backend-specific error types never cross the trait
/// boundary.
#[derive(Debug, ThisError)]
#[error("{operation} failed for {uri}")]
pub struct BackendError {
    operation: &'static str,
    uri: String,
    #[source]
    source: Box<dyn Error + Send + Sync>,
}

impl BackendError {
    /// Wraps a backend failure. The URI is masked here, once, so no
    /// caller can accidentally log credentials through an error message.
    pub fn new(
        operation: &'static str,
        uri: &str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            uri: uri::mask_password(uri),
            source: source.into(),
        }
    }
}

/// A resolved file handle inside some backend.
///
/// Handles are cheap path bindings, not open file descriptors; streams
/// are opened per operation. `close` releases whatever the backend keeps
/// per handle and may be called more than once.
pub trait VfsFile: Send {
    /// The URI this handle was resolved from.
    fn uri(&self) -> &str;

    /// Whether the file currently exists.
    fn exists(&mut self) -> Result<bool, BackendError>;

    /// Creates the file. Only guaranteed sensible when `exists` was
    /// false; backends with an atomic exclusive-create primitive should
    /// use it and fail when the file already exists.
    fn create(&mut self) -> Result<(), BackendError>;

    /// Opens the file content for reading.
    fn open_read(&mut self) -> Result<Box<dyn Read + Send>, BackendError>;

    /// Opens the file content for writing, truncating existing content.
    fn open_write(&mut self) -> Result<Box<dyn Write + Send>, BackendError>;

    /// Deletes the file. Deleting an absent file is a no-op.
    fn delete(&mut self) -> Result<(), BackendError>;

    /// Releases the handle. Idempotent.
    fn close(&mut self);
}

/// The injected backend seam.
///
/// Implementations map URIs onto a concrete file space (local disk,
/// FTP/FTPS, SFTP, ...) using the per-scheme options assembled by
/// [`crate::options::assemble`].
pub trait FileSystemManager: Send + Sync {
    /// Resolves a URI to a file handle.
    fn resolve(
        &self,
        target: &str,
        options: Option<&BackendOptions>,
    ) -> Result<Box<dyn VfsFile>, BackendError>;

    /// Releases the backend connection owning the given handle's parent.
    ///
    /// Invoked on acquire-error paths to reclaim pooled connections;
    /// backends without pooled connections treat this as a no-op.
    fn close_file_system(&self, file: &dyn VfsFile);
}

/// Derives the lock sidecar URI: `canonical(uri) + ".lock"`.
///
/// The query tail never participates, so every party derives the same
/// sidecar path regardless of per-request credentials.
#[must_use]
pub fn lock_sidecar_uri(target: &str) -> String {
    format!("{}{LOCK_SUFFIX}", uri::canonical(target))
}

/// Derives the fail sidecar URI: `canonical(uri) + ".fail" + query tail`.
///
/// Fail-marker operations re-attach the query tail so backends that
/// carry per-request credentials in it can honour existence checks,
/// creation, and deletion alike. Backends that do not consume query
/// credentials strip the tail while mapping the URI, so the marker's
/// identity is unaffected.
#[must_use]
pub fn fail_sidecar_uri(target: &str) -> String {
    format!(
        "{}{FAIL_SUFFIX}{}",
        uri::canonical(target),
        uri::query_tail(target)
    )
}

/// Writes `bytes` as the entire content of `file`: open, write, flush.
///
/// The stream is dropped on every path; the handle itself stays open and
/// remains the caller's to close.
pub fn write_all(file: &mut dyn VfsFile, bytes: &[u8]) -> Result<(), BackendError> {
    let mut output = file.open_write()?;
    let outcome = output.write_all(bytes).and_then(|()| output.flush());
    drop(output);
    outcome.map_err(|err| BackendError::new("content write", file.uri(), err))
}

/// Reads up to `limit` bytes from the start of `file`.
///
/// Returns the bytes read and whether the stream was exhausted, i.e.
/// whether a reader positioned after those bytes would see EOF. The
/// verify step of the lock handshake relies on the EOF signal to reject
/// superset-content collisions where a racing writer appended.
pub fn read_head(file: &mut dyn VfsFile, limit: usize) -> Result<(Vec<u8>, bool), BackendError> {
    let mut input = file.open_read()?;
    let mut buf = vec![0_u8; limit];
    let mut filled = 0;
    while filled < limit {
        let read = input
            .read(&mut buf[filled..])
            .map_err(|err| BackendError::new("content read", file.uri(), err))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buf.truncate(filled);

    let exhausted = if filled < limit {
        true
    } else {
        let read = input
            .read(&mut [0_u8; 1])
            .map_err(|err| BackendError::new("content read", file.uri(), err))?;
        read == 0
    };
    Ok((buf, exhausted))
}
