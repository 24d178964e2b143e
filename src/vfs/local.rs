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

//! Local filesystem backend.
//!
//! Handles `file://` URIs and bare paths. Query tails are stripped while
//! mapping a URI to a path; the local backend has no use for
//! per-request credentials. `create` uses the platform's exclusive
//! create, so losing a creation race surfaces as an error instead of a
//! silent overwrite; the lock protocol depends on that distinction.
//!
//! There is no connection pool behind `std::fs`, so
//! [`FileSystemManager::close_file_system`] is a no-op here.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;

use tracing::warn;

use super::{BackendError, FileSystemManager, VfsFile};
use crate::options::BackendOptions;
use crate::uri;

/// Backend for the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates the local backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A resolved local file handle: a path binding, no open descriptor.
struct LocalFile {
    target: String,
    path: PathBuf,
    closed: bool,
}

impl FileSystemManager for LocalFileSystem {
    fn resolve(
        &self,
        target: &str,
        _options: Option<&BackendOptions>,
    ) -> Result<Box<dyn VfsFile>, BackendError> {
        let path = map_to_path(target)?;
        Ok(Box::new(LocalFile {
            target: target.to_string(),
            path,
            closed: false,
        }))
    }

    fn close_file_system(&self, _file: &dyn VfsFile) {
        // std::fs holds no pooled connections to release.
    }
}

/// Maps a URI onto a local path, rejecting foreign schemes.
fn map_to_path(target: &str) -> Result<PathBuf, BackendError> {
    if let Some(scheme) = uri::extract_scheme(target)
        && scheme != "file"
    {
        return Err(BackendError::new(
            "resolve",
            target,
            io::Error::new(
                ErrorKind::Unsupported,
                format!("scheme '{scheme}' is not handled by the local backend"),
            ),
        ));
    }

    let canonical = uri::canonical(target);
    let path = canonical.strip_prefix("file://").unwrap_or(canonical);
    if path.is_empty() {
        return Err(BackendError::new(
            "resolve",
            target,
            io::Error::new(ErrorKind::InvalidInput, "empty path"),
        ));
    }
    Ok(PathBuf::from(path))
}

impl VfsFile for LocalFile {
    fn uri(&self) -> &str {
        &self.target
    }

    fn exists(&mut self) -> Result<bool, BackendError> {
        match std::fs::metadata(&self.path) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BackendError::new("exists", &self.target, err)),
        }
    }

    fn create(&mut self) -> Result<(), BackendError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map(drop)
            .map_err(|err| BackendError::new("create", &self.target, err))
    }

    fn open_read(&mut self) -> Result<Box<dyn Read + Send>, BackendError> {
        let file = File::open(&self.path)
            .map_err(|err| BackendError::new("open read", &self.target, err))?;
        Ok(Box::new(file))
    }

    fn open_write(&mut self) -> Result<Box<dyn Write + Send>, BackendError> {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| BackendError::new("open write", &self.target, err))?;
        Ok(Box::new(file))
    }

    fn delete(&mut self) -> Result<(), BackendError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(BackendError::new("delete", &self.target, err)),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Drop for LocalFile {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "File handle for {} dropped without close",
                uri::mask_password(&self.target)
            );
        }
    }
}
