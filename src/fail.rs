// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The Sidelock Project

//! Fail markers: poison flags for files whose processing failed.
//!
//! A `.fail` sidecar next to a file tells later pollers "this one broke,
//! do not reprocess". The signal is the marker's existence; its content,
//! a decimal millisecond epoch, is advisory metadata for operators.
//! Everything here is best-effort and purely advisory: a party that
//! chooses to ignore a marker is not blocked by anything.
//!
//! Marker operations have no failure channel back to the caller. The
//! marker is itself an error-channel signal, so IO problems are logged
//! (with masked URIs) and swallowed; only the existence probe reports
//! anything, and it reports `false` when the backend cannot answer.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::options::BackendOptions;
use crate::uri;
use crate::vfs::{self, BackendError, FileSystemManager, VfsFile};

/// Records and probes `.fail` sidecars in a shared file space.
///
/// Obtained from [`crate::lock::FileLockManager::fail_markers`]; marking
/// shares the lock manager's serialization mutex, so a mark never
/// interleaves with an acquire handshake in the same process.
pub struct FailMarkerStore {
    fs: Arc<dyn FileSystemManager>,
    serial: Arc<Mutex<()>>,
}

impl FailMarkerStore {
    pub(crate) fn shared(fs: Arc<dyn FileSystemManager>, serial: Arc<Mutex<()>>) -> Self {
        Self { fs, serial }
    }

    /// Marks `target` as failed, creating or overwriting its `.fail`
    /// sidecar with the current millisecond epoch.
    pub fn mark(&self, target: &str, options: Option<&BackendOptions>) {
        let _serial = self.serial.lock();

        let marker_uri = vfs::fail_sidecar_uri(target);
        let mut marker = match self.fs.resolve(&marker_uri, options) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    "Could not resolve fail marker for {}: {}",
                    uri::mask_password(target),
                    err
                );
                return;
            }
        };

        let stamp = Utc::now().timestamp_millis().to_string();
        if let Err(err) = write_marker(marker.as_mut(), stamp.as_bytes()) {
            warn!(
                "Could not record fail marker for {}: {}",
                uri::mask_password(target),
                err
            );
            // Don't leave a half-written marker around to be trusted.
            if let Err(err) = marker.delete() {
                debug!(
                    "Could not remove partial fail marker for {}: {}",
                    uri::mask_password(target),
                    err
                );
            }
        }
        marker.close();
    }

    /// Whether `target` carries a fail marker.
    ///
    /// Backend failures are logged and answered with `false`.
    #[must_use]
    pub fn is_marked(&self, target: &str, options: Option<&BackendOptions>) -> bool {
        let marker_uri = vfs::fail_sidecar_uri(target);
        match self.fs.resolve(&marker_uri, options) {
            Ok(mut marker) => {
                let present = marker.exists();
                marker.close();
                match present {
                    Ok(present) => present,
                    Err(err) => {
                        warn!(
                            "Could not check fail marker for {}: {}",
                            uri::mask_password(target),
                            err
                        );
                        false
                    }
                }
            }
            Err(err) => {
                warn!(
                    "Could not resolve fail marker for {}: {}",
                    uri::mask_password(target),
                    err
                );
                false
            }
        }
    }

    /// Clears the fail marker on `target`, if any.
    pub fn release(&self, target: &str, options: Option<&BackendOptions>) {
        let marker_uri = vfs::fail_sidecar_uri(target);
        match self.fs.resolve(&marker_uri, options) {
            Ok(mut marker) => {
                match marker.exists() {
                    Ok(true) => {
                        if let Err(err) = marker.delete() {
                            warn!(
                                "Could not clear fail marker for {}: {}",
                                uri::mask_password(target),
                                err
                            );
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            "Could not check fail marker for {}: {}",
                            uri::mask_password(target),
                            err
                        );
                    }
                }
                marker.close();
            }
            Err(err) => {
                warn!(
                    "Could not resolve fail marker for {}: {}",
                    uri::mask_password(target),
                    err
                );
            }
        }
    }
}

/// Creates the marker if missing, then writes the stamp.
fn write_marker(marker: &mut dyn VfsFile, stamp: &[u8]) -> Result<(), BackendError> {
    if !marker.exists()? {
        marker.create()?;
    }
    vfs::write_all(marker, stamp)
}
