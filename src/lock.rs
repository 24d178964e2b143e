// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The Sidelock Project

//! Cross-party advisory file locks over a shared file space.
//!
//! Listeners polling an inbound directory and senders depositing outbound
//! payloads coordinate through the file space itself: no broker, no
//! database. A file is claimed by creating a `.lock` sidecar next to it
//! whose content is a holder token ([`crate::token`]).
//!
//! Backends rarely offer an atomic create-if-absent, so the claim is a
//! create-then-verify handshake: write your token, re-resolve the sidecar
//! through a fresh handle, and confirm that the surviving content is
//! yours, byte for byte and followed by EOF. Two parties may both observe
//! "no sidecar" and both create; last writer wins on content, and the
//! verify step is the resolution.
//!
//! ## Lock lifecycle
//!
//! 1. **Acquire**: a listener or sender claims the file before touching it.
//! 2. **Process**: the caller reads/writes the file outside the lock core.
//! 3. **Release**: the sidecar is deleted; deleting an absent sidecar is
//!    a no-op.
//! 4. **Auto-release**: a sidecar left behind by a crashed holder can be
//!    forcibly removed on a later acquire, gated by age and origin node.
//!
//! All acquires within one process are serialized by a single long-lived
//! mutex, so races are cross-process only. The protocol stays advisory
//! and best-effort: every backend failure collapses to
//! [`AcquireOutcome::NotAcquired`] and the caller retries on its next
//! poll tick.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::fail::FailMarkerStore;
use crate::options::BackendOptions;
use crate::token;
use crate::uri;
use crate::vfs::{self, BackendError, FileSystemManager, VfsFile};

/// Result of an acquire attempt.
///
/// `NotAcquired` is the normal contended outcome, not an error; callers
/// poll on a fixed cadence and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock sidecar exists and holds this process's token.
    Acquired,
    /// Someone else holds the file, the file vanished, or the backend
    /// failed; retry on the next poll tick.
    NotAcquired,
}

/// Forced-removal directive for a suspect sidecar met during acquire.
///
/// Passing a policy to [`FileLockManager::acquire`] enables auto-release
/// for that call. The policy is deliberately conservative: it never
/// steals a young lock, and with `same_node_only` it never touches locks
/// from other hosts. It also never hands the lock to the caller: the
/// sidecar is at most deleted, and the caller retries later.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoReleasePolicy {
    /// Only remove sidecars written by this host (hostname and IP both
    /// match the local token).
    pub same_node_only: bool,
    /// Minimum age in milliseconds before a sidecar may be removed.
    /// `None` removes regardless of age.
    pub max_age_millis: Option<i64>,
}

/// Coordinates advisory file locks through an injected backend.
///
/// One manager per process is the intended shape: the internal mutex is
/// what serializes same-process acquires, and distinct managers behave
/// like distinct processes.
pub struct FileLockManager {
    fs: Arc<dyn FileSystemManager>,
    serial: Arc<Mutex<()>>,
}

impl FileLockManager {
    /// Creates a lock manager over the given backend.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystemManager>) -> Self {
        Self {
            fs,
            serial: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the fail-marker store for the same file space.
    ///
    /// The store shares this manager's serialization mutex, so marking a
    /// failure is mutually exclusive with acquiring a lock.
    #[must_use]
    pub fn fail_markers(&self) -> FailMarkerStore {
        FailMarkerStore::shared(self.fs.clone(), self.serial.clone())
    }

    /// Attempts to claim the file behind `target`.
    ///
    /// * `auto_release`: enables forced removal of a stale sidecar met
    ///   during this call; the call still returns `NotAcquired`.
    /// * `is_listener`: listeners additionally require the target file
    ///   to exist, so a file deleted between directory scan and acquire
    ///   does not leave an orphan sidecar.
    /// * `options`: per-scheme backend options for handle resolution.
    ///
    /// Never blocks on contention and never surfaces backend errors:
    /// failures are logged with a masked URI and collapse to
    /// `NotAcquired`.
    #[must_use]
    pub fn acquire(
        &self,
        target: &str,
        auto_release: Option<&AutoReleasePolicy>,
        is_listener: bool,
        options: Option<&BackendOptions>,
    ) -> AcquireOutcome {
        let _serial = self.serial.lock();

        let sidecar_uri = vfs::lock_sidecar_uri(target);
        let mut sidecar = match self.fs.resolve(&sidecar_uri, options) {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    "Could not resolve lock sidecar for {}: {}",
                    uri::mask_password(target),
                    err
                );
                return AcquireOutcome::NotAcquired;
            }
        };

        match self.handshake(sidecar.as_mut(), target, auto_release, is_listener, options) {
            Ok(outcome) => {
                sidecar.close();
                outcome
            }
            Err(err) => {
                warn!(
                    "Could not acquire lock for {}: {}",
                    uri::mask_password(target),
                    err
                );
                sidecar.close();
                // Chronic backend errors must not accumulate pooled
                // connections; drop the sidecar's parent filesystem.
                self.fs.close_file_system(sidecar.as_ref());
                AcquireOutcome::NotAcquired
            }
        }
    }

    /// The create-then-verify handshake. Runs inside the serialization
    /// mutex; the sidecar handle is owned by `acquire`.
    fn handshake(
        &self,
        sidecar: &mut dyn VfsFile,
        target: &str,
        auto_release: Option<&AutoReleasePolicy>,
        is_listener: bool,
        options: Option<&BackendOptions>,
    ) -> Result<AcquireOutcome, BackendError> {
        let holder = token::generate();

        // Presence gate: an existing sidecar means the file is claimed.
        if sidecar.exists()? {
            debug!(
                "Lock sidecar already present for {}",
                uri::mask_password(target)
            );
            if let Some(policy) = auto_release {
                auto_release_sidecar(sidecar, &holder, policy);
            }
            return Ok(AcquireOutcome::NotAcquired);
        }

        // Listener guard: don't claim a file that vanished between the
        // directory scan and this call.
        if is_listener {
            let mut item = self.fs.resolve(uri::canonical(target), options)?;
            let present = item.exists();
            item.close();
            if !present? {
                debug!(
                    "File {} is gone; skipping lock creation",
                    uri::mask_password(target)
                );
                return Ok(AcquireOutcome::NotAcquired);
            }
        }

        // Create. A failed create means another party won an exclusive
        // creation race; their sidecar, not ours to delete.
        if let Err(err) = sidecar.create() {
            debug!(
                "Lost the lock creation race for {}: {}",
                uri::mask_password(target),
                err
            );
            return Ok(AcquireOutcome::NotAcquired);
        }
        if let Err(err) = vfs::write_all(sidecar, holder.as_bytes()) {
            warn!(
                "Could not write lock content for {}: {}",
                uri::mask_password(target),
                err
            );
            if let Err(err) = sidecar.delete() {
                warn!(
                    "Could not remove partial lock sidecar for {}: {}",
                    uri::mask_password(target),
                    err
                );
            }
            return Ok(AcquireOutcome::NotAcquired);
        }

        // Verify through a fresh handle. Content equality plus EOF: a
        // racing writer that appended must not pass as us.
        let mut probe = self.fs.resolve(&vfs::lock_sidecar_uri(target), options)?;
        let verdict = confirm_holder(probe.as_mut(), holder.as_bytes());
        probe.close();
        if verdict? {
            Ok(AcquireOutcome::Acquired)
        } else {
            debug!(
                "Lock verification failed for {}; another party won",
                uri::mask_password(target)
            );
            // The surviving sidecar belongs to the rightful holder.
            Ok(AcquireOutcome::NotAcquired)
        }
    }

    /// Releases the lock on `target` by deleting its sidecar.
    ///
    /// Idempotent: releasing a file that is not locked is a no-op.
    /// Failures are logged and swallowed.
    pub fn release(&self, target: &str, options: Option<&BackendOptions>) {
        let sidecar_uri = vfs::lock_sidecar_uri(target);
        match self.fs.resolve(&sidecar_uri, options) {
            Ok(mut sidecar) => {
                match sidecar.exists() {
                    Ok(true) => {
                        if let Err(err) = sidecar.delete() {
                            warn!(
                                "Could not release lock for {}: {}",
                                uri::mask_password(target),
                                err
                            );
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            "Could not check lock sidecar for {}: {}",
                            uri::mask_password(target),
                            err
                        );
                    }
                }
                sidecar.close();
            }
            Err(err) => {
                warn!(
                    "Could not resolve lock sidecar for {}: {}",
                    uri::mask_password(target),
                    err
                );
            }
        }
    }
}

/// Confirms that the sidecar content is exactly `expected` followed by
/// EOF.
fn confirm_holder(probe: &mut dyn VfsFile, expected: &[u8]) -> Result<bool, BackendError> {
    if !probe.exists()? {
        return Ok(false);
    }
    let (head, exhausted) = vfs::read_head(probe, expected.len())?;
    Ok(head == expected && exhausted)
}

/// Forced removal of a stale sidecar, gated by token shape, origin node,
/// and age. Outcomes are swallowed; the caller retries acquire later.
fn auto_release_sidecar(sidecar: &mut dyn VfsFile, local_token: &str, policy: &AutoReleasePolicy) {
    let masked = uri::mask_password(sidecar.uri());

    let head = match vfs::read_head(sidecar, local_token.len()) {
        Ok((bytes, _)) => bytes,
        Err(err) => {
            warn!("Could not read lock sidecar {masked}: {err}");
            return;
        }
    };
    let Ok(content) = String::from_utf8(head) else {
        debug!("Lock sidecar {masked} holds a malformed token; leaving it");
        sidecar.close();
        return;
    };
    let (Some(held), Some(local)) = (token::split(&content), token::split(local_token)) else {
        debug!("Lock sidecar {masked} holds a malformed token; leaving it");
        sidecar.close();
        return;
    };

    if policy.same_node_only && (held[1] != local[1] || held[2] != local[2]) {
        debug!("Lock sidecar {masked} belongs to another node; leaving it");
        sidecar.close();
        return;
    }

    let age = match (local[3].parse::<i64>(), held[3].parse::<i64>()) {
        (Ok(now), Ok(then)) => now - then,
        _ => 0,
    };
    if policy.max_age_millis.is_none_or(|max_age| max_age <= age) {
        match sidecar.delete() {
            Ok(()) => debug!("Removed stale lock sidecar {masked} (age {age}ms)"),
            Err(err) => warn!("Could not remove stale lock sidecar {masked}: {err}"),
        }
    } else {
        debug!("Lock sidecar {masked} is too young to remove (age {age}ms)");
    }
}
