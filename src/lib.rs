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

//! Sidelock coordinates concurrent access to individual files in a shared
//! file space (local disk, FTP/FTPS, SFTP, any URI-addressable backend)
//! using only the file space itself as the rendezvous.
//!
//! Listeners that poll inbound directories and senders that deposit
//! outbound payloads claim a file by creating a `.lock` sidecar next to it
//! and verifying that their holder token survived the write. A `.fail`
//! sidecar poison-flags files whose processing failed. Both protocols are
//! advisory and best-effort: there is no broker, no database, and a
//! documented race window on backends without atomic exclusive create.

/// Deployment settings: configured auto-release defaults.
pub mod config;
/// Fail markers: poison flags for files whose processing failed.
pub mod fail;
/// The lock acquisition protocol and auto-release policy.
pub mod lock;
/// Per-scheme backend options assembled from query strings and configuration.
pub mod options;
/// Holder-token encoding.
pub mod token;
/// URI canonicalization and password masking.
pub mod uri;
/// Backend traits, sidecar resolution, and the local filesystem backend.
pub mod vfs;
