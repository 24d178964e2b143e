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

//! Per-scheme backend options.
//!
//! Remote backends need connection knobs the lock core does not care
//! about: SFTP identities, FTP passive mode, FTPS channel protection,
//! TLS material, transfer type. This module normalizes them from two
//! channels, the URI's own query string and a configuration source,
//! into one [`BackendOptions`] value that a [`crate::vfs::FileSystemManager`]
//! implementation consumes when resolving handles.
//!
//! Knobs may arrive through either channel; the query string wins when
//! both carry the same key.

use std::collections::HashMap;

use crate::uri;

/// Configuration-key prefix for SFTP option overlays. The full key is
/// the prefix followed by the TitleCased option name, e.g.
/// `vfs.sftpIdentities` for the `identities` option.
pub const SFTP_OPTION_PREFIX: &str = "vfs.sftp";

/// SFTP options recognized by the configured-value overlay.
const SFTP_OPTIONS: &[&str] = &[
    "identities",
    "identityPassPhrase",
    "userDirIsRoot",
    "strictHostKeyChecking",
    "preferredAuthentications",
    "sessionTimeout",
];

/// FTP/FTPS transfer type, carried on the wire as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// ASCII transfer (code 0).
    Ascii,
    /// EBCDIC transfer (code 1).
    Ebcdic,
    /// Binary transfer (code 2). The default.
    #[default]
    Binary,
    /// Local transfer (code 3).
    Local,
}

impl FileType {
    /// Parses a `fileType` value case-insensitively; unknown names fall
    /// back to binary.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ASCII" => Self::Ascii,
            "EBCDIC" => Self::Ebcdic,
            "LOCAL" => Self::Local,
            _ => Self::Binary,
        }
    }

    /// The backend's integer code for this transfer type.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Ascii => 0,
            Self::Ebcdic => 1,
            Self::Binary => 2,
            Self::Local => 3,
        }
    }
}

/// FTPS data-channel protection level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelProtection {
    /// `C`: clear.
    Clear,
    /// `S`: safe.
    Safe,
    /// `E`: confidential.
    Confidential,
    /// `P`: private.
    Private,
}

impl DataChannelProtection {
    /// Maps a `vfs.protection` value case-insensitively onto one of the
    /// four levels; any other value leaves the backend default.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "C" => Some(Self::Clear),
            "S" => Some(Self::Safe),
            "E" => Some(Self::Confidential),
            "P" => Some(Self::Private),
            _ => None,
        }
    }
}

/// A source of configured option values.
///
/// Implemented for a flat string map and for [`config::Config`], so the
/// assembler accepts both a structured parameter bag and deployment
/// configuration. Empty values count as absent.
pub trait ParamSource {
    /// Looks up a configured value by key.
    fn get(&self, key: &str) -> Option<String>;
}

impl ParamSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        // Inherent `HashMap::get`, not a recursive trait call.
        self.get(key).filter(|value| !value.is_empty()).cloned()
    }
}

impl ParamSource for config::Config {
    fn get(&self, key: &str) -> Option<String> {
        self.get_string(key).ok().filter(|value| !value.is_empty())
    }
}

/// Assembled backend options for one file URI.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    /// The URI scheme the options apply to.
    pub scheme: String,
    /// The merged parameter map: query-string entries plus configured
    /// SFTP overlays, including a `scheme` entry.
    pub params: HashMap<String, String>,
    /// SFTP options keyed by lowercased option name.
    pub sftp: HashMap<String, String>,
    /// FTP/FTPS passive mode, when configured.
    pub passive: Option<bool>,
    /// Whether FTPS runs in implicit mode.
    pub implicit_ftps: bool,
    /// FTPS data-channel protection, when configured.
    pub protection: Option<DataChannelProtection>,
    /// TLS keystore path.
    pub keystore: Option<String>,
    /// TLS truststore path.
    pub truststore: Option<String>,
    /// TLS keystore password.
    pub keystore_password: Option<String>,
    /// TLS truststore password.
    pub truststore_password: Option<String>,
    /// TLS private-key password.
    pub key_password: Option<String>,
    /// Transfer type; binary unless configured otherwise.
    pub file_type: FileType,
}

/// Assembles backend options for a file URI.
///
/// Returns `None` when the URI carries no scheme; there is no backend
/// to configure for a bare path.
#[must_use]
pub fn assemble(target: &str, source: &dyn ParamSource) -> Option<BackendOptions> {
    let scheme = uri::extract_scheme(target)?.to_string();

    let mut params = parse_query(uri::query_tail(target));
    params.insert("scheme".to_string(), scheme.clone());
    for option in SFTP_OPTIONS {
        let key = format!("{SFTP_OPTION_PREFIX}{}", title_case(option));
        if let Some(value) = source.get(&key) {
            params.insert((*option).to_string(), value);
        }
    }

    let lookup = |key: &str| params.get(key).cloned().or_else(|| source.get(key));

    let mut options = BackendOptions {
        scheme,
        ..BackendOptions::default()
    };

    for option in SFTP_OPTIONS {
        if let Some(value) = params.get(*option) {
            options.sftp.insert(option.to_lowercase(), value.clone());
        }
    }

    if let Some(value) = lookup("vfs.passive") {
        options.passive = Some(parse_bool(&value));
    }
    options.implicit_ftps = lookup("vfs.implicit").is_some_and(|value| parse_bool(&value));
    options.protection = lookup("vfs.protection")
        .and_then(|value| DataChannelProtection::from_name(&value));

    options.keystore = lookup("vfs.ssl.keystore");
    options.truststore = lookup("vfs.ssl.truststore");
    options.keystore_password = lookup("vfs.ssl.kspassword");
    options.truststore_password = lookup("vfs.ssl.tspassword");
    options.key_password = lookup("vfs.ssl.keypassword");

    options.file_type = lookup("fileType")
        .map_or(FileType::Binary, |value| FileType::from_name(&value));

    options.params = params;
    Some(options)
}

/// Parses a `?`-prefixed query tail into a key/value map.
fn parse_query(tail: &str) -> HashMap<String, String> {
    let raw = tail.strip_prefix('?').unwrap_or(tail);
    url::form_urlencoded::parse(raw.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Boolean parse with the permissive wire semantics: `true`
/// (case-insensitive) is true, everything else is false.
fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// Uppercases the first character of an option name.
fn title_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
