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

//! Deployment settings for the lock core.
//!
//! The embedding runtime decides per call whether a suspect sidecar may
//! be auto-released; these settings give it a configured default.
//! Scheme-option knobs (`vfs.*`, `fileType`, SFTP overlays) are read
//! straight from a [`config::Config`] through
//! [`crate::options::ParamSource`] and need no mirror here.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::lock::AutoReleasePolicy;

/// Settings for the lock core.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Defaults for forced removal of stale lock sidecars.
    #[serde(default)]
    pub auto_release: AutoReleaseSettings,
}

/// Configured auto-release defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AutoReleaseSettings {
    /// Whether acquires pass an auto-release policy at all.
    #[serde(default)]
    pub enabled: bool,

    /// Restrict forced removal to sidecars written by this host.
    #[serde(default)]
    pub same_node_only: bool,

    /// Minimum sidecar age in milliseconds before forced removal;
    /// absent means "remove regardless of age".
    #[serde(default)]
    pub max_age_millis: Option<i64>,
}

impl Settings {
    /// Load settings from an optional file and the environment.
    ///
    /// Priority, lowest to highest: built-in defaults, the explicit
    /// file, `SIDELOCK_*` environment variables (`__` separates nested
    /// keys, e.g. `SIDELOCK_AUTO_RELEASE__ENABLED`).
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("auto_release.enabled", false)?
            .set_default("auto_release.same_node_only", false)?;

        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SIDELOCK").separator("__"),
        );

        let settings = builder.build().context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// The auto-release policy acquires should carry, or `None` when
    /// auto-release is disabled.
    #[must_use]
    pub fn auto_release_policy(&self) -> Option<AutoReleasePolicy> {
        self.auto_release.enabled.then(|| AutoReleasePolicy {
            same_node_only: self.auto_release.same_node_only,
            max_age_millis: self.auto_release.max_age_millis,
        })
    }
}
