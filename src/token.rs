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

//! Lock-holder tokens.
//!
//! A token is the single line written into a lock sidecar:
//!
//! ```text
//! <random-int64>:<hostname>:<ip>:<millis-epoch>
//! ```
//!
//! It doubles as the holder's claim proof (the verify step compares the
//! sidecar content byte-for-byte against the locally generated token) and
//! as the auto-release oracle (host/ip identify the origin node, the
//! trailing field dates the claim). Cryptographic strength is not needed;
//! determinism across processes is not wanted. Hostname or address
//! resolution failures yield empty fields rather than errors, so the
//! encoder itself never fails. Empty fields are legal on the wire
//! (`::` separators), as long as the colon-split arity stays at four.

use chrono::Utc;
use std::net::IpAddr;
use tracing::debug;

/// Number of colon-separated fields in a well-formed token.
pub const TOKEN_FIELDS: usize = 4;

/// Generates a fresh holder token for this process and instant.
#[must_use]
pub fn generate() -> String {
    let nonce: i64 = rand::random();
    format!(
        "{nonce}:{}:{}:{}",
        node_host(),
        node_address(),
        Utc::now().timestamp_millis()
    )
}

/// Splits a token into its four fields.
///
/// Returns `None` when the colon-split arity is not exactly four; empty
/// fields are accepted.
#[must_use]
pub fn split(token: &str) -> Option<[&str; TOKEN_FIELDS]> {
    let mut parts = token.split(':');
    let fields = [parts.next()?, parts.next()?, parts.next()?, parts.next()?];
    if parts.next().is_some() {
        return None;
    }
    Some(fields)
}

/// Local hostname, or empty when resolution fails.
fn node_host() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            debug!("Could not resolve local hostname: {err}");
            String::new()
        }
    }
}

/// Local IPv4 address, or empty when resolution fails.
///
/// IPv6 addresses contain colons and would break the token arity, so an
/// IPv6-only host gets an empty field.
fn node_address() -> String {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(addr)) => addr.to_string(),
        Ok(IpAddr::V6(addr)) => {
            debug!("Skipping IPv6 local address {addr}: token fields are colon-delimited");
            String::new()
        }
        Err(err) => {
            debug!("Could not determine local address: {err}");
            String::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::{generate, split};

    #[test]
    fn generated_token_has_four_fields() {
        let token = generate();
        let fields = split(&token).unwrap();
        // Nonce and timestamp must parse; host/ip may be empty.
        fields[0].parse::<i64>().unwrap();
        assert!(fields[3].parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn generated_tokens_differ() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn split_accepts_empty_host_fields() {
        let fields = split("-42:::1000").unwrap();
        assert_eq!(fields, ["-42", "", "", "1000"]);
    }

    #[test]
    fn split_rejects_wrong_arity() {
        assert!(split("1:host:ip").is_none());
        assert!(split("1:host:ip:17:extra").is_none());
        assert!(split("").is_none());
    }
}
