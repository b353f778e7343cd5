// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Auth Server Contributors

//! Key authority errors.

/// Errors from the signing authority or the key cache.
///
/// `Upstream` is transient (network, timeout, 5xx from the authority)
/// and maps to a retryable 5xx at the HTTP boundary. `Malformed` means
/// the authority returned key material this service cannot use, which is
/// a configuration fault and is not retried.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key authority request failed: {0}")]
    Upstream(String),

    #[error("malformed response from key authority: {0}")]
    Malformed(String),
}

impl KeyError {
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream(err.to_string())
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed(detail.into())
    }
}
