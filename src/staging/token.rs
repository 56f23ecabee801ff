//! Staging tokens and the token registry.
//!
//! A [`StagingToken`] is the opaque correlation identifier an engine issues
//! for a bring-online batch. The [`TokenRegistry`] remembers which URLs were
//! submitted under which token. It is a correlation record only: it never
//! decides whether a call may proceed and holds no per-URL state.

use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::{TOKEN_BUFFER_LEN, TokenBuffer};
use crate::error::StagingError;

/// Opaque token covering one bring-online batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingToken(String);

impl StagingToken {
    /// Wraps a caller-supplied token, rejecting values no engine could have
    /// issued.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::MalformedToken`] if the token is empty, contains
    /// a NUL byte, or does not fit the engine token buffer.
    pub fn parse(token: impl Into<String>) -> Result<Self, StagingError> {
        let token = token.into();
        if token.is_empty() {
            return Err(StagingError::malformed_token("empty token"));
        }
        if token.as_bytes().contains(&0) {
            return Err(StagingError::malformed_token("embedded NUL byte"));
        }
        if token.len() >= TOKEN_BUFFER_LEN {
            return Err(StagingError::malformed_token("longer than the engine token buffer"));
        }
        Ok(Self(token))
    }

    /// Extracts the token an engine wrote into `buffer`, stopping at the
    /// first NUL.
    ///
    /// The engine has already accepted the batch at this point, so invalid
    /// UTF-8 is replaced rather than refused.
    #[must_use]
    pub fn from_buffer(buffer: &TokenBuffer) -> Self {
        let bytes = buffer.contents();
        match String::from_utf8_lossy(bytes) {
            std::borrow::Cow::Borrowed(token) => Self(token.to_owned()),
            std::borrow::Cow::Owned(token) => {
                warn!(%token, "engine token is not valid UTF-8");
                Self(token)
            }
        }
    }

    /// Returns the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the engine issued no token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StagingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StagingToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Correlation record: token -> URLs submitted under it.
///
/// A URL leaves the record only once it was released or aborted
/// successfully. Tokens the caller never releases stay here for the life of
/// the [`Context`](crate::Context).
#[derive(Debug, Default)]
pub struct TokenRegistry {
    entries: DashMap<StagingToken, Vec<String>>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the URLs submitted under `token`. Recording the same token
    /// twice merges the URL sets.
    pub fn record(&self, token: &StagingToken, urls: &[String]) {
        if token.is_empty() {
            return;
        }
        let mut entry = self.entries.entry(token.clone()).or_default();
        for url in urls {
            if !entry.contains(url) {
                entry.push(url.clone());
            }
        }
        debug!(%token, url_count = entry.len(), "recorded staging token");
    }

    /// Returns the URLs known for `token`.
    #[must_use]
    pub fn urls_for(&self, token: &StagingToken) -> Option<Vec<String>> {
        self.entries.get(token).map(|entry| entry.value().clone())
    }

    /// Returns true if the token was issued through this registry.
    #[must_use]
    pub fn contains(&self, token: &StagingToken) -> bool {
        self.entries.contains_key(token)
    }

    /// Logs URLs a caller names under `token` that were never submitted
    /// with it. Unknown tokens are not an error; they may come from another
    /// process.
    pub fn check_correlation(&self, token: &StagingToken, urls: &[String]) {
        let Some(entry) = self.entries.get(token) else {
            debug!(%token, "token not issued by this context");
            return;
        };
        for url in urls.iter().filter(|url| !entry.contains(*url)) {
            warn!(%token, url = %url, "URL was not submitted under this token");
        }
    }

    /// Drops `urls` from the token's set, forgetting the token once empty.
    pub fn forget(&self, token: &StagingToken, urls: &[String]) {
        let emptied = match self.entries.get_mut(token) {
            Some(mut entry) => {
                entry.retain(|known| !urls.contains(known));
                entry.is_empty()
            }
            None => false,
        };
        if emptied {
            self.entries.remove(token);
            debug!(%token, "forgot staging token");
        }
    }

    /// Number of tokens currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no token is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
