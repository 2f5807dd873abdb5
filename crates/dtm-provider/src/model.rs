//! Minimal wire-level shapes needed by [`crate::ProviderClient`]. The actual
//! endpoint paths and JSON bodies are out of the core's scope (§1); these
//! types describe only what callers need from a response.

use serde::{Deserialize, Serialize};

/// A single torrent as reported by the provider's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTorrent {
    /// Provider-assigned identifier.
    pub id: String,
    /// 40-char lower-hex info hash.
    pub hash: String,
    /// Display filename.
    pub filename: String,
    /// Provider-reported status label, not yet parsed into
    /// [`dtm_core::TorrentStatus`].
    pub status: String,
    /// Size in bytes.
    pub size: u64,
    /// When the torrent was added on the provider, RFC 3339.
    pub added: String,
}

/// Optional filter passed to [`crate::ProviderClient::get_torrents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Only torrents the provider currently considers failed.
    Failed,
    /// No filter; the full catalog page.
    All,
}

/// Result of submitting a magnet link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMagnetResult {
    /// Provider-assigned identifier for the newly admitted torrent.
    pub id: String,
    /// Provider-side URI for polling the new torrent's status.
    pub uri: String,
}

/// Account information, used as a connectivity/auth probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Provider username.
    pub username: String,
    /// Unix timestamp the premium subscription expires, 0 if not premium.
    pub premium_until: i64,
}
