#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Hash / magnet / metadata validation (§4.3), with an LRU of prior verdicts
//! and an in-memory denylist. The cache is observationally transparent: the
//! verdict for a given input is identical whether served from cache or
//! recomputed.

mod error;

use std::collections::{HashSet, VecDeque};

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

pub use error::ValidatorError;

/// Maximum number of prior verdicts retained in the cache.
pub const MAX_CACHE_ENTRIES: usize = 1000;
/// Minimum distinct characters a hash must contain, guarding against padding
/// such as `aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa`.
const MIN_DISTINCT_HASH_CHARS: usize = 3;
/// Maximum allowed length of a magnet `dn` display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 200;
/// Maximum allowed filename length on a torrent record.
pub const MAX_FILENAME_LEN: usize = 255;

const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`').add(b'&').add(b'?').add(b'#');

/// Outcome of a validation check: whether it passed and, if not, why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the input passed validation.
    pub ok: bool,
    /// Human-readable rejection reason, present iff `!ok`.
    pub reason: Option<String>,
}

impl Verdict {
    /// A passing verdict.
    #[must_use]
    pub const fn pass() -> Self {
        Self { ok: true, reason: None }
    }

    /// A failing verdict with the given reason.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Parsed magnet link outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMagnet {
    /// Whether the magnet parsed and validated successfully.
    pub ok: bool,
    /// The extracted, lower-case 40-hex info hash, when `ok`.
    pub hash: Option<String>,
    /// Human-readable rejection reason, present iff `!ok`.
    pub reason: Option<String>,
}

/// Minimal shape of a provider torrent record, as needed for
/// [`Validator::validate_torrent`].
#[derive(Debug, Clone)]
pub struct TorrentMeta<'a> {
    /// Provider-assigned id.
    pub id: &'a str,
    /// 40-char lower-hex info hash.
    pub hash: &'a str,
    /// Display filename.
    pub filename: &'a str,
    /// Wire status label.
    pub status: &'a str,
    /// Size in bytes.
    pub size: u64,
}

/// Snapshot of cache and denylist usage, exposed via `/stats` (§10.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationStats {
    /// Current number of cached verdicts.
    pub cache_size: usize,
    /// Total cache hits since construction.
    pub cache_hits: u64,
    /// Total cache misses since construction.
    pub cache_misses: u64,
    /// Current denylist size.
    pub denylist_size: usize,
}

struct CacheState {
    entries: std::collections::HashMap<String, Verdict>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: std::collections::HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &str) -> Option<Verdict> {
        if let Some(verdict) = self.entries.get(key) {
            self.hits += 1;
            Some(verdict.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    fn insert(&mut self, key: String, verdict: Verdict) {
        if self.entries.contains_key(&key) {
            return;
        }
        self.entries.insert(key.clone(), verdict);
        self.order.push_back(key);
        while self.order.len() > MAX_CACHE_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// Hash / magnet / metadata validator with an LRU verdict cache and
/// in-memory denylist.
pub struct Validator {
    cache: Mutex<CacheState>,
    denylist: Mutex<HashSet<String>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Build a validator with an empty cache and denylist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(CacheState::new()),
            denylist: Mutex::new(HashSet::new()),
        }
    }

    /// Add a hash to the denylist. Lower-cased before insertion.
    pub async fn denylist_add(&self, hash: impl Into<String>) {
        self.denylist.lock().await.insert(hash.into().to_ascii_lowercase());
    }

    /// Whether `hash` (already lower-case) is denylisted.
    async fn is_denylisted(&self, hash: &str) -> bool {
        self.denylist.lock().await.contains(hash)
    }

    /// Validate a 40-hex info hash (§4.3). Cached keyed by a stable digest
    /// of the raw input.
    pub async fn validate_hash(&self, raw: &str) -> Verdict {
        let key = cache_key("hash", raw);
        if let Some(cached) = self.cache.lock().await.get(&key) {
            return cached;
        }

        let verdict = self.validate_hash_uncached(raw).await;
        self.cache.lock().await.insert(key, verdict.clone());
        verdict
    }

    async fn validate_hash_uncached(&self, raw: &str) -> Verdict {
        let lowered = raw.to_ascii_lowercase();
        if lowered.len() != 40 || !lowered.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Verdict::fail("hash must be exactly 40 hexadecimal characters");
        }
        if lowered.bytes().all(|b| b == b'0') {
            return Verdict::fail("hash must not be all zeros");
        }
        let distinct: HashSet<u8> = lowered.bytes().collect();
        if distinct.len() < MIN_DISTINCT_HASH_CHARS {
            return Verdict::fail("hash has too few distinct characters");
        }
        if self.is_denylisted(&lowered).await {
            return Verdict::fail("hash is denylisted");
        }
        Verdict::pass()
    }

    /// Parse and validate a `magnet:` URI (§4.3).
    pub async fn parse_magnet(&self, raw: &str) -> ParsedMagnet {
        let Some(rest) = raw.strip_prefix("magnet:?") else {
            return ParsedMagnet {
                ok: false,
                hash: None,
                reason: Some("not a magnet: URI".to_string()),
            };
        };

        let mut xt = None;
        let mut dn = None;
        for pair in rest.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let decoded = percent_encoding::percent_decode_str(value)
                .decode_utf8_lossy()
                .into_owned();
            match key {
                "xt" => xt = Some(decoded),
                "dn" => dn = Some(decoded),
                _ => {}
            }
        }

        let Some(xt) = xt else {
            return ParsedMagnet {
                ok: false,
                hash: None,
                reason: Some("missing xt parameter".to_string()),
            };
        };

        let Some(hash_candidate) = xt.strip_prefix("urn:btih:") else {
            return ParsedMagnet {
                ok: false,
                hash: None,
                reason: Some("xt parameter is not a urn:btih value".to_string()),
            };
        };

        if let Some(dn) = &dn {
            if dn.chars().count() > MAX_DISPLAY_NAME_LEN {
                return ParsedMagnet {
                    ok: false,
                    hash: None,
                    reason: Some("display name exceeds 200 characters".to_string()),
                };
            }
        }

        let verdict = self.validate_hash(hash_candidate).await;
        if !verdict.ok {
            return ParsedMagnet {
                ok: false,
                hash: None,
                reason: verdict.reason,
            };
        }

        ParsedMagnet {
            ok: true,
            hash: Some(hash_candidate.to_ascii_lowercase()),
            reason: None,
        }
    }

    /// Build a `magnet:` URI from a hash and optional display name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidatorError::InvalidHash`] if `hash` fails
    /// [`Self::validate_hash`].
    pub async fn build_magnet(&self, hash: &str, display_name: Option<&str>) -> Result<String, ValidatorError> {
        let verdict = self.validate_hash(hash).await;
        if !verdict.ok {
            return Err(ValidatorError::InvalidHash {
                reason: verdict.reason.unwrap_or_else(|| "invalid hash".to_string()),
            });
        }
        let lowered = hash.to_ascii_lowercase();
        let mut magnet = format!("magnet:?xt=urn:btih:{lowered}");
        if let Some(name) = display_name {
            let encoded = utf8_percent_encode(name, FRAGMENT);
            magnet.push_str("&dn=");
            for chunk in encoded {
                magnet.push_str(chunk);
            }
        }
        Ok(magnet)
    }

    /// Validate a torrent record's required fields (§4.3).
    pub async fn validate_torrent(&self, meta: &TorrentMeta<'_>) -> Verdict {
        if meta.id.is_empty() {
            return Verdict::fail("id must not be empty");
        }
        if meta.filename.is_empty() {
            return Verdict::fail("filename must not be empty");
        }
        if meta.status.is_empty() {
            return Verdict::fail("status must not be empty");
        }
        let hash_verdict = self.validate_hash(meta.hash).await;
        if !hash_verdict.ok {
            return hash_verdict;
        }
        if meta.filename.chars().count() > MAX_FILENAME_LEN {
            return Verdict::fail("filename exceeds 255 characters");
        }
        if meta.filename.chars().any(|c| matches!(c, '<' | '>' | '|' | '\0' | '\n' | '\r')) {
            return Verdict::fail("filename contains a forbidden control character");
        }
        Verdict::pass()
    }

    /// Current cache and denylist usage (§10.5).
    pub async fn stats(&self) -> ValidationStats {
        let cache = self.cache.lock().await;
        let denylist = self.denylist.lock().await;
        ValidationStats {
            cache_size: cache.entries.len(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            denylist_size: denylist.len(),
        }
    }
}

fn cache_key(namespace: &str, raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forty_hex_chars_pass() {
        let validator = Validator::new();
        let verdict = validator.validate_hash(&"a1b2c3".repeat(6)[..40]).await;
        assert!(verdict.ok, "{verdict:?}");
    }

    #[tokio::test]
    async fn thirty_nine_or_forty_one_chars_fail() {
        let validator = Validator::new();
        assert!(!validator.validate_hash(&"a".repeat(39)).await.ok);
        assert!(!validator.validate_hash(&"a".repeat(41)).await.ok);
    }

    #[tokio::test]
    async fn non_hex_fails() {
        let validator = Validator::new();
        assert!(!validator.validate_hash(&format!("{}z", "a".repeat(39))).await.ok);
    }

    #[tokio::test]
    async fn all_zero_hash_rejected() {
        let validator = Validator::new();
        assert!(!validator.validate_hash(&"0".repeat(40)).await.ok);
    }

    #[tokio::test]
    async fn low_distinct_character_count_rejected() {
        let validator = Validator::new();
        assert!(!validator.validate_hash(&"aabbaabbaabbaabbaabbaabbaabbaabbaabbaabb"[..40]).await.ok);
    }

    #[tokio::test]
    async fn denylisted_hash_rejected() {
        let validator = Validator::new();
        let hash = "a1b2c3d4e5".repeat(4);
        validator.denylist_add(&hash).await;
        assert!(!validator.validate_hash(&hash).await.ok);
    }

    #[tokio::test]
    async fn build_then_parse_round_trips_hash() {
        let validator = Validator::new();
        let hash = "a1b2c3d4e5".repeat(4);
        let magnet = validator.build_magnet(&hash, Some("My Movie (2020)")).await.unwrap();
        let parsed = validator.parse_magnet(&magnet).await;
        assert!(parsed.ok);
        assert_eq!(parsed.hash.as_deref(), Some(hash.to_ascii_lowercase().as_str()));
    }

    #[tokio::test]
    async fn parse_magnet_rejects_non_magnet_scheme() {
        let validator = Validator::new();
        let parsed = validator.parse_magnet("http://example.com").await;
        assert!(!parsed.ok);
    }

    #[tokio::test]
    async fn verdict_is_stable_across_repeated_calls() {
        let validator = Validator::new();
        let hash = "a1b2c3d4e5".repeat(4);
        let first = validator.validate_hash(&hash).await;
        let second = validator.validate_hash(&hash).await;
        assert_eq!(first, second);
        let stats = validator.stats().await;
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 1);
    }

    #[tokio::test]
    async fn validate_torrent_rejects_control_characters_in_filename() {
        let validator = Validator::new();
        let hash = "a1b2c3d4e5".repeat(4);
        let meta = TorrentMeta {
            id: "T1",
            hash: &hash,
            filename: "bad\nname.mkv",
            status: "downloaded",
            size: 10,
        };
        assert!(!validator.validate_torrent(&meta).await.ok);
    }

    #[tokio::test]
    async fn cache_evicts_fifo_beyond_capacity() {
        let validator = Validator::new();
        for i in 0..(MAX_CACHE_ENTRIES + 10) {
            let hash = format!("{i:040x}");
            validator.validate_hash(&hash).await;
        }
        let stats = validator.stats().await;
        assert_eq!(stats.cache_size, MAX_CACHE_ENTRIES);
    }
}
