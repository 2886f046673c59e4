//! Outbound request identities (user-agent strings) rotated round-robin.
//!
//! The pool is built once per process or session and shared by reference
//! (`Arc<IdentityPool>`) between concurrent fetchers. The rotation cursor is
//! the only mutable state; it starts at a random offset so repeated runs do
//! not all open with the same identity.

use rand::Rng;
use std::sync::{Mutex, MutexGuard};

use crate::config::ConfigError;

/// Desktop browser user agents used when the config supplies none.
pub fn default_identities() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Browser-like request headers sent alongside the identity.
pub fn browser_headers(identity: &str) -> Vec<(String, String)> {
    [
        ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Referer", "https://www.google.com/"),
        ("DNT", "1"),
        ("Connection", "keep-alive"),
        ("Upgrade-Insecure-Requests", "1"),
        ("User-Agent", identity),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Thread-safe round-robin pool of identities.
#[derive(Debug)]
pub struct IdentityPool {
    identities: Vec<String>,
    cursor: Mutex<usize>,
}

impl IdentityPool {
    /// Build a pool with a random starting cursor. Fails on an empty list or
    /// a blank entry.
    pub fn new(identities: Vec<String>) -> Result<Self, ConfigError> {
        let offset = random_offset(identities.len());
        Self::with_offset(identities, offset)
    }

    /// Build a pool whose cursor starts at `offset % len`.
    pub fn with_offset(identities: Vec<String>, offset: usize) -> Result<Self, ConfigError> {
        if identities.is_empty() {
            return Err(ConfigError::EmptyIdentityPool);
        }
        if let Some(i) = identities.iter().position(|s| s.trim().is_empty()) {
            return Err(ConfigError::BlankIdentity(i));
        }
        let cursor = offset % identities.len();
        Ok(Self {
            identities,
            cursor: Mutex::new(cursor),
        })
    }

    /// Advance the cursor and return the identity it now points at.
    ///
    /// The read-increment-wrap sequence runs under one lock, so concurrent
    /// callers observe a strict round-robin order.
    pub fn next(&self) -> String {
        let mut cursor = self.lock();
        *cursor = (*cursor + 1) % self.identities.len();
        self.identities[*cursor].clone()
    }

    /// Identity at the cursor, without rotating.
    pub fn current(&self) -> String {
        let cursor = self.lock();
        self.identities[*cursor].clone()
    }

    /// Move the cursor to a fresh random offset.
    pub fn reset(&self) {
        let mut cursor = self.lock();
        *cursor = random_offset(self.identities.len());
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // A usize cursor is always valid, so a poisoned lock is safe to reuse.
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn random_offset(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..len)
}
