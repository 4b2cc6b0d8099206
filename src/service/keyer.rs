//! Cache fingerprints for analysis requests.
//!
//! The key covers only what changes the analysis content: the URL set, the
//! keyword set and the mode. Requester identity and plan are left out so
//! identical analyses are shared across users.

use sha2::{Digest, Sha256};

use crate::domain::models::{AnalysisRequest, CacheKey};

const KEY_PREFIX: &str = "analysis:v1:";

/// Derive the cache key for a request.
pub fn derive_key(request: &AnalysisRequest) -> CacheKey {
    let mut urls: Vec<&str> = request.urls.iter().map(String::as_str).collect();
    let mut keywords: Vec<&str> = request.keywords.iter().map(String::as_str).collect();
    urls.sort_unstable();
    keywords.sort_unstable();
    // keywords are a set
    keywords.dedup();

    let mut hasher = Sha256::new();
    hasher.update(request.mode.as_str().as_bytes());
    hash_section(&mut hasher, b'u', &urls);
    hash_section(&mut hasher, b'k', &keywords);

    CacheKey(format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize())))
}

// Length-prefixing every part keeps ["ab"] and ["a", "b"] apart.
fn hash_section(hasher: &mut Sha256, tag: u8, parts: &[&str]) {
    hasher.update([tag]);
    hasher.update((parts.len() as u64).to_le_bytes());
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
}
