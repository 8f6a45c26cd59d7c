//! Text normalization and hashing
//!
//! Normalization makes semantically-identical transcriptions compare
//! equal: trim, lowercase, strip sentence punctuation, collapse runs of
//! whitespace. The 16-hex-char SHA-256 prefix of the normalized form keys
//! both the dedup cache and the translation cache.

use sha2::{Digest, Sha256};

use babelcast_config::constants::dedup::HASH_PREFIX_LEN;
use babelcast_core::LanguageTag;

const STRIPPED: &[char] = &['.', ',', '!', '?', ';', ':', '\'', '"'];

/// Normalize text for dedup and cache-key purposes. Idempotent.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.trim().chars() {
        if STRIPPED.contains(&ch) {
            continue;
        }
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }
    out
}

/// 16-hex-char SHA-256 prefix of the given (already normalized) text.
pub fn hash16(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    let mut out = String::with_capacity(HASH_PREFIX_LEN);
    for byte in digest.iter().take(HASH_PREFIX_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Composite translation-cache key: `{src}:{tgt}:{hash16(normalized)}`.
pub fn cache_key(source: &LanguageTag, target: &LanguageTag, text: &str) -> String {
    format!("{}:{}:{}", source, target, hash16(&normalize(text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_rules() {
        assert_eq!(normalize("  Hello,   World!  "), "hello world");
        assert_eq!(normalize("Thank you."), "thank you");
        assert_eq!(normalize("Thank you!"), "thank you");
        assert_eq!(normalize("it's \"quoted\"; done:"), "its quoted done");
    }

    #[test]
    fn normalization_is_idempotent() {
        let cases = ["  Hello,   World!  ", "Thank you.", "a  b\tc\nd"];
        for case in cases {
            let once = normalize(case);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn hash16_is_stable_across_equivalent_text() {
        let a = hash16(&normalize("Thank you."));
        let b = hash16(&normalize("  thank   YOU!  "));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn cache_key_shape() {
        let en = LanguageTag::parse("en").unwrap();
        let es = LanguageTag::parse("es").unwrap();
        let key = cache_key(&en, &es, "Hello everyone");
        assert!(key.starts_with("en:es:"));
        assert_eq!(key.len(), "en:es:".len() + 16);
    }
}
