//! Neural voice table
//!
//! Static mapping from target language to the neural voice requested from
//! the TTS service. Languages without a voice are dropped from the fan-out
//! rather than synthesized with a wrong-language voice.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use babelcast_core::LanguageTag;

static VOICES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("en", "en-US-Neural-C"),
        ("es", "es-ES-Neural-A"),
        ("fr", "fr-FR-Neural-B"),
        ("de", "de-DE-Neural-D"),
        ("it", "it-IT-Neural-A"),
        ("pt", "pt-BR-Neural-C"),
        ("nl", "nl-NL-Neural-A"),
        ("pl", "pl-PL-Neural-B"),
        ("ru", "ru-RU-Neural-A"),
        ("ja", "ja-JP-Neural-C"),
        ("ko", "ko-KR-Neural-B"),
        ("zh", "zh-CN-Neural-A"),
        ("hi", "hi-IN-Neural-B"),
        ("ar", "ar-XA-Neural-A"),
        ("tr", "tr-TR-Neural-C"),
        ("sv", "sv-SE-Neural-A"),
    ])
});

/// The neural voice for a target language, if supported.
pub fn voice_for(language: &LanguageTag) -> Option<&'static str> {
    VOICES.get(language.as_str()).copied()
}

/// Languages listeners may subscribe to.
pub fn supported_languages() -> Vec<LanguageTag> {
    let mut tags: Vec<LanguageTag> = VOICES
        .keys()
        .map(|k| LanguageTag::parse(k).expect("static table holds valid tags"))
        .collect();
    tags.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_languages_resolve() {
        let es = LanguageTag::parse("es").unwrap();
        assert_eq!(voice_for(&es), Some("es-ES-Neural-A"));
    }

    #[test]
    fn unknown_language_is_none() {
        let xx = LanguageTag::parse("xx").unwrap();
        assert_eq!(voice_for(&xx), None);
    }

    #[test]
    fn supported_set_is_nonempty_and_sorted() {
        let langs = supported_languages();
        assert!(langs.len() >= 10);
        let mut sorted = langs.clone();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(langs, sorted);
    }
}
