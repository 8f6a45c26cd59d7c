//! Language tags
//!
//! Languages on the wire are two-letter ISO-639-1 codes. The tag type
//! normalizes to lowercase at construction so the rest of the system can
//! compare tags directly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorCode};

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z]{2}$").expect("valid regex"));

/// Validated ISO-639-1 language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Parse and normalize a tag, rejecting anything but two ASCII letters.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if !TAG_PATTERN.is_match(trimmed) {
            return Err(Error::Protocol {
                code: ErrorCode::UnsupportedLanguage,
                message: format!("invalid language tag: {raw:?}"),
            });
        }
        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LanguageTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
