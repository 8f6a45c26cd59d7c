//! SSML prosody composition
//!
//! Shapes translated text with the speaker's current emotion sample:
//! nested prosody wrappers carry rate and volume, strong emphasis marks
//! high-intensity agitated tones, and a leading break softens subdued
//! tones. Text is XML-escaped before wrapping.

use babelcast_core::{EmotionSample, EmotionTone, RateClass, VolumeClass};

/// Escape the five XML special characters.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// SSML prosody rate attribute from the speaking-rate class.
fn prosody_rate(class: RateClass) -> &'static str {
    match class {
        RateClass::VerySlow | RateClass::Slow => "slow",
        RateClass::Medium => "medium",
        RateClass::Fast => "fast",
        RateClass::VeryFast => "x-fast",
    }
}

/// SSML prosody volume attribute from the volume class.
fn prosody_volume(class: VolumeClass) -> &'static str {
    match class {
        VolumeClass::Whisper => "x-soft",
        VolumeClass::Soft => "soft",
        VolumeClass::Medium => "medium",
        VolumeClass::Loud | VolumeClass::VeryLoud => "loud",
    }
}

/// Compose the SSML document for one translated segment.
///
/// Without an emotion sample the text is wrapped with medium prosody.
pub fn build_ssml(text: &str, emotion: Option<&EmotionSample>) -> String {
    let escaped = escape_xml(text);

    let (rate, volume) = match emotion {
        Some(sample) => (
            prosody_rate(sample.rate_class),
            prosody_volume(sample.volume_class),
        ),
        None => ("medium", "medium"),
    };

    let mut body = escaped;
    if let Some(sample) = emotion {
        let agitated = matches!(
            sample.tone,
            EmotionTone::Angry | EmotionTone::Excited | EmotionTone::Surprised
        );
        if agitated && sample.intensity > 0.7 {
            body = format!("<emphasis level=\"strong\">{body}</emphasis>");
        }
        if matches!(sample.tone, EmotionTone::Sad | EmotionTone::Fearful) {
            body = format!("<break time=\"300ms\"/>{body}");
        }
    }

    format!(
        "<speak><prosody rate=\"{rate}\"><prosody volume=\"{volume}\">{body}</prosody></prosody></speak>"
    )
}
