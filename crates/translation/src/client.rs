//! Remote MT / TTS clients
//!
//! The translation and synthesis engines are remote services reached over
//! HTTP with explicit per-call timeouts. Timeouts and 429/5xx responses
//! classify as transient (they consume a retry allowance upstream); other
//! client errors are permanent. No-op implementations back the tests.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use babelcast_config::{FanoutConfig, UpstreamConfig};
use babelcast_core::{LanguageTag, MachineTranslator, SpeechSynthesizer, UpstreamError};

/// Upstream provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamProvider {
    #[default]
    Http,
    /// Pass-through stand-ins for tests and local development
    Noop,
}

fn classify_reqwest(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() || err.is_connect() {
        return UpstreamError::transient(err.to_string());
    }
    if let Some(status) = err.status() {
        if status.as_u16() == 429 || status.is_server_error() {
            return UpstreamError::transient(format!("upstream status {status}"));
        }
        return UpstreamError::permanent(format!("upstream status {status}"));
    }
    UpstreamError::transient(err.to_string())
}

fn classify_status(status: reqwest::StatusCode) -> Option<UpstreamError> {
    if status.is_success() {
        return None;
    }
    if status.as_u16() == 429 || status.is_server_error() {
        Some(UpstreamError::transient(format!("upstream status {status}")))
    } else {
        Some(UpstreamError::permanent(format!("upstream status {status}")))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

/// HTTP machine-translation client.
pub struct HttpTranslator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTranslator {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl MachineTranslator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &LanguageTag,
        target: &LanguageTag,
    ) -> Result<String, UpstreamError> {
        let request = TranslateRequest {
            text,
            source_language: source.as_str(),
            target_language: target.as_str(),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::permanent(format!("malformed translate response: {e}")))?;
        Ok(body.translated_text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    ssml: &'a str,
    voice: &'a str,
    sample_rate_hz: u32,
    encoding: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    /// Base64 PCM16
    audio_content: String,
}

/// HTTP text-to-speech client demanding PCM16 at 16 kHz mono.
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSynthesizer {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn synthesize(&self, ssml: &str, voice: &str) -> Result<Vec<u8>, UpstreamError> {
        let request = SynthesizeRequest {
            ssml,
            voice,
            sample_rate_hz: babelcast_core::audio::SAMPLE_RATE_HZ,
            encoding: "pcm",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::permanent(format!("malformed synthesize response: {e}")))?;
        BASE64
            .decode(body.audio_content.as_bytes())
            .map_err(|e| UpstreamError::permanent(format!("invalid audio encoding: {e}")))
    }
}

/// Pass-through translator for tests: returns the input text unchanged.
#[derive(Default)]
pub struct NoopTranslator;

#[async_trait]
impl MachineTranslator for NoopTranslator {
    async fn translate(
        &self,
        text: &str,
        _source: &LanguageTag,
        _target: &LanguageTag,
    ) -> Result<String, UpstreamError> {
        Ok(text.to_string())
    }
}

/// Silence synthesizer for tests: 100 ms of PCM16 silence per request.
#[derive(Default)]
pub struct NoopSynthesizer;

#[async_trait]
impl SpeechSynthesizer for NoopSynthesizer {
    async fn synthesize(&self, _ssml: &str, _voice: &str) -> Result<Vec<u8>, UpstreamError> {
        Ok(vec![0u8; (babelcast_core::audio::SAMPLE_RATE_HZ as usize / 10) * 2])
    }
}

/// Create a translator based on config.
pub fn create_translator(
    provider: UpstreamProvider,
    upstream: &UpstreamConfig,
    fanout: &FanoutConfig,
) -> std::sync::Arc<dyn MachineTranslator> {
    match provider {
        UpstreamProvider::Http => {
            tracing::info!(endpoint = %upstream.translate_endpoint, "using HTTP translator");
            std::sync::Arc::new(HttpTranslator::new(
                upstream.translate_endpoint.clone(),
                Duration::from_secs(fanout.translate_timeout_secs),
            ))
        }
        UpstreamProvider::Noop => {
            tracing::info!("using pass-through translator");
            std::sync::Arc::new(NoopTranslator)
        }
    }
}

/// Create a synthesizer based on config.
pub fn create_synthesizer(
    provider: UpstreamProvider,
    upstream: &UpstreamConfig,
    fanout: &FanoutConfig,
) -> std::sync::Arc<dyn SpeechSynthesizer> {
    match provider {
        UpstreamProvider::Http => {
            tracing::info!(endpoint = %upstream.synthesize_endpoint, "using HTTP synthesizer");
            std::sync::Arc::new(HttpSynthesizer::new(
                upstream.synthesize_endpoint.clone(),
                Duration::from_secs(fanout.synthesize_timeout_secs),
            ))
        }
        UpstreamProvider::Noop => {
            tracing::info!("using silence synthesizer");
            std::sync::Arc::new(NoopSynthesizer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_translator_passes_text_through() {
        let translator = NoopTranslator;
        let en = LanguageTag::parse("en").unwrap();
        let es = LanguageTag::parse("es").unwrap();
        let out = translator.translate("hello", &en, &es).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn noop_synthesizer_emits_pcm_silence() {
        let synth = NoopSynthesizer;
        let audio = synth.synthesize("<speak>hi</speak>", "en-US-Neural-C").await.unwrap();
        // 100 ms at 16 kHz, 2 bytes per sample
        assert_eq!(audio.len(), 3200);
        assert!(audio.iter().all(|&b| b == 0));
    }
}
