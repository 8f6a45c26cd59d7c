//! Speaker identity verification
//!
//! The identity oracle is external; this adapter checks the speaker's
//! token against a configured shared secret. With auth disabled
//! (development) any non-empty token verifies.

use async_trait::async_trait;

use babelcast_config::AuthConfig;
use babelcast_core::{SpeakerAuth, SpeakerIdentity, UpstreamError};

pub struct StaticTokenAuth {
    enabled: bool,
    api_key: Option<String>,
}

impl StaticTokenAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl SpeakerAuth for StaticTokenAuth {
    async fn verify(&self, token: &str) -> Result<SpeakerIdentity, UpstreamError> {
        if token.is_empty() {
            return Err(UpstreamError::permanent("empty speaker token"));
        }
        if self.enabled {
            match &self.api_key {
                Some(key) if key == token => {}
                _ => return Err(UpstreamError::permanent("speaker token rejected")),
            }
        }
        Ok(SpeakerIdentity {
            subject: format!("speaker:{:.8}", token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_auth_accepts_any_nonempty_token() {
        let auth = StaticTokenAuth::new(&AuthConfig {
            enabled: false,
            api_key: None,
        });
        assert!(auth.verify("anything").await.is_ok());
        assert!(auth.verify("").await.is_err());
    }

    #[tokio::test]
    async fn enabled_auth_requires_matching_key() {
        let auth = StaticTokenAuth::new(&AuthConfig {
            enabled: true,
            api_key: Some("secret".into()),
        });
        assert!(auth.verify("secret").await.is_ok());
        assert!(auth.verify("wrong").await.is_err());
    }
}
