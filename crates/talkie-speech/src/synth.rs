//! Remote synthesis client.
//!
//! One HTTP call per speech unit, no retries: narration is best-effort
//! relative to the text conversation, which continues regardless. Every
//! call runs under a shared cancellation token so a reset can terminate
//! it mid-flight; [`abort`](SynthesisClient::abort) re-arms a fresh
//! token for the next generation, mirroring how the queues re-arm.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use talkie_core::ports::{CredentialCheck, CredentialStore};
use talkie_core::settings::VoiceSettings;
use talkie_core::types::EncodedAudio;

use crate::error::SpeechError;

/// Client for the remote text-to-speech API.
pub struct SynthesisClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    settings: VoiceSettings,
    /// Cancelled by [`abort`](Self::abort), then replaced, so stale
    /// cancellations never bleed into the next turn's calls.
    cancel: Mutex<CancellationToken>,
}

impl SynthesisClient {
    #[must_use]
    pub fn new(settings: VoiceSettings, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            settings,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Synthesize one unit of text into transport-encoded audio.
    ///
    /// Fails fast with [`SpeechError::CredentialMissing`] before any
    /// network traffic if no key is configured.
    pub async fn synthesize(&self, text: &str) -> Result<EncodedAudio, SpeechError> {
        let Some(key) = self.credentials.get().await else {
            return Err(SpeechError::CredentialMissing);
        };

        let token = self.cancel.lock().unwrap().clone();
        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.settings.api_base, self.settings.voice_id
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.settings.model_id,
            "voice_settings": self.settings.parameters,
        });

        tracing::debug!(text_len = text.len(), "Requesting speech synthesis");

        let request = self
            .http
            .post(&url)
            .header("xi-api-key", key.expose())
            .json(&body)
            .send();

        let response = tokio::select! {
            () = token.cancelled() => return Err(SpeechError::Aborted),
            response = request => {
                response.map_err(|e| SpeechError::RequestFailed(e.to_string()))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::RequestFailed(format!(
                "synthesis API returned HTTP {status}"
            )));
        }

        let audio = tokio::select! {
            () = token.cancelled() => return Err(SpeechError::Aborted),
            bytes = response.bytes() => {
                bytes.map_err(|e| SpeechError::RequestFailed(e.to_string()))?
            }
        };

        tracing::debug!(audio_bytes = audio.len(), "Synthesis complete");
        Ok(EncodedAudio::from_bytes(&audio))
    }

    /// Cancel any in-flight call and re-arm for the next one.
    pub fn abort(&self) {
        let mut guard = self.cancel.lock().unwrap();
        guard.cancel();
        *guard = CancellationToken::new();
    }

    /// Probe the API with a candidate key.
    ///
    /// Distinguishes a rejected key from an unreachable service, since
    /// only the former should make the key-entry UI complain.
    pub async fn validate_credential(&self, key: &str) -> CredentialCheck {
        let url = format!("{}/v1/voices", self.settings.api_base);

        match self.http.get(&url).header("xi-api-key", key).send().await {
            Ok(response) if response.status().is_success() => CredentialCheck::valid(),
            Ok(_) => CredentialCheck::invalid("Invalid API key"),
            Err(_) => CredentialCheck::invalid("Network error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use talkie_core::ports::ApiKey;

    struct NoKey;

    #[async_trait]
    impl CredentialStore for NoKey {
        async fn get(&self) -> Option<ApiKey> {
            None
        }
    }

    #[test]
    fn missing_credential_fails_before_any_network_call() {
        // The api_base is unroutable on purpose: reaching the network
        // would hang, proving the short-circuit works.
        let settings = VoiceSettings {
            api_base: "http://192.0.2.1:1".to_string(),
            ..VoiceSettings::default()
        };
        let client = SynthesisClient::new(settings, Arc::new(NoKey));

        let result = tokio_test::block_on(client.synthesize("hello"));
        assert!(matches!(result, Err(SpeechError::CredentialMissing)));
    }

    #[test]
    fn abort_re_arms_the_cancellation_token() {
        let client = SynthesisClient::new(VoiceSettings::default(), Arc::new(NoKey));

        let before = client.cancel.lock().unwrap().clone();
        client.abort();

        assert!(before.is_cancelled());
        assert!(!client.cancel.lock().unwrap().is_cancelled());
    }
}
