//! Speech synthesis: send one chunk of text, get audio bytes back.
//!
//! The pipeline only depends on the [`SpeechSynthesizer`] trait. The shipped
//! implementation, [`OpenAiSpeech`], talks to any OpenAI-compatible
//! `/audio/speech` endpoint; tests inject their own implementation or point
//! the client at a mock server via `api_base_url`.
//!
//! HTTP status codes are mapped onto [`BookworksError`] variants here so the
//! retry loop in [`crate::narrate`] can tell transient failures (429, 5xx,
//! timeouts) from permanent ones (401/403, other 4xx).

use crate::config::NarrationConfig;
use crate::error::BookworksError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Environment variable the CLI reads the API key from.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default API root for [`OpenAiSpeech`].
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Converts text into encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Short provider name used in logs and error messages.
    fn name(&self) -> &str;

    /// Synthesise `text`. `chunk` is the 0-based chunk index, for errors only.
    async fn synthesize(&self, chunk: usize, text: &str) -> Result<Vec<u8>, BookworksError>;
}

/// Client for the OpenAI speech endpoint.
#[derive(Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    response_format: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl OpenAiSpeech {
    /// Build a client from the narration config.
    ///
    /// Fails with [`BookworksError::MissingCredential`] when no key is set, so
    /// callers learn about it before any request leaves the machine.
    pub fn from_config(config: &NarrationConfig) -> Result<Self, BookworksError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| BookworksError::MissingCredential {
                variable: API_KEY_ENV.to_string(),
            })?
            .to_string();

        let timeout = Duration::from_secs(config.api_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BookworksError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            voice: config.voice.clone(),
            response_format: config.response_format.clone(),
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, chunk: usize, text: &str) -> Result<Vec<u8>, BookworksError> {
        let start = Instant::now();
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: &self.response_format,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BookworksError::ApiTimeout {
                        chunk,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                } else {
                    BookworksError::SpeechApiError {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error(self.name(), status, retry_after_secs, detail));
        }

        let audio = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BookworksError::ApiTimeout {
                    chunk,
                    elapsed_ms: self.timeout.as_millis() as u64,
                }
            } else {
                BookworksError::SpeechApiError {
                    status: status.as_u16(),
                    message: format!("failed to read audio body: {e}"),
                }
            }
        })?;

        debug!(
            "Chunk {}: {} chars → {} audio bytes in {:?}",
            chunk,
            text.chars().count(),
            audio.len(),
            start.elapsed()
        );
        Ok(audio.to_vec())
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn status_error(
    provider: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    detail: String,
) -> BookworksError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BookworksError::AuthError {
            provider: provider.to_string(),
            detail: api_message(&detail),
        },
        StatusCode::TOO_MANY_REQUESTS => BookworksError::RateLimitExceeded {
            provider: provider.to_string(),
            retry_after_secs,
        },
        other => BookworksError::SpeechApiError {
            status: other.as_u16(),
            message: api_message(&detail),
        },
    }
}

/// Pull `error.message` out of an OpenAI-style JSON error body, falling back
/// to the raw body.
fn api_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str, key: Option<&str>) -> NarrationConfig {
        let mut c = NarrationConfig::default();
        c.api_base_url = base.to_string();
        c.api_key = key.map(str::to_string);
        c
    }

    #[test]
    fn missing_key_fails_fast() {
        let err = OpenAiSpeech::from_config(&config(DEFAULT_API_BASE_URL, None))
            .err()
            .expect("no key");
        assert!(matches!(err, BookworksError::MissingCredential { .. }));

        let err = OpenAiSpeech::from_config(&config(DEFAULT_API_BASE_URL, Some("  ")))
            .err()
            .expect("blank key");
        assert!(matches!(err, BookworksError::MissingCredential { .. }));
    }

    #[test]
    fn api_message_extracts_json_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(api_message(body), "Incorrect API key provided");
        assert_eq!(api_message(" plain text "), "plain text");
    }

    #[tokio::test]
    async fn sends_request_and_returns_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "tts-1",
                "voice": "shimmer",
                "input": "Hello there.",
                "response_format": "mp3"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3fake".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let speech = OpenAiSpeech::from_config(&config(&server.uri(), Some("sk-test"))).unwrap();
        let audio = speech.synthesize(0, "Hello there.").await.unwrap();
        assert_eq!(audio, b"ID3fake");
    }

    #[tokio::test]
    async fn maps_auth_and_rate_limit_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .respond_with(ResponseTemplate::new(401).set_body_string(
                r#"{"error":{"message":"Incorrect API key provided"}}"#,
            ))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let speech = OpenAiSpeech::from_config(&config(&server.uri(), Some("sk-bad"))).unwrap();
        match speech.synthesize(0, "x").await.unwrap_err() {
            BookworksError::AuthError { detail, .. } => {
                assert_eq!(detail, "Incorrect API key provided")
            }
            other => panic!("expected auth error, got {other:?}"),
        }
        match speech.synthesize(1, "x").await.unwrap_err() {
            BookworksError::RateLimitExceeded {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, Some(7)),
            other => panic!("expected rate limit, got {other:?}"),
        }
    }
}
