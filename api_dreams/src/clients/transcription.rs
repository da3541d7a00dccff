use classifier::{AiErrorClassification, ClassifiedError, ErrorType, classify_http};
use common::{env_config::OpenAiConfig, error::AppError};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::PROVIDER_DEFAULT_STATUS;

pub const SOURCE: &str = "OpenAI Whisper";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Speech-to-text client for recorded dream narrations.
#[derive(Clone)]
pub struct TranscriptionClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl TranscriptionClient {
    pub fn new(http: reqwest::Client, config: &OpenAiConfig) -> Self {
        TranscriptionClient {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.transcription_model.clone(),
        }
    }

    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: String,
        mime_type: &str,
    ) -> Result<String, ClassifiedError> {
        let file = Part::bytes(audio)
            .file_name(file_name)
            .mime_str(mime_type)
            .map_err(|e| {
                AiErrorClassification::invalid_request(format!("Invalid audio mime type: {}", e))
                    .into_error(400)
            })?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone());

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassifiedError::from(AppError::from(e)))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| ClassifiedError::from(AppError::from(e)))?;

        if !(200..300).contains(&status) {
            log::error!("{} transcription failed with {}: {}", SOURCE, status, raw);
            return Err(classify_http(status, &raw, SOURCE).into_error(PROVIDER_DEFAULT_STATUS));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&raw).map_err(|e| {
            AiErrorClassification::new(ErrorType::ParsingError, SOURCE, Some(e.to_string()))
                .into_error(500)
        })?;
        log::info!("Transcribed {} characters", parsed.text.len());
        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;

    fn client(base_url: String) -> TranscriptionClient {
        TranscriptionClient::new(
            reqwest::Client::new(),
            &OpenAiConfig {
                api_key: "sk-test".to_string(),
                base_url,
                chat_model: "gpt-4o-mini".to_string(),
                transcription_model: "whisper-1".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn sends_multipart_and_returns_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(Matcher::Regex(r#"filename="dream\.m4a""#.to_string()))
            .with_status(200)
            .with_body(r#"{"text":"I was flying over a city."}"#)
            .create_async()
            .await;

        let text = client(server.url())
            .transcribe(b"audio".to_vec(), "dream.m4a".to_string(), "audio/m4a")
            .await
            .unwrap();
        assert_eq!(text, "I was flying over a city.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invalid_key_is_authorization() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Incorrect API key provided: sk-abc123def456ghi789.","type":"invalid_request_error"}}"#)
            .create_async()
            .await;

        let err = client(server.url())
            .transcribe(b"audio".to_vec(), "dream.webm".to_string(), "audio/webm")
            .await
            .unwrap_err();
        assert_eq!(err.classification.error_type, ErrorType::Authorization);
        assert!(
            !err.classification
                .details
                .unwrap_or_default()
                .contains("sk-abc123def456ghi789")
        );
    }
}
