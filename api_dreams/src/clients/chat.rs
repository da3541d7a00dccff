use classifier::{AiErrorClassification, ClassifiedError, ErrorType, classify_http};
use common::{env_config::OpenAiConfig, error::AppError};
use serde::Deserialize;
use serde_json::json;

use super::PROVIDER_DEFAULT_STATUS;

pub const SOURCE: &str = "OpenAI";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

/// Chat completion client; one system prompt plus one user message per call.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatClient {
    pub fn new(http: reqwest::Client, config: &OpenAiConfig) -> Self {
        ChatClient {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.chat_model.clone(),
        }
    }

    /// Assistant text of the first choice.
    ///
    /// A structured `refusal` from the provider comes back as a
    /// `CONTENT_MODERATION` error; hidden refusals inside `content` are left
    /// to the caller.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        json_output: bool,
    ) -> Result<String, ClassifiedError> {
        let mut body = json!({
            "model": self.model,
            "temperature": 0.7,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
        });
        if json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifiedError::from(AppError::from(e)))?;

        let status = response.status().as_u16();
        let raw = response
            .text()
            .await
            .map_err(|e| ClassifiedError::from(AppError::from(e)))?;

        if !(200..300).contains(&status) {
            log::error!("{} chat completion failed with {}: {}", SOURCE, status, raw);
            return Err(classify_http(status, &raw, SOURCE).into_error(PROVIDER_DEFAULT_STATUS));
        }

        let parsed: ChatResponse = serde_json::from_str(&raw).map_err(|e| {
            AiErrorClassification::new(ErrorType::ParsingError, SOURCE, Some(e.to_string()))
                .into_error(500)
        })?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| {
                AiErrorClassification::new(
                    ErrorType::ParsingError,
                    SOURCE,
                    Some("response contained no choices".to_string()),
                )
                .into_error(500)
            })?;

        if let Some(refusal) = message.refusal.filter(|r| !r.trim().is_empty()) {
            log::warn!("{} refused the completion: {}", SOURCE, refusal);
            return Err(
                AiErrorClassification::new(ErrorType::ContentModeration, SOURCE, Some(refusal))
                    .into_error(PROVIDER_DEFAULT_STATUS),
            );
        }

        match message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(AiErrorClassification::new(
                ErrorType::ParsingError,
                SOURCE,
                Some("response contained no text".to_string()),
            )
            .into_error(500)),
        }
    }
}
