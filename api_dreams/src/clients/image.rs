use base64::{Engine, engine::general_purpose::STANDARD};
use classifier::{
    AiErrorClassification, ClassifiedError, ErrorType, ProviderErrorBody, classify_http,
    detect_refusal,
};
use common::{env_config::ImageProviderConfig, error::AppError};
use serde::Deserialize;
use serde_json::json;

use super::PROVIDER_DEFAULT_STATUS;

pub const SOURCE: &str = "Gemini";

/// Finish reasons that mean the image was withheld by a safety filter.
const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "IMAGE_SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// What the image provider produced for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    Image { mime_type: String, bytes: Vec<u8> },
    /// The provider declined on content grounds, either with a policy error or
    /// with a textual refusal in place of the image.
    Blocked { message: String },
}

#[derive(Clone)]
pub struct ImageClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ImageClient {
    pub fn new(http: reqwest::Client, config: &ImageProviderConfig) -> Self {
        ImageClient {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<ImageOutcome, ClassifiedError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });

        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
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
            let error = ProviderErrorBody::parse(&raw);
            if error.is_content_policy_rejection() {
                log::warn!("{} rejected the prompt: {}", SOURCE, error.message);
                return Ok(ImageOutcome::Blocked {
                    message: error.message,
                });
            }
            log::error!("{} image generation failed with {}: {}", SOURCE, status, raw);
            return Err(classify_http(status, &raw, SOURCE).into_error(PROVIDER_DEFAULT_STATUS));
        }

        let parsed: GenerateResponse = serde_json::from_str(&raw).map_err(|e| {
            AiErrorClassification::new(ErrorType::ParsingError, SOURCE, Some(e.to_string()))
                .into_error(500)
        })?;
        outcome(parsed)
    }
}

fn blocked_message(reason: &str) -> String {
    format!(
        "The image could not be generated because it was flagged by the safety filter ({}).",
        reason
    )
}

fn outcome(response: GenerateResponse) -> Result<ImageOutcome, ClassifiedError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Ok(ImageOutcome::Blocked {
            message: blocked_message(&reason),
        });
    }

    let mut texts = Vec::new();
    for candidate in response.candidates {
        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|r| SAFETY_FINISH_REASONS.contains(r))
        {
            return Ok(ImageOutcome::Blocked {
                message: blocked_message(reason),
            });
        }

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(inline) = part.inline_data {
                let bytes = STANDARD.decode(inline.data.trim()).map_err(|e| {
                    AiErrorClassification::new(
                        ErrorType::ParsingError,
                        SOURCE,
                        Some(format!("invalid base64 image data: {}", e)),
                    )
                    .into_error(500)
                })?;
                return Ok(ImageOutcome::Image {
                    mime_type: inline.mime_type,
                    bytes,
                });
            }
            if let Some(text) = part.text {
                texts.push(text);
            }
        }
    }

    // only text came back, which is how the provider phrases a soft refusal
    let text = texts.join("\n");
    if detect_refusal(&text, SOURCE).is_some() {
        return Ok(ImageOutcome::Blocked {
            message: text.trim().to_string(),
        });
    }

    let details = (!text.trim().is_empty()).then(|| text.trim().chars().take(300).collect());
    Err(AiErrorClassification::new(ErrorType::Unknown, SOURCE, details).into_error(500))
}
