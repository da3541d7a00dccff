use classifier::{AiErrorClassification, ClassifiedError, DreamAnalysis};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields are optional so a missing one surfaces as `INVALID_REQUEST`
/// instead of a bare deserialization error.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeDreamRequest {
    pub dream_content: Option<String>,
    pub dream_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub dream_id: Option<Uuid>,
    pub description: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscribeRequest {
    pub audio_base64: Option<String>,
    pub file_extension: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeDreamResponse {
    pub analysis: DreamAnalysis,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub enhanced_description: String,
}

impl GenerateImageResponse {
    pub fn generated(image_url: String, enhanced_description: String) -> Self {
        GenerateImageResponse {
            success: true,
            status: None,
            image_url: Some(image_url),
            message: None,
            enhanced_description,
        }
    }

    pub fn blocked(message: String, enhanced_description: String) -> Self {
        GenerateImageResponse {
            success: false,
            status: Some("blocked_content".to_string()),
            image_url: None,
            message: Some(message),
            enhanced_description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub text: String,
}

/// Present and non-blank text field, or an `INVALID_REQUEST` naming it.
pub fn required_text(value: Option<String>, field: &str) -> Result<String, ClassifiedError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(field))
}

pub fn required<T>(value: Option<T>, field: &str) -> Result<T, ClassifiedError> {
    value.ok_or_else(|| missing(field))
}

fn missing(field: &str) -> ClassifiedError {
    AiErrorClassification::invalid_request(format!("Missing required field: {}", field))
        .into_error(400)
}
