use serde_json::Value;

use crate::{
    error_type::{AiErrorClassification, ErrorType},
    rules::{self, RULES},
};

/// Longest provider message carried into `details`.
const DETAILS_LIMIT: usize = 1000;

/// Error payload after unwrapping the provider's envelope.
///
/// Handles `{"error": {"code", "message", "status"}}` (Gemini/Imagen),
/// `{"error": {"message", "type", "code"}}` (OpenAI), `{"error": "..."}`
/// with an optional sibling `message` and `statusCode` (storage),
/// `{"message": "..."}` and a one-element array around any of them.
/// Anything else is kept as plain text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderErrorBody {
    pub code: Option<String>,
    pub message: String,
    pub status: Option<String>,
}

impl ProviderErrorBody {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            return ProviderErrorBody {
                message: trimmed.to_string(),
                ..Default::default()
            };
        };

        let value = match value {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };

        match value.get("error") {
            Some(Value::String(error)) => match value.get("message").and_then(Value::as_str) {
                Some(message) => ProviderErrorBody {
                    code: value.get("statusCode").and_then(scalar_to_string),
                    message: message.to_string(),
                    status: Some(error.clone()),
                },
                None => ProviderErrorBody {
                    message: error.clone(),
                    ..Default::default()
                },
            },
            Some(Value::Object(error)) => ProviderErrorBody {
                code: error.get("code").and_then(scalar_to_string),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                status: error
                    .get("status")
                    .or_else(|| error.get("type"))
                    .and_then(scalar_to_string),
            },
            _ => match value.get("message").and_then(Value::as_str) {
                Some(message) => ProviderErrorBody {
                    message: message.to_string(),
                    ..Default::default()
                },
                None => ProviderErrorBody {
                    message: trimmed.to_string(),
                    ..Default::default()
                },
            },
        }
    }

    /// Text the keyword rules run against: status, code and message.
    pub fn matching_text(&self) -> String {
        [self.status.as_deref(), self.code.as_deref(), Some(self.message.as_str())]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Image provider's policy rejection: `INVALID_ARGUMENT` whose message
    /// reads like a moderation block.
    pub fn is_content_policy_rejection(&self) -> bool {
        self.status.as_deref() == Some("INVALID_ARGUMENT")
            && rules::match_rules(RULES, &self.message) == Some(ErrorType::ContentModeration)
    }

    /// The message, or the whole matching text when there is none, cut to a readable length.
    pub fn details(&self) -> Option<String> {
        let message = if self.message.is_empty() {
            self.matching_text()
        } else {
            self.message.clone()
        };
        if message.is_empty() {
            return None;
        }
        Some(message.chars().take(DETAILS_LIMIT).collect())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classifies a raw error body (JSON or plain text) coming from `source`.
pub fn classify(raw: &str, source: &str) -> AiErrorClassification {
    let body = ProviderErrorBody::parse(raw);
    let error_type = rules::match_rules(RULES, &body.matching_text()).unwrap_or(ErrorType::Unknown);
    AiErrorClassification::new(error_type, source, body.details())
}

/// Like [`classify`], but falls back on the HTTP status when no keyword matched.
pub fn classify_http(status: u16, raw: &str, source: &str) -> AiErrorClassification {
    let classification = classify(raw, source);
    if classification.error_type != ErrorType::Unknown {
        return classification;
    }

    let error_type = match status {
        401 | 403 => ErrorType::Authorization,
        429 => ErrorType::RateLimit,
        500..=599 => ErrorType::ServiceUnavailable,
        _ => return classification,
    };
    AiErrorClassification::new(error_type, source, classification.details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn content_policy_text_is_moderation() {
        let classification = classify(
            "Your request was rejected as a result of our safety system: content policy violation",
            "OpenAI",
        );
        assert_eq!(classification.error_type, ErrorType::ContentModeration);
        assert_eq!(classification.status(400), 422);
    }

    #[test]
    fn rate_limit_text_is_rate_limit() {
        let classification = classify("rate limit exceeded", "Gemini");
        assert_eq!(classification.error_type, ErrorType::RateLimit);
        assert_eq!(classification.status(400), 429);
    }

    #[test]
    fn unknown_text_keeps_default_status() {
        let classification = classify("the spoon bent", "OpenAI");
        assert_eq!(classification.error_type, ErrorType::Unknown);
        assert_eq!(classification.status(400), 400);
        assert_eq!(classification.details.as_deref(), Some("the spoon bent"));
    }

    #[test]
    fn unwraps_nested_gemini_error() {
        let raw = r#"{"error":{"code":429,"message":"Resource has been exhausted (e.g. check quota).","status":"RESOURCE_EXHAUSTED"}}"#;
        let body = ProviderErrorBody::parse(raw);
        assert_eq!(
            body,
            ProviderErrorBody {
                code: Some("429".to_string()),
                message: "Resource has been exhausted (e.g. check quota).".to_string(),
                status: Some("RESOURCE_EXHAUSTED".to_string()),
            }
        );

        let classification = classify(raw, "Gemini");
        assert_eq!(classification.error_type, ErrorType::RateLimit);
        assert_eq!(
            classification.details.as_deref(),
            Some("Resource has been exhausted (e.g. check quota).")
        );
    }

    #[test]
    fn unwraps_array_wrapped_error() {
        let raw = r#"[{"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}]"#;
        assert_eq!(classify(raw, "Gemini").error_type, ErrorType::ServiceUnavailable);
    }

    #[test]
    fn unwraps_openai_error_and_redacts_key() {
        let raw = r#"{"error":{"message":"Incorrect API key provided: sk-proj-1234567890abcdef.","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let classification = classify(raw, "OpenAI");

        assert_eq!(classification.error_type, ErrorType::Authorization);
        assert_eq!(classification.status(400), 401);
        let details = classification.details.unwrap();
        assert!(!details.contains("1234567890abcdef"), "{details}");
    }

    #[test]
    fn string_error_field_is_used_as_message() {
        let body = ProviderErrorBody::parse(r#"{"error":"database connection lost"}"#);
        assert_eq!(body.message, "database connection lost");
        assert_eq!(
            classify(r#"{"error":"database connection lost"}"#, "Supabase").error_type,
            ErrorType::DatabaseError
        );
    }

    #[test]
    fn string_error_keeps_sibling_message() {
        let raw = r#"{"statusCode":"403","error":"Unauthorized","message":"new row violates row-level security policy"}"#;
        assert_eq!(
            ProviderErrorBody::parse(raw),
            ProviderErrorBody {
                code: Some("403".to_string()),
                message: "new row violates row-level security policy".to_string(),
                status: Some("Unauthorized".to_string()),
            }
        );
        assert_eq!(
            classify_http(403, raw, "Storage").details.as_deref(),
            Some("new row violates row-level security policy")
        );
    }

    #[test]
    fn detects_image_policy_rejection() {
        let raw = r#"{"error":{"code":400,"message":"The prompt contains sensitive words that violate Google's Responsible AI practices.","status":"INVALID_ARGUMENT"}}"#;
        assert!(ProviderErrorBody::parse(raw).is_content_policy_rejection());

        let other = r#"{"error":{"code":400,"message":"Unknown name \"foo\"","status":"INVALID_ARGUMENT"}}"#;
        assert!(!ProviderErrorBody::parse(other).is_content_policy_rejection());
    }

    #[test]
    fn http_status_backs_up_silent_keywords() {
        assert_eq!(
            classify_http(502, "<html>upstream hiccup</html>", "OpenAI").error_type,
            ErrorType::ServiceUnavailable
        );
        assert_eq!(
            classify_http(429, "slow down", "OpenAI").error_type,
            ErrorType::RateLimit
        );
        assert_eq!(
            classify_http(418, "teapot", "OpenAI").error_type,
            ErrorType::Unknown
        );
    }
}
