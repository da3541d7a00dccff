use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use common::error::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{provider, redact};

/// Category of a failed (or refused) AI call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    InvalidRequest,
    Authorization,
    ContentModeration,
    ServiceUnavailable,
    RateLimit,
    DatabaseError,
    ParsingError,
    Unknown,
}

impl ErrorType {
    /// HTTP status used when surfacing this category. Categories without a
    /// dedicated status fall back to `default`.
    pub fn http_status(&self, default: u16) -> u16 {
        match self {
            ErrorType::Authorization => 401,
            ErrorType::RateLimit => 429,
            ErrorType::ServiceUnavailable => 503,
            ErrorType::ContentModeration => 422,
            _ => default,
        }
    }

    pub fn suggested_action(&self) -> &'static str {
        match self {
            ErrorType::InvalidRequest => "Check the request fields and try again.",
            ErrorType::Authorization => {
                "The AI service rejected our credentials. Please contact support if this persists."
            }
            ErrorType::ContentModeration => {
                "Try rephrasing your dream to avoid explicit, violent or otherwise sensitive details."
            }
            ErrorType::ServiceUnavailable => {
                "The AI service is temporarily unavailable. Please try again in a few minutes."
            }
            ErrorType::RateLimit => "Too many requests right now. Please wait a moment and try again.",
            ErrorType::DatabaseError => {
                "Your result was generated but could not be saved. Please try again."
            }
            ErrorType::ParsingError => "The AI returned an unexpected response. Please try again.",
            ErrorType::Unknown => "Something went wrong. Please try again later.",
        }
    }

    fn describe(&self, source: &str) -> String {
        match self {
            ErrorType::InvalidRequest => "Invalid request".to_string(),
            ErrorType::Authorization => format!("{} authorization failed", source),
            ErrorType::ContentModeration => {
                format!("{} blocked the request due to its content policy", source)
            }
            ErrorType::ServiceUnavailable => format!("{} is temporarily unavailable", source),
            ErrorType::RateLimit => format!("{} rate limit exceeded", source),
            ErrorType::DatabaseError => "Failed to save the result".to_string(),
            ErrorType::ParsingError => format!("Could not parse the {} response", source),
            ErrorType::Unknown => format!("{} request failed", source),
        }
    }
}

/// Outcome of classifying one AI call. Produced fresh per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiErrorClassification {
    pub error: String,
    pub error_type: ErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl AiErrorClassification {
    pub fn new(error_type: ErrorType, source: &str, details: Option<String>) -> Self {
        let details = match error_type {
            ErrorType::Authorization => details.map(|d| redact::redact_api_keys(&d)),
            _ => details,
        };
        AiErrorClassification {
            error: error_type.describe(source),
            error_type,
            details,
            suggested_action: Some(error_type.suggested_action().to_string()),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        AiErrorClassification {
            error: message.into(),
            error_type: ErrorType::InvalidRequest,
            details: None,
            suggested_action: Some(ErrorType::InvalidRequest.suggested_action().to_string()),
        }
    }

    pub fn status(&self, default: u16) -> u16 {
        self.error_type.http_status(default)
    }

    /// Pairs the classification with the status derived from its category.
    pub fn into_error(self, default_status: u16) -> ClassifiedError {
        let status = self.status(default_status);
        ClassifiedError {
            classification: self,
            status,
        }
    }
}

/// A classification ready to be rendered as an HTTP error response.
#[derive(Debug, Clone, Error)]
#[error("{} ({:?}, {})", classification.error, classification.error_type, status)]
pub struct ClassifiedError {
    pub classification: AiErrorClassification,
    pub status: u16,
}

impl ResponseError for ClassifiedError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(&self.classification)
    }
}

impl From<AppError> for ClassifiedError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Database(e) => {
                log::error!("Database error: {}", e);
                AiErrorClassification::new(ErrorType::DatabaseError, "database", Some(e.to_string()))
                    .into_error(500)
            }
            AppError::Reqwest(e) if e.is_timeout() || e.is_connect() => {
                log::error!("Provider unreachable: {}", e);
                AiErrorClassification::new(ErrorType::ServiceUnavailable, "AI provider", None)
                    .into_error(503)
            }
            AppError::BadRequest(message) => {
                AiErrorClassification::invalid_request(message).into_error(400)
            }
            AppError::NotFound(message) => {
                AiErrorClassification::invalid_request(message).into_error(404)
            }
            AppError::Unauthorized(message) | AppError::Forbidden(message) => {
                AiErrorClassification::new(ErrorType::Authorization, "request", Some(message))
                    .into_error(401)
            }
            AppError::TooManyRequests(message) => {
                AiErrorClassification::new(ErrorType::RateLimit, "request", Some(message))
                    .into_error(429)
            }
            other => {
                log::error!("Unclassified error: {}", other);
                provider::classify(&other.to_string(), "server").into_error(500)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_follows_category() {
        assert_eq!(ErrorType::Authorization.http_status(400), 401);
        assert_eq!(ErrorType::RateLimit.http_status(400), 429);
        assert_eq!(ErrorType::ServiceUnavailable.http_status(400), 503);
        assert_eq!(ErrorType::ContentModeration.http_status(400), 422);
        assert_eq!(ErrorType::ParsingError.http_status(400), 400);
        assert_eq!(ErrorType::DatabaseError.http_status(500), 500);
        assert_eq!(ErrorType::Unknown.http_status(502), 502);
    }

    #[test]
    fn serializes_with_screaming_error_type() {
        let classification =
            AiErrorClassification::new(ErrorType::RateLimit, "Gemini", Some("slow down".into()));
        let json = serde_json::to_value(&classification).unwrap();

        assert_eq!(json["errorType"], "RATE_LIMIT");
        assert_eq!(json["error"], "Gemini rate limit exceeded");
        assert_eq!(json["details"], "slow down");
        assert!(json["suggestedAction"].is_string());
    }

    #[test]
    fn authorization_details_are_redacted() {
        let classification = AiErrorClassification::new(
            ErrorType::Authorization,
            "OpenAI",
            Some("Incorrect API key provided: sk-proj-abcdef1234567890".into()),
        );
        let details = classification.details.unwrap();
        assert!(!details.contains("abcdef1234567890"), "{details}");
    }

    #[test]
    fn database_app_error_becomes_database_classification() {
        let error: ClassifiedError = AppError::Database(sqlx::Error::RowNotFound).into();
        assert_eq!(error.classification.error_type, ErrorType::DatabaseError);
        assert_eq!(error.status, 500);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_request_app_error_becomes_invalid_request() {
        let error: ClassifiedError = AppError::BadRequest("dreamContent is required".into()).into();
        assert_eq!(error.classification.error_type, ErrorType::InvalidRequest);
        assert_eq!(error.classification.error, "dreamContent is required");
        assert_eq!(error.status, 400);
    }
}
