//! Classification of AI provider responses.
//!
//! Turns raw provider error bodies, hidden refusals and malformed model output
//! into one [`AiErrorClassification`] per call, and salvages dream analyses from
//! responses that were supposed to be JSON but are not.

pub mod error_type;
pub mod provider;
pub mod redact;
pub mod refusal;
pub mod rules;
pub mod salvage;

pub use error_type::{AiErrorClassification, ClassifiedError, ErrorType};
pub use provider::{ProviderErrorBody, classify, classify_http};
pub use refusal::detect_refusal;
pub use salvage::{DreamAnalysis, PartialAnalysis, parse_analysis};
