use crate::error_type::{AiErrorClassification, ErrorType};

/// Phrases a provider uses when it answers 200 OK but declines the request.
const REFUSAL_PHRASES: &[&str] = &[
    "i cannot fulfill this request",
    "i can't fulfill this request",
    "i am unable to fulfill this request",
    "i'm unable to fulfill this request",
    "i cannot generate",
    "i can't generate",
    "i'm not able to generate",
    "i am not able to generate",
    "i cannot create images",
    "i can't create images",
    "violate google's responsible ai",
    "responsible ai practices",
    "against my safety guidelines",
    "goes against my guidelines",
];

/// Reclassifies a transport-level success as a moderation block when its
/// text reads like a refusal. Only meaningful for textual bodies; callers must
/// not pass decoded image or audio payloads.
pub fn detect_refusal(text: &str, source: &str) -> Option<AiErrorClassification> {
    let normalized = text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    let phrase = REFUSAL_PHRASES
        .iter()
        .find(|phrase| normalized.contains(*phrase))?;

    log::warn!("{} returned a refusal disguised as success ({:?})", source, phrase);
    Some(AiErrorClassification::new(
        ErrorType::ContentModeration,
        source,
        Some(text.trim().chars().take(300).collect()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_text_is_moderation() {
        let classification = detect_refusal(
            "I cannot fulfill this request. It may violate Google's Responsible AI practices.",
            "Gemini",
        )
        .unwrap();
        assert_eq!(classification.error_type, ErrorType::ContentModeration);
        assert_eq!(classification.status(200), 422);
    }

    #[test]
    fn curly_apostrophes_are_normalized() {
        assert!(detect_refusal("Sorry, I can\u{2019}t generate that image.", "Gemini").is_some());
    }

    #[test]
    fn ordinary_text_passes() {
        assert!(detect_refusal("Here is your dreamy lighthouse at dusk.", "Gemini").is_none());
    }
}
