use crate::error_type::ErrorType;

/// One `(predicate, category)` pair. The predicate holds when any keyword
/// occurs in the lower-cased input.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub error_type: ErrorType,
    pub keywords: &'static [&'static str],
}

impl Rule {
    pub fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|keyword| lowered.contains(keyword))
    }
}

/// Evaluated top to bottom, first match wins.
pub const RULES: &[Rule] = &[
    Rule {
        error_type: ErrorType::ContentModeration,
        keywords: &[
            "content policy",
            "content_policy",
            "policy",
            "moderation",
            "nsfw",
            "sensitive words",
            "sensitive content",
            "responsible ai",
            "safety system",
            "safety filter",
            "safety settings",
            "inappropriate",
            "violates",
            "violation",
            "prohibited",
        ],
    },
    Rule {
        error_type: ErrorType::ParsingError,
        keywords: &[
            "json",
            "parse",
            "parsing",
            "unexpected token",
            "unexpected end of",
            "syntax error",
            "malformed",
            "deserializ",
        ],
    },
    Rule {
        error_type: ErrorType::DatabaseError,
        keywords: &[
            "database",
            "postgres",
            "sql",
            "duplicate key",
            "foreign key",
            "constraint",
            "relation \"",
            "row-level security",
        ],
    },
    Rule {
        error_type: ErrorType::Authorization,
        keywords: &[
            "api key",
            "api_key",
            "apikey",
            "unauthorized",
            "unauthenticated",
            "authentication",
            "invalid key",
            "incorrect key",
            "permission denied",
            "permission_denied",
            "forbidden",
            "not authorized",
        ],
    },
    Rule {
        error_type: ErrorType::RateLimit,
        keywords: &[
            "rate limit",
            "rate_limit",
            "ratelimit",
            "too many requests",
            "quota",
            "resource_exhausted",
            "resource exhausted",
        ],
    },
    Rule {
        error_type: ErrorType::ServiceUnavailable,
        keywords: &[
            "unavailable",
            "overloaded",
            "timeout",
            "timed out",
            "internal server error",
            "internal error",
            "bad gateway",
            "connection refused",
            "connection reset",
            "econnrefused",
            "network",
            "try again later",
        ],
    },
];

/// Category of the first rule matching `text`, if any.
pub fn match_rules(rules: &[Rule], text: &str) -> Option<ErrorType> {
    let lowered = text.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.error_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        // mentions both moderation and rate limiting
        assert_eq!(
            match_rules(RULES, "Rate limit hit while running the moderation model"),
            Some(ErrorType::ContentModeration)
        );
        assert_eq!(
            match_rules(RULES, "Failed to parse JSON: unexpected end of input"),
            Some(ErrorType::ParsingError)
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(match_rules(RULES, "NSFW content detected"), Some(ErrorType::ContentModeration));
        assert_eq!(match_rules(RULES, "Too Many Requests"), Some(ErrorType::RateLimit));
        assert_eq!(match_rules(RULES, "Service Unavailable"), Some(ErrorType::ServiceUnavailable));
    }

    #[test]
    fn unmatched_text_has_no_category() {
        assert_eq!(match_rules(RULES, "something odd happened"), None);
    }

    #[test]
    fn custom_rule_lists_are_supported() {
        let rules = [Rule {
            error_type: ErrorType::InvalidRequest,
            keywords: &["missing field"],
        }];
        assert_eq!(
            match_rules(&rules, "Missing field `prompt`"),
            Some(ErrorType::InvalidRequest)
        );
    }
}
