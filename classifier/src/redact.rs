use std::sync::LazyLock;

use regex::Regex;

static KEY_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // OpenAI style secret keys, including project keys
        (r"sk-[A-Za-z0-9_\-]{8,}", "sk-****"),
        // Google API keys
        (r"AIza[0-9A-Za-z_\-]{20,}", "AIza****"),
        (r"(?i)(bearer\s+)[A-Za-z0-9_\-\.=]{8,}", "${1}****"),
        (
            r#"(?i)((?:api[_-]?key|key)["']?\s*[=:]\s*["']?)[A-Za-z0-9_\-\.]{8,}"#,
            "${1}****",
        ),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid key pattern"), replacement))
    .collect()
});

/// Masks API keys and bearer tokens so provider error text can be shown to users.
pub fn redact_api_keys(text: &str) -> String {
    KEY_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace_all(&acc, *replacement).into_owned()
        })
}
