use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error_type::{AiErrorClassification, ErrorType};

/// Raw model output longer than this is cut in diagnostics.
pub const RAW_PREVIEW_LIMIT: usize = 500;

const DEFAULT_RATING: u8 = 3;

/// Structured interpretation of a dream as returned to clients and stored
/// in `dream_analyses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamAnalysis {
    pub rating: u8,
    pub themes: Vec<String>,
    pub symbols: Vec<String>,
    pub emotions: Vec<String>,
    pub interpretation: String,
}

/// Whatever one extraction stage managed to recover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialAnalysis {
    pub rating: Option<f64>,
    pub themes: Vec<String>,
    pub symbols: Vec<String>,
    pub emotions: Vec<String>,
    pub interpretation: Option<String>,
}

impl PartialAnalysis {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(PartialAnalysis {
            rating: object.get("rating").and_then(rating_from_value),
            themes: object.get("themes").map(strings_from_value).unwrap_or_default(),
            symbols: object.get("symbols").map(strings_from_value).unwrap_or_default(),
            emotions: object.get("emotions").map(strings_from_value).unwrap_or_default(),
            interpretation: object
                .get("interpretation")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    fn has_interpretation(&self) -> bool {
        self.interpretation.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// A salvaged result counts only with an interpretation and at least one
    /// non-empty list.
    pub fn is_salvageable(&self) -> bool {
        self.has_interpretation()
            && [&self.themes, &self.symbols, &self.emotions]
                .iter()
                .any(|list| !list.is_empty())
    }

    pub fn into_analysis(self) -> DreamAnalysis {
        DreamAnalysis {
            rating: normalize_rating(self.rating),
            themes: self.themes,
            symbols: self.symbols,
            emotions: self.emotions,
            interpretation: self.interpretation.unwrap_or_default(),
        }
    }
}

fn normalize_rating(rating: Option<f64>) -> u8 {
    match rating {
        Some(r) if r.is_finite() => r.round().clamp(1.0, 5.0) as u8,
        _ => DEFAULT_RATING,
    }
}

fn rating_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .or_else(|| rating_from_text(s)),
        _ => None,
    }
}

fn strings_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Value::String(s) => split_list(s),
        _ => Vec::new(),
    }
}

/// Parses a model response expected to hold a dream analysis.
///
/// Strict JSON is tried first; after that the salvage chain runs. When every
/// stage fails the caller gets a `PARSING_ERROR` carrying a preview of the raw text.
pub fn parse_analysis(text: &str, source: &str) -> Result<DreamAnalysis, AiErrorClassification> {
    if let Some(strict) = strict_json(text) {
        return Ok(strict.into_analysis());
    }

    log::warn!("{} analysis was not valid JSON, attempting salvage", source);
    match salvage(text) {
        Some(partial) => Ok(partial.into_analysis()),
        None => {
            log::error!("Could not salvage {} analysis response", source);
            Err(AiErrorClassification::new(
                ErrorType::ParsingError,
                source,
                Some(raw_preview(text)),
            ))
        }
    }
}

fn strict_json(text: &str) -> Option<PartialAnalysis> {
    let value = serde_json::from_str::<Value>(text.trim()).ok()?;
    PartialAnalysis::from_value(&value).filter(PartialAnalysis::has_interpretation)
}

type Stage = fn(&str) -> Option<PartialAnalysis>;

/// Salvage stages in the order they are attempted.
const STAGES: [(&str, Stage); 3] = [
    ("fenced block", from_fenced_block),
    ("bare object", from_bare_object),
    ("labeled fields", from_labeled_fields),
];

/// Runs the salvage chain, stopping at the first stage whose result is salvageable.
pub fn salvage(text: &str) -> Option<PartialAnalysis> {
    STAGES.iter().find_map(|(name, stage)| {
        let partial = stage(text).filter(PartialAnalysis::is_salvageable)?;
        log::info!("Salvaged analysis from {}", name);
        Some(partial)
    })
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z]*\s*(\{.*?\})\s*```").expect("valid fenced block pattern")
});

/// Stage (a): a fenced code block containing an object.
pub fn from_fenced_block(text: &str) -> Option<PartialAnalysis> {
    let block = FENCED_BLOCK.captures(text)?.get(1)?.as_str();
    let value = serde_json::from_str::<Value>(block).ok()?;
    PartialAnalysis::from_value(&value)
}

/// Stage (b): the first balanced top-level `{...}` span anywhere in the text.
pub fn from_bare_object(text: &str) -> Option<PartialAnalysis> {
    let span = first_object_span(text)?;
    let value = serde_json::from_str::<Value>(span).ok()?;
    PartialAnalysis::from_value(&value)
}

fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

static RATING_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)rating["'*]*[:\s]*([1-5](?:\.\d+)?)\b"#).expect("valid rating pattern")
});

static RATING_OUT_OF_FIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([1-5](?:\.\d+)?)\s*/\s*5\b").expect("valid rating pattern")
});

fn rating_from_text(text: &str) -> Option<f64> {
    [&*RATING_LABELED, &*RATING_OUT_OF_FIVE]
        .iter()
        .find_map(|pattern| pattern.captures(text)?.get(1)?.as_str().parse::<f64>().ok())
}

/// Patterns recovering one list field from free text.
struct ListPatterns {
    json_array: Regex,
    inline: Regex,
    bullets: Regex,
}

impl ListPatterns {
    fn new(field: &str) -> Self {
        let label = format!(r#"\**["']?{field}["']?\**"#);
        ListPatterns {
            json_array: Regex::new(&format!(r#"(?i){label}\s*[:=]?\s*(\[[^\]]*\])"#))
                .expect("valid list pattern"),
            inline: Regex::new(&format!(
                r"(?im)^[^\S\n]*(?:[-*#]+[^\S\n]*)?{label}[^\S\n]*:[^\S\n]*\**[^\S\n]*([^\s\[][^\n]*)$"
            ))
            .expect("valid list pattern"),
            bullets: Regex::new(&format!(
                r"(?im)^[^\S\n]*(?:#+[^\S\n]*)?{label}[^\S\n]*:?[^\S\n]*\**[^\S\n]*\n((?:[^\S\n]*(?:[-*•]|\d+\.)[^\S\n]+[^\n]+(?:\n|$))+)"
            ))
            .expect("valid list pattern"),
        }
    }

    fn extract(&self, text: &str) -> Vec<String> {
        let from_json = self
            .json_array
            .captures(text)
            .and_then(|caps| serde_json::from_str::<Value>(caps.get(1)?.as_str()).ok())
            .map(|value| strings_from_value(&value))
            .filter(|items| !items.is_empty());
        if let Some(items) = from_json {
            return items;
        }

        let from_inline = self
            .inline
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| split_list(m.as_str()))
            .filter(|items| !items.is_empty());
        if let Some(items) = from_inline {
            return items;
        }

        self.bullets
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| {
                m.as_str()
                    .lines()
                    .map(strip_bullet)
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

static THEMES: LazyLock<ListPatterns> = LazyLock::new(|| ListPatterns::new("themes"));
static SYMBOLS: LazyLock<ListPatterns> = LazyLock::new(|| ListPatterns::new("symbols"));
static EMOTIONS: LazyLock<ListPatterns> = LazyLock::new(|| ListPatterns::new("emotions"));

/// `"interpretation": "..."` inside broken JSON; the closing quote may be
/// missing when the output was cut off.
static INTERPRETATION_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)"interpretation"\s*:\s*"((?:[^"\\]|\\.)*)"#)
        .expect("valid interpretation pattern")
});

/// Prose label, running to the next blank line.
static INTERPRETATION_LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)\**["']?interpretation["']?\**[^\S\n]*:[^\S\n]*\**[^\S\n]*(.+?)[^\S\n]*(?:\n[^\S\n]*\n|\z)"#,
    )
    .expect("valid interpretation pattern")
});

/// Decodes the body of a JSON string literal, keeping it raw if an escape is cut short.
fn unescape_json_string(body: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", body)).unwrap_or_else(|_| body.to_string())
}

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[^\S\n]*\n").expect("valid paragraph pattern"));

fn interpretation_from_text(text: &str) -> Option<String> {
    let labeled = match INTERPRETATION_JSON.captures(text).and_then(|caps| caps.get(1)) {
        Some(m) => Some(unescape_json_string(m.as_str()).trim().to_string()),
        None => INTERPRETATION_LABELED
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().trim_matches(['"', ',']).trim().to_string()),
    }
    .filter(|s| !s.is_empty());
    if labeled.is_some() {
        return labeled;
    }

    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .max_by_key(|paragraph| paragraph.chars().count())
        .map(str::to_string)
}

/// Stage (c): field-by-field regex recovery.
pub fn from_labeled_fields(text: &str) -> Option<PartialAnalysis> {
    Some(PartialAnalysis {
        rating: rating_from_text(text),
        themes: THEMES.extract(text),
        symbols: SYMBOLS.extract(text),
        emotions: EMOTIONS.extract(text),
        interpretation: interpretation_from_text(text),
    })
}

fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(|item| {
            item.trim()
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '*')
                .trim_end_matches('.')
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

fn strip_bullet(line: &str) -> String {
    let line = line.trim();
    let without_marker = line
        .strip_prefix(['-', '*', '•'])
        .map(str::to_string)
        .unwrap_or_else(|| {
            line.split_once(". ")
                .filter(|(number, _)| number.chars().all(|c| c.is_ascii_digit()))
                .map(|(_, rest)| rest.to_string())
                .unwrap_or_else(|| line.to_string())
        });
    without_marker
        .trim()
        .trim_matches(|c: char| c == '"' || c == '*')
        .trim()
        .to_string()
}

/// Raw text for diagnostics, cut to [`RAW_PREVIEW_LIMIT`] characters.
pub fn raw_preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_LIMIT {
        let head: String = text.chars().take(RAW_PREVIEW_LIMIT).collect();
        format!("{}... (truncated)", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strict_json_is_accepted_as_is() {
        let text = r#"{"rating": 5, "themes": ["flight"], "symbols": [], "emotions": ["joy"], "interpretation": "Freedom."}"#;
        assert_eq!(
            parse_analysis(text, "OpenAI").unwrap(),
            DreamAnalysis {
                rating: 5,
                themes: strings(&["flight"]),
                symbols: vec![],
                emotions: strings(&["joy"]),
                interpretation: "Freedom.".to_string(),
            }
        );
    }

    #[test]
    fn labeled_fields_are_salvaged() {
        let text = "rating: 4\nthemes: [\"water\",\"flight\"]\nemotions: joy, awe\ninterpretation: You felt free.";
        assert_eq!(
            parse_analysis(text, "OpenAI").unwrap(),
            DreamAnalysis {
                rating: 4,
                themes: strings(&["water", "flight"]),
                symbols: vec![],
                emotions: strings(&["joy", "awe"]),
                interpretation: "You felt free.".to_string(),
            }
        );
    }

    #[test]
    fn fenced_block_is_preferred() {
        let text = "Sure! Here is the analysis:\n```json\n{\"rating\": 2.6, \"themes\": [\"loss\"], \"symbols\": [\"key\"], \"emotions\": [\"grief\"], \"interpretation\": \"Letting go.\"}\n```\nHope it helps.";
        let partial = from_fenced_block(text).unwrap();
        assert_eq!(partial.symbols, strings(&["key"]));

        let analysis = parse_analysis(text, "OpenAI").unwrap();
        assert_eq!(analysis.rating, 3);
        assert_eq!(analysis.interpretation, "Letting go.");
    }

    #[test]
    fn bare_object_is_found_inside_prose() {
        let text = r#"The result {"rating": 1, "themes": ["chase"], "symbols": [], "emotions": [], "interpretation": "You avoid {something}."} end"#;
        assert_eq!(
            first_object_span(text).unwrap(),
            r#"{"rating": 1, "themes": ["chase"], "symbols": [], "emotions": [], "interpretation": "You avoid {something}."}"#
        );
        let analysis = parse_analysis(text, "OpenAI").unwrap();
        assert_eq!(analysis.rating, 1);
        assert_eq!(analysis.themes, strings(&["chase"]));
    }

    #[test]
    fn rating_accepts_out_of_five_and_defaults() {
        assert_eq!(rating_from_text("I'd give this 4.6/5 overall"), Some(4.6));
        assert_eq!(normalize_rating(Some(4.6)), 5);
        assert_eq!(normalize_rating(None), 3);
        assert_eq!(rating_from_text("rating: 10"), None);
    }

    #[test]
    fn bullet_lists_are_collected() {
        let text = "**Symbols:**\n- a locked door\n- an old key\n\n**Interpretation:** You are ready to open up.";
        let partial = from_labeled_fields(text).unwrap();
        assert_eq!(partial.symbols, strings(&["a locked door", "an old key"]));
        assert_eq!(
            partial.interpretation.as_deref(),
            Some("You are ready to open up.")
        );
        assert!(partial.is_salvageable());
    }

    #[test]
    fn longest_paragraph_stands_in_for_interpretation() {
        let text = "Themes: falling, exams\n\nThis dream reflects worry about performance and a fear of being judged by others.\n\nSleep well.";
        let partial = from_labeled_fields(text).unwrap();
        assert_eq!(
            partial.interpretation.as_deref(),
            Some("This dream reflects worry about performance and a fear of being judged by others.")
        );
        assert_eq!(partial.themes, strings(&["falling", "exams"]));
    }

    #[test]
    fn json_interpretation_stops_at_its_closing_quote() {
        let text = r#"{"rating": 4, "interpretation": "You felt free.", "themes": ["water", "flight"],}"#;
        assert_eq!(
            parse_analysis(text, "OpenAI").unwrap(),
            DreamAnalysis {
                rating: 4,
                themes: strings(&["water", "flight"]),
                symbols: vec![],
                emotions: vec![],
                interpretation: "You felt free.".to_string(),
            }
        );
    }

    #[test]
    fn json_interpretation_is_unescaped_and_survives_truncation() {
        let escaped = r#"{"themes": ["home"], "interpretation": "A \"safe\" place.\nRest.", "symbols": ["door"],"#;
        let partial = from_labeled_fields(escaped).unwrap();
        assert_eq!(partial.interpretation.as_deref(), Some("A \"safe\" place.\nRest."));
        assert_eq!(partial.symbols, strings(&["door"]));

        let cut = r#"{"themes": ["home"], "interpretation": "You long for a place to rest"#;
        assert_eq!(
            from_labeled_fields(cut).unwrap().interpretation.as_deref(),
            Some("You long for a place to rest")
        );
    }

    #[test]
    fn unrecoverable_text_is_a_parsing_error() {
        let classification = parse_analysis("{not json at all", "OpenAI").unwrap_err();
        assert_eq!(classification.error_type, ErrorType::ParsingError);
        assert_eq!(classification.details.as_deref(), Some("{not json at all"));
    }

    #[test]
    fn long_raw_text_is_truncated_in_details() {
        let text = "z".repeat(RAW_PREVIEW_LIMIT + 100);
        let classification = parse_analysis(&text, "OpenAI").unwrap_err();
        let details = classification.details.unwrap();

        assert!(details.ends_with("(truncated)"));
        assert_eq!(details.trim_end_matches("... (truncated)").chars().count(), RAW_PREVIEW_LIMIT);
    }
}
