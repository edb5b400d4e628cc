use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)(api[_-]?key|token|secret|authorization)\s*[:=]\s*["']?([A-Za-z0-9_\-\.]{6,})["']?"#)
            .expect("valid regex"),
        Regex::new(r"(?i)\b(bearer)\s+[A-Za-z0-9_\-\.]{8,}").expect("valid regex"),
        Regex::new(r"\b(secret_[A-Za-z0-9]{20,})\b").expect("valid regex"),
        Regex::new(r"\b(ntn_[A-Za-z0-9]{20,})\b").expect("valid regex"),
    ]
});

/// Strips Notion integration tokens out of text that may be logged or shown.
#[derive(Debug, Default, Clone, Copy)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    pub fn redact(&self, input: &str) -> String {
        if input.is_empty() {
            return String::new();
        }

        let mut result = input.to_string();
        for pattern in SECRET_PATTERNS.iter() {
            if !pattern.is_match(&result) {
                continue;
            }
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| {
                    let key = caps
                        .get(1)
                        .map(|m| m.as_str())
                        .unwrap_or("secret")
                        .to_ascii_lowercase();
                    if key.starts_with("secret_") || key.starts_with("ntn_") {
                        "[REDACTED]".to_string()
                    } else if key == "bearer" {
                        "Bearer [REDACTED]".to_string()
                    } else {
                        format!("{}=[REDACTED]", key)
                    }
                })
                .to_string();
        }
        result
    }
}
