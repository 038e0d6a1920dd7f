//! Redaction of sheet passwords before anything reaches the logs

use regex::Regex;
use std::sync::OnceLock;

static PATTERNS: OnceLock<Vec<(Regex, String)>> = OnceLock::new();

/// Scrubs shared-password material out of log lines.
///
/// The generic patterns catch password fields in JSON payloads and
/// `password=` style key/value pairs. A sanitizer built with
/// [`LogSanitizer::with_secret`] additionally redacts every literal
/// occurrence of a known password, which covers sheet file headers.
#[derive(Clone)]
pub struct LogSanitizer {
    patterns: Vec<(Regex, String)>,
}

impl LogSanitizer {
    pub fn new() -> Self {
        let patterns = PATTERNS.get_or_init(|| {
            vec![
                // "password": "hunter2" (with escaped quotes inside the value)
                (
                    Regex::new(r#""password"\s*:\s*"(?:[^"\\]|\\.)*""#).unwrap(),
                    r#""password":"***""#.to_string(),
                ),
                // password=hunter2 / password: hunter2
                (
                    Regex::new(r"(?i)\b(password\s*[=:]\s*)[^\s,;&]+").unwrap(),
                    "${1}***".to_string(),
                ),
            ]
        });

        Self {
            patterns: patterns.clone(),
        }
    }

    /// Also redact every literal occurrence of `secret`
    pub fn with_secret(mut self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        if let Ok(pattern) = Regex::new(&regex::escape(secret)) {
            self.patterns.push((pattern, "***".to_string()));
        }
        self
    }

    pub fn sanitize(&self, message: &str) -> String {
        let mut result = message.to_string();
        for (pattern, replacement) in &self.patterns {
            result = pattern
                .replace_all(&result, replacement.as_str())
                .to_string();
        }
        result
    }
}

impl Default for LogSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogSanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the patterns: a secret pattern is the secret itself.
        f.debug_struct("LogSanitizer")
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_password_redaction() {
        let sanitizer = LogSanitizer::new();
        let log = r#"{"type":"Join","password":"hunter2","name":"budget"}"#;
        assert_eq!(
            sanitizer.sanitize(log),
            r#"{"type":"Join","password":"***","name":"budget"}"#
        );
    }

    #[test]
    fn test_json_password_with_escaped_quote() {
        let sanitizer = LogSanitizer::new();
        let log = r#"{"password": "a\"b"}"#;
        assert_eq!(sanitizer.sanitize(log), r#"{"password":"***"}"#);
    }

    #[test]
    fn test_key_value_redaction() {
        let sanitizer = LogSanitizer::new();
        assert_eq!(
            sanitizer.sanitize("open sheet=budget password=hunter2 user=7"),
            "open sheet=budget password=*** user=7"
        );
    }

    #[test]
    fn test_known_secret_redaction() {
        let sanitizer = LogSanitizer::new().with_secret("s3cr.t");
        assert_eq!(sanitizer.sanitize("header: s3cr.t 12"), "header: *** 12");
        // The literal is escaped, so '.' does not act as a wildcard.
        assert_eq!(sanitizer.sanitize("s3crXt"), "s3crXt");
    }

    #[test]
    fn test_empty_secret_is_ignored() {
        let sanitizer = LogSanitizer::new().with_secret("");
        assert_eq!(sanitizer.sanitize("A1 42"), "A1 42");
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let sanitizer = LogSanitizer::new().with_secret("hunter2");
        assert!(!format!("{:?}", sanitizer).contains("hunter2"));
    }
}
