use crate::error::{DapError, Result};
use crate::lexicon::DATA_KEYWORDS;
use serde::Serialize;

pub const MIN_QUERY_CHARS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    fn invalid(message: &str, suggestions: &[&str]) -> Self {
        Self {
            valid: false,
            message: message.to_string(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Length and topical checks on raw question text.
#[derive(Debug, Clone, Copy)]
pub struct QueryValidator {
    max_query_length: usize,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new(500)
    }
}

impl QueryValidator {
    pub fn new(max_query_length: usize) -> Self {
        Self { max_query_length }
    }

    pub fn max_query_length(&self) -> usize {
        self.max_query_length
    }

    pub fn validate(&self, text: &str) -> ValidationReport {
        if text.trim().chars().count() < MIN_QUERY_CHARS {
            return ValidationReport::invalid(
                "Query is too short, please describe what you want to know in more detail",
                &["Describe the specific data you are interested in"],
            );
        }
        if text.chars().count() > self.max_query_length {
            return ValidationReport::invalid(
                "Query is too long, please simplify it",
                &["Split a complex question into several simple ones"],
            );
        }

        let lower = text.to_lowercase();
        if !DATA_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return ValidationReport::invalid(
                "Query seems unrelated to data analysis",
                &[
                    "Ask about sales, statistics or other analysis topics",
                    "For example: '显示过去3个月的销售趋势'",
                ],
            );
        }

        ValidationReport {
            valid: true,
            message: "Query looks good".to_string(),
            suggestions: Vec::new(),
        }
    }

    /// [`Self::validate`] as a `Result`.
    pub fn ensure_valid(&self, text: &str) -> Result<()> {
        let report = self.validate(text);
        if report.valid {
            Ok(())
        } else {
            Err(DapError::validation(report.message, report.suggestions))
        }
    }

    /// Length bound applied to every processed request.
    pub fn check_length(&self, text: &str) -> Result<()> {
        let len = text.trim().chars().count();
        if len == 0 {
            return Err(DapError::validation(
                "Query text is empty",
                vec!["Type a question about your data".to_string()],
            ));
        }
        if text.chars().count() > self.max_query_length {
            return Err(DapError::validation(
                format!("Query exceeds {} characters", self.max_query_length),
                vec!["Split a complex question into several simple ones".to_string()],
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_query() {
        let report = QueryValidator::default().validate("显示过去3个月的销售趋势");
        assert!(report.valid);
        assert!(report.suggestions.is_empty());
    }

    #[test]
    fn test_too_short_and_too_long() {
        let v = QueryValidator::new(20);
        assert!(!v.validate("  销售 ").valid);
        let report = v.validate(&"销售".repeat(11));
        assert!(!report.valid);
        assert!(report.message.contains("too long"));
    }

    #[test]
    fn test_unrelated_query() {
        let report = QueryValidator::default().validate("what is the weather like");
        assert!(!report.valid);
        assert_eq!(report.suggestions.len(), 2);
    }

    #[test]
    fn test_ensure_valid_and_length_errors() {
        let v = QueryValidator::new(10);
        let err = v.ensure_valid("hello world").unwrap_err();
        assert_eq!(err.error_type(), "VALIDATION_ERROR");

        assert!(v.check_length("销售").is_ok());
        assert!(v.check_length("   ").is_err());
        assert!(v.check_length("a much longer question").is_err());
    }
}
