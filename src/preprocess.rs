use crate::lexicon::{PUNCTUATION, TIME_PHRASES};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Text normalization applied before any pattern matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Strip punctuation, collapse whitespace and rewrite relative-time
    /// phrases into canonical English tokens.
    pub fn normalize(&self, raw: &str) -> String {
        let stripped: String = raw.chars().filter(|c| !PUNCTUATION.contains(c)).collect();
        let mut text = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

        for &(phrase, token) in TIME_PHRASES {
            if text.contains(phrase) {
                text = text.replace(phrase, token);
            }
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_maps_time_phrases() {
        let p = Preprocessor::new();
        assert_eq!(p.normalize("显示  本月   的销售趋势"), "显示 this month 的销售趋势");
    }

    #[test]
    fn test_strips_punctuation() {
        let p = Preprocessor::new();
        assert_eq!(p.normalize("上周的销售额是多少？"), "last week的销售额是多少");
        assert_eq!(p.normalize("  revenue, by region!  "), "revenue by region");
    }

    #[test]
    fn test_past_and_recent_tokens() {
        let p = Preprocessor::new();
        assert_eq!(p.normalize("过去3个月"), "past3个月");
        assert_eq!(p.normalize("最近7天"), "recent7天");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(Preprocessor::new().normalize("   "), "");
    }
}
