//! Lexicon-driven extraction of entities, time range, dimensions, metrics and filters.

use crate::lexicon::{
    contains_term, BUSINESS_METRICS, BUSINESS_OBJECTS, DIMENSION_WORDS, FILTER_CONDITIONS,
    FIXED_TIME_TOKENS, METRIC_WORDS,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    static ref ROLLING_WINDOW: Regex = Regex::new(
        r"(?i)(?-u:\b)(?:past|last|recent)\s*(\d+)\s*个?\s*(月|天|年|周|星期|days?|weeks?|months?|years?)"
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Business objects (one per object category) plus every metric keyword found.
    pub fn entities(&self, text: &str) -> BTreeSet<String> {
        let lower = text.to_lowercase();
        let mut entities = BTreeSet::new();

        for (_, variants) in BUSINESS_OBJECTS {
            if let Some(hit) = variants.iter().find(|v| contains_term(&lower, v)) {
                entities.insert(hit.to_string());
            }
        }
        for metric in BUSINESS_METRICS {
            if contains_term(&lower, metric) {
                entities.insert(metric.to_string());
            }
        }

        entities
    }

    /// First recognized time expression, canonicalized. Rolling windows
    /// ("past 3 months") are checked before fixed tokens.
    pub fn time_range(&self, text: &str) -> Option<String> {
        if let Some(caps) = ROLLING_WINDOW.captures(text) {
            let amount = &caps[1];
            let unit = canonical_unit(&caps[2]);
            return Some(format!("past {} {}", amount, unit));
        }

        let lower = text.to_lowercase();
        FIXED_TIME_TOKENS
            .iter()
            .find(|token| contains_term(&lower, token))
            .map(|token| token.to_string())
    }

    pub fn dimensions(&self, text: &str) -> Vec<String> {
        keywords_in(text, DIMENSION_WORDS)
    }

    pub fn metrics(&self, text: &str) -> Vec<String> {
        keywords_in(text, METRIC_WORDS)
    }

    /// Coarse comparison tag only; thresholds are not parsed.
    pub fn filters(&self, text: &str) -> BTreeMap<String, serde_json::Value> {
        let lower = text.to_lowercase();
        let mut filters = BTreeMap::new();
        if let Some((tag, _)) = FILTER_CONDITIONS
            .iter()
            .find(|(_, words)| words.iter().any(|w| contains_term(&lower, w)))
        {
            filters.insert("condition".to_string(), serde_json::Value::from(*tag));
        }
        filters
    }
}

fn keywords_in(text: &str, words: &[&str]) -> Vec<String> {
    let lower = text.to_lowercase();
    words
        .iter()
        .filter(|w| contains_term(&lower, w))
        .map(|w| w.to_string())
        .collect()
}

fn canonical_unit(raw: &str) -> &'static str {
    let raw = raw.to_lowercase();
    match raw.as_str() {
        "天" => "day",
        "周" | "星期" => "week",
        "月" => "month",
        "年" => "year",
        s if s.starts_with("day") => "day",
        s if s.starts_with("week") => "week",
        s if s.starts_with("month") => "month",
        _ => "year",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entities_count_object_categories_once() {
        let e = Extractor::new();
        // 客户 and 用户 belong to the same object category
        let entities = e.entities("各部门客户和用户的销售额");
        assert!(entities.contains("部门"));
        assert!(entities.contains("客户"));
        assert!(!entities.contains("用户"));
        assert!(entities.contains("销售额"));
        assert_eq!(entities.len(), 3);
    }

    #[test]
    fn test_time_range_rolling_window() {
        let e = Extractor::new();
        assert_eq!(e.time_range("显示past3个月的销售趋势").as_deref(), Some("past 3 month"));
        assert_eq!(e.time_range("revenue for the last 2 weeks").as_deref(), Some("past 2 week"));
        assert_eq!(e.time_range("recent7天").as_deref(), Some("past 7 day"));
    }

    #[test]
    fn test_time_range_fixed_tokens_first_match_wins() {
        let e = Extractor::new();
        assert_eq!(e.time_range("this month的销售额").as_deref(), Some("this month"));
        assert_eq!(e.time_range("today vs yesterday").as_deref(), Some("today"));
        assert_eq!(e.time_range("销售额"), None);
    }

    #[test]
    fn test_dimensions_and_metrics() {
        let e = Extractor::new();
        assert_eq!(e.dimensions("各地区各渠道的利润"), vec!["地区", "渠道"]);
        assert_eq!(e.metrics("各地区各渠道的利润"), vec!["利润"]);
        assert_eq!(e.metrics("Revenue by region"), vec!["revenue"]);
    }

    #[test]
    fn test_english_terms_need_whole_words() {
        let e = Extractor::new();
        assert!(e.dimensions("production cost per costume").is_empty());
        assert!(e.entities("username list").is_empty());
        assert!(e.entities("production cost per costume").contains("cost"));
        assert_eq!(e.dimensions("revenue of top products"), vec!["product"]);
        assert_eq!(e.time_range("sales this monthly report"), None);
    }

    #[test]
    fn test_filters_condition_tag() {
        let e = Extractor::new();
        let filters = e.filters("销售额大于100万的产品");
        assert_eq!(filters.get("condition"), Some(&serde_json::json!("greater_than")));
        assert!(e.filters("销售额").is_empty());
        assert_eq!(
            e.filters("orders less than 5").get("condition"),
            Some(&serde_json::json!("less_than"))
        );
    }
}
