//! Confidence Scorer
//!
//! Weighted five-factor confidence for locally computed intents. The weighted
//! sum is taken first, additive bonuses after, and the total is capped at 1.0.

use crate::classifier::PatternClassifier;
use crate::lexicon::{contains_term, BONUS_KEYWORDS};
use crate::models::{round2, IntentDraft};
use serde::Serialize;
use tracing::debug;

pub const TYPE_WEIGHT: f64 = 0.30;
pub const ENTITY_WEIGHT: f64 = 0.20;
pub const TIME_WEIGHT: f64 = 0.20;
pub const DIMENSION_WEIGHT: f64 = 0.15;
pub const METRIC_WEIGHT: f64 = 0.15;

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceFactor {
    pub name: &'static str,
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceBreakdown {
    pub factors: Vec<ConfidenceFactor>,
    pub weighted_sum: f64,
    pub bonus: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer {
    classifier: PatternClassifier,
}

impl ConfidenceScorer {
    pub fn new(classifier: PatternClassifier) -> Self {
        Self { classifier }
    }

    pub fn score(&self, text: &str, draft: &IntentDraft) -> f64 {
        self.breakdown(text, draft).confidence
    }

    pub fn breakdown(&self, text: &str, draft: &IntentDraft) -> ConfidenceBreakdown {
        let entity_score = match draft.entities.len() {
            n if n >= 3 => 1.0,
            2 => 0.8,
            1 => 0.6,
            _ => 0.3,
        };
        let factors = vec![
            ConfidenceFactor {
                name: "query_type",
                score: self.classifier.pattern_strength(draft.category, text),
                weight: TYPE_WEIGHT,
            },
            ConfidenceFactor {
                name: "entities",
                score: entity_score,
                weight: ENTITY_WEIGHT,
            },
            ConfidenceFactor {
                name: "time_range",
                score: if draft.time_range.is_some() { 0.9 } else { 0.4 },
                weight: TIME_WEIGHT,
            },
            ConfidenceFactor {
                name: "dimensions",
                score: if draft.dimensions.is_empty() { 0.5 } else { 1.0 },
                weight: DIMENSION_WEIGHT,
            },
            ConfidenceFactor {
                name: "metrics",
                score: if draft.metrics.is_empty() { 0.5 } else { 1.0 },
                weight: METRIC_WEIGHT,
            },
        ];

        let weighted_sum: f64 = factors.iter().map(|f| f.score * f.weight).sum();
        let bonus = length_bonus(text) + keyword_bonus(text);
        let confidence = round2((weighted_sum + bonus).min(1.0));

        for factor in &factors {
            debug!("  - {}: {:.2} (weight {})", factor.name, factor.score, factor.weight);
        }
        debug!("  - bonus: {:.2}, confidence: {:.2}", bonus, confidence);

        ConfidenceBreakdown {
            factors,
            weighted_sum,
            bonus,
            confidence,
        }
    }
}

fn length_bonus(text: &str) -> f64 {
    let len = text.trim().chars().count();
    if (10..=100).contains(&len) {
        0.05
    } else {
        0.0
    }
}

fn keyword_bonus(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let hits = BONUS_KEYWORDS.iter().filter(|kw| contains_term(&lower, kw)).count();
    match hits {
        n if n >= 4 => 0.10,
        n if n >= 2 => 0.05,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn draft(category: Category) -> IntentDraft {
        IntentDraft::new(category)
    }

    #[test]
    fn test_minimal_intent_scores_low() {
        let scorer = ConfidenceScorer::default();
        // 0.3*0 + 0.2*0.3 + 0.2*0.4 + 0.15*0.5 + 0.15*0.5 = 0.29, no bonus
        assert_eq!(scorer.score("hi", &draft(Category::Statistics)), 0.29);
    }

    fn rich_draft(category: Category) -> IntentDraft {
        let mut d = draft(category);
        d.entities = ["部门", "产品", "销售额"].iter().map(|s| s.to_string()).collect();
        d.time_range = Some("this month".to_string());
        d.dimensions = vec!["部门".to_string()];
        d.metrics = vec!["销售额".to_string()];
        d
    }

    #[test]
    fn test_rich_intent_without_pattern_or_bonus_scores_floor() {
        let scorer = ConfidenceScorer::default();
        // no category pattern matched and no bonus: 0.2 + 0.18 + 0.15 + 0.15
        let breakdown = scorer.breakdown("xyz", &rich_draft(Category::Comparison));
        assert_eq!(breakdown.factors[0].score, 0.0);
        assert_eq!(breakdown.bonus, 0.0);
        assert_eq!(breakdown.confidence, 0.68);
    }

    #[test]
    fn test_rich_intent_with_one_pattern_hit_reaches_point_seven() {
        let scorer = ConfidenceScorer::default();
        let d = rich_draft(Category::Comparison);
        // one of four comparison patterns adds 0.075, still without bonus
        let text = format!("对比{}", " xx".repeat(60));
        let breakdown = scorer.breakdown(&text, &d);
        assert_eq!(breakdown.bonus, 0.0);
        assert!(breakdown.confidence >= 0.7);
    }

    #[test]
    fn test_bonuses_stack_after_weighting() {
        let scorer = ConfidenceScorer::default();
        let text = "销售 利润 成本 客户 分析报告";
        let breakdown = scorer.breakdown(text, &draft(Category::Statistics));
        // length 10..=100 and five bonus keywords
        assert!((breakdown.bonus - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_capped() {
        let scorer = ConfidenceScorer::default();
        let mut d = draft(Category::Trend);
        d.entities = ["部门", "产品", "销售额"].iter().map(|s| s.to_string()).collect();
        d.time_range = Some("past 3 month".to_string());
        d.dimensions = vec!["部门".to_string()];
        d.metrics = vec!["销售额".to_string()];
        let text = "past3个月 销售趋势 增长率 逐月 历史 部门 产品 利润 成本";
        let c = scorer.score(text, &d);
        assert!(c <= 1.0);
        assert_eq!(c, 1.0);
    }
}
