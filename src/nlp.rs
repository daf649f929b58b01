//! Intent Parser
//!
//! Local pipeline: normalize → classify → extract → score. `parse` adds the
//! optional external refinement on top and falls back to the local result.

use crate::classifier::PatternClassifier;
use crate::confidence::ConfidenceScorer;
use crate::config::EngineConfig;
use crate::error::{DapError, Result};
use crate::extract::Extractor;
use crate::models::{Intent, IntentDraft};
use crate::preprocess::Preprocessor;
use crate::rate_limiter::DailyCallLimiter;
use crate::refiner::IntentRefiner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct IntentParser {
    preprocessor: Preprocessor,
    classifier: PatternClassifier,
    extractor: Extractor,
    scorer: ConfidenceScorer,
    refiner: IntentRefiner,
    timeout: Duration,
}

impl IntentParser {
    pub fn new(refiner: IntentRefiner, timeout: Duration) -> Self {
        let classifier = PatternClassifier::new();
        Self {
            preprocessor: Preprocessor::new(),
            classifier,
            extractor: Extractor::new(),
            scorer: ConfidenceScorer::new(classifier),
            refiner,
            timeout,
        }
    }

    /// Parser that never calls out.
    pub fn local() -> Self {
        Self::new(
            IntentRefiner::new(None, Arc::new(DailyCallLimiter::default())),
            Duration::from_secs(10),
        )
    }

    pub fn from_config(config: &EngineConfig, limiter: Arc<DailyCallLimiter>) -> Self {
        Self::new(IntentRefiner::from_config(config, limiter), config.llm_timeout)
    }

    pub fn refiner(&self) -> &IntentRefiner {
        &self.refiner
    }

    /// Local-only classification. Never fails.
    pub fn classify(&self, text: &str) -> Intent {
        let normalized = self.preprocessor.normalize(text);
        self.local_intent(&normalized).unwrap_or_else(|e| {
            warn!("Local intent could not be built ({}), using default", e);
            Intent::unscored(self.classifier.classify(&normalized))
        })
    }

    /// Local classification, refined externally when a call is possible.
    pub async fn parse(&self, text: &str) -> Result<Intent> {
        let normalized = self.preprocessor.normalize(text);
        info!("🔍 Parsing query: {}", normalized);

        if !self.refiner.is_available() {
            debug!("External refinement unavailable, using local analysis");
            return self.local_intent(&normalized);
        }

        let guess = self.classifier.classify(&normalized);
        self.refiner
            .refine(&normalized, guess, self.timeout)
            .await
            .or_fallback(|reason| {
                debug!("Falling back to local analysis: {}", reason);
                self.local_intent(&normalized)
            })
    }

    fn local_intent(&self, normalized: &str) -> Result<Intent> {
        let category = self.classifier.classify(normalized);
        let mut draft = IntentDraft::new(category);
        draft.entities = self.extractor.entities(normalized);
        draft.time_range = self.extractor.time_range(normalized);
        draft.dimensions = self.extractor.dimensions(normalized);
        draft.metrics = self.extractor.metrics(normalized);
        draft.filters = self.extractor.filters(normalized);
        draft.confidence = self.scorer.score(normalized, &draft);

        let intent = Intent::new(draft).map_err(|e| DapError::IntentParsing {
            message: format!("local analysis failed: {}", e),
        })?;
        info!(
            "🎯 Local intent: {} (confidence {:.2}, {} entities)",
            intent.category(),
            intent.confidence(),
            intent.entities().len()
        );
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, CompletionService};
    use crate::models::Category;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedService {
        reply: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedService {
        fn replying(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                delay: Duration::from_secs(30),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedService {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .map(str::to_string)
                .ok_or_else(|| DapError::Llm("no reply".to_string()))
        }
    }

    fn parser_with(service: Arc<ScriptedService>, limit: u32) -> IntentParser {
        let refiner = IntentRefiner::new(
            Some(service as Arc<dyn CompletionService>),
            Arc::new(DailyCallLimiter::new(limit)),
        );
        IntentParser::new(refiner, Duration::from_millis(200))
    }

    #[test]
    fn test_classify_trend_question() {
        let intent = IntentParser::local().classify("显示过去3个月的销售趋势");
        assert_eq!(intent.category(), Category::Trend);
        assert_eq!(intent.time_range(), Some("past 3 month"));
        assert!((0.0..=1.0).contains(&intent.confidence()));
    }

    #[test]
    fn test_classify_reference_questions() {
        let parser = IntentParser::local();
        assert_eq!(parser.classify("对比各部门的销售业绩").category(), Category::Comparison);
        assert_eq!(parser.classify("销售额TOP10的产品").category(), Category::Ranking);
        assert_eq!(parser.classify("各产品销售占比").category(), Category::Proportion);
        assert_eq!(parser.classify("").category(), Category::Statistics);
    }

    #[test]
    fn test_confidence_is_rounded_to_two_decimals() {
        let parser = IntentParser::local();
        for question in ["对比各部门的销售业绩", "hello", "本月各地区销售额和利润统计"] {
            let c = parser.classify(question).confidence();
            assert!((0.0..=1.0).contains(&c));
            assert!(((c * 100.0).round() - c * 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rich_question_without_pattern_hits_scores_floor() {
        let text = format!("division item retention channel amount today{}", " xx".repeat(40));
        let intent = IntentParser::local().classify(&text);
        assert_eq!(intent.category(), Category::Statistics);
        assert_eq!(intent.entities().len(), 3);
        assert_eq!(intent.time_range(), Some("today"));
        assert_eq!(intent.confidence(), 0.68);
    }

    #[tokio::test]
    async fn test_parse_without_credentials_is_local() {
        let parser = IntentParser::local();
        let intent = parser.parse("对比各部门的销售业绩").await.unwrap();
        assert_eq!(intent, parser.classify("对比各部门的销售业绩"));
        assert_eq!(parser.refiner().limiter().calls_today(), 0);
    }

    #[tokio::test]
    async fn test_parse_uses_refined_intent() {
        let service = ScriptedService::replying(
            r#"{"category": "proportion", "entities": ["渠道"], "confidence": 0.88}"#,
        );
        let parser = parser_with(Arc::clone(&service), 5);
        let intent = parser.parse("对比各渠道的客户").await.unwrap();
        assert_eq!(intent.category(), Category::Proportion);
        assert_eq!(intent.confidence(), 0.88);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parse_falls_back_on_malformed_reply() {
        let service = ScriptedService::replying("not json at all");
        let parser = parser_with(service, 5);
        let intent = parser.parse("销售额TOP10的产品").await.unwrap();
        assert_eq!(intent.category(), Category::Ranking);
        assert_eq!(parser.refiner().limiter().calls_today(), 1);
    }

    #[tokio::test]
    async fn test_parse_falls_back_on_timeout() {
        let service = ScriptedService::slow();
        let parser = parser_with(Arc::clone(&service), 5);
        let intent = parser.parse("对比各部门的销售业绩").await.unwrap();
        assert_eq!(intent.category(), Category::Comparison);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ceiling_stops_external_calls() {
        let service = ScriptedService::replying("garbage");
        let parser = parser_with(Arc::clone(&service), 2);
        for _ in 0..4 {
            parser.parse("本月总销售额统计").await.unwrap();
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }
}
