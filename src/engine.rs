//! AI Engine
//!
//! End-to-end pipeline for one question: validate → parse intent → build SQL
//! (optionally polished externally) → select chart. Nothing is executed.

use crate::chart::{chart_config, ChartSelector};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::llm::CompletionService;
use crate::models::{Category, QueryRequest, QueryResult, SchemaDescriptor};
use crate::nlp::IntentParser;
use crate::rate_limiter::{DailyCallLimiter, UsageStatistics};
use crate::refiner::IntentRefiner;
use crate::sql_generator::SqlGenerator;
use crate::sql_optimizer::SqlOptimizer;
use crate::validation::{QueryValidator, ValidationReport};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Catalog entry describing one supported question category.
#[derive(Debug, Clone, Serialize)]
pub struct SupportedQuery {
    pub category: Category,
    pub name: &'static str,
    pub description: &'static str,
    pub examples: Vec<&'static str>,
}

pub struct AiEngine {
    config: EngineConfig,
    limiter: Arc<DailyCallLimiter>,
    parser: IntentParser,
    generator: SqlGenerator,
    optimizer: Option<SqlOptimizer>,
    selector: ChartSelector,
    validator: QueryValidator,
    default_schema: SchemaDescriptor,
}

impl AiEngine {
    pub fn new(config: EngineConfig) -> Self {
        let limiter = Arc::new(DailyCallLimiter::new(config.daily_call_limit));
        let parser = IntentParser::from_config(&config, Arc::clone(&limiter));
        let optimizer = SqlOptimizer::from_config(&config, Arc::clone(&limiter));
        Self::assemble(config, limiter, parser, optimizer)
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(EngineConfig::from_env()?))
    }

    /// Engine that never calls out.
    pub fn local() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Uses `service` for every external call, regardless of credentials.
    pub fn with_completion_service(config: EngineConfig, service: Arc<dyn CompletionService>) -> Self {
        let limiter = Arc::new(DailyCallLimiter::new(config.daily_call_limit));
        let refiner = IntentRefiner::new(Some(Arc::clone(&service)), Arc::clone(&limiter))
            .with_sampling(config.temperature, config.max_tokens);
        let parser = IntentParser::new(refiner, config.llm_timeout);
        let optimizer = config
            .enable_sql_optimization
            .then(|| SqlOptimizer::new(service, Arc::clone(&limiter), config.llm_timeout));
        Self::assemble(config, limiter, parser, optimizer)
    }

    fn assemble(
        config: EngineConfig,
        limiter: Arc<DailyCallLimiter>,
        parser: IntentParser,
        optimizer: Option<SqlOptimizer>,
    ) -> Self {
        info!(
            "AI engine ready (external refinement: {}, SQL optimization: {})",
            parser.refiner().is_available(),
            optimizer.is_some()
        );
        Self {
            validator: QueryValidator::new(config.max_query_length),
            config,
            limiter,
            parser,
            generator: SqlGenerator::new(),
            optimizer,
            selector: ChartSelector::new(),
            default_schema: SchemaDescriptor::default(),
        }
    }

    pub fn with_default_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.default_schema = schema;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn process_query(&self, request: QueryRequest) -> Result<QueryResult> {
        let started = Instant::now();
        let query_id = Uuid::new_v4().to_string();
        info!("🚀 Processing query {}: {}", query_id, request.natural_query);

        self.validator.check_length(&request.natural_query)?;

        let intent = self.parser.parse(&request.natural_query).await?;
        let schema = request.schema.as_ref().unwrap_or(&self.default_schema);

        let template = self.generator.template_sql(&intent, schema)?;
        let statement = match &self.optimizer {
            Some(optimizer) => optimizer.optimize(&template, &intent, schema).await,
            None => template,
        };
        let sql_query = self.generator.finalize(statement).map_err(|e| {
            warn!("Query {} blocked: {}", query_id, e);
            e
        })?;

        let preview = request.data_preview.as_deref().filter(|rows| !rows.is_empty());
        let recommended_chart = self.selector.select(&intent, preview);
        let chart_config = preview.map(|rows| chart_config(recommended_chart, rows));

        let execution_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "✅ Query {} done in {}ms: {} → {}",
            query_id,
            execution_time_ms,
            intent.category(),
            recommended_chart
        );

        Ok(QueryResult {
            query_id,
            intent,
            sql_query,
            recommended_chart,
            chart_config,
            data: None,
            execution_time_ms,
            created_at: Utc::now(),
        })
    }

    pub fn validate_query(&self, text: &str) -> ValidationReport {
        self.validator.validate(text)
    }

    pub fn supported_queries(&self) -> Vec<SupportedQuery> {
        Category::ALL
            .iter()
            .map(|&category| SupportedQuery {
                category,
                name: category.display_name(),
                description: category.description(),
                examples: category.examples().to_vec(),
            })
            .collect()
    }

    pub fn api_statistics(&self) -> UsageStatistics {
        self.limiter.statistics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DapError;
    use crate::llm::CompletionRequest;
    use crate::models::ChartType;
    use async_trait::async_trait;
    use serde_json::json;

    #[tokio::test]
    async fn test_local_comparison_query() {
        let engine = AiEngine::local();
        let result = engine
            .process_query(QueryRequest::new("对比各部门的销售额"))
            .await
            .unwrap();
        assert_eq!(result.intent.category(), Category::Comparison);
        assert_eq!(result.recommended_chart, ChartType::Bar);
        assert!(result.sql_query.statement().contains("GROUP BY department"));
        assert!(result.chart_config.is_none());
        assert!(result.data.is_none());
        assert_eq!(engine.api_statistics().total_calls, 0);
    }

    #[tokio::test]
    async fn test_preview_and_schema_override() {
        let engine = AiEngine::local();
        let mut request = QueryRequest::new("各产品销售额占比");
        request.schema = Some(SchemaDescriptor::new(
            "orders",
            vec!["product".to_string(), "sales".to_string()],
        ));
        request.data_preview = Some(vec![
            json!({"product": "a", "sales": 10}),
            json!({"product": "b", "sales": 30}),
        ]);
        let result = engine.process_query(request).await.unwrap();
        assert!(result.sql_query.statement().contains("FROM orders"));
        assert_eq!(result.recommended_chart, ChartType::Pie);
        let config = result.chart_config.unwrap();
        assert_eq!(config["series"][0]["type"], json!("pie"));
    }

    #[tokio::test]
    async fn test_length_bound_is_validation_error() {
        let engine = AiEngine::new(EngineConfig {
            max_query_length: 10,
            ..EngineConfig::default()
        });
        let err = engine
            .process_query(QueryRequest::new("销售".repeat(6)))
            .await
            .unwrap_err();
        assert!(matches!(err, DapError::Validation { .. }));

        let err = engine.process_query(QueryRequest::new("  ")).await.unwrap_err();
        assert_eq!(err.error_type(), "VALIDATION_ERROR");
    }

    struct Scripted;

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            if request.system_prompt.contains("SQL optimizer") {
                Ok("```sql\nSELECT region, SUM(sales_amount) FROM business_data GROUP BY region\n```".to_string())
            } else {
                Ok(r#"{"category": "ranking", "entities": ["地区"], "dimensions": ["地区"], "metrics": ["销售额"], "confidence": 0.9}"#.to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_external_refinement_and_optimization() {
        let config = EngineConfig {
            enable_sql_optimization: true,
            ..EngineConfig::default()
        };
        let engine = AiEngine::with_completion_service(config, Arc::new(Scripted));
        let result = engine
            .process_query(QueryRequest::new("各地区销售额统计"))
            .await
            .unwrap();
        assert_eq!(result.intent.category(), Category::Ranking);
        assert_eq!(
            result.sql_query.statement(),
            "SELECT region, SUM(sales_amount) FROM business_data GROUP BY region"
        );
        let stats = engine.api_statistics();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.remaining_calls, stats.daily_limit - 2);
    }

    #[test]
    fn test_catalog_and_validation() {
        let engine = AiEngine::local();
        let catalog = engine.supported_queries();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.iter().all(|entry| entry.examples.len() == 3));
        assert!(engine.validate_query("显示过去3个月的销售趋势").valid);
        assert!(!engine.validate_query("hi").valid);
    }
}
