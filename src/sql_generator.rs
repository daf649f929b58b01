//! SQL Template Builder
//!
//! One fixed template per category, filled from the intent and the caller's
//! schema descriptor. Filling never fails on missing intent fields; every
//! placeholder has a schema-agnostic default.

use crate::error::{DapError, Result};
use crate::lexicon::{column_aliases, TIME_COLUMN_KEYWORDS};
use crate::models::{Category, Intent, SchemaDescriptor, SqlQuery};
use crate::safety::{CostEstimator, SafetyValidator};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const DEFAULT_LIMIT: u32 = 10;
const DEFAULT_DIMENSION: &str = "category";
const DEFAULT_METRIC: &str = "sales_amount";
const DEFAULT_TIME_DIMENSION: &str = "created_at";
const ALWAYS_TRUE: &str = "1=1";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref TABLE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap();
    static ref ROLLING_RANGE: Regex = Regex::new(r"^past (\d{1,4}) (day|week|month|year)$").unwrap();
}

/// Resolved placeholder values for one template.
#[derive(Debug, Clone)]
struct TemplateParams {
    table: String,
    dimensions: String,
    metrics: String,
    primary_metric: String,
    dimension: String,
    metric: String,
    time_dimension: String,
    filters: String,
    time_filter: String,
    limit: u32,
}

fn render(category: Category, p: &TemplateParams) -> String {
    match category {
        Category::Trend => format!(
            "SELECT {td}, {metrics}\nFROM {table}\nWHERE {filters} AND {time}\nGROUP BY {td}\nORDER BY {td}",
            td = p.time_dimension,
            metrics = p.metrics,
            table = p.table,
            filters = p.filters,
            time = p.time_filter,
        ),
        Category::Comparison => format!(
            "SELECT {dims}, {metrics}\nFROM {table}\nWHERE {filters} AND {time}\nGROUP BY {dims}\nORDER BY {primary} DESC",
            dims = p.dimensions,
            metrics = p.metrics,
            table = p.table,
            filters = p.filters,
            time = p.time_filter,
            primary = p.primary_metric,
        ),
        Category::Ranking => format!(
            "SELECT {dims}, {metrics}\nFROM {table}\nWHERE {filters} AND {time}\nGROUP BY {dims}\nORDER BY {primary} DESC\nLIMIT {limit}",
            dims = p.dimensions,
            metrics = p.metrics,
            table = p.table,
            filters = p.filters,
            time = p.time_filter,
            primary = p.primary_metric,
            limit = p.limit,
        ),
        Category::Statistics => format!(
            "SELECT COUNT(*) AS total_count, AVG({m}) AS avg_value, SUM({m}) AS sum_value, MAX({m}) AS max_value, MIN({m}) AS min_value\nFROM {table}\nWHERE {filters} AND {time}",
            m = p.metric,
            table = p.table,
            filters = p.filters,
            time = p.time_filter,
        ),
        Category::Proportion => format!(
            "SELECT {d}, SUM({m}) AS total, ROUND(SUM({m}) * 100.0 / SUM(SUM({m})) OVER (), 2) AS percentage\nFROM {table}\nWHERE {filters} AND {time}\nGROUP BY {d}\nORDER BY total DESC",
            d = p.dimension,
            m = p.metric,
            table = p.table,
            filters = p.filters,
            time = p.time_filter,
        ),
    }
}

#[derive(Debug, Clone)]
pub struct SqlGenerator {
    validator: SafetyValidator,
    estimator: CostEstimator,
    limit: u32,
}

impl Default for SqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlGenerator {
    pub fn new() -> Self {
        Self {
            validator: SafetyValidator::new(),
            estimator: CostEstimator::new(),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Template fill, safety check and cost estimate in one step.
    pub fn build_query(&self, intent: &Intent, schema: &SchemaDescriptor) -> Result<SqlQuery> {
        let statement = self.template_sql(intent, schema)?;
        self.finalize(statement)
    }

    /// Fills the category template. Fails only on an unusable table name.
    pub fn template_sql(&self, intent: &Intent, schema: &SchemaDescriptor) -> Result<String> {
        let table = schema.main_table.trim();
        if !TABLE_NAME.is_match(table) {
            return Err(DapError::SqlGeneration(format!(
                "invalid main table name '{}'",
                schema.main_table
            )));
        }
        let columns: Vec<&str> = schema
            .columns
            .iter()
            .map(|c| c.trim())
            .filter(|c| IDENTIFIER.is_match(c))
            .collect();

        let dimensions = map_terms_to_columns(intent.dimensions(), &columns);
        let metrics = map_terms_to_columns(intent.metrics(), &columns);
        debug!("Mapped dimensions {:?}, metrics {:?}", dimensions, metrics);

        let aggregated: Vec<String> = metrics.iter().map(|m| format!("SUM({})", m)).collect();
        let params = TemplateParams {
            table: table.to_string(),
            dimensions: if dimensions.is_empty() {
                "1".to_string()
            } else {
                dimensions.iter().join(", ")
            },
            metrics: if aggregated.is_empty() {
                "COUNT(*)".to_string()
            } else {
                aggregated.iter().join(", ")
            },
            primary_metric: aggregated
                .first()
                .cloned()
                .unwrap_or_else(|| "COUNT(*)".to_string()),
            dimension: dimensions
                .first()
                .map(|d| d.to_string())
                .unwrap_or_else(|| DEFAULT_DIMENSION.to_string()),
            metric: metrics
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| DEFAULT_METRIC.to_string()),
            time_dimension: time_dimension(&columns),
            filters: build_filters(intent.filters()),
            time_filter: build_time_filter(intent.time_range(), &columns),
            limit: self.limit,
        };

        Ok(render(intent.category(), &params))
    }

    /// Safety check and cost estimate for a finished statement.
    pub fn finalize(&self, statement: String) -> Result<SqlQuery> {
        let safety_score = self.validator.check(&statement)?;
        let estimated_cost = self.estimator.estimate(&statement);
        info!("📝 SQL ready (safety {:.2}, cost {})", safety_score, estimated_cost);
        Ok(SqlQuery::new(statement, estimated_cost, safety_score))
    }
}

/// Maps each term to the first column containing it (or contained in it),
/// trying the term itself before its aliases. Unmatched terms are dropped.
pub fn map_terms_to_columns<'a>(terms: &[String], columns: &[&'a str]) -> Vec<&'a str> {
    let mut mapped: Vec<&'a str> = Vec::new();
    for term in terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let hit = std::iter::once(term)
            .chain(column_aliases(term).iter().copied())
            .find_map(|candidate| find_column(candidate, columns));
        if let Some(column) = hit {
            if !mapped.contains(&column) {
                mapped.push(column);
            }
        }
    }
    mapped
}

fn find_column<'a>(candidate: &str, columns: &[&'a str]) -> Option<&'a str> {
    let candidate = candidate.to_lowercase();
    columns.iter().copied().find(|column| {
        let column = column.to_lowercase();
        column.contains(&candidate) || candidate.contains(&column)
    })
}

fn time_column<'a>(columns: &[&'a str]) -> Option<&'a str> {
    columns.iter().copied().find(|column| {
        let lower = column.to_lowercase();
        TIME_COLUMN_KEYWORDS.iter().any(|kw| lower.contains(kw))
    })
}

fn time_dimension(columns: &[&str]) -> String {
    columns
        .iter()
        .find(|column| {
            let lower = column.to_lowercase();
            ["date", "time", "created"].iter().any(|kw| lower.contains(kw))
        })
        .map(|column| column.to_string())
        .unwrap_or_else(|| DEFAULT_TIME_DIMENSION.to_string())
}

fn build_time_filter(time_range: Option<&str>, columns: &[&str]) -> String {
    let (range, col) = match (time_range, time_column(columns)) {
        (Some(range), Some(col)) => (range.trim().to_lowercase(), col),
        _ => return ALWAYS_TRUE.to_string(),
    };

    if let Some(caps) = ROLLING_RANGE.captures(&range) {
        return format!("{} >= CURRENT_DATE - INTERVAL '{} {}'", col, &caps[1], &caps[2]);
    }

    match range.as_str() {
        "today" => format!("{} >= CURRENT_DATE", col),
        "yesterday" => format!(
            "{c} >= CURRENT_DATE - INTERVAL '1 day' AND {c} < CURRENT_DATE",
            c = col
        ),
        "this week" => format!("{} >= DATE_TRUNC('week', CURRENT_DATE)", col),
        "last week" => format!(
            "{c} >= DATE_TRUNC('week', CURRENT_DATE - INTERVAL '1 week') AND {c} < DATE_TRUNC('week', CURRENT_DATE)",
            c = col
        ),
        "this month" => format!("{} >= DATE_TRUNC('month', CURRENT_DATE)", col),
        "last month" => format!(
            "{c} >= DATE_TRUNC('month', CURRENT_DATE - INTERVAL '1 month') AND {c} < DATE_TRUNC('month', CURRENT_DATE)",
            c = col
        ),
        "this year" => format!("{} >= DATE_TRUNC('year', CURRENT_DATE)", col),
        "last year" => format!(
            "{c} >= DATE_TRUNC('year', CURRENT_DATE - INTERVAL '1 year') AND {c} < DATE_TRUNC('year', CURRENT_DATE)",
            c = col
        ),
        other => {
            debug!("Unrecognized time range '{}', no time filter", other);
            ALWAYS_TRUE.to_string()
        }
    }
}

/// Backslashes are doubled before quotes so neither can end the literal early.
fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

fn build_filters(filters: &BTreeMap<String, serde_json::Value>) -> String {
    use serde_json::Value;

    let conditions: Vec<String> = filters
        .iter()
        .filter_map(|(key, value)| {
            if !IDENTIFIER.is_match(key) {
                warn!("Dropping filter with unusable key '{}'", key);
                return None;
            }
            match value {
                Value::String(s) => Some(format!("{} LIKE '%{}%'", key, escape_literal(s))),
                Value::Number(n) => Some(format!("{} = {}", key, n)),
                Value::Bool(b) => Some(format!("{} = {}", key, b)),
                Value::Null => Some(format!("{} IS NULL", key)),
                Value::Array(_) | Value::Object(_) => {
                    warn!("Dropping non-scalar filter '{}'", key);
                    None
                }
            }
        })
        .collect();

    if conditions.is_empty() {
        ALWAYS_TRUE.to_string()
    } else {
        conditions.join(" AND ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntentDraft;
    use crate::nlp::IntentParser;
    use serde_json::json;

    fn intent(draft: IntentDraft) -> Intent {
        Intent::new(draft).unwrap()
    }

    #[test]
    fn test_trend_query_on_default_schema() {
        let intent = IntentParser::local().classify("显示过去3个月的销售趋势");
        let query = SqlGenerator::new()
            .build_query(&intent, &SchemaDescriptor::default())
            .unwrap();
        let sql = query.statement();
        assert!(sql.starts_with("SELECT date, "));
        assert!(sql.contains("date >= CURRENT_DATE - INTERVAL '3 month'"));
        assert!(sql.contains("GROUP BY date"));
        assert_eq!(query.safety_score(), 0.9);
        assert_eq!(query.estimated_cost(), 3);
    }

    #[test]
    fn test_every_category_fills_with_nothing_known() {
        let generator = SqlGenerator::new();
        let schema = SchemaDescriptor::new("t", Vec::new());
        for category in Category::ALL {
            let query = generator
                .build_query(&intent(IntentDraft::new(category)), &schema)
                .unwrap();
            assert!(query.statement().contains("FROM t"));
            assert!(query.statement().contains("WHERE 1=1 AND 1=1"));
            assert!(query.safety_score() >= 0.8);
        }
    }

    #[test]
    fn test_defaults_per_template() {
        let generator = SqlGenerator::new();
        let schema = SchemaDescriptor::new("t", Vec::new());
        let stats = generator
            .template_sql(&intent(IntentDraft::new(Category::Statistics)), &schema)
            .unwrap();
        assert!(stats.contains("AVG(sales_amount)"));

        let ranking = generator
            .template_sql(&intent(IntentDraft::new(Category::Ranking)), &schema)
            .unwrap();
        assert!(ranking.starts_with("SELECT 1, COUNT(*)"));
        assert!(ranking.ends_with("LIMIT 10"));

        let top3 = SqlGenerator::new()
            .with_limit(3)
            .template_sql(&intent(IntentDraft::new(Category::Ranking)), &schema)
            .unwrap();
        assert!(top3.ends_with("LIMIT 3"));

        let proportion = generator
            .template_sql(&intent(IntentDraft::new(Category::Proportion)), &schema)
            .unwrap();
        assert!(proportion.starts_with("SELECT category, SUM(sales_amount)"));

        let trend = generator
            .template_sql(&intent(IntentDraft::new(Category::Trend)), &schema)
            .unwrap();
        assert!(trend.starts_with("SELECT created_at, COUNT(*)"));
    }

    #[test]
    fn test_comparison_maps_aliases() {
        let mut draft = IntentDraft::new(Category::Comparison);
        draft.dimensions = vec!["部门".to_string(), "地区".to_string()];
        draft.metrics = vec!["销售额".to_string()];
        let sql = SqlGenerator::new()
            .template_sql(&intent(draft), &SchemaDescriptor::default())
            .unwrap();
        assert!(sql.starts_with("SELECT department, region, SUM(sales_amount)"));
        assert!(sql.contains("GROUP BY department, region"));
        assert!(sql.contains("ORDER BY SUM(sales_amount) DESC"));
    }

    #[test]
    fn test_column_mapping_is_bidirectional_and_deduplicated() {
        let columns = ["sales_amount", "region", "date"];
        let terms = vec![
            "SALES".to_string(),
            "销售额".to_string(),
            "region_code".to_string(),
            "unknown".to_string(),
            " ".to_string(),
        ];
        assert_eq!(map_terms_to_columns(&terms, &columns), vec!["sales_amount", "region"]);
    }

    #[test]
    fn test_filters_rendering() {
        let mut filters = BTreeMap::new();
        filters.insert("region".to_string(), json!("O'Brien"));
        filters.insert("amount".to_string(), json!(100));
        filters.insert("active".to_string(), json!(true));
        filters.insert("deleted_at".to_string(), json!(null));
        filters.insert("tags".to_string(), json!(["a"]));
        filters.insert("bad key".to_string(), json!("x"));
        assert_eq!(
            build_filters(&filters),
            "active = true AND amount = 100 AND deleted_at IS NULL AND region LIKE '%O''Brien%'"
        );
        assert_eq!(build_filters(&BTreeMap::new()), "1=1");
    }

    #[test]
    fn test_trailing_backslash_cannot_escape_the_quote() {
        let mut filters = BTreeMap::new();
        filters.insert("region".to_string(), json!("north\\"));
        assert_eq!(build_filters(&filters), r"region LIKE '%north\\%'");

        filters.insert("region".to_string(), json!("a\\' OR 1=1 OR 'b"));
        assert_eq!(build_filters(&filters), r"region LIKE '%a\\'' OR 1=1 OR ''b%'");
    }

    #[test]
    fn test_time_filters() {
        let cols = ["order_date", "region"];
        assert_eq!(build_time_filter(Some("today"), &cols), "order_date >= CURRENT_DATE");
        assert!(build_time_filter(Some("last year"), &cols).contains("DATE_TRUNC('year'"));
        assert_eq!(
            build_time_filter(Some("past 2 week"), &cols),
            "order_date >= CURRENT_DATE - INTERVAL '2 week'"
        );
        assert_eq!(build_time_filter(Some("next decade"), &cols), "1=1");
        assert_eq!(build_time_filter(None, &cols), "1=1");
        assert_eq!(build_time_filter(Some("today"), &["region"]), "1=1");
    }

    #[test]
    fn test_invalid_table_is_generation_error() {
        let schema = SchemaDescriptor::new("t; DROP TABLE x", Vec::new());
        let err = SqlGenerator::new()
            .build_query(&intent(IntentDraft::new(Category::Trend)), &schema)
            .unwrap_err();
        assert_eq!(err.error_type(), "SQL_GENERATION_ERROR");
    }

    #[test]
    fn test_unsafe_statement_is_blocked() {
        let err = SqlGenerator::new()
            .finalize("DROP TABLE x".to_string())
            .unwrap_err();
        match err {
            DapError::SqlSafety { safety_score, .. } => assert_eq!(safety_score, 0.0),
            other => panic!("expected safety error, got {:?}", other),
        }
    }

    #[test]
    fn test_string_filter_with_comment_sequence_is_blocked() {
        let mut draft = IntentDraft::new(Category::Statistics);
        draft.filters.insert("region".to_string(), json!("east'--"));
        let err = SqlGenerator::new()
            .build_query(&intent(draft), &SchemaDescriptor::default())
            .unwrap_err();
        assert_eq!(err.error_type(), "SQL_SAFETY_ERROR");
    }
}
