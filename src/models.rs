//! Request-scoped data model: intents, generated statements, chart types.

use crate::error::{DapError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The five kinds of analytic question the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Trend,
    Comparison,
    Ranking,
    Statistics,
    Proportion,
}

impl Category {
    /// Enumeration order; classifier ties resolve to the earliest entry.
    pub const ALL: [Category; 5] = [
        Category::Trend,
        Category::Comparison,
        Category::Ranking,
        Category::Statistics,
        Category::Proportion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Trend => "trend",
            Category::Comparison => "comparison",
            Category::Ranking => "ranking",
            Category::Statistics => "statistics",
            Category::Proportion => "proportion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_lowercase())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Trend => "Trend analysis",
            Category::Comparison => "Comparison analysis",
            Category::Ranking => "Ranking analysis",
            Category::Statistics => "Statistical summary",
            Category::Proportion => "Proportion analysis",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Category::Trend => "How a metric changes over time",
            Category::Comparison => "Compare a metric across groups or categories",
            Category::Ranking => "Order groups by a metric and keep the top entries",
            Category::Statistics => "Aggregate statistics such as totals and averages",
            Category::Proportion => "Share of each part in the whole",
        }
    }

    pub fn examples(&self) -> &'static [&'static str] {
        match self {
            Category::Trend => &["显示过去3个月的销售趋势", "分析今年用户增长情况", "sales trend over the past 6 months"],
            Category::Comparison => &["对比各部门的销售业绩", "比较不同产品的市场表现", "compare revenue by region"],
            Category::Ranking => &["销售额TOP10的产品", "业绩最好的销售人员排名", "top 5 products by sales"],
            Category::Statistics => &["本月总销售额统计", "平均客单价是多少", "average order value this month"],
            Category::Proportion => &["各产品销售占比", "各渠道的客户分布", "revenue share by channel"],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recommended visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Number,
    Table,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Number => "number",
            ChartType::Table => "table",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable working copy of an intent, finalized through [`Intent::new`].
#[derive(Debug, Clone)]
pub struct IntentDraft {
    pub category: Category,
    pub entities: BTreeSet<String>,
    pub time_range: Option<String>,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filters: BTreeMap<String, serde_json::Value>,
    pub confidence: f64,
}

impl IntentDraft {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            entities: BTreeSet::new(),
            time_range: None,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: BTreeMap::new(),
            confidence: 0.0,
        }
    }
}

/// Structured interpretation of one question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    category: Category,
    entities: BTreeSet<String>,
    time_range: Option<String>,
    dimensions: Vec<String>,
    metrics: Vec<String>,
    filters: BTreeMap<String, serde_json::Value>,
    confidence: f64,
}

impl Intent {
    /// Finalizes a draft: confidence is clamped to [0, 1] and rounded to two decimals.
    pub fn new(draft: IntentDraft) -> Result<Self> {
        if !draft.confidence.is_finite() {
            return Err(DapError::IntentParsing {
                message: format!("confidence is not a finite number: {}", draft.confidence),
            });
        }
        Ok(Self {
            category: draft.category,
            entities: draft.entities,
            time_range: draft.time_range.filter(|t| !t.trim().is_empty()),
            dimensions: draft.dimensions,
            metrics: draft.metrics,
            filters: draft.filters,
            confidence: round2(draft.confidence.clamp(0.0, 1.0)),
        })
    }

    /// Category-only intent with zero confidence.
    pub(crate) fn unscored(category: Category) -> Self {
        Self {
            category,
            entities: BTreeSet::new(),
            time_range: None,
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: BTreeMap::new(),
            confidence: 0.0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn entities(&self) -> &BTreeSet<String> {
        &self.entities
    }

    pub fn time_range(&self) -> Option<&str> {
        self.time_range.as_deref()
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn filters(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.filters
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A generated, safety-checked statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlQuery {
    statement: String,
    parameters: BTreeMap<String, serde_json::Value>,
    estimated_cost: u32,
    safety_score: f64,
}

impl SqlQuery {
    pub(crate) fn new(statement: String, estimated_cost: u32, safety_score: f64) -> Self {
        Self {
            statement,
            parameters: BTreeMap::new(),
            estimated_cost,
            safety_score,
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn parameters(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.parameters
    }

    pub fn estimated_cost(&self) -> u32 {
        self.estimated_cost
    }

    pub fn safety_score(&self) -> f64 {
        self.safety_score
    }
}

/// Caller-supplied description of the table a question is asked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub main_table: String,
    pub columns: Vec<String>,
}

impl SchemaDescriptor {
    pub fn new(main_table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            main_table: main_table.into(),
            columns,
        }
    }
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::new(
            "business_data",
            [
                "date",
                "department",
                "product_name",
                "sales_amount",
                "customer_count",
                "region",
                "created_at",
                "updated_at",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub natural_query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Overrides the engine's default schema for this request.
    #[serde(default)]
    pub schema: Option<SchemaDescriptor>,
    #[serde(default)]
    pub data_preview: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl QueryRequest {
    pub fn new(natural_query: impl Into<String>) -> Self {
        Self {
            natural_query: natural_query.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query_id: String,
    pub intent: Intent,
    pub sql_query: SqlQuery,
    pub recommended_chart: ChartType,
    pub chart_config: Option<serde_json::Value>,
    pub data: Option<Vec<serde_json::Value>>,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}
