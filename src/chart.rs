//! Chart Selector
//!
//! Category gives the base chart; a data preview, when supplied, can override
//! it based on the shape of its first row.

use crate::models::{Category, ChartType, Intent};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Substrings that mark a preview column as temporal.
pub const TIME_KEYWORDS: &[&str] = &["date", "time", "created", "updated", "timestamp"];

const PIE_MAX_ROWS: usize = 5;
const BAR_MAX_ROWS: usize = 20;
const TABLE_MIN_ROWS: usize = 50;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("preview row is not an object: {0}")]
    NotAnObject(String),
}

/// Features of a data preview, read from its first row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataShape {
    pub has_time_series: bool,
    pub has_categories: bool,
    pub has_numeric: bool,
    pub column_count: usize,
    pub row_count: usize,
}

impl DataShape {
    pub fn inspect(rows: &[Value]) -> Result<Self, PreviewError> {
        let sample = match rows.first() {
            Some(Value::Object(map)) => map,
            Some(other) => return Err(PreviewError::NotAnObject(other.to_string())),
            None => {
                return Ok(Self {
                    has_time_series: false,
                    has_categories: false,
                    has_numeric: false,
                    column_count: 0,
                    row_count: 0,
                })
            }
        };

        Ok(Self {
            has_time_series: sample.keys().any(|key| is_time_field(key)),
            has_categories: sample.values().any(is_categorical),
            has_numeric: sample.values().any(is_numeric),
            column_count: sample.len(),
            row_count: rows.len(),
        })
    }
}

fn is_time_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    TIME_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn is_categorical(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().parse::<f64>().is_err())
}

pub fn base_chart(category: Category) -> ChartType {
    match category {
        Category::Trend => ChartType::Line,
        Category::Comparison | Category::Ranking => ChartType::Bar,
        Category::Statistics => ChartType::Number,
        Category::Proportion => ChartType::Pie,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChartSelector;

impl ChartSelector {
    pub fn new() -> Self {
        Self
    }

    /// Never fails; an unreadable preview yields [`ChartType::Table`].
    pub fn select(&self, intent: &Intent, preview: Option<&[Value]>) -> ChartType {
        let base = base_chart(intent.category());
        let rows = match preview {
            Some(rows) if !rows.is_empty() => rows,
            _ => return base,
        };

        match DataShape::inspect(rows) {
            Ok(shape) => {
                let chart = refine(base, &shape);
                debug!("Chart for {}: base {}, refined {} ({:?})", intent.category(), base, chart, shape);
                chart
            }
            Err(e) => {
                warn!("Chart refinement failed ({}), using table", e);
                ChartType::Table
            }
        }
    }
}

fn refine(base: ChartType, shape: &DataShape) -> ChartType {
    if shape.has_time_series && shape.has_numeric {
        ChartType::Line
    } else if shape.has_categories && shape.has_numeric {
        match shape.row_count {
            n if n <= PIE_MAX_ROWS => ChartType::Pie,
            n if n <= BAR_MAX_ROWS => ChartType::Bar,
            _ => ChartType::Table,
        }
    } else if shape.column_count == 1 {
        ChartType::Number
    } else if shape.row_count > TABLE_MIN_ROWS {
        ChartType::Table
    } else {
        base
    }
}

/// Minimal ECharts-style option object binding `rows` to `chart_type`.
pub fn chart_config(chart_type: ChartType, rows: &[Value]) -> Value {
    let fields: Vec<&String> = match rows.first() {
        Some(Value::Object(map)) => map.keys().collect(),
        _ => return json!({}),
    };
    let cell = |row: &Value, i: usize| -> Value {
        fields
            .get(i)
            .and_then(|field| row.get(field.as_str()))
            .cloned()
            .unwrap_or(Value::Null)
    };
    let label = |value: Value| -> String {
        match value {
            Value::String(s) => s,
            other => other.to_string(),
        }
    };

    match chart_type {
        ChartType::Bar | ChartType::Line => {
            let (x, y) = if chart_type == ChartType::Line {
                line_axes(&fields, rows)
            } else {
                (0, 1)
            };
            let categories: Vec<String> = rows.iter().map(|row| label(cell(row, x))).collect();
            let values: Vec<Value> = rows.iter().map(|row| cell(row, y)).collect();
            let title = if chart_type == ChartType::Line {
                "Trend analysis"
            } else {
                "Analysis result"
            };
            json!({
                "title": {"text": title},
                "tooltip": {"trigger": "axis"},
                "xAxis": {"type": "category", "data": categories},
                "yAxis": {"type": "value"},
                "series": [{
                    "name": fields.get(y).map(|f| f.as_str()).unwrap_or("value"),
                    "type": chart_type.as_str(),
                    "data": values,
                }],
            })
        }
        ChartType::Pie => {
            let data: Vec<Value> = if fields.len() >= 2 {
                rows.iter()
                    .map(|row| json!({"name": label(cell(row, 0)), "value": cell(row, 1)}))
                    .collect()
            } else {
                Vec::new()
            };
            json!({
                "title": {"text": "Proportion analysis"},
                "tooltip": {"trigger": "item"},
                "series": [{"name": "share", "type": "pie", "radius": "50%", "data": data}],
            })
        }
        ChartType::Number => {
            let first = rows.first().and_then(Value::as_object).and_then(|row| {
                row.iter().find(|(_, v)| is_numeric(v)).map(|(k, v)| (k.clone(), v.clone()))
            });
            match first {
                Some((name, value)) => json!({
                    "title": {"text": name},
                    "series": [{"type": "number", "data": [value]}],
                }),
                None => json!({}),
            }
        }
        ChartType::Table => json!({
            "title": {"text": "Data result"},
            "columns": fields,
            "rows": rows,
        }),
    }
}

/// Line charts put the first temporal field on the x-axis and the first other
/// numeric field on the y-axis, whatever the column order.
fn line_axes(fields: &[&String], rows: &[Value]) -> (usize, usize) {
    let x = fields.iter().position(|f| is_time_field(f)).unwrap_or(0);
    let first = rows.first();
    let y = (0..fields.len())
        .filter(|&i| i != x)
        .find(|&i| {
            first
                .and_then(|row| row.get(fields[i].as_str()))
                .map_or(false, is_numeric)
        })
        .unwrap_or(if x == 0 { 1 } else { 0 });
    (x, y)
}
