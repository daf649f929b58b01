//! Optional external polishing of template SQL. Any failure keeps the
//! template statement; safety validation runs afterwards either way.

use crate::config::EngineConfig;
use crate::llm::{CompletionRequest, CompletionService, LlmClient};
use crate::models::{Intent, SchemaDescriptor};
use crate::rate_limiter::DailyCallLimiter;
use chrono::Utc;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const OPTIMIZER_PROMPT: &str = "You are an expert SQL optimizer. Given a base SQL query and the \
query intent behind it:
1. Improve its performance and readability
2. Keep the syntax correct
3. Adjust the logic to match the intent
4. Return only the optimized SQL, without explanation

Rules:
- SELECT statements only
- No DDL or DML of any kind
- Keep the SQL concise";

const OPTIMIZER_TEMPERATURE: f64 = 0.1;
const OPTIMIZER_MAX_TOKENS: u32 = 800;

lazy_static! {
    static ref SQL_BLOCK: Regex = Regex::new(r"(?s)```sql\s*\n(.*?)\n\s*```").unwrap();
}

pub struct SqlOptimizer {
    service: Arc<dyn CompletionService>,
    limiter: Arc<DailyCallLimiter>,
    timeout: Duration,
}

impl SqlOptimizer {
    pub fn new(service: Arc<dyn CompletionService>, limiter: Arc<DailyCallLimiter>, timeout: Duration) -> Self {
        Self {
            service,
            limiter,
            timeout,
        }
    }

    /// `None` unless optimization is enabled and credentials are present.
    pub fn from_config(config: &EngineConfig, limiter: Arc<DailyCallLimiter>) -> Option<Self> {
        if !config.enable_sql_optimization {
            return None;
        }
        let client = LlmClient::from_config(config)?;
        Some(Self::new(Arc::new(client), limiter, config.llm_timeout))
    }

    pub async fn optimize(&self, base_sql: &str, intent: &Intent, schema: &SchemaDescriptor) -> String {
        let call_number = match self.limiter.try_acquire() {
            Some(n) => n,
            None => return base_sql.to_string(),
        };

        let schema_json = serde_json::to_string_pretty(schema).unwrap_or_default();
        let request = CompletionRequest {
            system_prompt: OPTIMIZER_PROMPT.to_string(),
            user_prompt: format!(
                "Optimize this SQL query:\n\n```sql\n{}\n```\n\nIntent:\n- category: {}\n- entities: {}\n- time range: {}\n- dimensions: {}\n- metrics: {}\n\nSchema:\n```json\n{}\n```",
                base_sql,
                intent.category(),
                intent.entities().iter().join(", "),
                intent.time_range().unwrap_or("none"),
                intent.dimensions().join(", "),
                intent.metrics().join(", "),
                schema_json
            ),
            temperature: OPTIMIZER_TEMPERATURE,
            max_tokens: OPTIMIZER_MAX_TOKENS,
            timeout: self.timeout,
        };

        let started = Utc::now();
        let clock = Instant::now();
        let reply = tokio::time::timeout(self.timeout, self.service.complete(&request)).await;
        let candidate = match reply {
            Ok(Ok(content)) => Some(extract_sql(&content)),
            Ok(Err(e)) => {
                warn!("SQL optimization failed: {}", e);
                None
            }
            Err(_) => {
                warn!("SQL optimization timed out after {:?}", self.timeout);
                None
            }
        };

        let accepted = candidate.filter(|sql| parses(sql));
        self.limiter
            .record(started, clock.elapsed(), call_number, accepted.is_some());

        match accepted {
            Some(sql) => {
                info!("⚡ Using optimized SQL");
                sql
            }
            None => {
                debug!("Keeping template SQL");
                base_sql.to_string()
            }
        }
    }
}

/// Contents of the first ```sql fence, or the whole reply.
pub fn extract_sql(content: &str) -> String {
    SQL_BLOCK
        .captures(content)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_else(|| content.trim().to_string())
}

fn parses(sql: &str) -> bool {
    match Parser::parse_sql(&GenericDialect {}, sql) {
        Ok(statements) => !statements.is_empty(),
        Err(e) => {
            warn!("Optimized SQL does not parse: {}", e);
            false
        }
    }
}
