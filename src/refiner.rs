//! External Intent Refiner
//!
//! Asks the completion service for a richer intent. Every failure mode is a
//! [`FallbackReason`]; nothing here is surfaced to the caller as an error.

use crate::config::EngineConfig;
use crate::error::Result;
use crate::llm::{extract_json_object, CompletionRequest, CompletionService, LlmClient};
use crate::models::{Category, Intent, IntentDraft};
use crate::rate_limiter::DailyCallLimiter;
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const SYSTEM_PROMPT: &str = r#"You are an expert at interpreting data analysis questions.
Users describe what they want to analyse in natural language (often Chinese). Extract:
1. category: trend, comparison, ranking, statistics or proportion
2. entities: business objects and metrics mentioned (products, departments, customers, revenue ...)
3. time_range: the time range asked about, or null
4. dimensions: grouping axes
5. metrics: quantitative fields
6. filters: filter conditions as an object
7. confidence: your certainty between 0 and 1

Return strictly one JSON object:
{
  "category": "trend|comparison|ranking|statistics|proportion",
  "entities": ["entity1", "entity2"],
  "time_range": "time range",
  "dimensions": ["dimension1"],
  "metrics": ["metric1"],
  "filters": {},
  "confidence": 0.95
}"#;

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    MissingCredentials,
    RateLimited,
    Timeout(Duration),
    Transport(String),
    MalformedResponse(String),
    IncompleteIntent(Vec<&'static str>),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::MissingCredentials => write!(f, "completion service not configured"),
            FallbackReason::RateLimited => write!(f, "daily call limit reached"),
            FallbackReason::Timeout(t) => write!(f, "no response within {:?}", t),
            FallbackReason::Transport(e) => write!(f, "transport failure: {}", e),
            FallbackReason::MalformedResponse(e) => write!(f, "malformed response: {}", e),
            FallbackReason::IncompleteIntent(missing) => {
                write!(f, "response missing fields: {}", missing.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefinementOutcome {
    Refined(Intent),
    Fallback(FallbackReason),
}

impl RefinementOutcome {
    pub fn is_refined(&self) -> bool {
        matches!(self, RefinementOutcome::Refined(_))
    }

    /// The refined intent, or whatever `fallback` computes from the reason.
    pub fn or_fallback<F>(self, fallback: F) -> Result<Intent>
    where
        F: FnOnce(FallbackReason) -> Result<Intent>,
    {
        match self {
            RefinementOutcome::Refined(intent) => Ok(intent),
            RefinementOutcome::Fallback(reason) => fallback(reason),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RefinedPayload {
    #[serde(alias = "query_type")]
    category: String,
    entities: Vec<String>,
    #[serde(default)]
    time_range: Option<String>,
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    metrics: Vec<String>,
    #[serde(default)]
    filters: BTreeMap<String, serde_json::Value>,
    confidence: f64,
}

pub struct IntentRefiner {
    service: Option<Arc<dyn CompletionService>>,
    limiter: Arc<DailyCallLimiter>,
    temperature: f64,
    max_tokens: u32,
}

impl IntentRefiner {
    pub fn new(service: Option<Arc<dyn CompletionService>>, limiter: Arc<DailyCallLimiter>) -> Self {
        Self {
            service,
            limiter,
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn from_config(config: &EngineConfig, limiter: Arc<DailyCallLimiter>) -> Self {
        let service = LlmClient::from_config(config)
            .map(|client| Arc::new(client) as Arc<dyn CompletionService>);
        Self::new(service, limiter).with_sampling(config.temperature, config.max_tokens)
    }

    pub fn with_sampling(mut self, temperature: f64, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn limiter(&self) -> &Arc<DailyCallLimiter> {
        &self.limiter
    }

    /// Whether a call would be attempted right now.
    pub fn is_available(&self) -> bool {
        self.service.is_some() && !self.limiter.is_exhausted()
    }

    /// One attempt, bounded by `timeout`. The call runs on its own task, so a
    /// caller that stops waiting does not cancel it; it completes or times out
    /// and is still recorded against the limiter.
    pub async fn refine(&self, text: &str, guess: Category, timeout: Duration) -> RefinementOutcome {
        let service = match &self.service {
            Some(service) => Arc::clone(service),
            None => return RefinementOutcome::Fallback(FallbackReason::MissingCredentials),
        };
        let call_number = match self.limiter.try_acquire() {
            Some(n) => n,
            None => return RefinementOutcome::Fallback(FallbackReason::RateLimited),
        };

        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: format!(
                "Parse this query: \"{}\"\n\nInitial classification: {}\n\nReturn the JSON result only.",
                text, guess
            ),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout,
        };
        let limiter = Arc::clone(&self.limiter);

        let task = tokio::spawn(async move {
            let started = Utc::now();
            let clock = Instant::now();
            let reply = tokio::time::timeout(timeout, service.complete(&request)).await;
            let outcome = match reply {
                Err(_) => RefinementOutcome::Fallback(FallbackReason::Timeout(timeout)),
                Ok(Err(e)) => RefinementOutcome::Fallback(FallbackReason::Transport(e.to_string())),
                Ok(Ok(body)) => match parse_refined_intent(&body) {
                    Ok(intent) => RefinementOutcome::Refined(intent),
                    Err(reason) => RefinementOutcome::Fallback(reason),
                },
            };
            limiter.record(started, clock.elapsed(), call_number, outcome.is_refined());
            outcome
        });

        let outcome = task.await.unwrap_or_else(|e| {
            RefinementOutcome::Fallback(FallbackReason::Transport(format!("refinement task failed: {}", e)))
        });
        match &outcome {
            RefinementOutcome::Refined(intent) => info!(
                "🤖 Refined intent: {} (confidence {:.2})",
                intent.category(),
                intent.confidence()
            ),
            RefinementOutcome::Fallback(reason) => warn!("Intent refinement fell back: {}", reason),
        }
        outcome
    }
}

/// Validates and converts a completion body into an [`Intent`].
pub fn parse_refined_intent(body: &str) -> std::result::Result<Intent, FallbackReason> {
    let map = extract_json_object(body).ok_or_else(|| {
        FallbackReason::MalformedResponse("no JSON object in response".to_string())
    })?;

    let mut missing = Vec::new();
    if !map.contains_key("category") && !map.contains_key("query_type") {
        missing.push("category");
    }
    if !map.contains_key("entities") {
        missing.push("entities");
    }
    if !map.contains_key("confidence") {
        missing.push("confidence");
    }
    if !missing.is_empty() {
        return Err(FallbackReason::IncompleteIntent(missing));
    }

    let payload: RefinedPayload = serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| FallbackReason::MalformedResponse(e.to_string()))?;
    let category = Category::from_str(&payload.category).ok_or_else(|| {
        FallbackReason::MalformedResponse(format!("unknown category '{}'", payload.category))
    })?;

    let mut draft = IntentDraft::new(category);
    draft.entities = payload.entities.into_iter().collect();
    draft.time_range = payload.time_range;
    draft.dimensions = payload.dimensions;
    draft.metrics = payload.metrics;
    draft.filters = payload.filters;
    draft.confidence = payload.confidence;

    Intent::new(draft).map_err(|e| FallbackReason::MalformedResponse(e.to_string()))
}
