//! SQL Safety Validator and Cost Estimator
//!
//! Read-only guard for generated statements plus a structural cost heuristic.
//! The cost number is a rough signal, not a planner estimate.

use crate::error::{DapError, Result};
use crate::models::round2;
use lazy_static::lazy_static;
use regex::Regex;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::{debug, warn};

/// Statements scoring below this are never returned.
pub const SAFETY_THRESHOLD: f64 = 0.8;

const BASELINE_SCORE: f64 = 0.9;
const INJECTION_PENALTY: f64 = 0.3;
const NESTING_PENALTY: f64 = 0.1;
const MAX_SELECTS: usize = 3;
const MALFORMED_SCORE: f64 = 0.3;
const NOT_SELECT_SCORE: f64 = 0.2;

lazy_static! {
    static ref DENYLIST: Regex = Regex::new(
        r"(?i)\b(?:DROP|DELETE|TRUNCATE|ALTER|CREATE|INSERT|UPDATE|EXEC|EXECUTE|GRANT|REVOKE)\b"
    )
    .unwrap();
    static ref INJECTION: Regex = Regex::new(r#"['"];|--|/\*|\*/"#).unwrap();
    static ref SELECT_WORD: Regex = Regex::new(r"(?i)\bSELECT\b").unwrap();
    static ref JOIN_WORD: Regex = Regex::new(r"(?i)\bJOIN\b").unwrap();
    static ref COST_FEATURES: Vec<Regex> = [r"(?i)\bGROUP\s+BY\b", r"(?i)\bORDER\s+BY\b", r"(?i)\bDISTINCT\b", r"(?i)\bUNION\b"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementShape {
    SingleSelect,
    NotSelect,
    MultipleStatements,
    Unparseable,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SafetyValidator;

impl SafetyValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn contains_denylisted(&self, sql: &str) -> bool {
        DENYLIST.is_match(sql)
    }

    pub fn shape(&self, sql: &str) -> StatementShape {
        let dialect = GenericDialect {};
        let tokens = match Tokenizer::new(&dialect, sql).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!("Tokenizer rejected statement: {}", e);
                return StatementShape::Unparseable;
            }
        };

        let mut statements: Vec<Vec<Token>> = vec![Vec::new()];
        for token in tokens {
            match token {
                Token::Whitespace(_) | Token::EOF => {}
                Token::SemiColon => statements.push(Vec::new()),
                other => {
                    if let Some(current) = statements.last_mut() {
                        current.push(other);
                    }
                }
            }
        }
        statements.retain(|s| !s.is_empty());

        match statements.as_slice() {
            [single] => match single.first() {
                Some(Token::Word(word)) if word.keyword == Keyword::SELECT => {
                    StatementShape::SingleSelect
                }
                _ => StatementShape::NotSelect,
            },
            [] => StatementShape::NotSelect,
            _ => StatementShape::MultipleStatements,
        }
    }

    /// 0.0 exactly when a denylisted keyword is present.
    pub fn score(&self, sql: &str) -> f64 {
        if self.contains_denylisted(sql) {
            warn!("🚫 Denylisted keyword in statement");
            return 0.0;
        }

        match self.shape(sql) {
            StatementShape::SingleSelect => {}
            StatementShape::NotSelect => return NOT_SELECT_SCORE,
            StatementShape::MultipleStatements | StatementShape::Unparseable => {
                return MALFORMED_SCORE
            }
        }

        let mut score = BASELINE_SCORE;
        if INJECTION.is_match(sql) {
            score -= INJECTION_PENALTY;
        }
        if SELECT_WORD.find_iter(sql).count() > MAX_SELECTS {
            score -= NESTING_PENALTY;
        }
        round2(score.max(0.0))
    }

    /// Score, or [`DapError::SqlSafety`] below [`SAFETY_THRESHOLD`].
    pub fn check(&self, sql: &str) -> Result<f64> {
        let safety_score = self.score(sql);
        if safety_score < SAFETY_THRESHOLD {
            warn!("SQL blocked with safety score {:.2}", safety_score);
            return Err(DapError::SqlSafety {
                safety_score,
                statement: sql.to_string(),
            });
        }
        Ok(safety_score)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimator;

impl CostEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, sql: &str) -> u32 {
        let joins = JOIN_WORD.find_iter(sql).count() as u32;
        let subqueries = (SELECT_WORD.find_iter(sql).count() as u32).saturating_sub(1);
        let features = COST_FEATURES.iter().filter(|re| re.is_match(sql)).count() as u32;
        1 + joins * 2 + subqueries * 3 + features
    }
}
