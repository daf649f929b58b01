use thiserror::Error;

#[derive(Error, Debug)]
pub enum DapError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        suggestions: Vec<String>,
    },

    #[error("Intent parsing error: {message}")]
    IntentParsing { message: String },

    #[error("SQL safety error: score {safety_score:.2} below threshold")]
    SqlSafety { safety_score: f64, statement: String },

    #[error("SQL generation error: {0}")]
    SqlGeneration(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DapError {
    pub fn validation(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        DapError::Validation {
            message: message.into(),
            suggestions,
        }
    }

    /// Stable machine-readable tag for the transport layer.
    pub fn error_type(&self) -> &'static str {
        match self {
            DapError::Validation { .. } => "VALIDATION_ERROR",
            DapError::IntentParsing { .. } => "INTENT_PARSING_ERROR",
            DapError::SqlSafety { .. } => "SQL_SAFETY_ERROR",
            DapError::SqlGeneration(_) => "SQL_GENERATION_ERROR",
            DapError::Llm(_) => "LLM_ERROR",
            DapError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Message safe to show to the person who asked the question.
    pub fn user_message(&self) -> String {
        match self {
            DapError::Validation { message, .. } => message.clone(),
            DapError::IntentParsing { .. } => {
                "Could not understand the question, please try simpler wording.".to_string()
            }
            DapError::SqlSafety { .. } => {
                "The generated query contains unsafe operations and was blocked.".to_string()
            }
            DapError::SqlGeneration(_) => {
                "Could not build a valid query for this question, please rephrase it.".to_string()
            }
            DapError::Llm(_) | DapError::Config(_) => {
                "An internal error occurred while processing the question.".to_string()
            }
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            DapError::Validation { suggestions, .. } => suggestions.clone(),
            DapError::IntentParsing { .. } => vec![
                "Use simpler, more direct wording".to_string(),
                "State the time range explicitly, e.g. 'past 3 months'".to_string(),
                "Name the metric you care about, e.g. 'sales amount' or 'user count'".to_string(),
            ],
            DapError::SqlSafety { .. } => vec![
                "Ask a read-only question about the data".to_string(),
            ],
            DapError::SqlGeneration(_) => vec![
                "Mention a concrete metric and grouping, e.g. 'sales by region'".to_string(),
            ],
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types_are_stable() {
        let err = DapError::SqlSafety {
            safety_score: 0.0,
            statement: "DROP TABLE x".to_string(),
        };
        assert_eq!(err.error_type(), "SQL_SAFETY_ERROR");
        assert!(!err.suggestions().is_empty());

        let err = DapError::validation("too short", vec!["say more".to_string()]);
        assert_eq!(err.error_type(), "VALIDATION_ERROR");
        assert_eq!(err.user_message(), "too short");
        assert_eq!(err.suggestions(), vec!["say more".to_string()]);
    }

    #[test]
    fn test_internal_errors_share_one_user_message() {
        let llm = DapError::Llm("timeout".to_string());
        let config = DapError::Config("bad limit".to_string());
        assert_eq!(llm.error_type(), "LLM_ERROR");
        assert_eq!(config.error_type(), "CONFIG_ERROR");
        assert_eq!(llm.user_message(), config.user_message());
        assert!(config.suggestions().is_empty());
    }

    #[test]
    fn test_intent_parsing_has_remediation() {
        let err = DapError::IntentParsing {
            message: "confidence was NaN".to_string(),
        };
        assert_eq!(err.suggestions().len(), 3);
        assert!(err.to_string().contains("confidence was NaN"));
    }
}
