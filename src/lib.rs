pub mod chart;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod lexicon;
pub mod llm;
pub mod models;
pub mod nlp;
pub mod preprocess;
pub mod rate_limiter;
pub mod refiner;
pub mod safety;
pub mod sql_generator;
pub mod sql_optimizer;
pub mod validation;

// Re-export the pipeline entry points
pub use engine::AiEngine;
pub use error::{DapError, Result};
pub use models::{Category, ChartType, Intent, QueryRequest, QueryResult, SchemaDescriptor, SqlQuery};
