use anyhow::{Context, Result};
use clap::Parser;
use dap_engine::config::EngineConfig;
use dap_engine::{AiEngine, DapError, QueryRequest, SchemaDescriptor};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dap-engine")]
#[command(about = "Turn an analytic question into an intent, a safe SQL query and a chart type")]
struct Args {
    /// The question in natural language
    query: String,

    /// Main table to query (default: business_data)
    #[arg(short, long)]
    table: Option<String>,

    /// Comma-separated column names of the main table
    #[arg(short, long, value_delimiter = ',')]
    columns: Vec<String>,

    /// JSON file holding an array of preview rows
    #[arg(short, long)]
    preview: Option<PathBuf>,

    /// Never call the external completion service
    #[arg(long)]
    local_only: bool,

    /// Only run the query text validation
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::from_env()?;
    if args.local_only {
        config.api_key = None;
    }
    let engine = AiEngine::new(config);

    if args.validate {
        let report = engine.validate_query(&args.query);
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.valid {
            std::process::exit(2);
        }
        return Ok(());
    }

    let mut request = QueryRequest::new(args.query);
    if args.table.is_some() || !args.columns.is_empty() {
        let defaults = SchemaDescriptor::default();
        let columns: Vec<String> = args
            .columns
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        request.schema = Some(SchemaDescriptor::new(
            args.table.unwrap_or(defaults.main_table),
            if columns.is_empty() { defaults.columns } else { columns },
        ));
    }
    if let Some(path) = &args.preview {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preview file {}", path.display()))?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Preview file {} is not a JSON array", path.display()))?;
        info!("Loaded {} preview rows", rows.len());
        request.data_preview = Some(rows);
    }

    match engine.process_query(request).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    }
}

fn report_error(e: &DapError) {
    error!("{}", e);
    eprintln!("error_type: {}", e.error_type());
    eprintln!("message: {}", e.user_message());
    for suggestion in e.suggestions() {
        eprintln!("  - {}", suggestion);
    }
}
