use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use matterscope::config::Config;
use matterscope::error::{LlmError, PipelineError};
use matterscope::legal::audit::AuditLog;
use matterscope::legal::dataset::MatterDataset;
use matterscope::legal::render::{
    ResultTable, attorney_matters_tables, conflict_report_tables, recommendation_tables,
    render_tables_html, render_tables_text, retrieval_tables,
};
use matterscope::llm::{ChatMessage, HttpLlmClient, LlmClient};
use matterscope::pipeline::Advisor;
use matterscope::settings::Settings;

#[derive(Parser)]
#[command(
    name = "matterscope",
    version,
    about = "Recommend counsel and run conflict checks against the firm's matters"
)]
struct Cli {
    /// TOML settings file; environment variables override it
    #[arg(long, global = true, env = "MATTERSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Matters dataset (overrides MATTERS_DATASET_PATH)
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Number of similar matters to retrieve
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend attorneys for a described matter
    Recommend {
        /// Description of the prospective work
        query: String,
    },

    /// Check a prospective client for conflicts of interest
    Conflicts {
        /// Client name to look up
        client: String,
    },

    /// Show the matters retrieval would pick, without calling the model
    Retrieve {
        /// Description of the prospective work
        query: String,
    },

    /// List every matter handled by an attorney
    Matters {
        /// Attorney name as it appears in the dataset
        attorney: String,
    },
}

impl Commands {
    fn needs_model(&self) -> bool {
        matches!(self, Self::Recommend { .. } | Self::Conflicts { .. })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Html,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Stands in for the model on commands that never call it, so those work
/// without an API key.
struct ModelDisabled;

#[async_trait]
impl LlmClient for ModelDisabled {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Err(LlmError::RequestFailed {
            status: None,
            reason: "model calls are disabled for this command".to_string(),
        })
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matterscope=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let mut config = Config::resolve(&settings).context("invalid configuration")?;
    if let Some(path) = &cli.dataset {
        config.dataset.path = path.clone();
    }
    if let Some(top_k) = cli.top_k {
        anyhow::ensure!(top_k > 0, "--top-k must be greater than zero");
        config.retrieval.top_k = top_k;
    }
    Ok(config)
}

fn build_advisor(config: Config, needs_model: bool) -> Result<Advisor> {
    let dataset = MatterDataset::load(&config.dataset).map_err(PipelineError::from)?;

    let llm: Arc<dyn LlmClient> = if needs_model {
        Arc::new(HttpLlmClient::new(config.llm).context("model client is not configured")?)
    } else {
        Arc::new(ModelDisabled)
    };

    Ok(Advisor::new(&config.retrieval, Arc::new(dataset), llm)
        .with_audit(AuditLog::new(&config.audit)))
}

fn emit<T: Serialize>(format: OutputFormat, tables: &[ResultTable], value: &T) -> Result<()> {
    let out = match format {
        OutputFormat::Text => render_tables_text(tables),
        OutputFormat::Html => render_tables_html(tables).map_err(PipelineError::from)?,
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
    };
    println!("{out}");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let advisor = build_advisor(config, cli.command.needs_model())?;

    match &cli.command {
        Commands::Recommend { query } => {
            let rec = advisor.recommend(query).await?;
            emit(cli.format, &recommendation_tables(&rec), &rec)
        }
        Commands::Conflicts { client } => {
            let report = advisor.conflict_check(client).await?;
            emit(cli.format, &conflict_report_tables(&report), &report)
        }
        Commands::Retrieve { query } => {
            let retrieval = advisor.retrieve_only(query)?;
            emit(cli.format, &retrieval_tables(&retrieval), &retrieval)
        }
        Commands::Matters { attorney } => {
            let listing = advisor.matters_for(attorney);
            emit(cli.format, &attorney_matters_tables(&listing), &listing)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<PipelineError>() {
                Some(pipeline) => eprintln!("{}", pipeline.user_message()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
