//! Map a markdown or text report to structured JSON.

use anyhow::{Context, Result};
use clap::Parser;
use medical_report_extractor::config::Config;
use medical_report_extractor::llm::MistralChatClient;
use medical_report_extractor::mapper::ReportMapper;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "md-to-json",
    version,
    about = "Convert a medical report from markdown to JSON"
)]
struct Args {
    /// Path to the input markdown file
    input_file: PathBuf,

    /// Optional path to the output JSON file; stdout when omitted
    #[arg(long = "output-file", alias = "output_file")]
    output_file: Option<PathBuf>,

    /// Type of medical report: therapy or radiation
    #[arg(long = "report-type", alias = "report_type", default_value = "therapy")]
    report_type: String,

    /// Chat model override
    #[arg(long, env = "MISTRAL_CHAT_MODEL")]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;
    medical_report_extractor::init_tracing(&config.log_filter);

    let text = tokio::fs::read_to_string(&args.input_file)
        .await
        .with_context(|| format!("reading {}", args.input_file.display()))?;

    let mut client = MistralChatClient::new(&config, config.http_client()?)?;
    if let Some(model) = args.model {
        client = client.with_model(model);
    }
    let mapper = ReportMapper::new(Arc::new(client));

    let report = mapper.map(&text, &args.report_type).await?;
    let json = serde_json::to_string_pretty(&report)?;

    match args.output_file {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote {}", path.display());
            println!("Output written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
