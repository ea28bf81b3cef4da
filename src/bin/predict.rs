use anyhow::{Context, Result};
use clap::Parser;
use profitscout::application::ml::inference::{ClipMode, InferenceAdapter};
use profitscout::config::Config;
use profitscout::domain::market::candle::Candle;
use profitscout::domain::ml::prediction::PredictionResponse;
use profitscout::infrastructure::ModelStore;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

/// Reads a JSON array of candles on stdin and writes one prediction as JSON
/// on stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the model bundle (overrides MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// per_call or frozen (overrides CLIP_MODE)
    #[arg(long)]
    clip_mode: Option<String>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries only the response
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let args = Args::parse();
    let (response, code) = match run(args) {
        Ok(response) => (response, ExitCode::SUCCESS),
        Err(e) => {
            error!("Prediction request failed: {:#}", e);
            (PredictionResponse::fallback(format!("{:#}", e)), ExitCode::FAILURE)
        }
    };

    match serde_json::to_string(&response) {
        Ok(json) => {
            println!("{}", json);
            code
        }
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<PredictionResponse> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;
    let candles: Vec<Candle> = serde_json::from_str(&input).context("Invalid candle JSON")?;

    let mut config = Config::from_env()?;
    if let Some(dir) = args.model_dir {
        config.model.model_dir = dir;
    }
    if let Some(mode) = args.clip_mode {
        config.model.clip_mode = mode.parse::<ClipMode>()?;
    }

    let bundle = ModelStore::new(&config.model.model_dir).load()?;
    let adapter = InferenceAdapter::new(bundle, config.model.clip_mode);
    Ok(adapter.predict(&candles))
}
