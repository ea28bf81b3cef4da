use anyhow::{Result, bail};
use clap::Parser;
use profitscout::application::features::engineer_features;
use profitscout::application::features::outlier_normalizer::ClipPolicy;
use profitscout::application::ml::evaluation::{
    BACKTEST_CONFIDENCE, ClassificationReport, EVALUATION_BATCH_SIZE, SWEEP_THRESHOLDS, backtest,
    predict_in_batches, threshold_sweep,
};
use profitscout::application::ml::inference::{ClipMode, InferenceAdapter};
use profitscout::config::Config;
use profitscout::infrastructure::ModelStore;
use profitscout::infrastructure::candle_csv;
use std::path::PathBuf;
use tracing::info;

const MAX_TEST_ROWS: usize = 50_000;
const TEST_SHARE: f64 = 0.2;
const PREVIEW_PREDICTIONS: usize = 5;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate a trained model on the most recent candles", long_about = None)]
struct Args {
    /// Candle CSV export (overrides DATA_PATH)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory holding the model bundle (overrides MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// per_call or frozen (overrides CLIP_MODE)
    #[arg(long)]
    clip_mode: Option<String>,

    /// Rows fed to the live prediction check
    #[arg(long, default_value_t = 1000)]
    live_rows: usize,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Setup logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(input) = args.input {
        config.features.data_path = input;
    }
    if let Some(dir) = args.model_dir {
        config.model.model_dir = dir;
    }
    if let Some(mode) = args.clip_mode {
        config.model.clip_mode = mode.parse::<ClipMode>()?;
    }

    info!("Loading trained model...");
    let bundle = ModelStore::new(&config.model.model_dir).load()?;

    let data_path = &config.features.data_path;
    let total_rows = candle_csv::count_rows(data_path)?;
    let test_size = MAX_TEST_ROWS.min((total_rows as f64 * TEST_SHARE) as usize);
    let candles = candle_csv::read_tail(data_path, test_size)?;
    info!("Test data shape: {} of {} rows", candles.len(), total_rows);

    let policy = match (config.model.clip_mode, &bundle.clip_bounds) {
        (ClipMode::Frozen, Some(bounds)) => ClipPolicy::Frozen(bounds),
        _ => ClipPolicy::PerCall,
    };
    let table = engineer_features(&candles, policy);
    let labeler = config.features.labeler();
    let labels = labeler.label_table(&table, labeler.lookforward_periods);

    let mut x = Vec::with_capacity(table.len());
    let mut y = Vec::with_capacity(table.len());
    for (i, label) in labels.iter().enumerate() {
        if let Some(row) = table.feature_row(i) {
            x.push(row.select(&bundle.feature_columns));
            y.push(*label);
        }
    }
    if x.is_empty() {
        bail!("No valid data for evaluation after cleaning");
    }
    info!("Evaluation data shape: ({}, {})", x.len(), bundle.feature_columns.len());

    let (predictions, probabilities) = predict_in_batches(
        bundle.scaler.as_ref(),
        bundle.classifier.as_ref(),
        &x,
        EVALUATION_BATCH_SIZE,
    )?;

    let report = ClassificationReport::compute(&y, &predictions, &probabilities);
    let positives = y.iter().filter(|l| **l == 1).count();
    println!("\nLabel distribution: 0 = {}, 1 = {}", y.len() - positives, positives);
    println!("\nClassification Report:");
    println!("{}", report);

    let result = backtest(&y, &probabilities, BACKTEST_CONFIDENCE, labeler.profit_threshold);
    if result.signals > 0 {
        println!("\nBacktest Results (Confidence >= {}):", result.threshold);
        println!("Total signals: {}", result.signals);
        println!("Correct signals: {}", result.correct_signals);
        println!("Precision: {:.4}", result.precision);
        println!(
            "Expected profit per signal: {:.4} ({}% * precision)",
            result.expected_profit_per_signal,
            labeler.profit_threshold * 100.0
        );
    } else {
        println!("\nNo signals generated with confidence >= {}", BACKTEST_CONFIDENCE);
    }

    println!("\nTesting different confidence thresholds:");
    for sweep in threshold_sweep(&y, &probabilities, &SWEEP_THRESHOLDS, labeler.profit_threshold) {
        println!(
            "Threshold {}: {} signals, {:.4} precision",
            sweep.threshold, sweep.signals, sweep.precision
        );
    }

    // Live check through the same path the prediction service uses
    let live = &candles[candles.len().saturating_sub(args.live_rows)..];
    info!("Using last {} rows for live prediction test", live.len());
    let adapter = InferenceAdapter::new(bundle, config.model.clip_mode);

    println!("\nPredictions for last {} data points:", PREVIEW_PREDICTIONS);
    println!("{}", "-".repeat(60));
    for k in (0..PREVIEW_PREDICTIONS.min(live.len())).rev() {
        let window = &live[..live.len() - k];
        let response = adapter.predict(window);
        if let Some(error) = &response.error {
            println!("Data point {}: {}", window.len(), error);
            continue;
        }
        println!("Data point {}:", window.len());
        println!(
            "  Prediction: {}",
            if response.prediction == 1 { "PROFIT OPPORTUNITY" } else { "NO PROFIT" }
        );
        println!("  Confidence: {:.4}", response.probability);
        println!("  Recommendation: {}", response.recommendation);
        println!();
    }
    Ok(())
}
