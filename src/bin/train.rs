use anyhow::{Context, Result, bail};
use clap::Parser;
use profitscout::application::features::chunked_builder::ChunkedFeatureBuilder;
use profitscout::application::ml::training::{LabeledDataset, Trainer, fit_clip_bounds};
use profitscout::config::Config;
use profitscout::domain::ml::feature_registry::Feature;
use profitscout::infrastructure::ModelStore;
use profitscout::infrastructure::candle_csv;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the profit-opportunity classifier", long_about = None)]
struct Args {
    /// Candle CSV export (overrides DATA_PATH)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory the model bundle is written to (overrides MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// random_forest or sgd_logistic (overrides CLASSIFIER)
    #[arg(long)]
    classifier: Option<String>,

    /// Rows per processing chunk (overrides CHUNK_SIZE)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Number of trees in the random forest
    #[arg(long)]
    n_trees: Option<usize>,

    /// Maximum depth of trees
    #[arg(long)]
    max_depth: Option<u16>,

    /// Minimum samples required to split an internal node
    #[arg(long)]
    min_split: Option<usize>,

    /// Minimum samples required at a leaf node
    #[arg(long)]
    min_leaf: Option<usize>,

    /// Where the held-out rows are exported
    #[arg(long, default_value = "test_set.csv")]
    test_set: PathBuf,

    /// Do not persist clip bounds; inference then normalizes per request.
    #[arg(long)]
    no_clip_bounds: bool,
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
    if let Some(kind) = args.classifier {
        config.model.classifier = kind.parse()?;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.features.chunk_size = chunk_size;
    }
    if let Some(n_trees) = args.n_trees {
        config.model.forest.n_trees = n_trees;
    }
    if let Some(max_depth) = args.max_depth {
        config.model.forest.max_depth = max_depth;
    }
    if let Some(min_split) = args.min_split {
        config.model.forest.min_samples_split = min_split;
    }
    if let Some(min_leaf) = args.min_leaf {
        config.model.forest.min_samples_leaf = min_leaf;
    }

    let data_path = &config.features.data_path;
    if !data_path.exists() {
        bail!("Training data not found at {:?}", data_path);
    }
    info!("Loading data from {:?}", data_path);
    let total_rows = candle_csv::count_rows(data_path)?;
    info!("Total rows in dataset: {}", total_rows);

    let builder = ChunkedFeatureBuilder::new(config.features.builder_settings())?;
    let mut records = Vec::new();
    let summary = builder
        .for_each_chunk(candle_csv::read_candles(data_path)?, |mut chunk| {
            records.append(&mut chunk);
            Ok(())
        })
        .context("Feature build failed")?;
    info!(
        "Built {} labeled rows from {} chunks ({} skipped), {} positive",
        summary.emitted_rows, summary.chunks, summary.skipped_chunks, summary.positive_labels
    );

    let columns = Feature::ALL.to_vec();
    let dataset = LabeledDataset::from_records(&records, &columns)?;
    info!("Combined data shape: ({}, {})", dataset.len(), columns.len());
    info!(
        "Target distribution: 0 = {}, 1 = {}",
        dataset.len() - dataset.positives(),
        dataset.positives()
    );
    info!("Profit opportunity percentage: {:.2}%", dataset.positive_rate() * 100.0);

    let clip_bounds = (!args.no_clip_bounds).then(|| fit_clip_bounds(&records));
    drop(records);

    let trainer = Trainer::new(config.model.training_settings())?;
    let outcome = trainer.train(&dataset, columns, clip_bounds)?;

    candle_csv::write_test_set(
        &args.test_set,
        &outcome.model.feature_columns,
        &outcome.test.open_time,
        &outcome.test.x,
        &outcome.test.y,
    )?;

    println!("\nClassification Report:");
    println!("{}", outcome.report);

    info!("Saving model and scaler...");
    ModelStore::new(&config.model.model_dir).save(&outcome.model)?;
    info!("Model training completed!");
    Ok(())
}
