use super::feature_table::FeatureTable;
use super::indicator_engine::{IndicatorEngine, MAX_LOOKBACK};
use super::labeling::LabelGenerator;
use super::outlier_normalizer::OutlierNormalizer;
use crate::domain::errors::PipelineError;
use crate::domain::market::candle::{Candle, sort_by_open_time};
use crate::domain::ml::feature_registry::FeatureRow;
use std::str::FromStr;
use tracing::{debug, info};

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
pub const DEFAULT_OVERLAP_ROWS: usize = 100;

/// How windowed history crosses chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkContinuity {
    /// Recompute each chunk from scratch with the previous chunk's last
    /// `rows` raw candles prepended, then discard those rows.
    Overlap { rows: usize },
    /// Keep one streaming engine alive across chunks.
    Carry,
}

impl FromStr for ChunkContinuity {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "carry" => Ok(ChunkContinuity::Carry),
            "overlap" => Ok(ChunkContinuity::Overlap {
                rows: DEFAULT_OVERLAP_ROWS,
            }),
            _ => Err(PipelineError::InvalidConfig {
                reason: format!("Invalid chunk continuity: {}. Must be 'carry' or 'overlap'", s),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BuilderSettings {
    pub chunk_size: usize,
    pub continuity: ChunkContinuity,
    /// Run the outlier normalizer on every chunk.
    pub normalize: bool,
    /// Attach labels; `None` builds unlabeled feature rows.
    pub labeler: Option<LabelGenerator>,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            continuity: ChunkContinuity::Carry,
            normalize: true,
            labeler: Some(LabelGenerator::default()),
        }
    }
}

/// One emitted training/evaluation row.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub open_time: i64,
    pub features: FeatureRow,
    pub label: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub chunks: usize,
    pub skipped_chunks: usize,
    pub raw_rows: usize,
    pub emitted_rows: usize,
    pub positive_labels: usize,
}

enum Continuation {
    Overlap { rows: usize, tail: Vec<Candle> },
    Carry { engine: IndicatorEngine },
}

/// Builds feature rows from a candle source one bounded chunk at a time.
pub struct ChunkedFeatureBuilder {
    settings: BuilderSettings,
}

impl ChunkedFeatureBuilder {
    pub fn new(settings: BuilderSettings) -> Result<Self, PipelineError> {
        if settings.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig {
                reason: "chunk size must be positive".to_string(),
            });
        }
        if let ChunkContinuity::Overlap { rows } = settings.continuity
            && rows < MAX_LOOKBACK
        {
            return Err(PipelineError::InvalidConfig {
                reason: format!(
                    "overlap of {} rows is shorter than the {}-row lookback",
                    rows, MAX_LOOKBACK
                ),
            });
        }
        Ok(Self { settings })
    }

    /// Collects every emitted row.
    pub fn build<I>(&self, source: I) -> Result<Vec<FeatureRecord>, PipelineError>
    where
        I: IntoIterator<Item = Result<Candle, PipelineError>>,
    {
        let mut records = Vec::new();
        self.for_each_chunk(source, |mut chunk| {
            records.append(&mut chunk);
            Ok(())
        })?;
        Ok(records)
    }

    /// Streams the source in chunks and hands each chunk's rows to `sink`.
    /// Chunks that produce no valid rows are skipped.
    pub fn for_each_chunk<I, F>(&self, source: I, mut sink: F) -> Result<BuildSummary, PipelineError>
    where
        I: IntoIterator<Item = Result<Candle, PipelineError>>,
        F: FnMut(Vec<FeatureRecord>) -> Result<(), PipelineError>,
    {
        let mut state = match self.settings.continuity {
            ChunkContinuity::Overlap { rows } => Continuation::Overlap {
                rows,
                tail: Vec::new(),
            },
            ChunkContinuity::Carry => Continuation::Carry {
                engine: IndicatorEngine::new(),
            },
        };
        let mut summary = BuildSummary::default();
        let mut buffer = Vec::with_capacity(self.settings.chunk_size);

        for candle in source {
            buffer.push(candle?);
            if buffer.len() == self.settings.chunk_size {
                let chunk = std::mem::replace(&mut buffer, Vec::with_capacity(self.settings.chunk_size));
                self.process_chunk(chunk, &mut state, &mut summary, &mut sink)?;
            }
        }
        if !buffer.is_empty() {
            self.process_chunk(buffer, &mut state, &mut summary, &mut sink)?;
        }

        info!(
            "Feature build complete: {} chunks ({} skipped), {} raw rows, {} rows emitted",
            summary.chunks, summary.skipped_chunks, summary.raw_rows, summary.emitted_rows
        );
        Ok(summary)
    }

    fn process_chunk<F>(
        &self,
        chunk: Vec<Candle>,
        state: &mut Continuation,
        summary: &mut BuildSummary,
        sink: &mut F,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(Vec<FeatureRecord>) -> Result<(), PipelineError>,
    {
        summary.chunks += 1;
        let first_row = summary.raw_rows;
        summary.raw_rows += chunk.len();
        info!(
            "Processing chunk {}, rows {}-{}",
            summary.chunks,
            first_row,
            summary.raw_rows
        );

        let records = match state {
            Continuation::Overlap { rows, tail } => self.process_overlap(chunk, *rows, tail),
            Continuation::Carry { engine } => self.process_carry(chunk, engine),
        };

        if records.is_empty() {
            summary.skipped_chunks += 1;
            debug!("Chunk {} produced no valid rows, skipping", summary.chunks);
            return Ok(());
        }

        let positives = records.iter().filter(|r| r.label == Some(1)).count();
        summary.emitted_rows += records.len();
        summary.positive_labels += positives;
        debug!(
            "Chunk {} emitted {} rows ({} positive)",
            summary.chunks,
            records.len(),
            positives
        );
        sink(records)
    }

    fn process_overlap(
        &self,
        chunk: Vec<Candle>,
        overlap: usize,
        tail: &mut Vec<Candle>,
    ) -> Vec<FeatureRecord> {
        let carried = tail.len();
        let mut window = std::mem::take(tail);
        window.extend(chunk);
        sort_by_open_time(&mut window);

        let mut table = FeatureTable::with_capacity(window.len());
        IndicatorEngine::new().extend(&window, &mut table);
        let records = self.finish_table(table, window.len(), carried);

        *tail = window[window.len().saturating_sub(overlap)..].to_vec();
        records
    }

    fn process_carry(&self, mut chunk: Vec<Candle>, engine: &mut IndicatorEngine) -> Vec<FeatureRecord> {
        sort_by_open_time(&mut chunk);
        let mut table = FeatureTable::with_capacity(chunk.len());
        engine.extend(&chunk, &mut table);
        self.finish_table(table, chunk.len(), 0)
    }

    /// Normalizes and labels a computed window, then emits complete rows from
    /// `skip` onward.
    fn finish_table(&self, mut table: FeatureTable, window_len: usize, skip: usize) -> Vec<FeatureRecord> {
        if self.settings.normalize {
            OutlierNormalizer::normalize(&mut table);
        }
        let labels = self
            .settings
            .labeler
            .map(|l| l.label_table(&table, l.horizon_for_chunk(window_len)));

        (skip..table.len())
            .filter_map(|i| {
                table.feature_row(i).map(|features| FeatureRecord {
                    open_time: table.open_time()[i],
                    features,
                    label: labels.as_ref().map(|l| l[i]),
                })
            })
            .collect()
    }
}
