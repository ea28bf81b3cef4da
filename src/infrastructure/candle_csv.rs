use crate::domain::errors::PipelineError;
use crate::domain::market::candle::Candle;
use crate::domain::ml::feature_registry::Feature;
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use tracing::info;

fn source_error(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Source {
        reason: format!("{}: {}", path.display(), e),
    }
}

/// Streams candles from an exchange export CSV.
///
/// Rows are numbered from 1 (the first data row) in `MalformedCandle` errors.
pub fn read_candles(path: &Path) -> Result<impl Iterator<Item = Result<Candle, PipelineError>>, PipelineError> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| source_error(path, e))?;
    info!("Streaming candles from {:?}", path);

    Ok(reader
        .into_deserialize::<Candle>()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| PipelineError::MalformedCandle {
                row: i + 1,
                reason: e.to_string(),
            })
        }))
}

/// Number of data rows, without parsing them.
pub fn count_rows(path: &Path) -> Result<usize, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| source_error(path, e))?;
    let mut record = csv::ByteRecord::new();
    let mut rows = 0;
    while reader.read_byte_record(&mut record).map_err(|e| source_error(path, e))? {
        rows += 1;
    }
    Ok(rows)
}

/// The last `n` candles of the file, keeping at most `n` in memory.
pub fn read_tail(path: &Path, n: usize) -> Result<Vec<Candle>, PipelineError> {
    let mut tail = VecDeque::with_capacity(n);
    for candle in read_candles(path)? {
        let candle = candle?;
        if n == 0 {
            continue;
        }
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(candle);
    }
    Ok(tail.into())
}

/// Writes held-out rows as `open_time, <feature columns>, target`.
pub fn write_test_set(
    path: &Path,
    columns: &[Feature],
    open_time: &[i64],
    rows: &[Vec<f64>],
    labels: &[u8],
) -> Result<(), PipelineError> {
    let file = File::create(path).map_err(|e| source_error(path, e))?;
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    let header = std::iter::once("open_time")
        .chain(columns.iter().map(|f| f.name()))
        .chain(std::iter::once("target"));
    wtr.write_record(header).map_err(|e| source_error(path, e))?;

    for ((t, row), label) in open_time.iter().zip(rows).zip(labels) {
        let record = std::iter::once(t.to_string())
            .chain(row.iter().map(|v| v.to_string()))
            .chain(std::iter::once(label.to_string()));
        wtr.write_record(record).map_err(|e| source_error(path, e))?;
    }
    wtr.flush().map_err(|e| source_error(path, e))?;

    info!("Test set saved to {:?} with {} rows", path, rows.len());
    Ok(())
}
