use crate::domain::ml::feature_registry::{FEATURE_COUNT, Feature, FeatureRow};

/// One engineered row before normalization: `None` where a window is still
/// warming up, `Some` possibly non-finite where arithmetic overflowed.
pub type RawRow = [Option<f64>; FEATURE_COUNT];

/// Column-major table of engineered features, ordered by open time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    open_time: Vec<i64>,
    columns: Vec<Vec<Option<f64>>>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(rows: usize) -> Self {
        Self {
            open_time: Vec::with_capacity(rows),
            columns: (0..FEATURE_COUNT)
                .map(|_| Vec::with_capacity(rows))
                .collect(),
        }
    }

    pub fn push_row(&mut self, open_time: i64, row: RawRow) {
        self.open_time.push(open_time);
        for (column, cell) in self.columns.iter_mut().zip(row) {
            column.push(cell);
        }
    }

    pub fn len(&self) -> usize {
        self.open_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_time.is_empty()
    }

    pub fn open_time(&self) -> &[i64] {
        &self.open_time
    }

    pub fn column(&self, feature: Feature) -> &[Option<f64>] {
        &self.columns[feature.index()]
    }

    pub fn column_mut(&mut self, feature: Feature) -> &mut Vec<Option<f64>> {
        &mut self.columns[feature.index()]
    }

    /// Column as floats with missing cells as NaN.
    pub fn values(&self, feature: Feature) -> Vec<f64> {
        self.column(feature)
            .iter()
            .map(|c| c.unwrap_or(f64::NAN))
            .collect()
    }

    pub fn cell(&self, row: usize, feature: Feature) -> Option<f64> {
        self.columns[feature.index()].get(row).copied().flatten()
    }

    pub fn raw_row(&self, row: usize) -> RawRow {
        let mut cells = [None; FEATURE_COUNT];
        for (slot, column) in cells.iter_mut().zip(&self.columns) {
            *slot = column[row];
        }
        cells
    }

    /// The row as a complete feature vector, `None` if any cell is unusable.
    pub fn feature_row(&self, row: usize) -> Option<FeatureRow> {
        FeatureRow::from_cells(&self.raw_row(row))
    }

    /// Number of finite cells in the row among `features`.
    pub fn available_count(&self, row: usize, features: &[Feature]) -> usize {
        features
            .iter()
            .filter(|f| self.cell(row, **f).is_some_and(f64::is_finite))
            .count()
    }

    /// Removes the first `n` rows.
    pub fn drop_front(&mut self, n: usize) {
        let n = n.min(self.len());
        self.open_time.drain(..n);
        for column in &mut self.columns {
            column.drain(..n);
        }
    }

    pub fn append(&mut self, other: &mut FeatureTable) {
        self.open_time.append(&mut other.open_time);
        for (mine, theirs) in self.columns.iter_mut().zip(other.columns.iter_mut()) {
            mine.append(theirs);
        }
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = (Feature, &mut Vec<Option<f64>>)> {
        Feature::ALL.into_iter().zip(self.columns.iter_mut())
    }
}
