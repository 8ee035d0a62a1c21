//! Min-max feature scaling to [0, 1]

/// Per-column min-max scaler
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    range: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit column minima and ranges over `rows`
    pub fn fit(rows: &[Vec<f64>]) -> Option<Self> {
        let width = rows.first()?.len();
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];
        for row in rows {
            for (j, &v) in row.iter().enumerate().take(width) {
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }
        let range = min.iter().zip(&max).map(|(lo, hi)| hi - lo).collect();
        Some(Self { min, range })
    }

    /// Fit a single-column scaler
    pub fn fit_column(values: &[f64]) -> Option<Self> {
        let rows: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
        Self::fit(&rows)
    }

    pub fn width(&self) -> usize {
        self.min.len()
    }

    /// Scale a row; constant columns map to 0
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.min.iter().zip(&self.range))
            .map(|(v, (lo, range))| if *range > 0.0 { (v - lo) / range } else { 0.0 })
            .collect()
    }

    pub fn transform_value(&self, column: usize, value: f64) -> f64 {
        let range = self.range[column];
        if range > 0.0 {
            (value - self.min[column]) / range
        } else {
            0.0
        }
    }

    pub fn inverse_value(&self, column: usize, scaled: f64) -> f64 {
        scaled * self.range[column] + self.min[column]
    }
}
