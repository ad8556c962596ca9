//! Confusion matrix, top confusions and macro F1

use serde::Serialize;

/// Square count table indexed `[true][pred]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConfusionMatrix {
    cells: Vec<Vec<u64>>,
}

/// One off-diagonal cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopConfusion {
    #[serde(rename = "true")]
    pub true_label: String,
    #[serde(rename = "pred")]
    pub pred_label: String,
    pub count: u64,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            cells: vec![vec![0; num_classes]; num_classes],
        }
    }

    /// Tally `(true, pred)` pairs.
    pub fn from_pairs(num_classes: usize, pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut cm = Self::new(num_classes);
        for (t, p) in pairs {
            cm.cells[t][p] += 1;
        }
        cm
    }

    pub fn num_classes(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, true_class: usize, pred_class: usize) -> u64 {
        self.cells[true_class][pred_class]
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.cells
    }

    pub fn row_sum(&self, true_class: usize) -> u64 {
        self.cells[true_class].iter().sum()
    }

    pub fn col_sum(&self, pred_class: usize) -> u64 {
        self.cells.iter().map(|row| row[pred_class]).sum()
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    pub fn off_diagonal_total(&self) -> u64 {
        self.total() - (0..self.num_classes()).map(|k| self.cells[k][k]).sum::<u64>()
    }

    /// Non-empty off-diagonal cells by descending count, row-major on ties,
    /// truncated to `limit`.
    pub fn top_confusions(&self, labels: &[String], limit: usize) -> Vec<TopConfusion> {
        let mut cells: Vec<(usize, usize, u64)> = Vec::new();
        for (t, row) in self.cells.iter().enumerate() {
            for (p, &count) in row.iter().enumerate() {
                if t != p && count > 0 {
                    cells.push((t, p, count));
                }
            }
        }
        cells.sort_by(|a, b| b.2.cmp(&a.2));
        cells
            .into_iter()
            .take(limit)
            .map(|(t, p, count)| TopConfusion {
                true_label: labels[t].clone(),
                pred_label: labels[p].clone(),
                count,
            })
            .collect()
    }

    /// Unweighted mean F1 over classes that occur in the truth or the
    /// predictions.
    pub fn macro_f1(&self) -> f64 {
        let mut sum = 0.0;
        let mut seen = 0usize;
        for k in 0..self.num_classes() {
            let tp = self.cells[k][k] as f64;
            let support = self.row_sum(k) as f64;
            let predicted = self.col_sum(k) as f64;
            if support + predicted == 0.0 {
                continue;
            }
            seen += 1;
            // 2tp / (2tp + fp + fn) == 2tp / (support + predicted)
            sum += 2.0 * tp / (support + predicted);
        }
        if seen == 0 {
            0.0
        } else {
            sum / seen as f64
        }
    }
}
