//! Top-class calibration bins and expected calibration error
//!
//! Winning-class confidence is bucketed into equal-width bins over [0, 1];
//! the last bin is closed so a confidence of exactly 1.0 lands in it.

use serde::Serialize;

/// Parallel per-bin sequences; every bin is present, empty ones count 0
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBins {
    pub bin_mid: Vec<f64>,
    #[serde(rename = "acc")]
    pub accuracy: Vec<f64>,
    #[serde(rename = "conf")]
    pub mean_confidence: Vec<f64>,
    pub count: Vec<u64>,
}

impl CalibrationBins {
    /// Bin `(confidence, correct)` observations into `num_bins` bins.
    pub fn compute(observations: &[(f64, bool)], num_bins: usize) -> Self {
        let num_bins = num_bins.max(1);
        let mut conf_sum = vec![0.0; num_bins];
        let mut correct = vec![0u64; num_bins];
        let mut count = vec![0u64; num_bins];

        for &(conf, hit) in observations {
            let bin = bin_index(conf, num_bins);
            conf_sum[bin] += conf;
            count[bin] += 1;
            if hit {
                correct[bin] += 1;
            }
        }

        let per_bin = |total: &dyn Fn(usize) -> f64| -> Vec<f64> {
            (0..num_bins)
                .map(|b| {
                    if count[b] == 0 {
                        0.0
                    } else {
                        total(b) / count[b] as f64
                    }
                })
                .collect()
        };

        Self {
            bin_mid: (0..num_bins)
                .map(|b| (b as f64 + 0.5) / num_bins as f64)
                .collect(),
            accuracy: per_bin(&|b| correct[b] as f64),
            mean_confidence: per_bin(&|b| conf_sum[b]),
            count,
        }
    }

    pub fn total(&self) -> u64 {
        self.count.iter().sum()
    }

    /// `Σ (count_i / N) * |accuracy_i - bin_mid_i|`, 0 for an empty set.
    pub fn expected_calibration_error(&self) -> f64 {
        let n = self.total();
        if n == 0 {
            return 0.0;
        }
        self.count
            .iter()
            .zip(&self.accuracy)
            .zip(&self.bin_mid)
            .map(|((&c, &acc), &mid)| (c as f64 / n as f64) * (acc - mid).abs())
            .sum()
    }
}

fn bin_index(conf: f64, num_bins: usize) -> usize {
    let raw = (conf.clamp(0.0, 1.0) * num_bins as f64) as usize;
    raw.min(num_bins - 1)
}
