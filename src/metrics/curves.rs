//! One-vs-rest ROC and precision/recall curves
//!
//! Both curves sweep the threshold over every distinct score of the
//! positive class, highest first, emitting one point per distinct score.

use serde::Serialize;

/// ROC curve, sorted by ascending false-positive rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Absent when the class has no positives or no negatives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auc: Option<f64>,
}

/// Precision/recall curve, sorted by ascending recall
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrCurve {
    pub recall: Vec<f64>,
    pub precision: Vec<f64>,
    /// Absent when the class has no positives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ap: Option<f64>,
}

/// Cumulative (true positives, false positives) after each distinct score.
fn sweep(scores: &[f64], positive: &[bool]) -> Vec<(f64, f64)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = Vec::new();
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &i) in order.iter().enumerate() {
        if positive[i] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let group_ends = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if group_ends {
            points.push((tp, fp));
        }
    }
    points
}

pub fn roc_curve(scores: &[f64], positive: &[bool]) -> RocCurve {
    let p = positive.iter().filter(|&&y| y).count() as f64;
    let n = positive.len() as f64 - p;
    if p == 0.0 || n == 0.0 {
        return RocCurve {
            fpr: vec![0.0, 1.0],
            tpr: vec![0.0, 1.0],
            auc: None,
        };
    }

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    for (tp, fp) in sweep(scores, positive) {
        fpr.push(fp / n);
        tpr.push(tp / p);
    }

    let auc = fpr
        .windows(2)
        .zip(tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    RocCurve {
        fpr,
        tpr,
        auc: Some(auc),
    }
}

pub fn pr_curve(scores: &[f64], positive: &[bool]) -> PrCurve {
    let p = positive.iter().filter(|&&y| y).count() as f64;
    if p == 0.0 {
        return PrCurve {
            recall: vec![0.0, 1.0],
            precision: vec![1.0, 0.0],
            ap: None,
        };
    }

    let mut recall = vec![0.0];
    let mut precision = vec![1.0];
    for (tp, fp) in sweep(scores, positive) {
        recall.push(tp / p);
        precision.push(tp / (tp + fp));
    }

    // step-wise: sum of (R_n - R_{n-1}) * P_n
    let ap = recall
        .windows(2)
        .zip(precision.iter().skip(1))
        .map(|(r, &prec)| (r[1] - r[0]) * prec)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    PrCurve {
        recall,
        precision,
        ap: Some(ap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_decreasing(v: &[f64]) -> bool {
        v.windows(2).all(|w| w[0] <= w[1])
    }

    #[test]
    fn test_perfect_separation() {
        let scores = [0.9, 0.8, 0.3, 0.1];
        let positive = [true, true, false, false];
        let roc = roc_curve(&scores, &positive);
        assert_eq!(roc.auc, Some(1.0));
        let pr = pr_curve(&scores, &positive);
        assert_eq!(pr.ap, Some(1.0));
    }

    #[test]
    fn test_known_auc_and_ap() {
        // sklearn: roc_auc_score([1,0,1,0],[0.8,0.6,0.4,0.2]) == 0.75
        let scores = [0.8, 0.6, 0.4, 0.2];
        let positive = [true, false, true, false];
        let roc = roc_curve(&scores, &positive);
        assert!((roc.auc.unwrap() - 0.75).abs() < 1e-12);

        // AP = 0.5 * 1 + 0.5 * (2/3)
        let pr = pr_curve(&scores, &positive);
        assert!((pr.ap.unwrap() - (0.5 + 1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_curves_monotonic_with_ties() {
        let scores = [0.5, 0.5, 0.5, 0.9, 0.1, 0.5, 0.7];
        let positive = [true, false, true, false, true, false, true];
        let roc = roc_curve(&scores, &positive);
        assert_eq!(roc.fpr.len(), roc.tpr.len());
        assert!(non_decreasing(&roc.fpr));
        assert!(non_decreasing(&roc.tpr));
        assert_eq!((roc.fpr[0], roc.tpr[0]), (0.0, 0.0));
        assert_eq!((*roc.fpr.last().unwrap(), *roc.tpr.last().unwrap()), (1.0, 1.0));
        // one point per distinct score plus the origin
        assert_eq!(roc.fpr.len(), 5);

        let pr = pr_curve(&scores, &positive);
        assert_eq!(pr.recall.len(), pr.precision.len());
        assert!(non_decreasing(&pr.recall));
        assert!(pr.precision.iter().all(|p| (0.0..=1.0).contains(p)));
        let ap = pr.ap.unwrap();
        assert!((0.0..=1.0).contains(&ap));
    }

    #[test]
    fn test_degenerate_classes() {
        let scores = [0.2, 0.4];
        let roc = roc_curve(&scores, &[false, false]);
        assert_eq!(roc.auc, None);
        let pr = pr_curve(&scores, &[false, false]);
        assert_eq!(pr.ap, None);

        // all positive: ROC undefined, PR fine
        assert_eq!(roc_curve(&scores, &[true, true]).auc, None);
        assert_eq!(pr_curve(&scores, &[true, true]).ap, Some(1.0));
    }

    #[test]
    fn test_missing_summary_omitted_from_json() {
        let roc = roc_curve(&[0.5], &[true]);
        let json = serde_json::to_value(&roc).unwrap();
        assert!(json.get("auc").is_none());
        assert_eq!(json["fpr"], serde_json::json!([0.0, 1.0]));
    }
}
