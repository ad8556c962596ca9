//! Shared artifact fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use starling::config::StarlingConfig;
use starling::{ModelRegistry, Service};

/// Held-out rows: 4 X, 3 Y, 3 Z; rows 7-9 are misclassified.
pub const HOLDOUT_CSV: &str = "\
a,b,c,true_label
1.0,0.0,0.0,X
0.9,1.2,0.1,X
0.0,2.0,0.0,Y
0.2,3.0,0.2,Y
0.0,0.0,1.0,Z
0.1,0.5,0.9,Z
0.8,2.5,0.0,X
0.0,1.8,0.8,Y
1.0,0.0,,Z
0.6,1.0,0.0,X
";

/// Last row repeats a held-out row and must be dropped.
pub const SAMPLES_CSV: &str = "\
a,b,c,true_label
0.7,0.4,0.0,X
0.0,2.2,0.1,Y
0.0,0.0,0.6,Z
1.0,0.0,0.0,X
";

fn split(feature: usize, threshold: f64, left: usize, right: usize, cover: f64, gain: f64) -> Value {
    json!({
        "feature": feature, "threshold": threshold, "left": left, "right": right,
        "cover": cover, "gain": gain,
    })
}

fn leaf(value: f64, cover: f64) -> Value {
    json!({"leaf": value, "cover": cover})
}

/// Three features (a, b, c), labels X, Y, Z, one tree per class.
///
/// X fires on a > 0.5 (stronger when b <= 1.5), Y on b > 1.0, Z on
/// c > 0.3. Missing a and c route right; b is imputed to 0.
pub fn model_json(version: &str, with_covers: bool) -> Value {
    let mut x_split = split(0, 0.5, 1, 2, 10.0, 4.0);
    x_split["missing"] = json!("right");
    let mut z_split = split(2, 0.3, 1, 2, 10.0, 2.0);
    z_split["missing"] = json!("right");

    let mut model = json!({
        "version": version,
        "features": ["a", "b", "c"],
        "labels": ["X", "Y", "Z"],
        "impute": {"b": 0.0},
        "trees": [
            {"class": 0, "nodes": [
                x_split,
                leaf(-0.8, 6.0),
                split(1, 1.5, 3, 4, 4.0, 1.5),
                leaf(1.2, 3.0),
                leaf(0.4, 1.0),
            ]},
            {"class": 1, "nodes": [
                split(1, 1.0, 1, 2, 10.0, 3.0),
                leaf(-0.8, 5.0),
                leaf(0.9, 5.0),
            ]},
            {"class": 2, "nodes": [
                z_split,
                leaf(-0.9, 7.0),
                leaf(1.1, 3.0),
            ]},
        ],
    });

    if !with_covers {
        for tree in model["trees"].as_array_mut().unwrap() {
            for node in tree["nodes"].as_array_mut().unwrap() {
                node.as_object_mut().unwrap().remove("cover");
            }
        }
    }
    model
}

pub fn write_artifacts(dir: &Path, version: &str, with_covers: bool) {
    write_artifacts_with_holdout(dir, version, with_covers, HOLDOUT_CSV);
}

pub fn write_artifacts_with_holdout(dir: &Path, version: &str, with_covers: bool, holdout: &str) {
    std::fs::write(
        dir.join("model.json"),
        serde_json::to_string_pretty(&model_json(version, with_covers)).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("feature_info.json"),
        json!({
            "a": {"unit": "days", "hint": "orbital period"},
            "b": {"unit": "ppm", "hint": "transit depth"},
            "c": {"unit": "", "hint": "impact parameter"},
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("training_summary.json"),
        json!({
            "n_train": 120,
            "n_total": 130,
            "search": {
                "best_params": {"max_depth": 2, "learning_rate": 0.1},
                "cv_macro_f1_mean": 0.74,
                "cv_macro_f1_std": 0.03,
            },
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(dir.join("holdout.csv"), holdout).unwrap();
    std::fs::write(dir.join("sample_inputs.csv"), SAMPLES_CSV).unwrap();
}

/// Registry with `dir` loaded as the current model version.
pub fn loaded_service(dir: &Path) -> Service {
    let registry = Arc::new(ModelRegistry::new(StarlingConfig::default()));
    registry.reload(Some(dir)).unwrap();
    Service::new(registry)
}

pub fn request(body: Value) -> starling::service::PredictRequest {
    serde_json::from_value(body).unwrap()
}
