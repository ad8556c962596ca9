//! One-shot commands: predict, batch, sample, inspect
//!
//! Each prints the same JSON document the matching HTTP endpoint returns.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use starling::service::{BatchRow, PredictRequest, Service};

/// Read a file, or stdin for `None` / "-".
fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn predict(
    service: &Service,
    input: Option<&Path>,
    threshold: Option<f64>,
    top_k: Option<usize>,
) -> Result<()> {
    let raw = read_input(input)?;
    let mut req: PredictRequest = serde_json::from_str(&raw).context("Invalid predict request")?;
    if threshold.is_some() {
        req.threshold = threshold;
    }
    if top_k.is_some() {
        req.top_k = top_k;
    }
    print_json(&service.predict(&req)?)
}

pub fn batch(service: &Service, input: Option<&Path>) -> Result<()> {
    let raw = read_input(input)?;
    let rows: Vec<BatchRow> = serde_json::from_str(&raw).context("Invalid batch: expected a JSON array")?;
    print_json(&service.batch_predict(rows)?)
}

pub fn sample(service: &Service, count: usize) -> Result<()> {
    if count == 1 {
        return print_json(&service.echo_sample()?);
    }
    let samples = (0..count)
        .map(|_| service.echo_sample())
        .collect::<Result<Vec<_>, _>>()?;
    print_json(&samples)
}

#[derive(Serialize)]
struct Inspection {
    metadata: starling::service::Metadata,
    provenance: starling::service::Provenance,
}

pub fn inspect(service: &Service) -> Result<()> {
    print_json(&Inspection {
        metadata: service.metadata()?,
        provenance: service.provenance()?,
    })
}
