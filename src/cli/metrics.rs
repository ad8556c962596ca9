//! Metrics command handler

use anyhow::Result;
use console::style;

use starling::metrics::MetricsSnapshot;
use starling::service::Service;

pub fn run(service: &Service, format: &str) -> Result<()> {
    let full = service.metrics_full()?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&full)?);
        return Ok(());
    }
    let bundle = full.bundle();
    print_text(&bundle.version, &bundle.metrics);
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
}

fn print_text(version: &str, m: &MetricsSnapshot) {
    println!("\n{} {}", style("Starling Metrics").bold(), style(version).dim());
    println!("{}", style("──────────────────────────────────────").dim());

    let f1 = format!("{:.3}", m.macro_f1);
    let f1 = if m.macro_f1 >= 0.8 {
        style(f1).green().bold()
    } else if m.macro_f1 >= 0.6 {
        style(f1).yellow().bold()
    } else {
        style(f1).red().bold()
    };
    println!("  Macro F1        {f1}");
    println!("  ROC AUC (OvR)   {}", fmt_opt(m.roc_auc_ovr));
    println!("  ECE             {:.3}", m.ece);
    println!("  Rows            train {}  test {}", m.n_train, m.n_test);

    println!("\n{}", style("PER CLASS").bold());
    for label in &m.labels {
        let auc = m.auc_per_class.get(label).copied();
        let ap = m.pr.get(label).and_then(|c| c.ap);
        println!(
            "  {:<16} auc {}  ap {}",
            style(label).cyan(),
            fmt_opt(auc),
            fmt_opt(ap)
        );
    }

    println!("\n{}", style("CONFUSION (true \\ pred)").bold());
    print!("  {:<16}", "");
    for label in &m.labels {
        print!("{label:>10}");
    }
    println!();
    for (label, row) in m.labels.iter().zip(m.confusion_matrix.rows()) {
        print!("  {label:<16}");
        for count in row {
            print!("{count:>10}");
        }
        println!();
    }

    if !m.top_confusions.is_empty() {
        println!("\n{}", style("TOP CONFUSIONS").bold());
        for c in &m.top_confusions {
            println!(
                "  {} -> {}  {}",
                c.true_label,
                c.pred_label,
                style(c.count).yellow()
            );
        }
    }

    println!("\n{}", style("DECISION").bold());
    println!(
        "  Recommended threshold  {:.3}",
        m.decision.recommended_threshold
    );
    println!(
        "  Coverage               {:.1}%",
        m.decision.coverage_at_threshold * 100.0
    );
    println!(
        "  Precision (accepted)   {}",
        fmt_opt(m.decision.precision_on_accepted)
    );

    let search = &m.search;
    println!("\n{}", style("SEARCH").bold());
    println!(
        "  CV macro F1            {:.3} ± {:.3}",
        search.cv_macro_f1_mean, search.cv_macro_f1_std
    );
    for (name, value) in &search.best_params {
        println!("  {name:<22} {value}");
    }
    println!();
}
