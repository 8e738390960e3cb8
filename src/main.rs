// src/main.rs

use color_eyre::eyre::Result;
use ethprobe_rs::{RuleSet, ScanOptions, assess_many, logging};
use std::sync::Arc;
use tracing::warn;
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::initialize_logging()?;

    let endpoints: Vec<String> = std::env::args().skip(1).map(normalize_endpoint).collect();
    if endpoints.is_empty() {
        eprintln!("usage: ethprobe-rs <rpc-endpoint> [<rpc-endpoint> ...]");
        return Ok(());
    }

    let rules = Arc::new(RuleSet::builtin());
    let options = ScanOptions::default();
    let records = assess_many(&endpoints, &options, rules).await;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// Prepends an http scheme when the argument has none, so bare
/// `host:port` endpoints work as inputs.
fn normalize_endpoint(raw: String) -> String {
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw
    } else {
        format!("http://{raw}")
    };
    if Url::parse(&with_scheme).is_err() {
        warn!(endpoint = %with_scheme, "Endpoint does not parse as a URL; probing it anyway.");
    }
    with_scheme
}
