// src/core/scanner/mod.rs

// Public interface of the assessment pipeline: the probe sequencer lives in
// its own sub-module, this file owns the per-endpoint pipeline and the
// bounded fan-out across endpoint lists.
pub mod rpc_probe;

use crate::core::knowledge_base::RuleSet;
use crate::core::models::{AssessmentRecord, ClientIdentity, ScanOptions};
use crate::core::version_parser::parse_client_version;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Assesses a single endpoint: probe, identify, match vulnerabilities.
///
/// Never fails. An unreachable endpoint still produces a record whose probe
/// result carries the connection error and whose identity is `Unknown`.
pub async fn assess_one(
    endpoint: &str,
    options: &ScanOptions,
    rules: &RuleSet,
) -> AssessmentRecord {
    info!(endpoint, "Starting endpoint assessment.");

    let probe = rpc_probe::run_probe(endpoint, options.timeout).await;
    let identity = match probe.client_version.as_deref() {
        Some(raw) => parse_client_version(raw),
        None => ClientIdentity::unknown(""),
    };

    let matched = rules.matches(&identity);
    let risk_level = RuleSet::aggregate_risk(&matched);
    let vulnerabilities = matched.into_iter().cloned().collect();

    info!(
        endpoint,
        implementation = %identity.implementation,
        risk = ?risk_level,
        "Endpoint assessment finished."
    );
    AssessmentRecord {
        endpoint: endpoint.to_string(),
        identity,
        probe,
        vulnerabilities,
        risk_level,
        assessed_at: Utc::now(),
    }
}

/// Assesses many endpoints under a bounded admission gate, returning one
/// record per input endpoint in input order.
///
/// At most `options.max_concurrency` probes are in flight at once; a value
/// of 1 degrades to strictly sequential scanning. Completion order is
/// irrelevant: each task writes into its own slot of a pre-sized buffer, so
/// no endpoint's failure, timeout, or panic can displace or corrupt another
/// endpoint's record. If the returned future is dropped mid-run, in-flight
/// probes are abandoned with it.
pub async fn assess_many(
    endpoints: &[String],
    options: &ScanOptions,
    rules: Arc<RuleSet>,
) -> Vec<AssessmentRecord> {
    info!(
        endpoints = endpoints.len(),
        max_concurrency = options.max_concurrency,
        "Starting endpoint fan-out."
    );

    let gate = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, endpoint) in endpoints.iter().enumerate() {
        let gate = gate.clone();
        let rules = rules.clone();
        let options = options.clone();
        let endpoint = endpoint.clone();
        tasks.spawn(async move {
            // The permit is held for the whole probe; dropping it at task
            // end admits the next waiter.
            let _permit = gate.acquire_owned().await.ok();
            let record = assess_one(&endpoint, &options, &rules).await;
            (index, record)
        });
    }

    let mut slots: Vec<Option<AssessmentRecord>> = Vec::with_capacity(endpoints.len());
    slots.resize_with(endpoints.len(), || None);

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, record)) => slots[index] = Some(record),
            Err(e) => warn!(error = %e, "Assessment task did not complete."),
        }
    }

    // Any slot left empty belongs to a task that panicked or was aborted;
    // the contract is still one record per input endpoint.
    slots
        .into_iter()
        .zip(endpoints)
        .map(|(slot, endpoint)| {
            slot.unwrap_or_else(|| {
                AssessmentRecord::aborted(endpoint, "assessment task aborted before completion")
            })
        })
        .collect()
}
