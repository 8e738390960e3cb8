// src/lib.rs

//! Fingerprinting and vulnerability assessment for Ethereum-compatible
//! JSON-RPC endpoints.
//!
//! The engine probes an endpoint with a fixed battery of read-only RPC
//! calls, decomposes the reported client version string into a structured
//! identity, and correlates implementation and version against a read-only
//! database of CVE version-range rules. Three entry points cover the whole
//! surface:
//!
//! - [`parse_client_version`]: raw version string to [`ClientIdentity`],
//!   pure and synchronous.
//! - [`assess_one`]: probe and assess a single endpoint.
//! - [`assess_many`]: fan the pipeline out over an ordered endpoint list
//!   under a bounded concurrency gate, preserving input order.

pub mod core;
pub mod logging;

pub use crate::core::knowledge_base::{RuleSet, VersionPredicate, VulnerabilityRule};
pub use crate::core::models::{
    AssessmentRecord, ClientIdentity, Implementation, NamespaceFlags, ProbeResult, RiskLevel,
    ScanOptions, SemanticVersion, Severity,
};
pub use crate::core::scanner::rpc_probe::ProbeError;
pub use crate::core::scanner::{assess_many, assess_one};
pub use crate::core::version_parser::parse_client_version;
