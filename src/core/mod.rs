// src/core/mod.rs

// Root of the `core` module, exposing the engine's sub-modules to the
// crate: data models, the version string parser, the vulnerability
// knowledge base, and the probe/assessment pipeline.

/// Data structures shared across the engine: probe results, client
/// identities, vulnerability severities, assessment records.
pub mod models;

/// Heuristic parser decomposing raw `web3_clientVersion` strings into
/// structured client identities.
pub mod version_parser;

/// The read-only CVE rule database and the version-predicate matcher.
pub mod knowledge_base;

/// The RPC probe sequencer and the bounded-concurrency assessment
/// pipeline built on top of it.
pub mod scanner;
