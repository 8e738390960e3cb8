// src/core/models.rs

use crate::core::knowledge_base::VulnerabilityRule;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// --- Core Data Models ---

/// Severity tier assigned to a vulnerability rule.
///
/// The variant order matters: `derive(Ord)` makes `Critical` the greatest
/// value, which the matcher sort and the aggregate risk computation rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall risk classification for one assessed endpoint: the maximum
/// severity among all matched vulnerability rules, or `None` when the
/// endpoint matched nothing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl From<Severity> for RiskLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => RiskLevel::Low,
            Severity::Medium => RiskLevel::Medium,
            Severity::High => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }
}

/// The closed set of Ethereum node implementations the parser can identify.
/// Anything without a recognized anchor is classified as `Unknown`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
pub enum Implementation {
    Geth,
    Erigon,
    Besu,
    Nethermind,
    Reth,
    #[strum(serialize = "Parity/OpenEthereum")]
    #[serde(rename = "Parity/OpenEthereum")]
    Parity,
    #[strum(serialize = "EthereumJS")]
    #[serde(rename = "EthereumJS")]
    EthereumJs,
    Hardhat,
    Ganache,
    Anvil,
    Unknown,
}

impl Implementation {
    /// Normalized lookup key used by the vulnerability rule set.
    pub fn registry_key(&self) -> &'static str {
        match self {
            Implementation::Geth => "geth",
            Implementation::Erigon => "erigon",
            Implementation::Besu => "besu",
            Implementation::Nethermind => "nethermind",
            Implementation::Reth => "reth",
            Implementation::Parity => "parity",
            Implementation::EthereumJs => "ethereumjs",
            Implementation::Hardhat => "hardhat",
            Implementation::Ganache => "ganache",
            Implementation::Anvil => "anvil",
            Implementation::Unknown => "unknown",
        }
    }
}

// --- Semantic Versions ---

static RE_SEMVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").unwrap());

/// A normalized `major.minor.patch` version used for ordering.
///
/// Pre-release suffixes (`-stable`, `-beta`, ...) and build metadata
/// (`+<hash>`) are stripped before parsing and play no part in comparisons.
/// Missing components compare as 0, so `1.10` orders the same as `1.10.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    /// Parses a raw version token into a comparable version, returning
    /// `None` when no numeric version can be recognized at all.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let stripped = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        // Ordering ignores pre-release suffixes and build metadata.
        let cleaned = stripped.split(['-', '+']).next().unwrap_or(stripped);

        let caps = RE_SEMVER
            .captures(cleaned)
            .or_else(|| RE_SEMVER.captures(stripped))?;
        let component = |idx: usize| -> u64 {
            caps.get(idx)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };
        Some(Self {
            major: caps.get(1)?.as_str().parse().ok()?,
            minor: component(2),
            patch: component(3),
        })
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// --- Client Identity ---

/// Structured identity derived from a raw `web3_clientVersion` string.
///
/// Every field besides the implementation tag and the preserved raw string
/// is independently optional; a partial extraction never blocks the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub implementation: Implementation,
    pub raw_version: String,
    pub node_version: Option<String>,
    pub semantic_version: Option<SemanticVersion>,
    pub programming_language: Option<String>,
    pub language_version: Option<String>,
    pub operating_system: Option<String>,
    pub architecture: Option<String>,
    pub commit_hash: Option<String>,
    pub build_timestamp: Option<String>,
}

impl ClientIdentity {
    /// Identity for input with no recognizable implementation anchor. The
    /// raw string is preserved verbatim for audit; everything else stays
    /// absent.
    pub fn unknown(raw: &str) -> Self {
        Self {
            implementation: Implementation::Unknown,
            raw_version: raw.to_string(),
            node_version: None,
            semantic_version: None,
            programming_language: None,
            language_version: None,
            operating_system: None,
            architecture: None,
            commit_hash: None,
            build_timestamp: None,
        }
    }
}

// --- Probe Models ---

/// Availability of optional RPC namespaces that are commonly disabled on
/// hardened nodes, plus whether the endpoint exposes unlocked accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceFlags {
    pub admin: bool,
    pub debug: bool,
    pub txpool: bool,
    pub accounts_exposed: bool,
}

/// Raw signals gathered from one endpoint by a single probe attempt.
///
/// A `ProbeResult` is terminal: once the probe battery finishes it is handed
/// to the aggregator and never mutated again. Each field is independently
/// absent when its RPC call failed; the failure itself lands in `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub endpoint: String,
    pub client_version: Option<String>,
    pub network_id: Option<u64>,
    pub chain_id: Option<u64>,
    pub block_number: Option<u64>,
    pub gas_price: Option<u64>,
    pub peer_count: Option<u64>,
    pub syncing: Option<bool>,
    pub mining: Option<bool>,
    pub hashrate: Option<u64>,
    pub accounts: Option<Vec<String>>,
    pub supported_methods: Vec<String>,
    pub namespaces: NamespaceFlags,
    pub response_time_ms: Option<u64>,
    pub errors: Vec<String>,
}

impl ProbeResult {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }

    /// Result for an endpoint where no request could be established at all.
    pub fn unreachable(endpoint: &str, error: String) -> Self {
        let mut result = Self::new(endpoint);
        result.errors.push(error);
        result
    }
}

// --- Assessment Models ---

/// Final assessed record for one endpoint: derived identity, raw probe
/// signals, and all matched vulnerability rules sorted by descending
/// severity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub endpoint: String,
    pub identity: ClientIdentity,
    pub probe: ProbeResult,
    pub vulnerabilities: Vec<VulnerabilityRule>,
    pub risk_level: RiskLevel,
    pub assessed_at: DateTime<Utc>,
}

impl AssessmentRecord {
    /// Record for an endpoint whose assessment task could not complete.
    /// The controller guarantees one record per input endpoint, so even an
    /// aborted task must still be represented.
    pub fn aborted(endpoint: &str, reason: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            identity: ClientIdentity::unknown(""),
            probe: ProbeResult::unreachable(endpoint, reason.to_string()),
            vulnerabilities: Vec::new(),
            risk_level: RiskLevel::None,
            assessed_at: Utc::now(),
        }
    }
}

// --- Scan Options ---

/// Options shared by the single-endpoint and fan-out entry points.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Per-call timeout budget applied to every RPC request of a probe.
    pub timeout: Duration,
    /// Admission gate size for concurrent probes. `1` gives the strictly
    /// sequential low-noise mode.
    pub max_concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_concurrency: 10,
        }
    }
}
