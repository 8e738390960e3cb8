//! Vulnerability knowledge base for Ethereum node implementations.
//!
//! The rule set is loaded once (from the embedded database or a file), is
//! read-only for the lifetime of a run, and can be shared across concurrent
//! probe tasks without synchronization. Matching is deterministic: identical
//! (identity, rule set) inputs always produce the same severity-sorted list.

use crate::core::models::{ClientIdentity, RiskLevel, SemanticVersion, Severity};
use color_eyre::eyre::{Result, WrapErr};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// The builtin rule database shipped with the crate.
const BUILTIN_DATABASE: &str = include_str!("../../data/cve_database.json");

static BUILTIN: Lazy<RuleSet> = Lazy::new(|| {
    serde_json::from_str::<RuleSet>(BUILTIN_DATABASE)
        .map(RuleSet::normalized)
        .expect("embedded cve_database.json is valid")
});

/// Predicate selecting the affected versions of one implementation.
///
/// `Exact` compares the raw node-version string and therefore still works
/// when numeric parsing fails. `Range` and `Prefix` need a parsed
/// `SemanticVersion` and fail closed without one: an unparseable version is
/// never assumed vulnerable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VersionPredicate {
    Exact {
        versions: Vec<String>,
    },
    Range {
        #[serde(default)]
        min: Option<String>,
        #[serde(default)]
        max: Option<String>,
        #[serde(default)]
        min_exclusive: bool,
        #[serde(default)]
        max_exclusive: bool,
        /// Raw version strings carved out of the range (backported fixes).
        #[serde(default)]
        exclude: Vec<String>,
    },
    Prefix {
        prefix: String,
    },
}

impl VersionPredicate {
    /// Evaluates the predicate against a node version. `node_version` is the
    /// raw extracted token, `semver` its normalized form when parseable.
    pub fn matches(&self, node_version: Option<&str>, semver: Option<SemanticVersion>) -> bool {
        match self {
            VersionPredicate::Exact { versions } => match node_version {
                Some(raw) => versions.iter().any(|v| v == raw),
                None => false,
            },
            VersionPredicate::Range {
                min,
                max,
                min_exclusive,
                max_exclusive,
                exclude,
            } => {
                let Some(version) = semver else {
                    return false;
                };
                if let Some(raw) = node_version {
                    if exclude.iter().any(|v| v == raw) {
                        return false;
                    }
                }
                if let Some(lower) = min.as_deref().and_then(SemanticVersion::parse) {
                    let below = if *min_exclusive {
                        version <= lower
                    } else {
                        version < lower
                    };
                    if below {
                        return false;
                    }
                }
                if let Some(upper) = max.as_deref().and_then(SemanticVersion::parse) {
                    let above = if *max_exclusive {
                        version >= upper
                    } else {
                        version > upper
                    };
                    if above {
                        return false;
                    }
                }
                true
            }
            VersionPredicate::Prefix { prefix } => match semver {
                Some(version) => version.to_string().starts_with(prefix.as_str()),
                None => false,
            },
        }
    }
}

/// A single CVE rule: which implementation and versions it affects, how
/// severe it is, and what to do about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRule {
    pub cve_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub cvss_score: f64,
    pub affected_versions: VersionPredicate,
    pub fixed_in: String,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub impact: String,
    pub recommendation: String,
}

/// Metadata block of the rule database file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSetMetadata {
    #[serde(default)]
    pub database_version: String,
    #[serde(default)]
    pub last_updated: String,
}

/// Immutable mapping from normalized implementation name to its known
/// vulnerability rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub metadata: RuleSetMetadata,
    #[serde(default)]
    vulnerabilities: HashMap<String, Vec<VulnerabilityRule>>,
}

impl RuleSet {
    /// Returns a copy of the rule set embedded in the binary.
    pub fn builtin() -> RuleSet {
        BUILTIN.clone()
    }

    /// Loads a rule set from a JSON database file. A reload is a fresh call
    /// to this function; an already-loaded set is never mutated in place.
    pub fn load(path: impl AsRef<Path>) -> Result<RuleSet> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read rule database {}", path.display()))?;
        let set: RuleSet = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse rule database {}", path.display()))?;
        debug!(
            path = %path.display(),
            rules = set.rule_count(),
            "Loaded vulnerability rule database."
        );
        Ok(set.normalized())
    }

    /// Builds a rule set directly from per-implementation rule lists.
    /// Primarily useful for injecting fixture rules in tests.
    pub fn from_rules(rules: HashMap<String, Vec<VulnerabilityRule>>) -> RuleSet {
        RuleSet {
            metadata: RuleSetMetadata::default(),
            vulnerabilities: rules,
        }
        .normalized()
    }

    /// Normalizes database keys so that lookups by `registry_key` always
    /// land on the right bucket regardless of how the file spells the name.
    fn normalized(mut self) -> RuleSet {
        let mut normalized = HashMap::with_capacity(self.vulnerabilities.len());
        for (name, rules) in self.vulnerabilities.drain() {
            let key = normalize_implementation_name(&name);
            normalized
                .entry(key)
                .or_insert_with(Vec::new)
                .extend(rules);
        }
        self.vulnerabilities = normalized;
        self
    }

    pub fn rule_count(&self) -> usize {
        self.vulnerabilities.values().map(Vec::len).sum()
    }

    /// All known rules for one implementation, matched or not.
    pub fn rules_for(&self, key: &str) -> &[VulnerabilityRule] {
        self.vulnerabilities
            .get(&normalize_implementation_name(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns every rule whose implementation and version predicate match
    /// the given identity, sorted by severity (highest first), then by
    /// descending score, then by CVE id for a stable order.
    pub fn matches(&self, identity: &ClientIdentity) -> Vec<&VulnerabilityRule> {
        let key = identity.implementation.registry_key();
        let mut matched: Vec<&VulnerabilityRule> = self
            .rules_for(key)
            .iter()
            .filter(|rule| {
                rule.affected_versions
                    .matches(identity.node_version.as_deref(), identity.semantic_version)
            })
            .collect();

        matched.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.cvss_score.total_cmp(&a.cvss_score))
                .then_with(|| a.cve_id.cmp(&b.cve_id))
        });

        if !matched.is_empty() {
            warn!(
                implementation = %identity.implementation,
                version = ?identity.node_version,
                matches = matched.len(),
                "Identity matches known vulnerabilities."
            );
        }
        matched
    }

    /// Aggregate risk for a match set: the maximum severity, or `None` when
    /// nothing matched.
    pub fn aggregate_risk(matched: &[&VulnerabilityRule]) -> RiskLevel {
        matched
            .iter()
            .map(|rule| RiskLevel::from(rule.severity))
            .max()
            .unwrap_or(RiskLevel::None)
    }
}

/// Maps common spelling variations onto the canonical registry key.
fn normalize_implementation_name(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.as_str() {
        "go-ethereum" | "turbogeth" => "geth".to_string(),
        "parity-ethereum" | "openethereum" | "parity/openethereum" => "parity".to_string(),
        "hyperledger-besu" | "hyperledger_besu" => "besu".to_string(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Implementation;
    use crate::core::version_parser::parse_client_version;

    fn geth_consensus_rule() -> VulnerabilityRule {
        VulnerabilityRule {
            cve_id: "CVE-2021-39137".to_string(),
            title: "Geth consensus flaw".to_string(),
            description: "Memory corruption during EVM execution".to_string(),
            severity: Severity::Critical,
            cvss_score: 9.8,
            affected_versions: VersionPredicate::Range {
                min: Some("1.10.0".to_string()),
                max: Some("1.10.7".to_string()),
                min_exclusive: false,
                max_exclusive: false,
                exclude: Vec::new(),
            },
            fixed_in: "1.10.8".to_string(),
            published_date: "2021-08-24".to_string(),
            references: vec!["https://nvd.nist.gov/vuln/detail/CVE-2021-39137".to_string()],
            impact: "Could lead to chain splits".to_string(),
            recommendation: "Update to 1.10.8 or later".to_string(),
        }
    }

    fn fixture_set() -> RuleSet {
        let mut rules = HashMap::new();
        rules.insert("geth".to_string(), vec![geth_consensus_rule()]);
        RuleSet::from_rules(rules)
    }

    fn geth_identity(version: &str) -> ClientIdentity {
        let mut identity = ClientIdentity::unknown("");
        identity.implementation = Implementation::Geth;
        identity.node_version = Some(version.to_string());
        identity.semantic_version = SemanticVersion::parse(version);
        identity
    }

    #[test]
    fn vulnerable_version_matches() {
        let set = fixture_set();
        let matched = set.matches(&geth_identity("1.10.7"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].cve_id, "CVE-2021-39137");
        assert_eq!(RuleSet::aggregate_risk(&matched), RiskLevel::Critical);
    }

    #[test]
    fn fixed_version_does_not_match() {
        let set = fixture_set();
        let matched = set.matches(&geth_identity("1.10.8"));
        assert!(matched.is_empty());
        assert_eq!(RuleSet::aggregate_risk(&matched), RiskLevel::None);
    }

    #[test]
    fn unparseable_version_fails_closed_for_ranges() {
        let set = fixture_set();
        let mut identity = geth_identity("1.10.7");
        identity.node_version = Some("unknown-build".to_string());
        identity.semantic_version = None;
        assert!(set.matches(&identity).is_empty());
    }

    #[test]
    fn exact_predicate_matches_raw_string_without_semver() {
        let predicate = VersionPredicate::Exact {
            versions: vec!["nightly-2023".to_string()],
        };
        assert!(predicate.matches(Some("nightly-2023"), None));
        assert!(!predicate.matches(Some("nightly-2024"), None));
        assert!(!predicate.matches(None, None));
    }

    #[test]
    fn exclusive_bounds_are_honored() {
        let predicate = VersionPredicate::Range {
            min: Some("1.10.0".to_string()),
            max: Some("1.10.8".to_string()),
            min_exclusive: false,
            max_exclusive: true,
            exclude: Vec::new(),
        };
        assert!(predicate.matches(Some("1.10.7"), SemanticVersion::parse("1.10.7")));
        assert!(!predicate.matches(Some("1.10.8"), SemanticVersion::parse("1.10.8")));
    }

    #[test]
    fn excluded_versions_are_skipped() {
        let predicate = VersionPredicate::Range {
            min: Some("1.0.0".to_string()),
            max: Some("2.0.0".to_string()),
            min_exclusive: false,
            max_exclusive: false,
            exclude: vec!["1.5.1".to_string()],
        };
        assert!(predicate.matches(Some("1.5.0"), SemanticVersion::parse("1.5.0")));
        assert!(!predicate.matches(Some("1.5.1"), SemanticVersion::parse("1.5.1")));
    }

    #[test]
    fn prefix_predicate_contains_point_releases() {
        let predicate = VersionPredicate::Prefix {
            prefix: "1.10.".to_string(),
        };
        assert!(predicate.matches(Some("1.10.3"), SemanticVersion::parse("1.10.3")));
        assert!(!predicate.matches(Some("1.11.0"), SemanticVersion::parse("1.11.0")));
        // Fail closed without a parsed version.
        assert!(!predicate.matches(Some("1.10.x"), None));
    }

    #[test]
    fn prerelease_suffix_is_ignored_for_range_matching() {
        let set = fixture_set();
        let matched = set.matches(&geth_identity("1.10.7-stable"));
        assert_eq!(matched.len(), 1);
        let matched = set.matches(&geth_identity("1.10.8-stable"));
        assert!(matched.is_empty());
    }

    #[test]
    fn match_order_is_stable_across_invocations() {
        let mut rules = HashMap::new();
        let mut low = geth_consensus_rule();
        low.cve_id = "CVE-2020-0002".to_string();
        low.severity = Severity::Low;
        low.cvss_score = 3.1;
        let mut high_a = geth_consensus_rule();
        high_a.cve_id = "CVE-2020-0001".to_string();
        high_a.severity = Severity::High;
        high_a.cvss_score = 7.5;
        let mut high_b = geth_consensus_rule();
        high_b.cve_id = "CVE-2019-0009".to_string();
        high_b.severity = Severity::High;
        high_b.cvss_score = 7.5;
        rules.insert(
            "geth".to_string(),
            vec![low, geth_consensus_rule(), high_a, high_b],
        );
        let set = RuleSet::from_rules(rules);

        let identity = geth_identity("1.10.5");
        let first: Vec<String> = set
            .matches(&identity)
            .iter()
            .map(|r| r.cve_id.clone())
            .collect();
        for _ in 0..10 {
            let again: Vec<String> = set
                .matches(&identity)
                .iter()
                .map(|r| r.cve_id.clone())
                .collect();
            assert_eq!(first, again);
        }
        assert_eq!(
            first,
            vec![
                "CVE-2021-39137",
                "CVE-2019-0009",
                "CVE-2020-0001",
                "CVE-2020-0002"
            ]
        );
    }

    #[test]
    fn builtin_database_loads_and_finds_known_cves() {
        let set = RuleSet::builtin();
        assert!(set.rule_count() > 0);
        let matched = set.matches(&geth_identity("1.10.7"));
        assert!(matched.iter().any(|r| r.cve_id == "CVE-2021-39137"));
    }

    #[test]
    fn unknown_implementation_matches_nothing() {
        let set = RuleSet::builtin();
        let identity = parse_client_version("CustomClient/v1.0.0");
        assert_eq!(identity.implementation, Implementation::Unknown);
        assert!(set.matches(&identity).is_empty());
    }

    #[test]
    fn alias_keys_are_normalized_on_load() {
        let mut rules = HashMap::new();
        rules.insert("Go-Ethereum".to_string(), vec![geth_consensus_rule()]);
        let set = RuleSet::from_rules(rules);
        assert_eq!(set.rules_for("geth").len(), 1);
    }
}
