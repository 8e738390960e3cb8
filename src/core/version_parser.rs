// src/core/version_parser.rs

use crate::core::models::{ClientIdentity, Implementation, SemanticVersion};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Grammar used to pull structured fields out of a matched version string.
enum Grammar {
    /// `Name/vX.Y.Z[-suffix][+commit]/<os>-<arch>/<lang><ver>`
    /// (Geth, TurboGeth, Erigon, Besu, Nethermind).
    SlashOsArch,
    /// `Name/vX.Y.Z/<target-triple>[/rustcX.Y.Z]` where the triple leads
    /// with the architecture (Parity/OpenEthereum, Reth).
    SlashTriple,
    /// `anvil X.Y.Z (<commit> <timestamp>)`.
    AnvilSpaced,
    /// Node.js tooling with loosely structured strings (Hardhat, Ganache,
    /// EthereumJS); only generic extraction applies.
    NodeTool,
}

/// One entry of the extraction registry.
struct ExtractionRule {
    implementation: Implementation,
    /// Case-insensitive marker substrings identifying this implementation.
    /// Anchors are disjoint across rules by construction; where an input
    /// could carry two markers ("HardhatNetwork/.../@ethereumjs/..."), the
    /// earlier rule wins, so specific rules must stay above generic ones.
    anchors: &'static [&'static str],
    language: &'static str,
    grammar: Grammar,
}

/// The registry, tried in priority order; the first matching anchor wins.
/// When adding a rule, document here why its position breaks any overlap
/// with existing anchors.
static RULES: &[ExtractionRule] = &[
    // "turbogeth" contains "geth", so a single marker covers both spellings.
    ExtractionRule {
        implementation: Implementation::Geth,
        anchors: &["geth"],
        language: "Go",
        grammar: Grammar::SlashOsArch,
    },
    ExtractionRule {
        implementation: Implementation::Nethermind,
        anchors: &["nethermind"],
        language: ".NET",
        grammar: Grammar::SlashOsArch,
    },
    ExtractionRule {
        implementation: Implementation::Besu,
        anchors: &["besu"],
        language: "Java",
        grammar: Grammar::SlashOsArch,
    },
    ExtractionRule {
        implementation: Implementation::Erigon,
        anchors: &["erigon"],
        language: "Go",
        grammar: Grammar::SlashOsArch,
    },
    ExtractionRule {
        implementation: Implementation::Parity,
        anchors: &["parity", "openethereum"],
        language: "Rust",
        grammar: Grammar::SlashTriple,
    },
    ExtractionRule {
        implementation: Implementation::Anvil,
        anchors: &["anvil"],
        language: "Rust",
        grammar: Grammar::AnvilSpaced,
    },
    // Hardhat banners embed "@ethereumjs/vm", so Hardhat must come before
    // the EthereumJS rule.
    ExtractionRule {
        implementation: Implementation::Hardhat,
        anchors: &["hardhat"],
        language: "JavaScript/TypeScript",
        grammar: Grammar::NodeTool,
    },
    ExtractionRule {
        implementation: Implementation::Ganache,
        anchors: &["ganache", "testrpc"],
        language: "JavaScript",
        grammar: Grammar::NodeTool,
    },
    ExtractionRule {
        implementation: Implementation::EthereumJs,
        anchors: &["ethereumjs", "ethereum-js"],
        language: "JavaScript/TypeScript",
        grammar: Grammar::NodeTool,
    },
    // Last: "reth" is the shortest marker and the most likely to appear by
    // accident inside an unrelated token.
    ExtractionRule {
        implementation: Implementation::Reth,
        anchors: &["reth"],
        language: "Rust",
        grammar: Grammar::SlashTriple,
    },
];

// Statically compiled extraction regexes, one per token family.
static RE_GO_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^go(\d+(?:\.\d+)*)").unwrap());
static RE_RUSTC_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^rustc(\d+(?:\.\d+)*)").unwrap());
static RE_JAVA_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"java-?(\d+(?:\.\d+)*)").unwrap());
static RE_DOTNET_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^dotnet(\d+(?:\.\d+)*)").unwrap());
static RE_ANVIL_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)anvil\s+v?(\d+\.\d+\.\d+)").unwrap());
static RE_ANVIL_BUILD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([0-9a-fA-F]+)\s+([^\s)]+)\)").unwrap());
static RE_GENERIC_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"v?(\d+\.\d+\.\d+(?:[-+][^\s/]+)?)").unwrap());

/// Decomposes a raw `web3_clientVersion` string into a structured identity.
///
/// This is a pure function and it never fails: input with no recognizable
/// implementation anchor yields `Implementation::Unknown` with the raw
/// string preserved verbatim and every other field absent. After the
/// matched rule's grammar has run, generic heuristics fill any field the
/// grammar could not extract; a partial match never blocks the rest.
pub fn parse_client_version(raw: &str) -> ClientIdentity {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ClientIdentity::unknown(raw);
    }

    let lower = trimmed.to_lowercase();
    let Some(rule) = RULES
        .iter()
        .find(|rule| rule.anchors.iter().any(|anchor| lower.contains(anchor)))
    else {
        debug!(raw = trimmed, "No implementation anchor matched.");
        return ClientIdentity::unknown(raw);
    };

    let mut identity = ClientIdentity::unknown(raw);
    identity.implementation = rule.implementation;
    identity.programming_language = Some(rule.language.to_string());

    match rule.grammar {
        Grammar::SlashOsArch => extract_slash_os_arch(trimmed, &mut identity),
        Grammar::SlashTriple => extract_slash_triple(trimmed, &mut identity),
        Grammar::AnvilSpaced => extract_anvil(trimmed, &mut identity),
        Grammar::NodeTool => {
            identity.operating_system = Some("Node.js".to_string());
        }
    }

    fill_generic_fields(trimmed, &lower, &mut identity);
    identity.semantic_version = identity
        .node_version
        .as_deref()
        .and_then(SemanticVersion::parse);

    debug!(
        implementation = %identity.implementation,
        version = ?identity.node_version,
        "Parsed client version string."
    );
    identity
}

/// `Name/vX.Y.Z/<os>-<arch>/<lang><ver>` extraction.
fn extract_slash_os_arch(input: &str, identity: &mut ClientIdentity) {
    let parts: Vec<&str> = input.split('/').collect();

    if let Some(token) = parts.get(1) {
        apply_version_token(token, identity);
    }
    if let Some(os_arch) = parts.get(2) {
        if let Some((os_token, arch_token)) = os_arch.split_once('-') {
            identity.operating_system = Some(canonical_os(os_token));
            identity.architecture = Some(canonical_arch(arch_token));
        }
    }
    if let Some(lang_token) = parts.get(3) {
        if let Some(version) = language_version(lang_token) {
            identity.language_version = Some(version);
        }
    }
}

/// `Name/vX.Y.Z/<arch>-...-<os>-.../[rustcX.Y.Z]` extraction for clients
/// that report a build target triple.
fn extract_slash_triple(input: &str, identity: &mut ClientIdentity) {
    let parts: Vec<&str> = input.split('/').collect();

    if let Some(token) = parts.get(1) {
        apply_version_token(token, identity);
    }
    if let Some(triple) = parts.get(2) {
        if let Some(arch_token) = triple.split('-').next() {
            identity.architecture = Some(canonical_arch(arch_token));
        }
        identity.operating_system = os_from_marker(&triple.to_lowercase());
    }
    if let Some(lang_token) = parts.get(3) {
        if let Some(version) = language_version(lang_token) {
            identity.language_version = Some(version);
        }
    }
}

/// `anvil X.Y.Z (<commit> <timestamp>)` extraction.
fn extract_anvil(input: &str, identity: &mut ClientIdentity) {
    if let Some(caps) = RE_ANVIL_VERSION.captures(input) {
        identity.node_version = Some(caps[1].to_string());
    }
    if let Some(caps) = RE_ANVIL_BUILD.captures(input) {
        identity.commit_hash = Some(caps[1].to_string());
        identity.build_timestamp = Some(caps[2].to_string());
    }
}

/// Strips the `v` prefix, then splits off trailing `+<commit>` build
/// metadata (Nethermind style) into the commit hash field.
fn apply_version_token(token: &str, identity: &mut ClientIdentity) {
    let stripped = token
        .strip_prefix('v')
        .or_else(|| token.strip_prefix('V'))
        .unwrap_or(token);
    if stripped.is_empty() {
        return;
    }
    match stripped.split_once('+') {
        Some((version, commit)) => {
            identity.node_version = Some(version.to_string());
            if !commit.is_empty() {
                identity.commit_hash = Some(commit.to_string());
            }
        }
        None => identity.node_version = Some(stripped.to_string()),
    }
}

/// Extracts the language version from a `go1.21.4` / `rustc1.41.0` /
/// `openjdk-java-17` / `dotnet8.0.0` style token.
fn language_version(token: &str) -> Option<String> {
    for re in [
        &RE_GO_VERSION,
        &RE_RUSTC_VERSION,
        &RE_JAVA_VERSION,
        &RE_DOTNET_VERSION,
    ] {
        if let Some(caps) = re.captures(token) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Fixed alias table for OS tokens; anything unmapped is title-cased so a
/// new platform still shows up readably.
fn canonical_os(token: &str) -> String {
    match token.to_lowercase().as_str() {
        "linux" => "Linux".to_string(),
        "darwin" | "macos" | "osx" => "macOS".to_string(),
        "windows" | "win32" | "win64" => "Windows".to_string(),
        "freebsd" => "FreeBSD".to_string(),
        "openbsd" => "OpenBSD".to_string(),
        other => title_case(other),
    }
}

/// Fixed alias table for architecture tokens; unmapped tokens pass through
/// verbatim (e.g. `amd64`, `arm64`).
fn canonical_arch(token: &str) -> String {
    match token.to_lowercase().as_str() {
        "x64" | "x86-64" => "x86_64".to_string(),
        _ => token.to_string(),
    }
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// OS detection from an arbitrary lowercased fragment (target triples,
/// free-form suffixes).
fn os_from_marker(lower: &str) -> Option<String> {
    if lower.contains("linux") {
        Some("Linux".to_string())
    } else if lower.contains("darwin") || lower.contains("macos") {
        Some("macOS".to_string())
    } else if lower.contains("windows") || lower.contains("win32") || lower.contains("win64") {
        Some("Windows".to_string())
    } else if lower.contains("freebsd") {
        Some("FreeBSD".to_string())
    } else if lower.contains("openbsd") {
        Some("OpenBSD".to_string())
    } else {
        None
    }
}

/// Fills any field the matched grammar left absent using generic substring
/// heuristics over the whole input.
fn fill_generic_fields(input: &str, lower: &str, identity: &mut ClientIdentity) {
    if identity.node_version.is_none() {
        if let Some(caps) = RE_GENERIC_VERSION.captures(input) {
            identity.node_version = Some(caps[1].to_string());
        }
    }

    if identity.operating_system.is_none() {
        identity.operating_system = os_from_marker(lower);
    }

    if identity.architecture.is_none() {
        // Full-token markers first: "x86_64" also contains "x86".
        identity.architecture = if lower.contains("amd64")
            || lower.contains("x86_64")
            || lower.contains("x64")
        {
            Some("x86_64".to_string())
        } else if lower.contains("arm64") || lower.contains("aarch64") {
            Some("ARM64".to_string())
        } else if lower.contains("arm") {
            Some("ARM".to_string())
        } else if lower.contains("i386") || lower.contains("x86") {
            Some("x86".to_string())
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geth_slash_format() {
        let identity = parse_client_version("Geth/v1.13.5-stable/linux-amd64/go1.21.4");
        assert_eq!(identity.implementation, Implementation::Geth);
        assert_eq!(identity.node_version.as_deref(), Some("1.13.5-stable"));
        assert_eq!(
            identity.semantic_version,
            Some(SemanticVersion::new(1, 13, 5))
        );
        assert_eq!(identity.programming_language.as_deref(), Some("Go"));
        assert_eq!(identity.language_version.as_deref(), Some("1.21.4"));
        assert_eq!(identity.operating_system.as_deref(), Some("Linux"));
        assert_eq!(identity.architecture.as_deref(), Some("amd64"));
    }

    #[test]
    fn parses_geth_darwin_build() {
        let identity = parse_client_version("Geth/v1.13.5-stable/darwin-arm64/go1.21.4");
        assert_eq!(identity.operating_system.as_deref(), Some("macOS"));
        assert_eq!(identity.architecture.as_deref(), Some("arm64"));
    }

    #[test]
    fn turbogeth_maps_to_geth() {
        let identity = parse_client_version("TurboGeth/v2021.03.4-alpha/linux-amd64/go1.16.2");
        assert_eq!(identity.implementation, Implementation::Geth);
        assert_eq!(identity.node_version.as_deref(), Some("2021.03.4-alpha"));
        assert_eq!(identity.language_version.as_deref(), Some("1.16.2"));
    }

    #[test]
    fn parses_parity_target_triple() {
        let identity =
            parse_client_version("Parity-Ethereum/v2.7.2-stable/x86_64-linux-gnu/rustc1.41.0");
        assert_eq!(identity.implementation, Implementation::Parity);
        assert_eq!(identity.node_version.as_deref(), Some("2.7.2-stable"));
        assert_eq!(identity.programming_language.as_deref(), Some("Rust"));
        assert_eq!(identity.language_version.as_deref(), Some("1.41.0"));
        assert_eq!(identity.operating_system.as_deref(), Some("Linux"));
        assert_eq!(identity.architecture.as_deref(), Some("x86_64"));
    }

    #[test]
    fn parses_openethereum_as_parity() {
        let identity =
            parse_client_version("OpenEthereum/v3.3.5-stable/x86_64-unknown-linux-gnu/rustc1.56.1");
        assert_eq!(identity.implementation, Implementation::Parity);
        assert_eq!(identity.node_version.as_deref(), Some("3.3.5-stable"));
        assert_eq!(identity.architecture.as_deref(), Some("x86_64"));
        assert_eq!(identity.operating_system.as_deref(), Some("Linux"));
    }

    #[test]
    fn parses_besu_with_java_version() {
        let identity = parse_client_version("Besu/v23.4.0/darwin-aarch64/openjdk-java-17");
        assert_eq!(identity.implementation, Implementation::Besu);
        assert_eq!(identity.node_version.as_deref(), Some("23.4.0"));
        assert_eq!(identity.programming_language.as_deref(), Some("Java"));
        assert_eq!(identity.language_version.as_deref(), Some("17"));
        assert_eq!(identity.operating_system.as_deref(), Some("macOS"));
        assert_eq!(identity.architecture.as_deref(), Some("aarch64"));
    }

    #[test]
    fn parses_nethermind_commit_metadata() {
        let identity = parse_client_version("Nethermind/v1.14.6+6c21356f/linux-x64/dotnet6.0.11");
        assert_eq!(identity.implementation, Implementation::Nethermind);
        assert_eq!(identity.node_version.as_deref(), Some("1.14.6"));
        assert_eq!(identity.commit_hash.as_deref(), Some("6c21356f"));
        assert_eq!(identity.programming_language.as_deref(), Some(".NET"));
        assert_eq!(identity.language_version.as_deref(), Some("6.0.11"));
        assert_eq!(identity.operating_system.as_deref(), Some("Linux"));
        // x64 goes through the architecture alias table.
        assert_eq!(identity.architecture.as_deref(), Some("x86_64"));
    }

    #[test]
    fn parses_erigon_without_v_prefix() {
        let identity = parse_client_version("erigon/2.48.1/linux-amd64/go1.19.2");
        assert_eq!(identity.implementation, Implementation::Erigon);
        assert_eq!(identity.node_version.as_deref(), Some("2.48.1"));
        assert_eq!(identity.programming_language.as_deref(), Some("Go"));
        assert_eq!(identity.language_version.as_deref(), Some("1.19.2"));
    }

    #[test]
    fn parses_reth_target_triple() {
        let identity = parse_client_version("reth/v0.2.0-beta.5/x86_64-unknown-linux-gnu");
        assert_eq!(identity.implementation, Implementation::Reth);
        assert_eq!(identity.node_version.as_deref(), Some("0.2.0-beta.5"));
        assert_eq!(identity.programming_language.as_deref(), Some("Rust"));
        assert_eq!(identity.operating_system.as_deref(), Some("Linux"));
        assert_eq!(identity.architecture.as_deref(), Some("x86_64"));
    }

    #[test]
    fn parses_anvil_space_grammar() {
        let identity =
            parse_client_version("anvil 0.2.0 (a1b2c3d 2024-01-15T10:30:45.123456789Z)");
        assert_eq!(identity.implementation, Implementation::Anvil);
        assert_eq!(identity.node_version.as_deref(), Some("0.2.0"));
        assert_eq!(identity.programming_language.as_deref(), Some("Rust"));
        assert_eq!(identity.commit_hash.as_deref(), Some("a1b2c3d"));
        assert_eq!(
            identity.build_timestamp.as_deref(),
            Some("2024-01-15T10:30:45.123456789Z")
        );
    }

    #[test]
    fn hardhat_wins_over_embedded_ethereumjs_marker() {
        let identity =
            parse_client_version("HardhatNetwork/2.17.1/@ethereumjs/vm/5.9.3/node/v18.17.0");
        assert_eq!(identity.implementation, Implementation::Hardhat);
        assert_eq!(identity.node_version.as_deref(), Some("2.17.1"));
        assert_eq!(
            identity.programming_language.as_deref(),
            Some("JavaScript/TypeScript")
        );
        assert_eq!(identity.operating_system.as_deref(), Some("Node.js"));
    }

    #[test]
    fn parses_ganache_banner() {
        let identity = parse_client_version("Ganache/v7.9.1/linux/node/v16.20.1");
        assert_eq!(identity.implementation, Implementation::Ganache);
        assert_eq!(identity.node_version.as_deref(), Some("7.9.1"));
        assert_eq!(identity.programming_language.as_deref(), Some("JavaScript"));
        assert_eq!(identity.operating_system.as_deref(), Some("Node.js"));
    }

    #[test]
    fn parses_testrpc_as_ganache_family() {
        let identity = parse_client_version("TestRPC/v2.13.2/ethereum-js");
        assert_eq!(identity.implementation, Implementation::Ganache);
        assert_eq!(identity.node_version.as_deref(), Some("2.13.2"));
    }

    #[test]
    fn unknown_anchor_preserves_raw_string_only() {
        let identity = parse_client_version("CustomClient/v1.0.0");
        assert_eq!(identity.implementation, Implementation::Unknown);
        assert_eq!(identity.raw_version, "CustomClient/v1.0.0");
        assert_eq!(identity.node_version, None);
        assert_eq!(identity.semantic_version, None);
        assert_eq!(identity.programming_language, None);
        assert_eq!(identity.operating_system, None);
        assert_eq!(identity.architecture, None);
    }

    #[test]
    fn empty_and_garbage_input_never_panics() {
        for raw in ["", "   ", "InvalidFormat", "////", "(((", "v"] {
            let identity = parse_client_version(raw);
            assert_eq!(identity.implementation, Implementation::Unknown);
            assert_eq!(identity.raw_version, raw);
        }
    }

    #[test]
    fn malformed_geth_string_degrades_per_field() {
        // Recognized anchor but truncated payload: implementation and any
        // extractable fields survive, the rest stay absent.
        let identity = parse_client_version("Geth/v1.10.26-stable");
        assert_eq!(identity.implementation, Implementation::Geth);
        assert_eq!(identity.node_version.as_deref(), Some("1.10.26-stable"));
        assert_eq!(identity.operating_system, None);
        assert_eq!(identity.architecture, None);
        assert_eq!(identity.language_version, None);
    }

    #[test]
    fn round_trip_from_template_fields() {
        let cases = [
            ("Geth", "1.12.2", "linux", "amd64", "go1.20.3"),
            ("Besu", "23.4.0", "linux", "x86_64", "openjdk-java-17"),
            ("erigon", "2.55.0", "darwin", "arm64", "go1.21.4"),
        ];
        for (name, version, os_token, arch, lang) in cases {
            let raw = format!("{name}/v{version}/{os_token}-{arch}/{lang}");
            let identity = parse_client_version(&raw);
            assert_eq!(identity.node_version.as_deref(), Some(version), "{raw}");
            assert_eq!(identity.architecture.as_deref(), Some(arch), "{raw}");
            assert!(identity.language_version.is_some(), "{raw}");
            assert!(identity.operating_system.is_some(), "{raw}");
        }
    }
}
