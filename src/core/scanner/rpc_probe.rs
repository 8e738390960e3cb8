// src/core/scanner/rpc_probe.rs

use crate::core::models::ProbeResult;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "EthprobeRS/0.1";

/// JSON-RPC error code for a method the node does not implement. Any other
/// error code proves the method exists, which is what the capability probes
/// rely on.
const METHOD_NOT_FOUND: i64 = -32601;

/// Method names tried during discovery. A representative sample of the
/// standard surface, not an exhaustive sweep.
const DISCOVERY_METHODS: &[&str] = &[
    "web3_clientVersion",
    "web3_sha3",
    "net_version",
    "net_listening",
    "eth_protocolVersion",
    "eth_blockNumber",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_call",
    "eth_getLogs",
    "eth_getBlockByNumber",
    "eth_getTransactionReceipt",
    "eth_sendRawTransaction",
    "eth_newBlockFilter",
];

/// Failure modes of a single JSON-RPC call.
///
/// `Connection` and `Timeout` mean the endpoint could not be spoken to at
/// all; `Protocol` covers malformed envelopes and unexpected payloads; `Rpc`
/// is a well-formed error object returned by the node.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ProbeError {
    /// Whether this error means the endpoint itself is unreachable, as
    /// opposed to a single method misbehaving.
    fn is_transport(&self) -> bool {
        matches!(self, ProbeError::Connection(_) | ProbeError::Timeout(_))
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Issues one JSON-RPC 2.0 call and unwraps the response envelope.
async fn rpc_call(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
    method: &str,
    params: Value,
) -> Result<Value, ProbeError> {
    let payload = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });

    let response = client
        .post(endpoint)
        .json(&payload)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(timeout)
            } else {
                ProbeError::Connection(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::Protocol(format!("HTTP {status}")));
    }

    let envelope: RpcEnvelope = response
        .json()
        .await
        .map_err(|e| ProbeError::Protocol(format!("malformed JSON-RPC response: {e}")))?;

    if let Some(err) = envelope.error {
        return Err(ProbeError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    envelope
        .result
        .ok_or_else(|| ProbeError::Protocol("envelope carries neither result nor error".into()))
}

/// Decodes an RPC quantity: `0x`-prefixed hex, a decimal string, or a bare
/// JSON number.
fn quantity(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

async fn fetch_quantity(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
    method: &str,
) -> Result<u64, ProbeError> {
    let value = rpc_call(client, endpoint, timeout, method, json!([])).await?;
    quantity(&value)
        .ok_or_else(|| ProbeError::Protocol(format!("unexpected quantity payload: {value}")))
}

/// Runs the fixed probe battery against one endpoint and assembles a
/// `ProbeResult`.
///
/// Every call is attempted independently: a failing call records an error
/// entry, leaves its field absent, and never aborts the remaining calls.
/// The single exception is a transport-level failure on the opening
/// `web3_clientVersion` call, which proves the endpoint unreachable and
/// short-circuits the rest of the battery. No call is ever retried here;
/// retry policy, if any, belongs to the caller.
pub async fn run_probe(endpoint: &str, timeout: Duration) -> ProbeResult {
    info!(endpoint, "Starting RPC probe.");

    let client = match reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to build HTTP client for probe.");
            return ProbeResult::unreachable(endpoint, format!("http client error: {e}"));
        }
    };

    let mut result = ProbeResult::new(endpoint);
    let started = Instant::now();

    match rpc_call(&client, endpoint, timeout, "web3_clientVersion", json!([])).await {
        Ok(value) => {
            result.response_time_ms = Some(started.elapsed().as_millis() as u64);
            match value.as_str() {
                Some(raw) => result.client_version = Some(raw.to_string()),
                None => result
                    .errors
                    .push(format!("web3_clientVersion: unexpected payload: {value}")),
            }
        }
        Err(e) if e.is_transport() => {
            info!(endpoint, error = %e, "Endpoint unreachable, aborting probe battery.");
            result.errors.push(format!("web3_clientVersion: {e}"));
            return result;
        }
        Err(e) => result.errors.push(format!("web3_clientVersion: {e}")),
    }

    // Quantity-valued calls, each independently settable.
    let quantity_battery: [(&str, fn(&mut ProbeResult, u64)); 6] = [
        ("net_version", |r, v| r.network_id = Some(v)),
        ("eth_chainId", |r, v| r.chain_id = Some(v)),
        ("eth_blockNumber", |r, v| r.block_number = Some(v)),
        ("eth_gasPrice", |r, v| r.gas_price = Some(v)),
        ("net_peerCount", |r, v| r.peer_count = Some(v)),
        ("eth_hashrate", |r, v| r.hashrate = Some(v)),
    ];
    for (method, set) in quantity_battery {
        match fetch_quantity(&client, endpoint, timeout, method).await {
            Ok(value) => set(&mut result, value),
            Err(e) => result.errors.push(format!("{method}: {e}")),
        }
    }

    // eth_syncing returns `false` when idle and a progress object otherwise.
    match rpc_call(&client, endpoint, timeout, "eth_syncing", json!([])).await {
        Ok(Value::Bool(flag)) => result.syncing = Some(flag),
        Ok(_) => result.syncing = Some(true),
        Err(e) => result.errors.push(format!("eth_syncing: {e}")),
    }

    match rpc_call(&client, endpoint, timeout, "eth_mining", json!([])).await {
        Ok(value) => result.mining = value.as_bool(),
        Err(e) => result.errors.push(format!("eth_mining: {e}")),
    }

    match rpc_call(&client, endpoint, timeout, "eth_accounts", json!([])).await {
        Ok(Value::Array(entries)) => {
            let accounts: Vec<String> = entries
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            result.namespaces.accounts_exposed = !accounts.is_empty();
            result.accounts = Some(accounts);
        }
        Ok(value) => result
            .errors
            .push(format!("eth_accounts: unexpected payload: {value}")),
        Err(e) => result.errors.push(format!("eth_accounts: {e}")),
    }

    probe_namespaces(&client, endpoint, timeout, &mut result).await;
    result.supported_methods = discover_methods(&client, endpoint, timeout).await;

    info!(
        endpoint,
        errors = result.errors.len(),
        methods = result.supported_methods.len(),
        "RPC probe finished."
    );
    result
}

/// Capability probes for optional namespaces. An RPC error is a signal here
/// (the method group exists but rejected the call), not a probe failure;
/// only transport and protocol problems land in the error list.
async fn probe_namespaces(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
    result: &mut ProbeResult,
) {
    // admin and txpool count as available only when a result comes back.
    match rpc_call(client, endpoint, timeout, "admin_nodeInfo", json!([])).await {
        Ok(_) => result.namespaces.admin = true,
        Err(ProbeError::Rpc { .. }) => {}
        Err(e) => result.errors.push(format!("admin_nodeInfo: {e}")),
    }

    // debug is an existence check: the dummy argument is expected to be
    // rejected, so any error code other than "method not found" proves the
    // namespace is wired up.
    match rpc_call(
        client,
        endpoint,
        timeout,
        "debug_traceTransaction",
        json!(["0x0", {}]),
    )
    .await
    {
        Ok(_) => result.namespaces.debug = true,
        Err(ProbeError::Rpc { code, .. }) => {
            if code != METHOD_NOT_FOUND {
                result.namespaces.debug = true;
            }
        }
        Err(e) => result.errors.push(format!("debug_traceTransaction: {e}")),
    }

    match rpc_call(client, endpoint, timeout, "txpool_status", json!([])).await {
        Ok(_) => result.namespaces.txpool = true,
        Err(ProbeError::Rpc { .. }) => {}
        Err(e) => result.errors.push(format!("txpool_status: {e}")),
    }
}

/// Tests a sample of standard method names; a method is supported unless
/// the node answers with "method not found". Transport failures just skip
/// the method.
async fn discover_methods(
    client: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
) -> Vec<String> {
    let mut supported = Vec::new();
    for method in DISCOVERY_METHODS {
        match rpc_call(client, endpoint, timeout, method, json!([])).await {
            Ok(_) => supported.push(method.to_string()),
            Err(ProbeError::Rpc { code, .. }) if code != METHOD_NOT_FOUND => {
                supported.push(method.to_string());
            }
            Err(e) => debug!(method, error = %e, "Method probe skipped."),
        }
    }
    supported
}
