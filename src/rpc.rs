// src/rpc.rs
//
// Minimal JSON-RPC client over the ResilientFetcher. Only the two methods the
// resolver needs: eth_blockNumber (never memoized) and eth_call (memoized per block).

use ethers::types::{Address, Bytes};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::{ResolverError, Result};
use crate::fetcher::{CallKind, CallSignature, ResilientFetcher};
use crate::networks::{Network, NetworkRegistry};
use crate::transport::{Transport, TransportError};
use crate::types::BlockTag;

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    fetcher: Arc<ResilientFetcher>,
    registry: Arc<NetworkRegistry>,
}

/// Pulls `result` out of a JSON-RPC envelope; an `error` member is a retryable failure.
fn rpc_result(url: &str, mut response: Value) -> std::result::Result<Value, TransportError> {
    if let Some(err) = response.get("error").filter(|e| !e.is_null()) {
        return Err(TransportError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match response.get_mut("result").map(Value::take) {
        Some(result) if !result.is_null() => Ok(result),
        _ => Err(TransportError::Malformed {
            url: url.to_string(),
            message: "missing result".to_string(),
        }),
    }
}

fn parse_hex_quantity(value: &Value) -> Result<u64> {
    let raw = value
        .as_str()
        .ok_or_else(|| ResolverError::invalid_response(format!("expected hex quantity, got {}", value)))?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| ResolverError::invalid_response(format!("bad hex quantity '{}': {}", raw, e)))
}

fn parse_hex_bytes(value: &Value) -> Result<Bytes> {
    let raw = value
        .as_str()
        .ok_or_else(|| ResolverError::invalid_response(format!("expected hex data, got {}", value)))?;
    hex::decode(raw.trim_start_matches("0x"))
        .map(Bytes::from)
        .map_err(|e| ResolverError::invalid_response(format!("bad hex data '{}': {}", raw, e)))
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>, fetcher: Arc<ResilientFetcher>, registry: Arc<NetworkRegistry>) -> Self {
        Self {
            transport,
            fetcher,
            registry,
        }
    }

    async fn request(&self, network: Network, signature: CallSignature, method: &str, params: Value, memoize: bool) -> Result<Value> {
        let url = self.registry.resolve(network)?.rpc_url.clone();
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let call = || {
            let transport = self.transport.clone();
            let url = url.clone();
            let body = body.clone();
            async move {
                let response = transport.post_json(&url, &body).await?;
                rpc_result(&url, response)
            }
        };

        if memoize {
            self.fetcher.fetch(signature, call).await
        } else {
            self.fetcher.fetch_fresh(signature, call).await
        }
    }

    /// Current chain head. Always hits the node.
    pub async fn block_number(&self, network: Network) -> Result<u64> {
        let signature = CallSignature::new(CallKind::Rpc, network, "eth_blockNumber", network.as_str());
        let result = self
            .request(network, signature, "eth_blockNumber", json!([]), false)
            .await?;
        parse_hex_quantity(&result)
    }

    /// `eth_call` of `data` against `to` at `block`; memoized per (network, to, data, block).
    pub async fn eth_call(&self, network: Network, to: Address, data: &[u8], block: BlockTag) -> Result<Bytes> {
        let calldata = format!("0x{}", hex::encode(data));
        let target = format!("{:?}", to);
        let signature = CallSignature::new(CallKind::Rpc, network, "eth_call", target.clone())
            .at_block(block)
            .with_arg(calldata.clone());
        let params = json!([{ "to": target, "data": calldata }, block.to_string()]);

        let result = self.request(network, signature, "eth_call", params, true).await?;
        parse_hex_bytes(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_object_is_transport_error() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "header not found"}});
        match rpc_result("https://rpc.example", response) {
            Err(TransportError::Rpc { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "header not found");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_missing_result_is_malformed() {
        let response = json!({"jsonrpc": "2.0", "id": 1});
        assert!(matches!(
            rpc_result("https://rpc.example", response),
            Err(TransportError::Malformed { .. })
        ));
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(parse_hex_quantity(&json!("0xf9f4f8")).unwrap(), 16_381_176);
        assert!(parse_hex_quantity(&json!(12)).is_err());
        assert_eq!(parse_hex_bytes(&json!("0x0102")).unwrap().to_vec(), vec![1u8, 2u8]);
        assert!(parse_hex_bytes(&json!("0xzz")).is_err());
    }
}
