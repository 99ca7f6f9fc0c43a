//! Minimal Ethereum JSON-RPC client over `reqwest`

use alloy_primitives::{Address, TxHash, U256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use super::{ReceiptStatus, Transport, TransportError, TransportResult};
use crate::tx_builder::SignedEnvelope;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawReceipt {
    #[serde(default)]
    status: Option<U64>,
}

/// JSON-RPC transport bound to a single endpoint
#[derive(Debug)]
pub struct JsonRpcTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout_ms: u64,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let endpoint = endpoint.into();
        let timeout_ms = timeout.as_millis() as u64;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::from_reqwest(&endpoint, timeout_ms, &e))?;

        Ok(Self {
            client,
            endpoint,
            timeout_ms,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&self, method: &'a str, params: Value) -> RpcRequest<'a> {
        RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        }
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, body: &B) -> TransportResult<R> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&self.endpoint, self.timeout_ms, &e))?;

        let response = response
            .error_for_status()
            .map_err(|e| TransportError::from_reqwest(&self.endpoint, self.timeout_ms, &e))?;

        response
            .json::<R>()
            .await
            .map_err(|e| TransportError::from_reqwest(&self.endpoint, self.timeout_ms, &e))
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> TransportResult<T> {
        let request = self.request(method, params);
        trace!(method, id = request.id, "JSON-RPC call");
        let response: RpcResponse = self.post(&request).await?;
        self.into_result(response)
    }

    fn into_result<T: DeserializeOwned>(&self, response: RpcResponse) -> TransportResult<T> {
        if let Some(error) = response.error {
            return Err(TransportError::from_rpc_error(
                &self.endpoint,
                Some(error.code),
                &error.message,
            ));
        }
        serde_json::from_value(response.result.unwrap_or(Value::Null)).map_err(|e| {
            TransportError::Decode {
                endpoint: self.endpoint.clone(),
                message: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl Transport for JsonRpcTransport {
    async fn get_sequence(&self, address: Address) -> TransportResult<u64> {
        let count: U64 = self
            .call("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        Ok(count.to::<u64>())
    }

    async fn submit(&self, envelope: &SignedEnvelope) -> TransportResult<TxHash> {
        self.call("eth_sendRawTransaction", json!([envelope.raw()])).await
    }

    async fn submit_batch(&self, envelopes: &[SignedEnvelope]) -> Vec<TransportResult<TxHash>> {
        if envelopes.is_empty() {
            return Vec::new();
        }

        let requests: Vec<RpcRequest<'_>> = envelopes
            .iter()
            .map(|envelope| self.request("eth_sendRawTransaction", json!([envelope.raw()])))
            .collect();
        let ids: Vec<u64> = requests.iter().map(|r| r.id).collect();

        let responses: Vec<RpcResponse> = match self.post(&requests).await {
            Ok(responses) => responses,
            Err(err) => return ids.iter().map(|_| Err(err.clone())).collect(),
        };
        debug!(requested = ids.len(), answered = responses.len(), "Batch submission answered");

        // Batch answers may arrive in any order
        let mut by_id: HashMap<u64, RpcResponse> =
            responses.into_iter().map(|r| (r.id, r)).collect();
        ids.into_iter()
            .map(|id| match by_id.remove(&id) {
                Some(response) => self.into_result(response),
                None => Err(TransportError::Decode {
                    endpoint: self.endpoint.clone(),
                    message: format!("missing response for request id {id}"),
                }),
            })
            .collect()
    }

    async fn get_receipt(&self, hash: TxHash) -> TransportResult<ReceiptStatus> {
        let receipt: Option<RawReceipt> =
            self.call("eth_getTransactionReceipt", json!([hash])).await?;
        Ok(match receipt {
            None => ReceiptStatus::Pending,
            Some(RawReceipt { status: Some(status) }) if status == U64::from(1) => {
                ReceiptStatus::Success
            }
            Some(_) => ReceiptStatus::Failed,
        })
    }

    async fn get_balance(&self, address: Address) -> TransportResult<U256> {
        self.call("eth_getBalance", json!([address, "latest"])).await
    }
}
