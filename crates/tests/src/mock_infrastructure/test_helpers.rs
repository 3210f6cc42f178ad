//! Test Helper Functions and Fixtures
//!
//! Common provider configurations and Ethereum response fixtures.

use serde_json::{json, Value};
use std::time::Duration;
use volley_core::config::{RequestPolicy, RetryPolicy};
use volley_core::provider::FallbackProvider;

use super::rpc_mock::RpcOutcome;

/// Retry policy with near-zero backoff so failure paths run in
/// milliseconds.
#[must_use]
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy { max_retries, min_backoff_ms: 1, max_backoff_ms: 4, log_retries: false }
}

/// Request policy with a 1ms aggregation window and the given batch cap.
#[must_use]
pub fn batching(max_batch_size: usize) -> RequestPolicy {
    RequestPolicy { max_batch_size, max_concurrent_batches: 5, aggregation_window_ms: 1 }
}

/// Builds a mainnet-expecting provider over `urls`, named `rpc0`, `rpc1`,
/// ... in order.
#[must_use]
pub fn mainnet_provider(
    urls: &[String],
    request: RequestPolicy,
    retry: RetryPolicy,
) -> FallbackProvider {
    let mut builder = FallbackProvider::builder()
        .expected_chain_id(1)
        .request_policy(request)
        .retry_policy(retry)
        .reset_interval(Duration::from_secs(60));
    for (ordinal, url) in urls.iter().enumerate() {
        builder = builder.endpoint(format!("rpc{ordinal}"), url.clone());
    }
    builder.build().expect("test provider config must be valid")
}

/// Answers the methods the provider itself issues plus a generic block
/// fetch; everything else gets a method-not-found error.
pub fn mainnet_responder(method: &str, params: &Value) -> RpcOutcome {
    match method {
        "eth_chainId" => Ok(json!("0x1")),
        "eth_blockNumber" => Ok(json!("0x100")),
        "eth_getBlockByNumber" => {
            let number = params
                .get(0)
                .and_then(Value::as_str)
                .unwrap_or("0x0")
                .to_owned();
            Ok(test_block(&number))
        }
        other => Err((-32601, format!("the method {other} does not exist"))),
    }
}

/// Minimal block fixture for a hex block number.
#[must_use]
pub fn test_block(number: &str) -> Value {
    json!({
        "number": number,
        "hash": format!("0xb{}", number.trim_start_matches("0x")),
        "parentHash": "0x00",
        "timestamp": "0x5f5e100",
        "transactions": [],
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x5208",
        "baseFeePerGas": "0x7"
    })
}

/// Receipt fixture mined in the given block.
#[must_use]
pub fn test_receipt(tx_hash: &str, block_number: u64) -> Value {
    json!({
        "transactionHash": tx_hash,
        "transactionIndex": "0x0",
        "blockHash": format!("0x{block_number:064x}"),
        "blockNumber": format!("0x{block_number:x}"),
        "from": "0x0000000000000000000000000000000000000001",
        "to": "0x0000000000000000000000000000000000000002",
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "contractAddress": null,
        "logs": [],
        "status": "0x1",
        "effectiveGasPrice": "0x1"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_fixture_carries_the_requested_number() {
        let block = test_block("0x64");
        assert_eq!(block["number"], "0x64");
    }

    #[test]
    fn test_receipt_fixture_encodes_the_block_number() {
        let receipt = test_receipt("0xdead", 16);
        assert_eq!(receipt["blockNumber"], "0x10");
        assert_eq!(receipt["transactionHash"], "0xdead");
    }
}
