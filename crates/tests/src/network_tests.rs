//! Network Detection Tests
//!
//! Verify chain-identity detection: the one-shot probe round shared by
//! concurrent callers, fatal mismatches on first detection, soft exclusion
//! on later drift, the periodic reset sweep, and identity caching.

use crate::mock_infrastructure::{
    batching, fast_retry, mainnet_provider, mainnet_responder, BatchRpcMock,
};
use futures::future::join_all;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use volley_core::error::ProviderError;
use volley_core::provider::FallbackProvider;

#[tokio::test]
async fn test_chain_mismatch_at_startup_is_fatal() {
    let wrong = BatchRpcMock::start(|method, _| match method {
        "eth_chainId" => Ok(json!("0x89")),
        _ => Ok(json!("0x0")),
    })
    .await;
    let right = BatchRpcMock::start(mainnet_responder).await;
    let provider =
        mainnet_provider(&[wrong.url(), right.url()], batching(10), fast_retry(2));

    let error = provider.call("eth_blockNumber", json!([])).await.unwrap_err();
    match &error {
        ProviderError::ChainMismatch { endpoint, actual, expected } => {
            assert_eq!(endpoint, "rpc0");
            assert!(actual.contains("polygon"), "actual: {actual}");
            assert!(expected.contains("mainnet"), "expected: {expected}");
        }
        other => panic!("expected a chain mismatch, got {other:?}"),
    }

    // nothing but probes reached either endpoint
    assert!(wrong.entries().iter().all(|entry| entry["method"] == "eth_chainId"));
    assert!(right.entries().iter().all(|entry| entry["method"] == "eth_chainId"));

    // the mismatch stays fatal until a detection round succeeds
    assert_eq!(provider.detect_network().await.unwrap_err().code(), "chain_mismatch");
}

#[tokio::test]
async fn test_first_detection_without_expectation_requires_agreement() {
    let a = BatchRpcMock::start(|method, _| match method {
        "eth_chainId" => Ok(json!("0x1")),
        _ => Ok(json!("0x0")),
    })
    .await;
    let b = BatchRpcMock::start(|method, _| match method {
        "eth_chainId" => Ok(json!("0x89")),
        _ => Ok(json!("0x0")),
    })
    .await;
    let provider = FallbackProvider::builder()
        .endpoint("a", a.url())
        .endpoint("b", b.url())
        .request_policy(batching(10))
        .retry_policy(fast_retry(2))
        .build()
        .unwrap();

    // without an expectation the first answer becomes the reference
    let error = provider.detect_network().await.unwrap_err();
    match &error {
        ProviderError::ChainMismatch { endpoint, .. } => assert_eq!(endpoint, "b"),
        other => panic!("expected a chain mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_detection_agrees_without_expectation() {
    let a = BatchRpcMock::start(mainnet_responder).await;
    let b = BatchRpcMock::start(mainnet_responder).await;
    let provider = FallbackProvider::builder()
        .endpoint("a", a.url())
        .endpoint("b", b.url())
        .request_policy(batching(10))
        .retry_policy(fast_retry(2))
        .build()
        .unwrap();

    let identity = provider.detect_network().await.unwrap();
    assert_eq!(identity.chain_id, 1);
    assert_eq!(identity.name, "mainnet");
    assert!(identity.ens_registry.is_some());
}

#[tokio::test]
async fn test_identity_is_cached_between_calls() {
    let mock = BatchRpcMock::start(mainnet_responder).await;
    let provider = mainnet_provider(&[mock.url()], batching(10), fast_retry(2));

    let identity = provider.get_network().await.unwrap();
    assert_eq!(identity.chain_id, 1);

    provider.call("eth_blockNumber", json!([])).await.unwrap();
    provider.call("eth_blockNumber", json!([])).await.unwrap();
    assert_eq!(mock.count_of("eth_chainId"), 1);
}

#[tokio::test]
async fn test_detection_probes_run_once_for_concurrent_first_calls() {
    let mock = BatchRpcMock::start(mainnet_responder).await;
    let provider = mainnet_provider(&[mock.url()], batching(10), fast_retry(2));

    let calls: Vec<_> = (0..4).map(|_| provider.call("eth_blockNumber", json!([]))).collect();
    for result in join_all(calls).await {
        result.unwrap();
    }
    assert_eq!(mock.count_of("eth_chainId"), 1);
}

#[tokio::test]
async fn test_every_probe_failing_is_a_detection_error() {
    let a = BatchRpcMock::start_http_error(503).await;
    let b = BatchRpcMock::start_http_error(503).await;
    let provider = mainnet_provider(&[a.url(), b.url()], batching(10), fast_retry(2));

    let error = provider.call("eth_blockNumber", json!([])).await.unwrap_err();
    assert_eq!(error.code(), "network_detection");
}

#[tokio::test]
async fn test_later_mismatch_excludes_the_endpoint() {
    let primary = BatchRpcMock::start(|method, _| match method {
        "eth_chainId" => Ok(json!("0x1")),
        "eth_blockNumber" => Ok(json!("0x100")),
        _ => Err((-32000, "unavailable".to_owned())),
    })
    .await;
    // answers mainnet on the first probe, polygon on every later one
    let probes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&probes);
    let drifter = BatchRpcMock::start(move |method, _| match method {
        "eth_chainId" => {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(json!("0x1"))
            } else {
                Ok(json!("0x89"))
            }
        }
        _ => Ok(json!("0x100")),
    })
    .await;
    let provider = FallbackProvider::builder()
        .endpoint("rpc0", primary.url())
        .endpoint("rpc1", drifter.url())
        .expected_chain_id(1)
        .request_policy(batching(10))
        .retry_policy(fast_retry(2))
        .reset_interval(Duration::from_millis(50))
        .build()
        .unwrap();

    provider.call("eth_blockNumber", json!([])).await.unwrap();

    // let the reset sweep invalidate the cached identity
    tokio::time::sleep(Duration::from_millis(120)).await;

    // re-detection drops the drifted endpoint instead of failing the
    // provider, so the call dies on the only usable endpoint
    let error = provider.call("eth_call", json!([])).await.unwrap_err();
    assert!(matches!(error, ProviderError::AllEndpointsFailed { .. }), "got {error:?}");
    assert_eq!(drifter.count_of("eth_call"), 0);
    assert_eq!(drifter.count_of("eth_chainId"), 2);
}

#[tokio::test]
async fn test_reset_sweep_readmits_endpoints_and_restarts_rotation() {
    let flaky = BatchRpcMock::start(|method, _| match method {
        "eth_chainId" => Ok(json!("0x1")),
        _ => Err((-32000, "unavailable".to_owned())),
    })
    .await;
    let steady = BatchRpcMock::start(|method, _| match method {
        "eth_chainId" => Ok(json!("0x1")),
        "eth_call" => Ok(json!("0xfeed")),
        other => Err((-32601, format!("the method {other} does not exist"))),
    })
    .await;
    let provider = FallbackProvider::builder()
        .endpoint("rpc0", flaky.url())
        .endpoint("rpc1", steady.url())
        .expected_chain_id(1)
        .request_policy(batching(10))
        .retry_policy(fast_retry(2))
        .reset_interval(Duration::from_millis(50))
        .build()
        .unwrap();

    // first call exhausts the flaky endpoint and rotates away
    let result = provider.call("eth_call", json!([])).await.unwrap();
    assert_eq!(result, json!("0xfeed"));
    assert_eq!(flaky.count_of("eth_call"), 2);

    // rotation is sticky while the sweep has not fired
    provider.call("eth_call", json!([])).await.unwrap();
    assert_eq!(flaky.count_of("eth_call"), 2);
    assert_eq!(flaky.count_of("eth_chainId"), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;

    // after the sweep: fresh probes, rotation back at the head
    provider.call("eth_call", json!([])).await.unwrap();
    assert_eq!(flaky.count_of("eth_chainId"), 2);
    assert_eq!(flaky.count_of("eth_call"), 4);
    assert_eq!(steady.count_of("eth_call"), 3);
}
