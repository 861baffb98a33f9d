//! ARC client against a mock HTTP server.

use bsv_primitives::chainhash::Hash;
use bsv_script::Script;
use bsv_spv::Broadcaster;
use bsv_transaction::{Outpoint, Transaction, TransactionInput, TransactionOutput};
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{ArcClient, ArcConfig, ArcError, ArcStatus};

fn config(base_url: &str) -> ArcConfig {
    ArcConfig { base_url: base_url.to_string(), ..ArcConfig::default() }
}

fn client(server: &MockServer) -> ArcClient {
    ArcClient::new(config(&server.uri())).unwrap()
}

fn sample_tx() -> Transaction {
    let mut tx = Transaction::new();
    let mut input = TransactionInput::new(Outpoint::new(Hash::new([5; 32]), 1));
    input.unlocking_script = Some(Script::from_bytes(&[0x51]));
    tx.add_input(input);
    tx.add_output(TransactionOutput::new(900, Script::p2pkh(&[3; 20])));
    tx
}

async fn answer_submit(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST")).and(path("/tx")).respond_with(response).mount(server).await;
}

#[tokio::test]
async fn test_broadcast_success_sends_raw_bytes() {
    let server = MockServer::start().await;
    let tx = sample_tx();
    Mock::given(method("POST"))
        .and(path("/tx"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(tx.to_bytes()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txid": tx.tx_id().to_string(),
            "txStatus": "SEEN_ON_NETWORK",
            "status": 200,
            "title": "OK"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let success = client(&server).broadcast(&tx).await.unwrap();
    assert_eq!(success.txid, tx.tx_id());
    assert_eq!(success.message, "SEEN_ON_NETWORK");
}

#[tokio::test]
async fn test_headers_follow_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tx"))
        .and(header("Authorization", "Bearer test-key"))
        .and(header("X-CallbackUrl", "https://example.com/callback"))
        .and(header("X-CallbackToken", "cb-token"))
        .and(header("X-WaitForStatus", "8"))
        .and(header("X-SkipFeeValidation", "true"))
        .and(header("X-CumulativeFeeValidation", "true"))
        .and(header("X-MaxTimeout", "30"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txid": "00",
            "txStatus": "QUEUED",
            "status": 200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ArcClient::new(ArcConfig {
        api_key: Some("test-key".into()),
        callback_url: Some("https://example.com/callback".into()),
        callback_token: Some("cb-token".into()),
        wait_for_status: Some(ArcStatus::SeenOnNetwork),
        skip_fee_validation: true,
        cumulative_fee_validation: true,
        max_timeout: Some(30),
        ..config(&server.uri())
    })
    .unwrap();
    let response = client.submit(&sample_tx()).await.unwrap();
    assert_eq!(response.tx_status, Some(ArcStatus::Queued));
}

#[tokio::test]
async fn test_no_optional_headers_by_default() {
    let server = MockServer::start().await;
    answer_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"txStatus": "STORED"})),
    )
    .await;

    client(&server).submit(&sample_tx()).await.unwrap();
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    for name in ["authorization", "x-callbackurl", "x-waitforstatus", "x-skipfeevalidation"] {
        assert!(!requests[0].headers.contains_key(name), "unexpected header {}", name);
    }
}

#[tokio::test]
async fn test_rejected_status_is_fatal() {
    let server = MockServer::start().await;
    answer_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txid": "00",
            "txStatus": "REJECTED",
            "status": 200,
            "extraInfo": "dust output"
        })),
    )
    .await;

    let client = client(&server);
    match client.submit(&sample_tx()).await {
        Err(ArcError::Rejected { status, detail }) => {
            assert_eq!(status, ArcStatus::Rejected);
            assert_eq!(detail, "dust output");
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
    let failure = client.broadcast(&sample_tx()).await.unwrap_err();
    assert!(!failure.retryable);
    assert_eq!(failure.code, "REJECTED");
}

#[tokio::test]
async fn test_double_spend_is_fatal() {
    let server = MockServer::start().await;
    answer_submit(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txStatus": "DOUBLE_SPEND_ATTEMPTED",
            "detail": "competing transaction seen"
        })),
    )
    .await;

    let failure = client(&server).broadcast(&sample_tx()).await.unwrap_err();
    assert!(!failure.retryable);
    assert!(failure.description.contains("competing transaction seen"));
}

#[tokio::test]
async fn test_client_error_uses_arc_code() {
    let server = MockServer::start().await;
    answer_submit(
        &server,
        ResponseTemplate::new(465).set_body_json(serde_json::json!({
            "status": 465,
            "title": "Fee too low",
            "detail": "fee is below the minimum"
        })),
    )
    .await;

    let failure = client(&server).broadcast(&sample_tx()).await.unwrap_err();
    assert!(!failure.retryable);
    assert_eq!(failure.code, "465");
    assert!(failure.description.contains("fee is below the minimum"));
}

#[tokio::test]
async fn test_server_errors_are_retryable() {
    let server = MockServer::start().await;
    answer_submit(
        &server,
        ResponseTemplate::new(502).set_body_string("<html><body>Bad Gateway</body></html>"),
    )
    .await;

    let client = client(&server);
    match client.submit(&sample_tx()).await {
        Err(err @ ArcError::Http { status: 502, .. }) => {
            assert!(err.is_retryable());
            assert!(err.to_string().contains("Bad Gateway"));
        }
        other => panic!("expected an HTTP error, got {:?}", other),
    }
    assert!(client.broadcast(&sample_tx()).await.unwrap_err().retryable);
}

#[tokio::test]
async fn test_malformed_body_is_retryable() {
    let server = MockServer::start().await;
    answer_submit(&server, ResponseTemplate::new(200).set_body_string("{not valid json")).await;

    let client = client(&server);
    assert!(matches!(client.submit(&sample_tx()).await, Err(ArcError::Decode(_))));
    let failure = client.broadcast(&sample_tx()).await.unwrap_err();
    assert!(failure.retryable);
    assert_eq!(failure.code, "DECODE");
}

#[tokio::test]
async fn test_connection_refused_is_retryable() {
    let client = ArcClient::new(config("http://127.0.0.1:1")).unwrap();
    let failure = client.broadcast(&sample_tx()).await.unwrap_err();
    assert!(failure.retryable);
    assert_eq!(failure.code, "TRANSPORT");
}

#[tokio::test]
async fn test_slow_answer_times_out() {
    let server = MockServer::start().await;
    answer_submit(
        &server,
        ResponseTemplate::new(200)
            .set_delay(std::time::Duration::from_secs(3))
            .set_body_json(serde_json::json!({"txStatus": "QUEUED"})),
    )
    .await;

    let client = ArcClient::new(ArcConfig { request_timeout_secs: 1, ..config(&server.uri()) }).unwrap();
    let failure = client.broadcast(&sample_tx()).await.unwrap_err();
    assert!(failure.retryable);
    assert_eq!(failure.code, "TIMEOUT");
}

#[tokio::test]
async fn test_status_of_mined_transaction() {
    let server = MockServer::start().await;
    let txid = sample_tx().tx_id();
    Mock::given(method("GET"))
        .and(path(format!("/tx/{}", txid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "txid": txid.to_string(),
            "txStatus": "MINED",
            "status": 200,
            "blockHeight": 850000,
            "blockHash": "000000000000000000026f5a9cf8e64507d75e70a9c37acac5b59a5e8c4dfe3c",
            "merklePath": "fed123abc"
        })))
        .mount(&server)
        .await;

    let response = client(&server).status(&txid).await.unwrap();
    assert_eq!(response.tx_status, Some(ArcStatus::Mined));
    assert_eq!(response.block_height, Some(850000));
    assert_eq!(response.merkle_path.as_deref(), Some("fed123abc"));
}

#[tokio::test]
async fn test_status_not_found() {
    let server = MockServer::start().await;
    let txid = Hash::new([9; 32]);
    Mock::given(method("GET"))
        .and(path(format!("/tx/{}", txid)))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "status": 404,
            "title": "Not found"
        })))
        .mount(&server)
        .await;

    match client(&server).status(&txid).await {
        Err(ArcError::Http { status: 404, detail }) => assert_eq!(detail, "Not found"),
        other => panic!("expected 404, got {:?}", other),
    }
}
