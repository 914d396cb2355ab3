use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use node_health_sentinel::eval_stats::EvalStats;
use node_health_sentinel::evaluator::{NodeHealthEvaluator, RateSettings};
use node_health_sentinel::explorer::ExplorerClient;
use node_health_sentinel::models::{Address, GroupVerdict, OnlineStatus, StallStatus};
use node_health_sentinel::window::HealthPolicy;
use tokio_util::sync::CancellationToken;

const NODE: &str = "0x00000000000000000000000000000000000000bb";
const DELAY: Duration = Duration::from_millis(10);

fn rate_limited() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": "0",
        "message": "NOTOK",
        "result": "Max calls per sec rate limit reached (2/sec)"
    }))
}

async fn setup() -> (MockServer, ExplorerClient, Arc<EvalStats>, Address) {
    let server = MockServer::start().await;
    let stats = Arc::new(EvalStats::new());
    let client = ExplorerClient::new(&format!("{}/api", server.uri()), "TESTKEY", stats.clone())
        .unwrap();
    (server, client, stats, NODE.parse().unwrap())
}

#[tokio::test]
async fn balance_is_converted_to_ether() {
    let (server, client, stats, address) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("module", "account"))
        .and(query_param("action", "balance"))
        .and(query_param("address", NODE))
        .and(query_param("tag", "latest"))
        .and(query_param("apikey", "TESTKEY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": "2250000000000000000"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let balance = client.fetch_balance(&address, DELAY).await.unwrap();
    assert!((balance - 2.25).abs() < 1e-12);
    assert_eq!(stats.snapshot().fetch_attempts, 1);
}

#[tokio::test]
async fn rate_limit_in_ok_body_is_retried() {
    let (server, client, stats, address) = setup().await;
    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .respond_with(rate_limited())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("action", "txlist"))
        .and(query_param("sort", "desc"))
        .and(query_param("page", "1"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "1",
            "message": "OK",
            "result": [
                { "hash": "0x1", "timeStamp": "1700000100", "isError": "0",
                  "input": "0x5c36b186", "functionName": "ping()" },
                { "hash": "0x2", "timeStamp": "1700000000", "isError": "1",
                  "input": "0xf21a494b00", "functionName": "commit(uint256)" }
            ]
        })))
        .mount(&server)
        .await;

    let txs = client.fetch_transactions(&address, DELAY).await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].timestamp, 1_700_000_100);
    assert!(!txs[1].succeeded());

    let snap = stats.snapshot();
    assert_eq!(snap.fetch_attempts, 2);
    assert_eq!(snap.rate_limited, 1);
    assert_eq!(snap.neutral_results, 0);
}

#[tokio::test]
async fn persistent_rate_limit_yields_no_balance() {
    let (server, client, stats, address) = setup().await;
    Mock::given(method("GET"))
        .respond_with(rate_limited())
        .expect(3)
        .mount(&server)
        .await;

    assert_eq!(client.fetch_balance(&address, DELAY).await, None);
    let snap = stats.snapshot();
    assert_eq!(snap.rate_limited, 3);
    assert_eq!(snap.neutral_results, 1);
}

#[tokio::test]
async fn unrelated_error_string_fails_fast() {
    let (server, client, _stats, address) = setup().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Error! Invalid address format"
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.fetch_transactions(&address, DELAY).await, None);
}

#[tokio::test]
async fn server_errors_are_retried_then_absorbed() {
    let (server, client, stats, address) = setup().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    assert_eq!(client.fetch_transactions(&address, DELAY).await, None);
    assert_eq!(stats.snapshot().rate_limited, 0);
    assert_eq!(stats.snapshot().neutral_results, 1);
}

#[tokio::test]
async fn empty_history_is_not_an_error() {
    let (server, client, stats, address) = setup().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.fetch_transactions(&address, DELAY).await, Some(Vec::new()));
    assert_eq!(stats.snapshot().neutral_results, 0);
}

#[tokio::test]
async fn unreachable_explorer_reports_unknown_stall() {
    let (server, client, stats, address) = setup().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(6)
        .mount(&server)
        .await;

    let evaluator = NodeHealthEvaluator::new(
        Arc::new(client),
        HealthPolicy::default(),
        RateSettings {
            max_calls_per_second: 1_000.0,
            floor_delay_secs: 0.0,
        },
        stats.clone(),
    );
    let reports = evaluator
        .evaluate(std::slice::from_ref(&address), &CancellationToken::new())
        .await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.address, address);
    assert_eq!(report.stall_status, StallStatus::Unknown);
    assert_eq!(report.online_status, OnlineStatus::Unknown);
    assert_eq!(report.health_strip, vec![GroupVerdict::Empty; 5]);
    assert_eq!(report.balance, 0.0);
    assert_eq!(stats.snapshot().neutral_results, 2);
}
