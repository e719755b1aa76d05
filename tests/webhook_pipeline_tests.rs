//! End-to-end webhook pipeline tests against HTTP doubles.
//!
//! A wiremock server stands in for the Port API and another for the user's
//! webhook target; events are fed straight into the pipeline the way a
//! source adapter would.

mod common;

use std::sync::Arc;

use port_agent::crypto::{compact_json, sign_sha256, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use port_agent::{EventOrigin, EventProcessor, Mapping, PortClient, RunPipeline};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "test-secret";

async fn port_api_mock() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "token"})))
        .mount(&server)
        .await;
    server
}

fn pipeline(port_api: &MockServer, mappings: Vec<Mapping>) -> RunPipeline {
    let settings = Arc::new(common::test_settings(&port_api.uri(), "http://unused"));
    let port = Arc::new(PortClient::new(settings.clone()).unwrap());
    RunPipeline::new(settings, port, Arc::new(mappings)).unwrap()
}

fn identity_mapping() -> Vec<Mapping> {
    serde_json::from_str(r#"[{"enabled": true, "body": "."}]"#).unwrap()
}

fn run_event(target_url: &str, agent: bool) -> Value {
    json!({
        "action": "Create",
        "resourceType": "run",
        "status": "TRIGGERED",
        "context": {
            "entity": null,
            "blueprint": "Service",
            "runId": "r_jE5FhDURh4Uen2Qr"
        },
        "payload": {
            "entity": null,
            "action": {
                "identifier": "Create",
                "invocationMethod": {
                    "type": "WEBHOOK",
                    "agent": agent,
                    "url": target_url
                }
            },
            "properties": {}
        }
    })
}

#[tokio::test]
async fn test_run_event_dispatched_with_valid_signature() {
    let port_api = port_api_mock().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    let event = run_event(&format!("{}/x", target.uri()), true);
    let pipeline = pipeline(&port_api, identity_mapping());
    pipeline
        .process(event.clone(), EventOrigin::ActionRun)
        .await
        .unwrap();

    let requests = target.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    // The JSON body is the event itself, untouched.
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, event);

    // The signature covers `timestamp + "." + compact_json(body)`.
    let timestamp = request
        .headers
        .get(TIMESTAMP_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    let signature = request
        .headers
        .get(SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(signature, sign_sha256(&compact_json(&body), SECRET, timestamp));

    // Nothing to report: 200 response, invocation not synchronized.
    let port_requests = port_api.received_requests().await.unwrap();
    assert!(port_requests.iter().all(|r| r.method != "PATCH"));
}

#[tokio::test]
async fn test_agentless_event_is_skipped() {
    let port_api = port_api_mock().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&target)
        .await;

    let event = run_event(&format!("{}/x", target.uri()), false);
    let pipeline = pipeline(&port_api, identity_mapping());
    pipeline.process(event, EventOrigin::ActionRun).await.unwrap();

    assert!(target.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_changelog_event_dispatched_without_reporting() {
    let port_api = port_api_mock().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/test"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    let event = json!({
        "action": "Create",
        "resourceType": "run",
        "changelogDestination": {
            "type": "WEBHOOK",
            "agent": true,
            "url": format!("{}/api/test", target.uri())
        }
    });
    let pipeline = pipeline(&port_api, identity_mapping());
    pipeline.process(event, EventOrigin::Changelog).await.unwrap();

    assert_eq!(target.received_requests().await.unwrap().len(), 1);
    // Changelog events carry no run id, so nothing reaches the runs API.
    let port_requests = port_api.received_requests().await.unwrap();
    assert!(port_requests
        .iter()
        .all(|r| !r.url.path().starts_with("/v1/actions/runs")));
}

#[tokio::test]
async fn test_synchronized_run_reports_response_and_status() {
    let port_api = port_api_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/actions/runs/r_jE5FhDURh4Uen2Qr/response"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&port_api)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/actions/runs/r_jE5FhDURh4Uen2Qr"))
        .and(body_json(json!({"status": "SUCCESS", "link": "http://test.com"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&port_api)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/actions/runs/r_jE5FhDURh4Uen2Qr/logs"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&port_api)
        .await;

    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deployed": true})))
        .expect(1)
        .mount(&target)
        .await;

    let mut event = run_event(&format!("{}/x", target.uri()), true);
    event["payload"]["action"]["invocationMethod"]["synchronized"] = json!(true);

    let mappings: Vec<Mapping> = serde_json::from_str(
        r#"[{"enabled": true, "body": ".", "report": {"link": "\"http://test.com\""}}]"#,
    )
    .unwrap();
    let pipeline = pipeline(&port_api, mappings);
    pipeline.process(event, EventOrigin::ActionRun).await.unwrap();

    // The captured target response was fed back verbatim.
    let port_requests = port_api.received_requests().await.unwrap();
    let response_patch = port_requests
        .iter()
        .find(|r| r.url.path().ends_with("/response"))
        .unwrap();
    let body: Value = serde_json::from_slice(&response_patch.body).unwrap();
    assert_eq!(body, json!({"deployed": true}));
}

#[tokio::test]
async fn test_failed_dispatch_reports_failure_and_surfaces() {
    let port_api = port_api_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/actions/runs/r_jE5FhDURh4Uen2Qr"))
        .and(body_json(json!({
            "status": "FAILURE",
            "summary": "Invoker failed with status code: 500"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&port_api)
        .await;

    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&target)
        .await;

    let event = run_event(&format!("{}/x", target.uri()), true);
    let pipeline = pipeline(&port_api, identity_mapping());
    let result = pipeline.process(event, EventOrigin::ActionRun).await;

    // The failure surfaces so the source adapter records it.
    assert!(result.is_err());
}

#[tokio::test]
async fn test_tampered_signature_drops_event() {
    let port_api = port_api_mock().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&target)
        .await;

    let mut event = run_event(&format!("{}/x", target.uri()), true);
    // Sign the genuine document, then tamper with the body.
    let timestamp = "1700000000";
    let signature = sign_sha256(&compact_json(&event), SECRET, timestamp);
    event.as_object_mut().unwrap().insert(
        "headers".to_string(),
        json!({
            SIGNATURE_HEADER: signature,
            TIMESTAMP_HEADER: timestamp,
        }),
    );
    event["payload"]["properties"] = json!({"tampered": true});

    let pipeline = pipeline(&port_api, identity_mapping());
    pipeline.process(event, EventOrigin::ActionRun).await.unwrap();

    assert!(target.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signed_event_verifies_and_forwards_without_signing_headers() {
    let port_api = port_api_mock().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    // The control plane signs the event with its headers block present,
    // minus the two signing entries.
    let mut event = run_event(&format!("{}/x", target.uri()), true);
    event
        .as_object_mut()
        .unwrap()
        .insert("headers".to_string(), json!({}));
    let timestamp = "1700000000";
    let signature = sign_sha256(&compact_json(&event), SECRET, timestamp);
    let headers = event["headers"].as_object_mut().unwrap();
    headers.insert(SIGNATURE_HEADER.to_string(), json!(signature));
    headers.insert(TIMESTAMP_HEADER.to_string(), json!(timestamp));

    let pipeline = pipeline(&port_api, identity_mapping());
    pipeline.process(event, EventOrigin::ActionRun).await.unwrap();

    let requests = target.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    // The forwarded body kept the headers block but not the signing entries.
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["headers"], json!({}));
}

#[tokio::test]
async fn test_no_mapping_and_no_url_skips() {
    let port_api = port_api_mock().await;
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&target)
        .await;

    let event = json!({
        "context": {"runId": "r1"},
        "payload": {
            "action": {
                "invocationMethod": {"type": "WEBHOOK", "agent": true}
            }
        }
    });
    let pipeline = pipeline(&port_api, Vec::new());
    pipeline.process(event, EventOrigin::ActionRun).await.unwrap();

    assert!(target.received_requests().await.unwrap().is_empty());
}
