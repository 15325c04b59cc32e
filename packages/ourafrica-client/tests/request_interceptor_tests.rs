//! Integration tests for authenticated requests.
//!
//! Covers:
//! - Single-flight renewal under concurrent 401s
//! - Teardown when renewal fails
//! - Error normalization for JSON and binary responses

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use futures::future::join_all;
use ourafrica_client::http::{ApiRequest, RawResponse};
use ourafrica_client::testing::{json_response, MockTransport};
use ourafrica_client::{AuthEvent, CertificateQuery, ClientError};
use serde_json::json;
use test_context::test_context;
use tokio_test::{assert_err, assert_ok};

/// Harness whose transport takes a moment to answer, so concurrent
/// requests overlap.
fn slow_harness() -> TestHarness {
    TestHarness {
        transport: Arc::new(MockTransport::new().with_delay(Duration::from_millis(20))),
        ..TestHarness::new()
    }
}

fn certificates_for(
    valid_token: Option<String>,
) -> impl Fn(&ApiRequest) -> ourafrica_client::Result<RawResponse> + Send + Sync + 'static {
    move |request: &ApiRequest| {
        let authorized = valid_token.is_some() && request.bearer_token() == valid_token.as_deref();
        if authorized {
            Ok(json_response(200, &json!([certificate_json("c1", "soil-101")])))
        } else {
            Ok(json_response(401, &json!({"message": "Token expired"})))
        }
    }
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let ctx = slow_harness();
    let stale = ourafrica_client::auth::TokenPair {
        access_token: token_expiring_in(-30),
        refresh_token: token_expiring_in(3600),
    };
    ctx.seed_token_store(&stale).await;

    let renewed = fresh_token_pair();
    ctx.transport.respond_json(REFRESH, 200, json!(renewed));
    ctx.transport
        .respond_with(CERTIFICATES, certificates_for(Some(renewed.access_token.clone())));

    let client = ctx.client().await;
    let query = CertificateQuery::default();
    let results = join_all((0..6).map(|_| client.student().list_certificates(&query))).await;

    for result in &results {
        assert_eq!(result.as_ref().unwrap().items.len(), 1);
    }
    assert_eq!(ctx.transport.calls(REFRESH), 1);

    let retried: HashSet<String> = ctx
        .transport
        .requests()
        .iter()
        .filter(|r| r.url.ends_with(CERTIFICATES))
        .filter_map(|r| r.bearer_token().map(str::to_string))
        .filter(|token| *token != stale.access_token)
        .collect();
    assert_eq!(retried, HashSet::from([renewed.access_token.clone()]));
    assert_eq!(client.auth().session().access_token, Some(renewed.access_token));
    assert!(client.auth().is_authenticated());
}

#[tokio::test]
async fn test_failed_refresh_surfaces_original_error_and_ends_session() {
    let ctx = slow_harness();
    ctx.seed_token_store(&ourafrica_client::auth::TokenPair {
        access_token: token_expiring_in(-30),
        refresh_token: token_expiring_in(3600),
    })
    .await;
    ctx.transport
        .respond_json(REFRESH, 401, json!({"message": "Refresh token revoked"}));
    ctx.transport.respond_with(CERTIFICATES, certificates_for(None));

    let client = ctx.client().await;
    let mut events = client.auth().events().subscribe();
    let query = CertificateQuery::default();
    let results = join_all((0..3).map(|_| client.student().list_certificates(&query))).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.to_api_error().title, "Token expired");
    }
    assert_eq!(ctx.transport.calls(REFRESH), 1);
    assert_eq!(events.recv().await.unwrap(), AuthEvent::SessionExpired);
    assert!(client.auth().session().access_token.is_none());
    assert!(!client.auth().is_authenticated());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_validation_errors_pass_through(ctx: &TestHarness) {
    let body = json!({
        "error": {
            "title": "Validation failed",
            "status": 422,
            "details": ["Course not completed"],
            "field_errors": {
                "course_id": ["has outstanding lessons", "has no final exam result"]
            }
        }
    });
    ctx.transport
        .respond_json("/api/student/certificates/course/soil-101/claim", 422, body);

    let client = ctx.client().await;
    let err = client.student().claim_certificate("soil-101").await.unwrap_err();

    let api = match err {
        ClientError::Api(api) => api,
        other => panic!("expected an API error, got {:?}", other),
    };
    assert_eq!(api.status, 422);
    assert_eq!(api.title, "Validation failed");
    assert_eq!(api.details, Some(vec!["Course not completed".to_string()]));
    assert_eq!(
        api.field_errors.unwrap()["course_id"],
        vec!["has outstanding lessons", "has no final exam result"]
    );
    assert_eq!(ctx.transport.calls(REFRESH), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_binary_download_error_is_decoded(ctx: &TestHarness) {
    ctx.seed_token_store(&fresh_token_pair()).await;
    ctx.transport.respond_raw(
        "/api/student/certificates/c9/download",
        404,
        "application/json",
        br#"{"message": "Certificate not found"}"#,
    );

    let client = ctx.client().await;
    let err = client.student().download_certificate("c9").await.unwrap_err();

    let api = err.to_api_error();
    assert_eq!(api.status, 404);
    assert_eq!(api.title, "Certificate not found");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_binary_download_carries_bearer(ctx: &TestHarness) {
    let tokens = fresh_token_pair();
    ctx.seed_token_store(&tokens).await;
    ctx.transport.respond_raw(
        "/api/student/certificates/c1/download",
        200,
        "application/pdf",
        b"%PDF-1.7 certificate",
    );

    let client = ctx.client().await;
    let bytes = client.student().download_certificate("c1").await.unwrap();

    assert!(bytes.starts_with(b"%PDF"));
    let request = ctx
        .transport
        .requests()
        .into_iter()
        .find(|r| r.url.ends_with("/c1/download"))
        .unwrap();
    assert_eq!(request.bearer_token(), Some(tokens.access_token.as_str()));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_missing_course_certificate_is_none(ctx: &TestHarness) {
    ctx.seed_token_store(&fresh_token_pair()).await;
    ctx.transport.respond_json(
        "/api/student/certificates/course/soil-101",
        200,
        certificate_json("c1", "soil-101"),
    );

    let client = ctx.client().await;

    let found = client.student().certificate_for_course("soil-101").await.unwrap();
    assert_eq!(found.unwrap().certificate_number.as_deref(), Some("OA-C1"));
    assert!(client
        .student()
        .certificate_for_course("chem-200")
        .await
        .unwrap()
        .is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_listing_sends_query(ctx: &TestHarness) {
    ctx.seed_token_store(&fresh_token_pair()).await;
    ctx.transport.respond_json(
        CERTIFICATES,
        200,
        json!({"certificates": [certificate_json("c1", "soil-101")], "total": 11, "page": 2, "limit": 10}),
    );

    let client = ctx.client().await;
    let page = client
        .student()
        .list_certificates(&CertificateQuery::default().page(2).limit(10).search("soil science"))
        .await
        .unwrap();

    assert_eq!(page.total, Some(11));
    let listed = ctx
        .transport
        .requests()
        .into_iter()
        .any(|r| r.url.ends_with("/api/student/certificates?page=2&limit=10&search=soil+science"));
    assert!(listed);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_network_failure_is_normalized(ctx: &TestHarness) {
    ctx.seed_token_store(&fresh_token_pair()).await;
    ctx.transport.fail_network("/api/student/certificates/c1");

    let client = ctx.client().await;
    let err = client.student().get_certificate("c1").await.unwrap_err();

    assert!(err.is_network());
    assert_eq!(err.status(), Some(0));
    assert_eq!(err.to_api_error().title, "Network Error");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_bearer_is_not_sent_to_lookalike_host(ctx: &TestHarness) {
    ctx.seed_token_store(&fresh_token_pair()).await;
    ctx.transport.respond_json("/steal", 200, json!({"ok": true}));

    let client = ctx.client().await;
    let lookalike = format!("{}.attacker.example/steal", API_URL);
    assert_ok!(client.api().get::<serde_json::Value>(&lookalike).await);

    let sent = ctx.transport.requests();
    let request = sent.iter().find(|r| r.url == lookalike).unwrap();
    assert_eq!(request.bearer_token(), None);
    assert_eq!(request.header_value("Authorization"), None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn test_unauthorized_while_offline_keeps_session(ctx: &TestHarness) {
    let tokens = fresh_token_pair();
    ctx.seed_token_store(&tokens).await;
    ctx.transport.respond_json(REFRESH, 200, json!(fresh_token_pair()));
    ctx.transport.respond_with(CERTIFICATES, certificates_for(None));

    let client = ctx.client().await;
    let mut events = client.auth().events().subscribe();
    ctx.connectivity.set_online(false);

    let err = client
        .student()
        .list_certificates(&CertificateQuery::default())
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(ctx.transport.calls(REFRESH), 0);
    assert_eq!(client.auth().session().access_token, Some(tokens.access_token));
    assert!(client.auth().is_authenticated());
    assert_err!(events.try_recv());
}
