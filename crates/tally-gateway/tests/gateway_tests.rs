// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tally_core::ExpenseAnalysis;
use tally_gateway::{build_router, AuthConfig, GatewayState, HealthState};
use tally_test_utils::{ModelScript, TestHarness};
use tower::ServiceExt;

fn analysis(amount: f64, category: &str, note: &str) -> ExpenseAnalysis {
    ExpenseAnalysis {
        amount,
        category: category.into(),
        date: "2026-03-06 12:30:00".into(),
        note: note.into(),
        comment: "Noted.".into(),
    }
}

fn app(harness: &TestHarness, token: Option<&str>) -> Router {
    build_router(GatewayState {
        pipeline: harness.pipeline.clone(),
        auth: AuthConfig {
            bearer_token: token.map(str::to_string),
        },
        health: HealthState::default(),
    })
}

fn post_json(uri: &str, owner: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("X-User-ID", owner);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str, owner: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-User-ID", owner)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse an SSE body into `(event, data)` pairs.
fn sse_events(raw: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(raw);
    text.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(d) = line.strip_prefix("data: ") {
                    data.push(d);
                } else if let Some(d) = line.strip_prefix("data:") {
                    data.push(d);
                }
            }
            event.map(|e| (e, data.join("\n")))
        })
        .collect()
}

async fn analyze(app: &Router, owner: &str, description: &str) -> Vec<(String, String)> {
    let response = app
        .clone()
        .oneshot(post_json(
            "/v1/expenses/analyze",
            Some(owner),
            serde_json::json!({ "description": description }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
    sse_events(&body_bytes(response).await)
}

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::builder().build().await.unwrap();
    let response = app(&harness, Some("secret"))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["uptime_secs"].is_u64());
}

#[tokio::test]
async fn analyze_streams_deltas_then_done() {
    let expected = analysis(25.0, "Transport", "taxi");
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(&expected, 4)])
        .build()
        .await
        .unwrap();

    let events = analyze(&app(&harness, None), "u1", "taxi 25").await;
    assert_eq!(events.len(), 5);
    let (deltas, terminal) = events.split_at(4);
    assert!(deltas.iter().all(|(name, _)| name == "delta"));

    let joined: String = deltas.iter().map(|(_, data)| data.as_str()).collect();
    let reparsed: ExpenseAnalysis = serde_json::from_str(&joined).unwrap();
    assert_eq!(reparsed, expected);

    assert_eq!(terminal[0].0, "done");
    let record: Value = serde_json::from_str(&terminal[0].1).unwrap();
    assert_eq!(record["owner_id"], "u1");
    assert_eq!(record["category"], "Transport");
    assert!(record.get("deleted_at").is_none());
}

#[tokio::test]
async fn stream_failure_is_an_error_event() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::fragments(["{\"amount\"", ": 1"]).failing_after(1)])
        .build()
        .await
        .unwrap();

    let events = analyze(&app(&harness, None), "u1", "mystery").await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "delta");
    assert_eq!(events[1].0, "error");
    assert!(events[1].1.contains("provider"));
    assert!(serde_json::from_str::<Value>(&events[1].1).is_err(), "error data is plain text");
}

#[tokio::test]
async fn missing_owner_is_unauthorized() {
    let harness = TestHarness::builder().build().await.unwrap();
    let response = app(&harness, None)
        .oneshot(post_json(
            "/v1/expenses/analyze",
            None,
            serde_json::json!({ "description": "taxi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.model.calls(), 0);
}

#[tokio::test]
async fn bearer_token_is_enforced_when_configured() {
    let harness = TestHarness::builder().build().await.unwrap();
    let router = app(&harness, Some("secret"));

    let response = router
        .clone()
        .oneshot(get("/v1/expenses", "u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = get("/v1/expenses", "u1");
    request
        .headers_mut()
        .insert("authorization", "Bearer secret".parse().unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn pre_stream_failures_use_status_codes() {
    let harness = TestHarness::builder().build().await.unwrap();
    let router = app(&harness, None);

    let response = router
        .clone()
        .oneshot(post_json(
            "/v1/expenses/analyze",
            Some("u1"),
            serde_json::json!({ "description": "  " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    harness.memory.set_fail_search(true);
    let response = router
        .oneshot(post_json(
            "/v1/expenses/analyze",
            Some("u1"),
            serde_json::json!({ "description": "taxi" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn list_filters_by_inclusive_date_range() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(&analysis(4.0, "Food & Dining", "tea"), 2)])
        .build()
        .await
        .unwrap();
    let router = app(&harness, None);
    analyze(&router, "u1", "tea 4").await;

    let page = body_json(
        router
            .clone()
            .oneshot(get("/v1/expenses?start_date=2026-03-06&end_date=2026-03-06", "u1"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["note"], "tea");

    let page = body_json(
        router
            .clone()
            .oneshot(get("/v1/expenses?end_date=2026-03-05", "u1"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total"], 0);

    let page = body_json(
        router
            .clone()
            .oneshot(get("/v1/expenses?category=Transport", "u1"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(page["total"], 0);

    let response = router
        .oneshot(get("/v1/expenses?start_date=March", "u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn record_endpoints_enforce_ownership() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(&analysis(60.0, "Health & Medical", "dentist"), 3)])
        .build()
        .await
        .unwrap();
    let router = app(&harness, None);
    let events = analyze(&router, "alice", "dentist 60").await;
    let record: Value = serde_json::from_str(&events.last().unwrap().1).unwrap();
    let id = record["id"].as_i64().unwrap();

    let response = router
        .clone()
        .oneshot(get(&format!("/v1/expenses/{id}"), "mallory"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(post_json(
            "/v1/expenses/delete",
            Some("mallory"),
            serde_json::json!({ "id": id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(get("/v1/expenses/9999", "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_then_delete() {
    let harness = TestHarness::builder()
        .with_scripts(vec![ModelScript::analysis(&analysis(9.0, "Food & Dining", "sandwich"), 2)])
        .build()
        .await
        .unwrap();
    let router = app(&harness, None);
    let events = analyze(&router, "u1", "sandwich 9").await;
    let record: Value = serde_json::from_str(&events.last().unwrap().1).unwrap();
    let id = record["id"].as_i64().unwrap();

    let updated = body_json(
        router
            .clone()
            .oneshot(post_json(
                "/v1/expenses/update",
                Some("u1"),
                serde_json::json!({ "id": id, "amount": 11.5, "note": "club sandwich", "date": "2026-03-01" }),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(updated["amount"], 11.5);
    assert_eq!(updated["note"], "club sandwich");
    assert_eq!(updated["category"], "Food & Dining");

    let response = router
        .clone()
        .oneshot(post_json(
            "/v1/expenses/update",
            Some("u1"),
            serde_json::json!({ "id": id, "date": "first of march" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let deleted = body_json(
        router
            .clone()
            .oneshot(post_json(
                "/v1/expenses/delete",
                Some("u1"),
                serde_json::json!({ "id": id }),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(deleted["deleted"], id);

    let response = router
        .oneshot(get(&format!("/v1/expenses/{id}"), "u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
