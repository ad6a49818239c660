//! Integration tests for `/api/v1/benchmarks`.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, poll_until, post_json, Host};
use serde_json::json;

fn finished(batch: &serde_json::Value) -> bool {
    let progress = &batch["progress"];
    progress["pending"] == 0
        && progress["ok"].as_u64().unwrap_or(0) + progress["failed"].as_u64().unwrap_or(0)
            == progress["expected"].as_u64().unwrap_or(u64::MAX)
}

async fn submit(app: &axum::Router, body: serde_json::Value) -> serde_json::Value {
    let response = post_json(app.clone(), "/api/v1/benchmarks", body).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Test: submit and observe a sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_runs_to_completion_with_metrics() {
    let t = common::spawn_app_with(Host {
        mpi: "exit 0",
        serial: "sleep 0.05",
        ..Host::default()
    })
    .await;

    let accepted = submit(
        &t.app,
        json!({ "sizes": "3, 2", "procs": "1-2", "repeats": 2, "seed": 1234 }),
    )
    .await;
    assert_eq!(accepted["combinations"], 4);
    assert_eq!(accepted["sizes"], json!([2, 3]));
    assert_eq!(accepted["procs"], json!([1, 2]));
    assert_eq!(accepted["seed"], 1234);

    let batch_id = accepted["batch_id"].as_str().expect("batch_id");
    let report = poll_until(&t.app, &format!("/api/v1/benchmarks/{batch_id}"), finished).await;

    assert_eq!(report["batch"]["seed"], 1234);
    assert_eq!(report["batch"]["sizes_expr"], "3, 2");
    assert!(report["batch"]["hardware"]["logical_cpus"].as_u64().unwrap() >= 1);
    assert_eq!(report["progress"]["expected"], 6);
    assert_eq!(report["progress"]["ok"], 6);

    let results = report["results"].as_array().expect("results");
    let order: Vec<_> = results
        .iter()
        .map(|r| (r["n"].as_u64().unwrap(), r["mode"].as_str().unwrap().to_string(), r["p"].as_u64().unwrap()))
        .collect();
    assert_eq!(
        order,
        vec![
            (2, "serial".to_string(), 1),
            (2, "mpi".to_string(), 1),
            (2, "mpi".to_string(), 2),
            (3, "serial".to_string(), 1),
            (3, "mpi".to_string(), 1),
            (3, "mpi".to_string(), 2),
        ]
    );

    let serial = &results[0];
    assert!(serial["speedup"].is_null());
    assert_eq!(serial["samples"].as_array().unwrap().len(), 1);

    let mpi = &results[2];
    assert_eq!(mpi["status"], "ok");
    assert!(mpi["speedup"].as_f64().expect("speedup") > 0.0);
    assert!(mpi["efficiency"].is_number());
    assert!(mpi["karp_flatt"].is_number());
    assert!(results[1]["karp_flatt"].is_null(), "undefined at p = 1");
}

#[tokio::test]
async fn failing_serial_leaves_scaling_null() {
    let t = common::spawn_app_with(Host {
        mpi: "exit 0",
        serial: "exit 1",
        ..Host::default()
    })
    .await;

    let accepted = submit(&t.app, json!({ "sizes": "2", "procs": "2", "repeats": 1 })).await;
    let batch_id = accepted["batch_id"].as_str().expect("batch_id");
    assert!(accepted["seed"].is_u64(), "seed is chosen when omitted");

    let report = poll_until(&t.app, &format!("/api/v1/benchmarks/{batch_id}"), finished).await;

    assert_eq!(report["progress"]["failed"], 1);
    assert_eq!(report["progress"]["ok"], 1);
    let results = report["results"].as_array().unwrap();
    assert_eq!(results[0]["error_msg"], "serial n=2 failed: Process exited with code 1");
    assert_eq!(results[1]["status"], "ok");
    assert!(results[1]["speedup"].is_null());
}

// ---------------------------------------------------------------------------
// Test: validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn over_cap_sweep_rejected_with_400() {
    let t = common::spawn_app().await;

    // cap is 6 in the test config
    let response = post_json(
        t.app.clone(),
        "/api/v1/benchmarks",
        json!({ "sizes": "64,128,256", "procs": "1-3" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("9"));
}

#[tokio::test]
async fn malformed_expression_rejected_with_400() {
    let t = common::spawn_app().await;

    for body in [
        json!({ "sizes": "128,abc", "procs": "2" }),
        json!({ "sizes": "128", "procs": "1-4:0" }),
        json!({ "sizes": "", "procs": "2" }),
        json!({ "sizes": "0", "procs": "2" }),
    ] {
        let response = post_json(t.app.clone(), "/api/v1/benchmarks", body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
    }
}

#[tokio::test]
async fn repeats_out_of_range_rejected() {
    let t = common::spawn_app().await;

    let response = post_json(
        t.app.clone(),
        "/api/v1/benchmarks",
        json!({ "sizes": "16", "procs": "2", "repeats": 0 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_batch_returns_404() {
    let t = common::spawn_app().await;

    let response = get(t.app.clone(), "/api/v1/benchmarks/missing").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}
