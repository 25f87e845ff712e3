//! End-to-end tests for the chatsync HTTP API.
//!
//! Each test builds a fresh router over in-memory databases and drives it
//! with `tower::ServiceExt::oneshot`, without starting a network server.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use chatsync_core::{Conversation, ConversationId, Message, Role, DEFAULT_SYSTEM_PURPOSE};
use chatsync_server::router::build_router;
use chatsync_server::state::AppState;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn test_app() -> Router {
    let state = AppState::in_memory().expect("failed to create in-memory AppState");
    build_router(state)
}

/// Sends a request with an optional JSON body and returns (status, json).
async fn send(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!(null));
    (status, json)
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    send(app, "GET", path, None).await
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, "POST", path, Some(body)).await
}

async fn put_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    send(app, "PUT", path, Some(body)).await
}

async fn delete_json(app: &Router, path: &str) -> (StatusCode, Value) {
    send(app, "DELETE", path, None).await
}

fn conversation(id: &str, texts: &[&str]) -> Conversation {
    let mut conversation = Conversation::new(DEFAULT_SYSTEM_PURPOSE);
    conversation.id = ConversationId::from(id);
    for (i, text) in texts.iter().enumerate() {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        conversation.append_message(Message::new_text(role, *text));
    }
    conversation
}

fn assert_error(body: &Value, code: &str) {
    assert_eq!(body["success"], false, "body: {}", body);
    assert_eq!(body["error"]["code"], code, "body: {}", body);
}

// ---------------------------------------------------------------------------
// /stores
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_lifecycle() {
    let app = test_app();

    let (status, body) = get_json(&app, "/stores/app-ui").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    let (status, body) = put_json(
        &app,
        "/stores/app-ui",
        json!({"data": {"centerMode": "full"}, "version": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "app-ui");
    assert_eq!(body["data"]["version"], 3);
    let created_at = body["data"]["createdAt"].clone();

    let (_, body) = put_json(
        &app,
        "/stores/app-ui",
        json!({"data": {"centerMode": "wide"}, "version": 3}),
    )
    .await;
    assert_eq!(body["data"]["createdAt"], created_at);

    let (status, body) = get_json(&app, "/stores/app-ui").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"], json!({"centerMode": "wide"}));

    put_json(&app, "/stores/app-chats", json!({"data": [], "version": 4})).await;
    let (_, body) = get_json(&app, "/stores").await;
    let names: Vec<&str> = body["data"]["stores"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["app-chats", "app-ui"]);

    let (status, body) = delete_json(&app, "/stores/app-ui").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], "app-ui");
    let (status, _) = delete_json(&app, "/stores/app-ui").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_put_without_version_is_rejected() {
    let app = test_app();
    let (status, body) = put_json(&app, "/stores/x", json!({"data": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let (status, _) = get_json(&app, "/stores/x").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// /chats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_create_read_replace_delete() {
    let app = test_app();
    let c1 = conversation("c1", &["hi", "hello", "how are you"]);

    let (status, body) = post_json(&app, "/chats", json!({"conversation": c1})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["id"], "c1");
    assert_eq!(body["data"]["messageCount"], 3);
    assert_eq!(body["data"]["created"], true);

    let (status, body) = get_json(&app, "/chats/c1").await;
    assert_eq!(status, StatusCode::OK);
    let loaded: Conversation =
        serde_json::from_value(body["data"]["conversation"].clone()).unwrap();
    assert_eq!(loaded, c1);

    // Replace with a shorter message list; only the new set survives.
    let shorter = {
        let mut c = c1.clone();
        c.messages.truncate(1);
        c
    };
    let (status, body) = put_json(&app, "/chats/c1", json!({"conversation": shorter})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], false);
    let (_, body) = get_json(&app, "/chats/c1").await;
    assert_eq!(
        body["data"]["conversation"]["messages"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    let (status, _) = delete_json(&app, "/chats/c1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = get_json(&app, "/chats/c1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");
    let (status, _) = delete_json(&app, "/chats/c1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_list_is_oldest_first() {
    let app = test_app();
    let mut older = conversation("older", &["a"]);
    older.created = 1_000;
    let mut newer = conversation("newer", &["b"]);
    newer.created = 2_000;

    post_json(&app, "/chats", json!({"conversation": newer})).await;
    post_json(&app, "/chats", json!({"conversation": older})).await;

    let (status, body) = get_json(&app, "/chats").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"]["conversations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["older", "newer"]);
}

#[tokio::test]
async fn chat_put_with_mismatched_id_changes_nothing() {
    let app = test_app();
    let c2 = conversation("c2", &["x"]);
    let (status, body) = put_json(&app, "/chats/c1", json!({"conversation": c2})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let (_, body) = get_json(&app, "/chats").await;
    assert!(body["data"]["conversations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn incognito_and_malformed_chats_are_rejected() {
    let app = test_app();
    let mut secret = conversation("secret", &["psst"]);
    secret.is_incognito = true;
    let (status, _) = post_json(&app, "/chats", json!({"conversation": secret})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(&app, "/chats", json!({"conversation": {"id": "c"}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let blank = conversation(" ", &[]);
    let (status, _) = post_json(&app, "/chats", json!({"conversation": blank})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_message_or_fragment_ids_are_rejected() {
    let app = test_app();
    let mut doubled = conversation("c1", &["one", "two"]);
    doubled.messages[1].id = doubled.messages[0].id.clone();
    let (status, body) = put_json(&app, "/chats/c1", json!({"conversation": doubled})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_error(&body, "BAD_REQUEST");

    let mut doubled = conversation("c1", &["one"]);
    let fragment = doubled.messages[0].fragments[0].clone();
    doubled.messages[0].fragments.push(fragment);
    let (status, body) = post_json(&app, "/chats", json!({"conversation": doubled})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    assert_error(&body, "BAD_REQUEST");

    let (_, body) = get_json(&app, "/chats").await;
    assert!(body["data"]["conversations"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// /llms
// ---------------------------------------------------------------------------

fn registry() -> Value {
    json!({
        "services": [
            {"id": "openai-1", "label": "OpenAI", "vendorId": "openai"},
            {"id": "local-1", "label": "Local", "vendorId": "ollama"}
        ],
        "models": [
            {"id": "gpt", "serviceId": "openai-1", "label": "GPT"},
            {"id": "gpt-mini", "serviceId": "openai-1", "label": "GPT mini"},
            {"id": "llama", "serviceId": "local-1", "label": "Llama"}
        ],
        "assignments": {
            "primaryChat": {"modelId": "gpt"},
            "fastUtil": {"modelId": "llama"}
        }
    })
}

#[tokio::test]
async fn registry_starts_empty_and_can_be_replaced() {
    let app = test_app();
    let (status, body) = get_json(&app, "/llms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["services"], json!([]));

    let (status, _) = post_json(&app, "/llms", registry()).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = get_json(&app, "/llms").await;
    assert_eq!(body["data"]["models"].as_array().unwrap().len(), 3);
    assert_eq!(body["data"]["assignments"]["fastUtil"]["modelId"], "llama");
}

#[tokio::test]
async fn registry_with_dangling_model_is_rejected() {
    let app = test_app();
    let mut bad = registry();
    bad["models"][0]["serviceId"] = json!("nowhere");
    let (status, body) = post_json(&app, "/llms", bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let (_, body) = get_json(&app, "/llms").await;
    assert_eq!(body["data"]["models"], json!([]));
}

#[tokio::test]
async fn registry_entries_can_be_patched() {
    let app = test_app();
    post_json(&app, "/llms", registry()).await;

    let (status, body) = put_json(&app, "/llms/gpt", json!({"label": "GPT-5", "id": "renamed"})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let gpt = &body["data"]["models"][0];
    assert_eq!(gpt["id"], "gpt");
    assert_eq!(gpt["label"], "GPT-5");

    let (status, _) = put_json(&app, "/llms/gpt", json!({"serviceId": "nowhere"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = put_json(&app, "/llms/missing", json!({"label": "x"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");
}

#[tokio::test]
async fn single_registry_entries_can_be_read() {
    let app = test_app();
    let (status, body) = get_json(&app, "/llms/gpt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");

    post_json(&app, "/llms", registry()).await;
    let (status, body) = get_json(&app, "/llms/local-1").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["kind"], "service");
    assert_eq!(body["data"]["entry"]["vendorId"], "ollama");

    let (status, body) = get_json(&app, "/llms/gpt-mini").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["kind"], "model");
    assert_eq!(body["data"]["entry"]["serviceId"], "openai-1");
    assert_eq!(body["data"]["entry"]["label"], "GPT mini");

    let (status, _) = get_json(&app, "/llms/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_service_cascades_to_models_and_assignments() {
    let app = test_app();
    post_json(&app, "/llms", registry()).await;

    let (status, body) = delete_json(&app, "/llms/openai-1").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["removed"]["services"], json!(["openai-1"]));
    assert_eq!(body["data"]["removed"]["models"], json!(["gpt", "gpt-mini"]));
    assert_eq!(body["data"]["removed"]["assignments"], json!(["primaryChat"]));

    let (_, body) = get_json(&app, "/llms").await;
    assert_eq!(body["data"]["models"].as_array().unwrap().len(), 1);
    assert!(body["data"]["assignments"]["primaryChat"].is_null());
    assert_eq!(body["data"]["assignments"]["fastUtil"]["modelId"], "llama");

    let (status, _) = delete_json(&app, "/llms/openai-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// /metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn token_totals_saturate_at_the_i64_limit() {
    let app = test_app();
    for _ in 0..2 {
        let (status, body) = post_json(
            &app,
            "/metrics",
            json!({
                "operation": "addCostEntry",
                "serviceId": "openai-1",
                "inputTokens": i64::MAX,
                "outputTokens": 1,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (status, body) = get_json(&app, "/metrics/openai-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalInputTokens"], json!(i64::MAX));
    assert_eq!(body["data"]["totalOutputTokens"], 2);
    assert_eq!(body["data"]["usageCount"], 2);
}

#[tokio::test]
async fn cost_entries_accumulate_per_service() {
    let app = test_app();
    for _ in 0..2 {
        let (status, body) = post_json(
            &app,
            "/metrics",
            json!({
                "operation": "addCostEntry",
                "serviceId": "openai-1",
                "cost": 0.5,
                "inputTokens": 100,
                "outputTokens": 20,
                "timestamp": 1_000,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }
    post_json(
        &app,
        "/metrics",
        json!({"operation": "addCostEntry", "serviceId": "local-1", "category": "free"}),
    )
    .await;

    let (status, body) = get_json(&app, "/metrics/openai-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["usageCount"], 2);
    assert_eq!(body["data"]["totalInputTokens"], 200);
    assert_eq!(body["data"]["totalCost"], 1.0);

    let (_, body) = get_json(&app, "/metrics").await;
    let services: Vec<&str> = body["data"]["aggregates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["serviceId"].as_str().unwrap())
        .collect();
    assert_eq!(services, vec!["local-1", "openai-1"]);
}

#[tokio::test]
async fn metrics_save_store_delete_and_clear() {
    let app = test_app();
    let (status, body) = post_json(
        &app,
        "/metrics",
        json!({
            "operation": "saveStore",
            "aggregates": [{
                "serviceId": "imported",
                "totalCost": 2.5,
                "totalSavings": 0.0,
                "totalInputTokens": 10,
                "totalOutputTokens": 5,
                "usageCount": 3
            }]
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["saved"], 1);

    let (_, body) = get_json(&app, "/metrics/imported").await;
    assert_eq!(body["data"]["usageCount"], 3);

    let (status, _) = delete_json(&app, "/metrics/imported").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(&app, "/metrics/imported").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = delete_json(&app, "/metrics/imported").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    post_json(
        &app,
        "/metrics",
        json!({"operation": "addCostEntry", "serviceId": "s"}),
    )
    .await;
    let (status, body) = post_json(&app, "/metrics", json!({"operation": "clear"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], true);
    let (_, body) = get_json(&app, "/metrics").await;
    assert_eq!(body["data"]["aggregates"], json!([]));
}

#[tokio::test]
async fn invalid_metrics_operations_are_rejected() {
    let app = test_app();
    let (status, body) = post_json(&app, "/metrics", json!({"operation": "explode"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&body, "BAD_REQUEST");

    let (status, _) = post_json(
        &app,
        "/metrics",
        json!({"operation": "addCostEntry", "serviceId": "s", "inputTokens": -1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = get_json(&app, "/metrics").await;
    assert_eq!(body["data"]["aggregates"], json!([]));
}

// ---------------------------------------------------------------------------
// /workspace
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workspace_associations_lifecycle() {
    let app = test_app();

    let (status, body) = post_json(
        &app,
        "/workspace",
        json!({"workspaceId": "w1", "fileIds": ["f1", "f2"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["added"], 2);

    let (_, body) = post_json(&app, "/workspace/w1", json!({"fileIds": ["f2", "f3"]})).await;
    assert_eq!(body["data"]["added"], 1);
    assert_eq!(body["data"]["fileIds"], json!(["f1", "f2", "f3"]));

    post_json(&app, "/workspace/w2", json!({"fileIds": ["f2"]})).await;

    let (status, body) = delete_json(&app, "/workspace/files/f2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["workspaces"], json!(["w1", "w2"]));

    let (_, body) = get_json(&app, "/workspace/w1").await;
    assert_eq!(body["data"]["fileIds"], json!(["f1", "f3"]));

    let (status, _) = delete_json(&app, "/workspace/w1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = get_json(&app, "/workspace/w1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&body, "NOT_FOUND");
    let (status, _) = delete_json(&app, "/workspace/w1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = get_json(&app, "/workspace").await;
    assert_eq!(body["data"]["workspaces"], json!({"w2": []}));
}

#[tokio::test]
async fn removing_an_unknown_file_touches_nothing() {
    let app = test_app();
    let (status, body) = delete_json(&app, "/workspace/files/ghost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["workspaces"], json!([]));

    let (status, _) = post_json(&app, "/workspace", json!({"workspaceId": "", "fileIds": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
