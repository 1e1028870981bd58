use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use huddle_api::{AppStateInner, StreamSettings, router};
use huddle_core::ChatConfig;
use huddle_core::lookup::{LookupRegistry, StaticLookup};
use huddle_db::Database;
use huddle_types::api::Claims;
use huddle_types::models::LookupKind;

const SECRET: &str = "test-secret";

struct Caller {
    id: Uuid,
    token: String,
}

fn app() -> Router {
    let mut lookups = LookupRegistry::new();
    lookups.register(LookupKind::Order, Arc::new(StaticLookup::new()));
    let state = AppStateInner::new(
        Database::open_in_memory().unwrap(),
        SECRET.into(),
        ChatConfig::default(),
        lookups,
        StreamSettings::default(),
    );
    router(state)
}

fn caller(username: &str, roles: &[&str]) -> Caller {
    let id = Uuid::new_v4();
    let claims = Claims {
        sub: id,
        username: username.into(),
        display_name: None,
        roles: roles.iter().map(|r| r.to_string()).collect(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
    Caller { id, token }
}

async fn call(app: &Router, method: &str, uri: &str, who: Option<&Caller>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(who) = who {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", who.token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_channel(app: &Router, who: &Caller, body: Value) -> String {
    let (status, channel) = call(app, "POST", "/channels", Some(who), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", channel);
    channel["id"].as_str().unwrap().to_string()
}

async fn send(app: &Router, who: &Caller, channel: &str, body: Value) -> (StatusCode, Value) {
    call(app, "POST", &format!("/channels/{}/messages", channel), Some(who), Some(body)).await
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let app = app();
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = call(&app, "GET", "/channels", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let forged = Caller {
        id: Uuid::new_v4(),
        token: "not-a-jwt".into(),
    };
    let (status, _) = call(&app, "GET", "/channels", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn private_channel_flow() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let b = caller("ben", &[]);

    let c = create_channel(&app, &a, json!({ "name": "inner", "kind": "private" })).await;

    let (status, sent) = send(&app, &a, &c, json!({ "body": "hello" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["id"], 1);
    assert_eq!(sent["author_name"], "ann");

    let (status, denied) = call(&app, "GET", &format!("/channels/{}/messages", c), Some(&b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // An unknown channel is indistinguishable from a hidden one.
    let (status, unknown) =
        call(&app, "GET", &format!("/channels/{}/messages", Uuid::new_v4()), Some(&b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(denied, unknown);

    let (_, list) = call(&app, "GET", "/channels", Some(&b), None).await;
    assert_eq!(list["private"].as_array().unwrap().len(), 0);
    assert_eq!(list["can_create_channel"], false);

    let (status, change) =
        call(&app, "PUT", &format!("/channels/{}/members/{}", c, a.id), Some(&a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["changed"], false);

    let (_, change) = call(&app, "PUT", &format!("/channels/{}/members/{}", c, b.id), Some(&a), None).await;
    assert_eq!(change["changed"], true);
    let (status, page) = call(&app, "GET", &format!("/channels/{}/messages?cursor=0", c), Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"][0]["body"], "hello");
    assert_eq!(page["last_id"], 1);
}

#[tokio::test]
async fn restricted_channel_visibility() {
    let app = app();
    let creator = caller("cat", &["manager"]);
    let seller = caller("sue", &["sales"]);
    let support = caller("sid", &["support"]);

    let c = create_channel(
        &app,
        &creator,
        json!({ "name": "deals", "kind": "public", "restricted": true, "allowed_roles": ["sales"] }),
    )
    .await;

    let (_, list) = call(&app, "GET", "/channels", Some(&seller), None).await;
    assert_eq!(list["public"].as_array().unwrap().len(), 1);
    assert_eq!(list["public"][0]["restricted"], true);

    let (_, list) = call(&app, "GET", "/channels", Some(&support), None).await;
    assert!(list["public"].as_array().unwrap().is_empty());

    let (_, list) = call(&app, "GET", "/channels", Some(&creator), None).await;
    assert_eq!(list["public"][0]["can_manage"], true);

    let (status, _) = send(&app, &support, &c, json!({ "body": "let me in" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unresolvable_command_still_sends() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let c = create_channel(&app, &a, json!({ "name": "sales", "kind": "public" })).await;

    let (status, sent) = send(&app, &a, &c, json!({ "body": "/order #999999" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["message_type"], "text");
    assert_eq!(sent["notice"], "Could not find order #999999");
}

#[tokio::test]
async fn archive_blocks_posting_but_not_reading() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let c = create_channel(&app, &a, json!({ "name": "old", "kind": "public" })).await;
    send(&app, &a, &c, json!({ "body": "last words" })).await;

    let (_, change) = call(&app, "POST", &format!("/channels/{}/archive", c), Some(&a), None).await;
    assert_eq!(change["changed"], true);
    let (_, change) = call(&app, "POST", &format!("/channels/{}/archive", c), Some(&a), None).await;
    assert_eq!(change["changed"], false);

    let (status, _) = send(&app, &a, &c, json!({ "body": "too late" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = call(&app, "GET", &format!("/channels/{}/messages", c), Some(&a), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn validation_errors_map_to_statuses() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let c = create_channel(&app, &a, json!({ "name": "files", "kind": "public" })).await;

    let (status, body) = send(
        &app,
        &a,
        &c,
        json!({ "body": "big", "attachment": { "url": "https://f.example/x.zip", "filename": "x.zip", "size": 1u64 << 40 } }),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "ATTACHMENT_TOO_LARGE");

    let (status, _) = send(&app, &a, &c, json!({ "body": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "POST", "/channels", Some(&a), Some(json!({ "name": "files", "kind": "public" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = call(&app, "POST", &format!("/channels/{}/messages/42/pin", c), Some(&a), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reaction_toggle_round_trips_to_baseline() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let c = create_channel(&app, &a, json!({ "name": "fun", "kind": "public" })).await;
    send(&app, &a, &c, json!({ "body": "ship it" })).await;

    let uri = format!("/channels/{}/messages/1/reactions", c);
    let (status, first) = call(&app, "POST", &uri, Some(&a), Some(json!({ "emoji": "🚀" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["added"], true);
    assert_eq!(first["reactions"][0]["count"], 1);
    assert_eq!(first["reactions"][0]["reacted"], true);

    let (_, second) = call(&app, "POST", &uri, Some(&a), Some(json!({ "emoji": "🚀" }))).await;
    assert_eq!(second["added"], false);
    assert!(second["reactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn direct_channels_are_shared_by_the_pair() {
    let app = app();
    let a = caller("ann", &[]);
    let b = caller("ben", &[]);
    // Users become known to the directory on their first request.
    call(&app, "GET", "/channels", Some(&b), None).await;

    let (status, first) = call(&app, "POST", "/channels/direct", Some(&a), Some(json!({ "user_id": b.id }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = call(&app, "POST", "/channels/direct", Some(&b), Some(json!({ "user_id": a.id }))).await;
    assert_eq!(first["id"], second["id"]);

    let (_, list) = call(&app, "GET", "/channels", Some(&a), None).await;
    assert_eq!(list["direct"][0]["peer_name"], "ben");
    assert_eq!(list["direct"][0]["member_count"], 2);
}

#[tokio::test]
async fn stream_starts_with_catch_up_batch() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let c = create_channel(&app, &a, json!({ "name": "live", "kind": "public" })).await;
    send(&app, &a, &c, json!({ "body": "one" })).await;
    send(&app, &a, &c, json!({ "body": "two" })).await;

    let request = Request::builder()
        .uri(format!("/channels/{}/stream?cursor=1", c))
        .header(header::AUTHORIZATION, format!("Bearer {}", a.token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.starts_with("event: messages\n"), "{}", text);
    assert!(text.contains("\"body\":\"two\""));
    assert!(!text.contains("\"body\":\"one\""));
    assert!(text.contains("\"last_id\":2"));
}

#[tokio::test]
async fn stream_is_forbidden_to_non_viewers() {
    let app = app();
    let a = caller("ann", &["manager"]);
    let b = caller("ben", &[]);
    let c = create_channel(&app, &a, json!({ "name": "inner", "kind": "private" })).await;

    let (status, _) = call(&app, "GET", &format!("/channels/{}/stream", c), Some(&b), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
