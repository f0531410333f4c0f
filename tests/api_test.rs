mod common;

use common::{spawn_app, Provider};
use meridian::chat::{Chat, ChatDetail, Role};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

fn http() -> reqwest::Client {
    reqwest::Client::new()
}

async fn create_chat(base: &str, user: &str, title: &str) -> Chat {
    let res = http()
        .post(format!("{base}/chats"))
        .header("x-user-id", user)
        .json(&json!({ "title": title }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    res.json().await.unwrap()
}

async fn get_detail(base: &str, user: &str, id: i64) -> ChatDetail {
    let res = http()
        .get(format!("{base}/chats/{id}"))
        .header("x-user-id", user)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    res.json().await.unwrap()
}

#[tokio::test]
async fn identity_is_required_on_every_endpoint() {
    let base = spawn_app(Provider::Ok).await;

    let res = http().get(format!("{base}/chats")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = http()
        .post(format!("{base}/chats"))
        .json(&json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = http()
        .post(format!("{base}/chats/1/messages"))
        .json(&json!({ "content": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    // a blank id is as good as no id
    let res = http()
        .get(format!("{base}/chats"))
        .header("x-user-id", "   ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn create_and_list_chats_per_owner() {
    let base = spawn_app(Provider::Ok).await;

    let blank = create_chat(&base, "alice", "   ").await;
    assert_eq!(blank.title, "New Chat");
    assert_eq!(blank.owner_id, "alice");

    let trip = create_chat(&base, "alice", "Trip planning").await;
    create_chat(&base, "bob", "Other").await;

    let res = http()
        .get(format!("{base}/chats"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let chats: Vec<Chat> = res.json().await.unwrap();

    assert_eq!(
        chats.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![trip.id, blank.id],
        "newest first, scoped to the caller"
    );
}

#[tokio::test]
async fn create_chat_validates_title_shape() {
    let base = spawn_app(Provider::Ok).await;

    let res = http()
        .post(format!("{base}/chats"))
        .header("x-user-id", "alice")
        .json(&json!({ "title": 123 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let res = http()
        .post(format!("{base}/chats"))
        .header("x-user-id", "alice")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn get_chat_enforces_ownership() {
    let base = spawn_app(Provider::Ok).await;
    let chat = create_chat(&base, "alice", "mine").await;

    let res = http()
        .get(format!("{base}/chats/{}", chat.id))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = http()
        .get(format!("{base}/chats/999"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let detail = get_detail(&base, "alice", chat.id).await;
    assert_eq!(detail.chat.id, chat.id);
    assert!(detail.messages.is_empty());
}

#[tokio::test]
async fn delete_chat_is_owner_only_and_final() {
    let base = spawn_app(Provider::Ok).await;
    let chat = create_chat(&base, "alice", "doomed").await;

    let res = http()
        .delete(format!("{base}/chats/{}", chat.id))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = http()
        .delete(format!("{base}/chats/{}", chat.id))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);

    let res = http()
        .get(format!("{base}/chats/{}", chat.id))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);

    let res = http()
        .delete(format!("{base}/chats/{}", chat.id))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn send_message_streams_and_persists_both_sides() {
    let base = spawn_app(Provider::Ok).await;
    let chat = create_chat(&base, "alice", "convo").await;

    let res = http()
        .post(format!("{base}/chats/{}/messages", chat.id))
        .header("x-user-id", "alice")
        .header("x-user-name", "Alice")
        .json(&json!({ "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res
        .headers()
        .get(CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = res.text().await.unwrap();
    assert!(body.contains(r#"{"content":"Hello"}"#));
    assert!(body.contains(r#"{"content":" there"}"#));
    assert!(body.contains(r#"{"done":true}"#));

    // once the terminal frame is out, both rows are durable
    let detail = get_detail(&base, "alice", chat.id).await;
    assert_eq!(detail.messages.len(), 2);
    assert_eq!(detail.messages[0].role, Role::User);
    assert_eq!(detail.messages[0].content, "hi");
    assert_eq!(detail.messages[1].role, Role::Assistant);
    assert_eq!(detail.messages[1].content, "Hello there");
}

#[tokio::test]
async fn send_to_foreign_chat_writes_nothing() {
    let base = spawn_app(Provider::Ok).await;
    let chat = create_chat(&base, "alice", "mine").await;

    let res = http()
        .post(format!("{base}/chats/{}/messages", chat.id))
        .header("x-user-id", "bob")
        .json(&json!({ "content": "let me in" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let detail = get_detail(&base, "alice", chat.id).await;
    assert!(detail.messages.is_empty(), "rejected send must not persist");
}

#[tokio::test]
async fn send_to_missing_chat_is_not_found() {
    let base = spawn_app(Provider::Ok).await;

    let res = http()
        .post(format!("{base}/chats/999/messages"))
        .header("x-user-id", "alice")
        .json(&json!({ "content": "hello?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn empty_content_is_rejected_before_any_write() {
    let base = spawn_app(Provider::Ok).await;
    let chat = create_chat(&base, "alice", "convo").await;

    let res = http()
        .post(format!("{base}/chats/{}/messages", chat.id))
        .header("x-user-id", "alice")
        .json(&json!({ "content": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    let detail = get_detail(&base, "alice", chat.id).await;
    assert!(detail.messages.is_empty());
}

#[tokio::test]
async fn provider_failure_keeps_the_user_message() {
    let base = spawn_app(Provider::Failing).await;
    let chat = create_chat(&base, "alice", "convo").await;

    let res = http()
        .post(format!("{base}/chats/{}/messages", chat.id))
        .header("x-user-id", "alice")
        .json(&json!({ "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Failed to generate a response");

    // the user's input survived the provider failure
    let detail = get_detail(&base, "alice", chat.id).await;
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].role, Role::User);
    assert_eq!(detail.messages[0].content, "hi");
}

#[tokio::test]
async fn truncated_stream_surfaces_error_and_persists_no_assistant() {
    let base = spawn_app(Provider::Truncated).await;
    let chat = create_chat(&base, "alice", "convo").await;

    let res = http()
        .post(format!("{base}/chats/{}/messages", chat.id))
        .header("x-user-id", "alice")
        .json(&json!({ "content": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let body = res.text().await.unwrap();
    assert!(body.contains(r#"{"content":"Hel"}"#));
    assert!(body.contains(r#"{"error":"Failed to generate a response"}"#));
    assert!(!body.contains(r#"{"done":true}"#));

    let detail = get_detail(&base, "alice", chat.id).await;
    assert_eq!(detail.messages.len(), 1, "no truncated assistant row");
    assert_eq!(detail.messages[0].role, Role::User);
}
