#![allow(dead_code)]

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use meridian::api::{self, AppState};
use meridian::completion::CompletionClient;
use meridian::config::CompletionConfig;
use meridian::service::Conversations;
use meridian::store::Store;
use serde_json::json;
use std::time::Duration;

/// Scripted behavior of the mock completion provider.
#[derive(Clone, Copy)]
pub enum Provider {
    /// Streams "Hello" + " there" and terminates properly.
    Ok,
    /// Rejects the completion request outright.
    Failing,
    /// Streams one fragment, then closes without the terminal marker.
    Truncated,
    /// Like `Ok`, but stalls first so tests can observe in-flight state.
    Slow,
}

/// Spin up the real app wired to a mock provider; returns its base url.
pub async fn spawn_app(provider: Provider) -> String {
    let provider_url = spawn_provider(provider).await;

    let store = Store::open_in_memory().await.unwrap();
    let completions = CompletionClient::new(&CompletionConfig {
        base_url: provider_url,
        api_key: "test-key".to_string(),
        model: "gpt-4o".to_string(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    let app = api::router(AppState {
        conversations: Conversations::new(store),
        completions,
    });

    serve(app).await
}

pub async fn spawn_provider(mode: Provider) -> String {
    let app = Router::new()
        .route("/chat/completions", post(completions))
        .with_state(mode);
    serve(app).await
}

async fn completions(State(mode): State<Provider>) -> Response {
    match mode {
        Provider::Ok => sse_body(&["Hello", " there"], true),
        Provider::Failing => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Provider::Truncated => sse_body(&["Hel"], false),
        Provider::Slow => {
            tokio::time::sleep(Duration::from_millis(600)).await;
            sse_body(&["Hello", " there"], true)
        }
    }
}

fn sse_body(chunks: &[&str], done: bool) -> Response {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": chunk } }] })
        ));
    }
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
