use crate::chat::{Chat, ChatDetail};
use crate::client::ClientError;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;

/// The caller this client acts as. The id is the opaque identity-provider
/// id; the display name, when present, feeds reply personalization.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl ClientIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Typed wrappers over the chat HTTP API. One method per endpoint; every
/// non-success status is mapped to `ClientError::Api` with the server's
/// safe message.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    identity: ClientIdentity,
}

impl ApiClient {
    pub fn new(base_url: &str, identity: ClientIdentity) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-user-id", &self.identity.user_id);
        if let Some(name) = &self.identity.display_name {
            req = req.header("x-user-name", name);
        }
        req
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, ClientError> {
        let res = self.request(reqwest::Method::GET, "/chats").send().await?;
        Ok(check(res).await?.json().await?)
    }

    pub async fn create_chat(&self, title: &str) -> Result<Chat, ClientError> {
        let res = self
            .request(reqwest::Method::POST, "/chats")
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    pub async fn get_chat(&self, id: i64) -> Result<ChatDetail, ClientError> {
        let res = self
            .request(reqwest::Method::GET, &format!("/chats/{id}"))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    pub async fn delete_chat(&self, id: i64) -> Result<(), ClientError> {
        let res = self
            .request(reqwest::Method::DELETE, &format!("/chats/{id}"))
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }

    /// Append a message and consume the server's SSE reply stream. Each
    /// `{"content"}` fragment is handed to `on_token` as it arrives; returns
    /// once the terminal `{"done"}` frame is seen. A terminal `{"error"}`
    /// frame or a stream that ends early is a `Completion` failure.
    pub async fn send_message(
        &self,
        chat_id: i64,
        content: &str,
        image_url: Option<&str>,
        on_token: &mut (dyn FnMut(&str) + Send),
    ) -> Result<(), ClientError> {
        let res = self
            .request(reqwest::Method::POST, &format!("/chats/{chat_id}/messages"))
            .json(&serde_json::json!({ "content": content, "imageUrl": image_url }))
            .send()
            .await?;
        let res = check(res).await?;

        let mut bytes = res.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            buf.extend_from_slice(&chunk?);

            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);

                match parse_frame(line.trim()) {
                    Some(StreamFrame::Content(text)) => on_token(&text),
                    Some(StreamFrame::Done) => return Ok(()),
                    Some(StreamFrame::Error(message)) => {
                        return Err(ClientError::Completion(message))
                    }
                    None => {}
                }
            }
        }

        Err(ClientError::Completion(
            "stream ended before completion".to_string(),
        ))
    }
}

enum StreamFrame {
    Content(String),
    Done,
    Error(String),
}

/// One SSE line from the reply stream. Non-`data:` lines (comments,
/// keep-alives, blanks) carry nothing.
fn parse_frame(line: &str) -> Option<StreamFrame> {
    let data = line.strip_prefix("data:")?.trim();
    let value: Value = serde_json::from_str(data).ok()?;

    if value.get("done").and_then(Value::as_bool) == Some(true) {
        return Some(StreamFrame::Done);
    }
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Some(StreamFrame::Error(message.to_string()));
    }
    value
        .get("content")
        .and_then(Value::as_str)
        .map(|text| StreamFrame::Content(text.to_string()))
}

/// Map a non-success response to `ClientError::Api`, extracting the server's
/// `{"message"}` body when present.
async fn check(res: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let message = res
        .json::<Value>()
        .await
        .ok()
        .and_then(|v| {
            v.get("message")
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| status.to_string());

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_frame() {
        match parse_frame(r#"data: {"content":"Hi"}"#) {
            Some(StreamFrame::Content(text)) => assert_eq!(text, "Hi"),
            _ => panic!("expected content frame"),
        }
    }

    #[test]
    fn parses_terminal_frames() {
        assert!(matches!(
            parse_frame(r#"data: {"done":true}"#),
            Some(StreamFrame::Done)
        ));
        assert!(matches!(
            parse_frame(r#"data: {"error":"boom"}"#),
            Some(StreamFrame::Error(_))
        ));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        assert!(parse_frame("").is_none());
        assert!(parse_frame(": keep-alive").is_none());
    }
}
