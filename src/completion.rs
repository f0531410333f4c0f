use crate::chat::Message;
use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Product persona injected as the leading system message of every
/// completion request.
const PERSONA: &str = "You are Meridian, a helpful and intelligent AI assistant.";

/// Client for an OpenAI-compatible chat completion endpoint. Turns a chat's
/// stored history into one streamed assistant reply.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn system_prompt(display_name: Option<&str>) -> String {
        match display_name {
            Some(name) => format!("{PERSONA} The user's name is {name}."),
            None => PERSONA.to_string(),
        }
    }

    /// Open a streaming completion over the given history. Yields text deltas
    /// as the provider produces them; the stream ends after the provider's
    /// terminal marker. Ends with `Error::Upstream` if the connection drops
    /// before that marker, so a truncated reply is never mistaken for a
    /// complete one.
    ///
    /// `image_url` is not forwarded; the provider contract here is text-only.
    pub async fn stream(
        &self,
        history: &[Message],
        display_name: Option<&str>,
    ) -> Result<impl Stream<Item = Result<String>> + Send + 'static> {
        let mut payload_messages =
            vec![json!({ "role": "system", "content": Self::system_prompt(display_name) })];
        payload_messages.extend(
            history
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": payload_messages,
                "stream": true,
            }))
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "completion request failed with status {status}"
            )));
        }

        let mut bytes = response.bytes_stream();

        Ok(async_stream::stream! {
            let mut buf: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(Error::Upstream(e.to_string()));
                        return;
                    }
                };
                buf.extend_from_slice(&chunk);

                // The provider frames deltas as `data: <json>` lines; one
                // frame may arrive split across chunks.
                while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        return;
                    }

                    match serde_json::from_str::<Value>(data) {
                        Ok(frame) => {
                            if let Some(text) = delta_text(&frame) {
                                if !text.is_empty() {
                                    yield Ok(text.to_string());
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(Error::Upstream(format!("malformed stream frame: {e}")));
                            return;
                        }
                    }
                }
            }

            debug!("completion stream closed before terminal marker");
            yield Err(Error::Upstream(
                "stream ended before completion".to_string(),
            ));
        })
    }
}

/// Text delta carried by one streamed completion frame, if any.
fn delta_text(frame: &Value) -> Option<&str> {
    frame["choices"][0]["delta"]["content"].as_str()
}
