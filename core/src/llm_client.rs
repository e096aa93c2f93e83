//! Streaming and one-shot completions against an OpenAI-compatible
//! `/chat/completions` endpoint.

use futures::Stream;
use futures::StreamExt;

use crate::error::MinicoderError;
use crate::error::Result;
use crate::model_config::ModelDescriptor;

/// Distinguishes user-visible content from a provider's reasoning/thinking
/// stream. Reasoning chunks are surfaced to the caller but never included in
/// the string `complete` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Content,
    Reasoning,
}

/// Performs one completion call, streaming or one-shot depending on the
/// model's `params.stream` flag. `on_chunk` is invoked, in wire order, for
/// every content and reasoning delta; `is_cancelled` is polled before every
/// chunk dispatch and aborts the transfer with `MinicoderError::Cancelled`.
pub async fn complete(
    client: &reqwest::Client,
    model: &ModelDescriptor,
    prompt: &str,
    mut on_chunk: impl FnMut(&str, ChunkKind),
    mut is_cancelled: impl FnMut() -> bool,
) -> Result<String> {
    if !model.endpoint.contains("/chat/completions") {
        return Err(MinicoderError::Configuration(format!(
            "model '{}' endpoint must contain /chat/completions",
            model.name
        )));
    }
    let api_key = model.api_key.as_deref().ok_or_else(|| {
        MinicoderError::Configuration(format!("model '{}' has no API key configured", model.name))
    })?;

    let streaming = model
        .params
        .get("stream")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let mut body = serde_json::Map::new();
    if let Some(provider_model) = &model.model {
        body.insert(
            "model".to_string(),
            serde_json::Value::String(provider_model.clone()),
        );
    }
    body.insert(
        "messages".to_string(),
        serde_json::json!([{"role": "user", "content": prompt}]),
    );
    for (key, value) in &model.params {
        body.insert(key.clone(), value.clone());
    }

    let mut request = client
        .post(&model.endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .bearer_auth(api_key);
    if streaming {
        request = request
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
    }

    let response = request
        .json(&serde_json::Value::Object(body))
        .send()
        .await
        .map_err(|e| MinicoderError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        let message = provider_error_message(&body_text)
            .unwrap_or_else(|| format!("HTTP {status}: {body_text}"));
        return Err(MinicoderError::Provider(message));
    }

    if is_cancelled() {
        return Err(MinicoderError::Cancelled);
    }

    if streaming {
        run_sse(response.bytes_stream(), on_chunk, is_cancelled).await
    } else {
        run_one_shot(response, on_chunk).await
    }
}

fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

async fn run_one_shot(
    response: reqwest::Response,
    mut on_chunk: impl FnMut(&str, ChunkKind),
) -> Result<String> {
    let text = response
        .text()
        .await
        .map_err(|e| MinicoderError::Transport(e.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| MinicoderError::Provider(format!("invalid JSON response: {e}")))?;

    if let Some(message) = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return Err(MinicoderError::Provider(message.to_string()));
    }

    let message_obj = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"));

    let content = message_obj
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| MinicoderError::Provider("No content received".to_string()))?;
    on_chunk(content, ChunkKind::Content);

    if let Some(reasoning) = message_obj
        .and_then(|m| m.get("reasoning").or_else(|| m.get("reasoning_content")))
        .and_then(|r| r.as_str())
    {
        on_chunk(reasoning, ChunkKind::Reasoning);
    }

    Ok(content.to_string())
}

async fn run_sse(
    mut stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
    mut on_chunk: impl FnMut(&str, ChunkKind),
    mut is_cancelled: impl FnMut() -> bool,
) -> Result<String> {
    let mut buffer = String::new();
    let mut content = String::new();
    let mut saw_done = false;

    'outer: while let Some(next) = stream.next().await {
        if is_cancelled() {
            return Err(MinicoderError::Cancelled);
        }
        let bytes = next.map_err(|e| MinicoderError::Transport(e.to_string()))?;
        buffer.push_str(&String::from_utf8_lossy(&bytes));

        loop {
            let Some(newline_pos) = buffer.find('\n') else {
                break;
            };
            let line = buffer[..newline_pos].trim_end_matches('\r').to_string();
            buffer.drain(..=newline_pos);

            if is_cancelled() {
                return Err(MinicoderError::Cancelled);
            }

            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            if payload == "[DONE]" {
                saw_done = true;
                break 'outer;
            }
            let Ok(chunk) = serde_json::from_str::<serde_json::Value>(payload) else {
                continue;
            };
            if let Some(message) = chunk
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return Err(MinicoderError::Provider(message.to_string()));
            }

            let delta = chunk
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"));
            let Some(delta) = delta else { continue };

            if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
                content.push_str(text);
                on_chunk(text, ChunkKind::Content);
            }
            if let Some(text) = delta
                .get("reasoning")
                .or_else(|| delta.get("reasoning_content"))
                .and_then(|r| r.as_str())
            {
                on_chunk(text, ChunkKind::Reasoning);
            }
        }
    }

    if !saw_done {
        let trimmed = buffer.trim();
        if !trimmed.is_empty() {
            let message = trimmed
                .strip_prefix("data: ")
                .and_then(provider_error_message)
                .or_else(|| provider_error_message(trimmed));
            if let Some(message) = message {
                return Err(MinicoderError::Provider(message));
            }
        }
        return Err(MinicoderError::Provider(
            "Incomplete SSE data received".to_string(),
        ));
    }

    if content.is_empty() {
        return Err(MinicoderError::Provider("No content received".to_string()));
    }
    Ok(content)
}
