// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! OpenAI-compatible wire client.
//!
//! Every saturn endpoint speaks the `/chat/completions` + `/models` wire
//! format.  Local endpoints are addressed as `http://host:port/v1/...`;
//! endpoints advertising an `api_base` (beacons proxying a cloud API) are
//! addressed as `<api_base>/...` and authenticated with their ephemeral
//! bearer key.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use saturn_discovery::{EndpointDescriptor, Health};

use crate::{
    error::ModelError, provider::ResponseStream, CompletionRequest, Message, MessageContent,
    Role, StreamEvent,
};

/// Timeout applied to the `/v1/health` probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum error-body bytes carried into a [`ModelError::Http`].
const ERROR_BODY_CAP: usize = 2048;

/// A model entry from `GET /models`.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub name: Option<String>,
}

/// Stateless wire client; the connection pool lives in the shared
/// `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Unary chat completion.  Returns the assistant turn converted into
    /// internal messages: a text message (when `content` is present)
    /// followed by one tool-call message per entry of `tool_calls`.
    pub async fn chat(
        &self,
        ep: &EndpointDescriptor,
        req: &CompletionRequest,
    ) -> Result<Vec<Message>, ModelError> {
        let body = build_request_body(req, false);
        debug!(endpoint = %ep.instance, messages = req.messages.len(), "unary chat request");

        let resp = self
            .apply_auth(self.http.post(chat_url(ep)), ep)
            .json(&body)
            .send()
            .await?;
        let v = read_json(resp).await?;

        let message = &v["choices"][0]["message"];
        let mut out = Vec::new();
        if let Some(text) = message["content"].as_str() {
            if !text.is_empty() {
                out.push(Message::assistant(text));
            }
        }
        if let Some(calls) = message["tool_calls"].as_array() {
            for tc in calls {
                out.push(Message::tool_call(
                    tc["id"].as_str().unwrap_or_default(),
                    tc["function"]["name"].as_str().unwrap_or_default(),
                    tc["function"]["arguments"].as_str().unwrap_or("{}"),
                ));
            }
        }
        Ok(out)
    }

    /// Streaming chat completion over SSE.
    pub async fn chat_stream(
        &self,
        ep: &EndpointDescriptor,
        req: &CompletionRequest,
    ) -> Result<ResponseStream, ModelError> {
        let body = build_request_body(req, true);
        debug!(endpoint = %ep.instance, messages = req.messages.len(), "streaming chat request");

        let resp = self
            .apply_auth(self.http.post(chat_url(ep)), ep)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        // SSE events can be split across TCP packets.  Maintain a line
        // buffer across chunks; emit events only for complete lines.
        let byte_stream = resp.bytes_stream();
        let event_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let events: Vec<Result<StreamEvent, ModelError>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(ModelError::Transport(e.to_string()))],
                };
                std::future::ready(Some(events))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(event_stream))
    }

    /// `GET /models`.
    pub async fn list_models(
        &self,
        ep: &EndpointDescriptor,
    ) -> Result<Vec<ModelInfo>, ModelError> {
        let resp = self
            .apply_auth(self.http.get(url_for(ep, "models")), ep)
            .send()
            .await?;
        let v = read_json(resp).await?;
        let mut models = Vec::new();
        if let Some(data) = v["data"].as_array() {
            for item in data {
                if let Some(id) = item["id"].as_str() {
                    models.push(ModelInfo {
                        id: id.to_string(),
                        name: item["name"].as_str().map(str::to_string),
                    });
                }
            }
        }
        Ok(models)
    }

    /// Probe `/v1/health` with a 2 s timeout.  Endpoints proxying a remote
    /// API skip the probe and report healthy.
    pub async fn health_check(&self, ep: &EndpointDescriptor) -> Health {
        if ep.is_remote() {
            return Health::Healthy;
        }
        let probe = self
            .http
            .get(url_for(ep, "health"))
            .timeout(HEALTH_TIMEOUT)
            .send();
        match probe.await {
            Ok(resp) if resp.status().is_success() => Health::Healthy,
            _ => Health::Unhealthy,
        }
    }

    fn apply_auth(
        &self,
        req: reqwest::RequestBuilder,
        ep: &EndpointDescriptor,
    ) -> reqwest::RequestBuilder {
        match &ep.ephemeral_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

/// Full chat-completions URL for an endpoint.
pub fn chat_url(ep: &EndpointDescriptor) -> String {
    url_for(ep, "chat/completions")
}

/// Remote bases already include their version segment; local endpoints get
/// the `/v1` prefix.
fn url_for(ep: &EndpointDescriptor, path: &str) -> String {
    if ep.is_remote() {
        format!("{}/{path}", ep.base_url())
    } else {
        format!("{}/v1/{path}", ep.base_url())
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value, ModelError> {
    if !resp.status().is_success() {
        return Err(http_error(resp).await);
    }
    Ok(resp.json().await?)
}

async fn http_error(resp: reqwest::Response) -> ModelError {
    let status = resp.status().as_u16();
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_CAP {
        let mut end = ERROR_BODY_CAP;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push('…');
    }
    ModelError::Http { status, body }
}

fn build_request_body(req: &CompletionRequest, stream: bool) -> Value {
    let mut body = json!({
        "messages": build_openai_messages(&req.messages),
    });
    if let Some(model) = &req.model {
        body["model"] = json!(model);
    }
    if let Some(max) = req.max_tokens {
        body["max_tokens"] = json!(max);
    }
    if stream {
        body["stream"] = json!(true);
    }
    if !req.tools.is_empty() {
        let tools: Vec<Value> = req
            .tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(tools);
    }
    body
}

/// Parse a single complete SSE `data:` line into a [`StreamEvent`].
///
/// Returns `None` for empty lines and comment/noise lines.
fn parse_sse_data_line(line: &str) -> Option<Result<StreamEvent, ModelError>> {
    let data = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(Ok(StreamEvent::Done));
    }
    match serde_json::from_str::<Value>(data) {
        Ok(v) => Some(Ok(parse_sse_chunk(&v))),
        Err(_) => Some(Err(ModelError::StreamDecode(data.to_string()))),
    }
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so the next TCP chunk can
/// extend it.  Necessary because a single SSE event may be split across
/// multiple packets.
pub(crate) fn drain_complete_sse_lines(
    buf: &mut String,
) -> Vec<Result<StreamEvent, ModelError>> {
    let mut events = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        // Strip the optional Windows-style \r before \n.
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(ev) = parse_sse_data_line(&line) {
            events.push(ev);
        }
    }
    events
}

fn parse_sse_chunk(v: &Value) -> StreamEvent {
    let delta = &v["choices"][0]["delta"];

    // Tool-call delta.  Each chunk carries one fragment in practice; the
    // `index` field routes accumulation in the agent.
    if let Some(tc) = delta["tool_calls"].get(0) {
        return StreamEvent::ToolCall {
            index: tc["index"].as_u64().unwrap_or(0) as u32,
            id: tc["id"].as_str().unwrap_or("").to_string(),
            name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
            arguments: tc["function"]["arguments"].as_str().unwrap_or("").to_string(),
        };
    }

    let text = delta["content"].as_str().unwrap_or("");
    StreamEvent::TextDelta(text.to_string())
}

fn role_str(r: &Role) -> &'static str {
    match r {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Convert internal [`Message`]s into the OpenAI wire-format JSON array.
///
/// Free function so it can be unit-tested without HTTP requests.
///
/// **Parallel tool call coalescing**: the wire requires every tool call of
/// one assistant turn inside a *single* assistant message as a `tool_calls`
/// array.  Saturn stores each call as its own `MessageContent::ToolCall`
/// entry, so consecutive tool-call messages merge into one object here.
pub(crate) fn build_openai_messages(messages: &[Message]) -> Vec<Value> {
    fn tool_call_to_json(tool_call_id: &str, function: &crate::FunctionCall) -> Value {
        json!({
            "id": tool_call_id,
            "type": "function",
            "function": {
                "name": function.name,
                "arguments": function.arguments,
            }
        })
    }

    let mut result: Vec<Value> = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let m = &messages[i];

        if let MessageContent::ToolCall {
            tool_call_id,
            function,
        } = &m.content
        {
            let mut calls = vec![tool_call_to_json(tool_call_id, function)];
            i += 1;
            while i < messages.len() {
                if let MessageContent::ToolCall {
                    tool_call_id,
                    function,
                } = &messages[i].content
                {
                    calls.push(tool_call_to_json(tool_call_id, function));
                    i += 1;
                } else {
                    break;
                }
            }
            result.push(json!({ "role": "assistant", "tool_calls": calls }));
            continue;
        }

        let v = match &m.content {
            MessageContent::Text(t) => json!({
                "role": role_str(&m.role),
                "content": t,
            }),
            MessageContent::ToolCall { .. } => unreachable!("handled above"),
            MessageContent::ToolResult {
                tool_call_id,
                content,
                ..
            } => json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
        };
        result.push(v);
        i += 1;
    }

    result
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
