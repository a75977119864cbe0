//! Client <-> upstream translation.
//!
//! - Client `chat/completions` request -> upstream payload (model remapped,
//!   sampling defaults filled in, optional thinking template flag)
//! - Upstream non-streaming response -> fixed `chat.completion` envelope

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::filter::{scrub_message, FilterOptions};
use crate::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatTemplateKwargs, Choice, ResponseMessage,
    UpstreamRequest, Usage,
};
use chrono::Utc;
use serde_json::Value;

pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_MAX_TOKENS: u32 = 9024;

/// Build the upstream payload for a client request.
pub fn to_upstream_request(req: &ChatCompletionRequest, config: &RelayConfig) -> UpstreamRequest {
    UpstreamRequest {
        model: config.models.resolve(&req.model),
        messages: req.messages.clone(),
        temperature: req.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        stream: req.is_stream(),
        top_p: req.top_p,
        stop: req.stop.clone(),
        chat_template_kwargs: config
            .thinking_mode
            .then_some(ChatTemplateKwargs { thinking: true }),
    }
}

/// Reshape a complete upstream response into the relay's envelope.
///
/// `requested_model` is the name the client sent; it is echoed back rather
/// than the upstream id.
pub fn to_chat_completion(
    mut resp: Value,
    requested_model: &str,
    opts: FilterOptions,
) -> Result<ChatCompletionResponse, RelayError> {
    let choices = resp
        .get_mut("choices")
        .and_then(|v| v.as_array_mut())
        .ok_or_else(|| RelayError::Translation("upstream response has no choices".to_string()))?;

    let mut out_choices = Vec::with_capacity(choices.len());
    for (position, choice) in choices.iter_mut().enumerate() {
        let index = choice
            .get("index")
            .and_then(|v| v.as_u64())
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(position as u32);
        let finish_reason = choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let (role, content) = match choice.get_mut("message").and_then(|m| m.as_object_mut()) {
            Some(message) => {
                scrub_message(message, opts);
                let role = message
                    .get("role")
                    .and_then(|v| v.as_str())
                    .unwrap_or("assistant")
                    .to_string();
                let content = message
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                (role, content)
            }
            None => ("assistant".to_string(), String::new()),
        };

        out_choices.push(Choice {
            index,
            message: ResponseMessage { role, content },
            finish_reason,
        });
    }

    let usage = resp.get("usage").map(usage_from_value).unwrap_or_default();

    let now = Utc::now();
    Ok(ChatCompletionResponse {
        id: format!("chatcmpl-{}", now.timestamp_millis()),
        object: "chat.completion".to_string(),
        created: now.timestamp(),
        model: requested_model.to_string(),
        choices: out_choices,
        usage,
    })
}

/// Read each usage counter on its own; a missing or non-numeric one is zero.
fn usage_from_value(usage: &Value) -> Usage {
    let counter = |key: &str| usage.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    Usage {
        prompt_tokens: counter("prompt_tokens"),
        completion_tokens: counter("completion_tokens"),
        total_tokens: counter("total_tokens"),
    }
}
