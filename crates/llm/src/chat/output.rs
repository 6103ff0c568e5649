//! Inbound translation: Chat Completions response → output items.

use protocol::{
    Annotation, InputTokensDetails, Item, ItemPayload, ItemStatus, LogProb, MessageContent, OutputContent,
    OutputTokensDetails, ReasoningPayload, Role, TopLogProb, Usage,
};

use crate::{event::FinishReason, provider::ProviderResponse};

use super::wire;

pub(super) fn to_provider_response(response: wire::ChatCompletionResponse) -> ProviderResponse {
    let usage = response.usage.map(convert_usage).unwrap_or_default();

    // The gateway always requests a single choice.
    let Some(choice) = response.choices.into_iter().min_by_key(|c| c.index) else {
        return ProviderResponse {
            output: Vec::new(),
            usage,
            finish_reason: FinishReason::Stop,
        };
    };

    let finish_reason = convert_finish_reason(choice.finish_reason.as_deref());
    let mut output = Vec::new();

    if let Some(reasoning) = choice.message.reasoning_content.filter(|r| !r.is_empty()) {
        output.push(Item::new(
            ItemPayload::Reasoning(ReasoningPayload {
                content: Some(reasoning),
                ..Default::default()
            }),
            ItemStatus::Completed,
        ));
    }

    if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
        output.push(Item::message(
            Role::Assistant,
            MessageContent::Output(vec![OutputContent::Refusal { refusal }]),
            ItemStatus::Completed,
        ));
    } else if let Some(text) = choice.message.content.filter(|c| !c.is_empty()) {
        let logprobs = choice
            .logprobs
            .and_then(|lp| lp.content)
            .map(|entries| entries.into_iter().map(convert_logprob).collect())
            .unwrap_or_default();

        let status = match finish_reason {
            FinishReason::Length => ItemStatus::Incomplete,
            _ => ItemStatus::Completed,
        };

        output.push(Item::message(
            Role::Assistant,
            MessageContent::Output(vec![OutputContent::OutputText {
                text,
                annotations: Vec::<Annotation>::new(),
                logprobs,
            }]),
            status,
        ));
    }

    for call in choice.message.tool_calls.unwrap_or_default() {
        output.push(Item::function_call(
            call.function.name,
            call.id,
            call.function.arguments,
            ItemStatus::Completed,
        ));
    }

    ProviderResponse {
        output,
        usage,
        finish_reason,
    }
}

pub(super) fn convert_usage(usage: wire::Usage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        input_tokens_details: InputTokensDetails {
            cached_tokens: usage.prompt_tokens_details.unwrap_or_default().cached_tokens,
        },
        output_tokens_details: OutputTokensDetails {
            reasoning_tokens: usage.completion_tokens_details.unwrap_or_default().reasoning_tokens,
        },
    }
}

pub(super) fn convert_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn convert_logprob(entry: wire::LogProbEntry) -> LogProb {
    LogProb {
        token: entry.token,
        logprob: entry.logprob,
        top_logprobs: entry
            .top_logprobs
            .into_iter()
            .map(|top| TopLogProb {
                token: top.token,
                logprob: top.logprob,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: serde_json::Value) -> wire::ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_choice_becomes_assistant_message() {
        let response = parse(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "hello" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
        }));

        let result = to_provider_response(response);

        assert_eq!(result.finish_reason, FinishReason::Stop);
        assert_eq!(result.output.len(), 1);
        assert_eq!(result.output[0].as_message().unwrap().content.text(), "hello");
        assert_eq!(result.usage.total_tokens, 5);
    }

    #[test]
    fn tool_calls_become_function_call_items() {
        let response = parse(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        { "id": "call_1", "type": "function",
                          "function": { "name": "web_search", "arguments": "{\"query\":\"rust\"}" } },
                        { "id": "call_2", "type": "function",
                          "function": { "name": "lookup", "arguments": "{}" } }
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }));

        let result = to_provider_response(response);

        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        assert_eq!(result.output.len(), 2);

        let first = result.output[0].as_function_call().unwrap();
        assert_eq!(first.name, "web_search");
        assert_eq!(first.call_id, "call_1");
        assert_eq!(first.arguments, "{\"query\":\"rust\"}");
    }

    #[test]
    fn length_finish_marks_item_incomplete() {
        let response = parse(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "truncat" },
                "finish_reason": "length"
            }]
        }));

        let result = to_provider_response(response);

        assert_eq!(result.finish_reason, FinishReason::Length);
        assert_eq!(result.output[0].status, ItemStatus::Incomplete);
    }

    #[test]
    fn refusal_becomes_refusal_part() {
        let response = parse(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "refusal": "cannot help with that" },
                "finish_reason": "content_filter"
            }]
        }));

        let result = to_provider_response(response);

        assert_eq!(result.finish_reason, FinishReason::ContentFilter);
        let message = result.output[0].as_message().unwrap();
        assert!(matches!(
            &message.content,
            MessageContent::Output(parts) if matches!(&parts[0], OutputContent::Refusal { .. })
        ));
    }

    #[test]
    fn usage_details_are_carried() {
        let response = parse(json!({
            "choices": [],
            "usage": {
                "prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14,
                "prompt_tokens_details": { "cached_tokens": 8 },
                "completion_tokens_details": { "reasoning_tokens": 2 }
            }
        }));

        let result = to_provider_response(response);
        assert_eq!(result.usage.input_tokens_details.cached_tokens, 8);
        assert_eq!(result.usage.output_tokens_details.reasoning_tokens, 2);
    }
}
