//! SSE delta reassembly for Chat Completions streams.
//!
//! Chat Completions emits partial deltas; tool-call arguments arrive as JSON
//! fragments that must be buffered per `(choice_index, tool_index)` and only
//! reported complete when the choice finishes or a new tool call begins.
//! Fragments may straddle chunk boundaries; the call id is carried on the
//! first fragment and correlated across the rest.

use std::collections::{BTreeMap, HashMap};

use crate::event::ProviderEvent;

use super::{output, wire};

#[derive(Debug, Default)]
struct ToolCallBuffer {
    id: String,
    name: String,
    arguments: String,
    done: bool,
}

#[derive(Debug, Default)]
struct ChoiceState {
    text: String,
    text_open: bool,
    reasoning: String,
    reasoning_open: bool,
    tool_calls: BTreeMap<usize, ToolCallBuffer>,
    current_tool: Option<usize>,
}

impl ChoiceState {
    fn close_reasoning(&mut self, events: &mut Vec<ProviderEvent>) {
        if self.reasoning_open {
            self.reasoning_open = false;
            events.push(ProviderEvent::ReasoningDone {
                text: std::mem::take(&mut self.reasoning),
            });
        }
    }

    fn close_text(&mut self, events: &mut Vec<ProviderEvent>) {
        if self.text_open {
            self.text_open = false;
            events.push(ProviderEvent::TextDone {
                text: std::mem::take(&mut self.text),
            });
        }
    }

    fn close_tool_call(&mut self, index: usize, events: &mut Vec<ProviderEvent>) {
        if let Some(buffer) = self.tool_calls.get_mut(&index)
            && !buffer.done
        {
            buffer.done = true;
            events.push(ProviderEvent::ToolCallDone {
                index,
                id: buffer.id.clone(),
                name: buffer.name.clone(),
                arguments: buffer.arguments.clone(),
            });
        }
    }

    fn close_all(&mut self, events: &mut Vec<ProviderEvent>) {
        self.close_reasoning(events);
        self.close_text(events);

        let open: Vec<usize> = self
            .tool_calls
            .iter()
            .filter(|(_, buffer)| !buffer.done)
            .map(|(index, _)| *index)
            .collect();

        for index in open {
            self.close_tool_call(index, events);
        }
    }
}

/// Per-stream state machine turning wire chunks into provider events.
///
/// Multiple choices are tracked independently but only the first choice is
/// forwarded; the gateway never requests more than one.
#[derive(Debug, Default)]
pub(super) struct ChunkAssembler {
    choices: HashMap<u32, ChoiceState>,
    finished: bool,
}

impl ChunkAssembler {
    pub fn handle(&mut self, chunk: wire::ChatCompletionChunk) -> Vec<ProviderEvent> {
        let mut events = Vec::new();

        for choice in chunk.choices {
            let forward = choice.index == 0;
            let state = self.choices.entry(choice.index).or_default();
            let mut choice_events = Vec::new();

            if let Some(delta) = choice.delta.reasoning_content
                && !delta.is_empty()
            {
                state.reasoning_open = true;
                state.reasoning.push_str(&delta);
                choice_events.push(ProviderEvent::ReasoningDelta { delta });
            }

            if let Some(delta) = choice.delta.content
                && !delta.is_empty()
            {
                state.close_reasoning(&mut choice_events);
                state.text_open = true;
                state.text.push_str(&delta);
                choice_events.push(ProviderEvent::TextDelta { delta });
            }

            if let Some(delta) = choice.delta.refusal
                && !delta.is_empty()
            {
                choice_events.push(ProviderEvent::RefusalDelta { delta });
            }

            for fragment in choice.delta.tool_calls.unwrap_or_default() {
                handle_tool_fragment(state, fragment, &mut choice_events);
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                state.close_all(&mut choice_events);
                choice_events.push(ProviderEvent::Finish {
                    reason: output::convert_finish_reason(Some(reason)),
                });
            }

            if forward {
                events.extend(choice_events);
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(ProviderEvent::UsageReport {
                usage: output::convert_usage(usage),
            });
        }

        events
    }

    /// Finalize on the `[DONE]` sentinel (or unexpected upstream close).
    pub fn finish(&mut self) -> Vec<ProviderEvent> {
        if self.finished {
            return Vec::new();
        }

        self.finished = true;

        let mut events = Vec::new();

        if let Some(state) = self.choices.get_mut(&0) {
            state.close_all(&mut events);
        }

        events
    }
}

fn handle_tool_fragment(state: &mut ChoiceState, fragment: wire::StreamingToolCall, events: &mut Vec<ProviderEvent>) {
    let is_new = !state.tool_calls.contains_key(&fragment.index);

    // A new tool call beginning closes the previous one; fragments for an
    // already-open index keep appending to its own buffer.
    if is_new
        && let Some(current) = state.current_tool
        && current != fragment.index
    {
        state.close_tool_call(current, events);
    }

    state.current_tool = Some(fragment.index);

    let buffer = state.tool_calls.entry(fragment.index).or_default();

    let mut delta_id = None;
    let mut delta_name = None;

    if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
        buffer.id = id.clone();
        delta_id = Some(id);
    }

    let arguments_fragment = match fragment.function {
        Some(function) => {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                buffer.name = name.clone();
                delta_name = Some(name);
            }

            function.arguments.unwrap_or_default()
        }
        None => String::new(),
    };

    buffer.arguments.push_str(&arguments_fragment);

    if is_new || delta_id.is_some() || delta_name.is_some() || !arguments_fragment.is_empty() {
        events.push(ProviderEvent::ToolCallDelta {
            index: fragment.index,
            id: delta_id,
            name: delta_name,
            arguments_fragment,
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::event::FinishReason;

    use super::*;

    fn chunk(value: serde_json::Value) -> wire::ChatCompletionChunk {
        serde_json::from_value(value).unwrap()
    }

    fn text_chunk(delta: &str) -> wire::ChatCompletionChunk {
        chunk(json!({ "choices": [{ "index": 0, "delta": { "content": delta } }] }))
    }

    fn finish_chunk(reason: &str) -> wire::ChatCompletionChunk {
        chunk(json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": reason }] }))
    }

    #[test]
    fn text_deltas_accumulate_into_done() {
        let mut assembler = ChunkAssembler::default();

        let first = assembler.handle(text_chunk("hel"));
        assert_eq!(first, vec![ProviderEvent::TextDelta { delta: "hel".into() }]);

        let second = assembler.handle(text_chunk("lo"));
        assert_eq!(second, vec![ProviderEvent::TextDelta { delta: "lo".into() }]);

        let end = assembler.handle(finish_chunk("stop"));
        assert_eq!(
            end,
            vec![
                ProviderEvent::TextDone { text: "hello".into() },
                ProviderEvent::Finish {
                    reason: FinishReason::Stop
                },
            ]
        );
    }

    #[test]
    fn argument_fragments_reassemble_exactly() {
        let mut assembler = ChunkAssembler::default();

        assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 0, "id": "call_1", "function": { "name": "web_search", "arguments": "" } }
        ]}}]})));

        // Fragments straddling JSON token boundaries.
        for fragment in ["{\"qu", "ery\":\"ru", "st\"}"] {
            assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
                { "index": 0, "function": { "arguments": fragment } }
            ]}}]})));
        }

        let end = assembler.handle(finish_chunk("tool_calls"));

        assert_eq!(
            end,
            vec![
                ProviderEvent::ToolCallDone {
                    index: 0,
                    id: "call_1".into(),
                    name: "web_search".into(),
                    arguments: "{\"query\":\"rust\"}".into(),
                },
                ProviderEvent::Finish {
                    reason: FinishReason::ToolCalls
                },
            ]
        );
    }

    #[test]
    fn new_tool_call_closes_the_previous_one() {
        let mut assembler = ChunkAssembler::default();

        assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 0, "id": "call_1", "function": { "name": "first", "arguments": "{}" } }
        ]}}]})));

        let events = assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 1, "id": "call_2", "function": { "name": "second", "arguments": "" } }
        ]}}]})));

        assert_eq!(
            events[0],
            ProviderEvent::ToolCallDone {
                index: 0,
                id: "call_1".into(),
                name: "first".into(),
                arguments: "{}".into(),
            }
        );

        let end = assembler.handle(finish_chunk("tool_calls"));
        assert!(matches!(
            end[0],
            ProviderEvent::ToolCallDone { index: 1, .. }
        ));
    }

    #[test]
    fn parallel_tool_calls_buffer_independently() {
        let mut assembler = ChunkAssembler::default();

        assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 0, "id": "call_1", "function": { "name": "a", "arguments": "{\"x\":" } }
        ]}}]})));
        assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 0, "function": { "arguments": "1}" } }
        ]}}]})));

        // Call 1 begins, which closes call 0 at the boundary.
        let boundary = assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 1, "id": "call_2", "function": { "name": "b", "arguments": "{\"y\":" } }
        ]}}]})));

        assert_eq!(
            boundary[0],
            ProviderEvent::ToolCallDone {
                index: 0,
                id: "call_1".into(),
                name: "a".into(),
                arguments: "{\"x\":1}".into(),
            }
        );

        let end = assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 1, "function": { "arguments": "2}" } }
        ]}, "finish_reason": "tool_calls" }]})));

        let dones: Vec<_> = end
            .iter()
            .filter_map(|event| match event {
                ProviderEvent::ToolCallDone { index, arguments, .. } => Some((*index, arguments.clone())),
                _ => None,
            })
            .collect();

        assert_eq!(dones, vec![(1, "{\"y\":2}".to_string())]);
    }

    #[test]
    fn reasoning_closes_before_text() {
        let mut assembler = ChunkAssembler::default();

        assembler.handle(chunk(json!({ "choices": [{ "index": 0, "delta": { "reasoning_content": "hmm" } }] })));
        let events = assembler.handle(text_chunk("answer"));

        assert_eq!(
            events,
            vec![
                ProviderEvent::ReasoningDone { text: "hmm".into() },
                ProviderEvent::TextDelta { delta: "answer".into() },
            ]
        );
    }

    #[test]
    fn secondary_choices_are_not_forwarded() {
        let mut assembler = ChunkAssembler::default();

        let events = assembler.handle(chunk(json!({ "choices": [
            { "index": 1, "delta": { "content": "ignored" } },
            { "index": 0, "delta": { "content": "kept" } }
        ]})));

        assert_eq!(events, vec![ProviderEvent::TextDelta { delta: "kept".into() }]);
    }

    #[test]
    fn usage_chunk_reports_usage() {
        let mut assembler = ChunkAssembler::default();

        let events = assembler.handle(chunk(json!({
            "choices": [],
            "usage": { "prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10 }
        })));

        assert!(matches!(
            &events[0],
            ProviderEvent::UsageReport { usage } if usage.total_tokens == 10
        ));
    }

    #[test]
    fn finish_is_idempotent() {
        let mut assembler = ChunkAssembler::default();
        assembler.handle(text_chunk("tail"));

        let first = assembler.finish();
        assert_eq!(first, vec![ProviderEvent::TextDone { text: "tail".into() }]);
        assert!(assembler.finish().is_empty());
    }
}
