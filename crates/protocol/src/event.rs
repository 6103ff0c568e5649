//! The sequence-numbered streaming event protocol.
//!
//! Event `type` strings are partly dynamic (`response.{tool}_call.{phase}`
//! tool-lifecycle events, `<provider>:<type>` extensions), so (de)serialization
//! goes through a hand-written bridge over `serde_json::Value` instead of a
//! derived tag. Each event serializes only the fields meaningful to its type,
//! always including `type` and `sequence_number`.

use serde::{Deserialize, Serialize, de, de::DeserializeOwned};
use serde_json::{Map, Value, json};

use crate::{Error, Item, OutputContent, Response, item::is_extension_type};

/// Phase of a server-side tool execution, as surfaced to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    InProgress,
    Searching,
    Interpreting,
    Completed,
    Failed,
}

impl ToolPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolPhase::InProgress => "in_progress",
            ToolPhase::Searching => "searching",
            ToolPhase::Interpreting => "interpreting",
            ToolPhase::Completed => "completed",
            ToolPhase::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(ToolPhase::InProgress),
            "searching" => Some(ToolPhase::Searching),
            "interpreting" => Some(ToolPhase::Interpreting),
            "completed" => Some(ToolPhase::Completed),
            "failed" => Some(ToolPhase::Failed),
            _ => None,
        }
    }
}

/// Payload of one streaming event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    ResponseCreated { response: Response },
    ResponseInProgress { response: Response },
    ResponseCompleted { response: Response },
    ResponseFailed { response: Response },
    ResponseIncomplete { response: Response },
    OutputItemAdded { output_index: usize, item: Item },
    OutputItemDone { output_index: usize, item: Item },
    ContentPartAdded { item_id: String, output_index: usize, content_index: usize, part: OutputContent },
    ContentPartDone { item_id: String, output_index: usize, content_index: usize, part: OutputContent },
    OutputTextDelta { item_id: String, output_index: usize, content_index: usize, delta: String },
    OutputTextDone { item_id: String, output_index: usize, content_index: usize, text: String },
    RefusalDelta { item_id: String, output_index: usize, content_index: usize, delta: String },
    RefusalDone { item_id: String, output_index: usize, content_index: usize, refusal: String },
    FunctionCallArgumentsDelta { item_id: String, output_index: usize, delta: String },
    FunctionCallArgumentsDone { item_id: String, output_index: usize, arguments: String },
    ReasoningTextDelta { item_id: String, output_index: usize, delta: String },
    ReasoningTextDone { item_id: String, output_index: usize, text: String },
    /// `response.{tool}_call.{phase}` around server-side execution.
    ToolCall { tool: String, phase: ToolPhase, item_id: String, output_index: usize },
    /// Streaming error, not wrapped in a response snapshot.
    Error { error: Error },
    /// `<provider>:<type>` extension event with an opaque payload.
    Extension { event_type: String, data: Map<String, Value> },
}

/// One event of a response stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Strictly monotonic per stream, starting at 0.
    pub sequence_number: u64,
    pub kind: EventKind,
}

impl StreamEvent {
    pub fn new(sequence_number: u64, kind: EventKind) -> Self {
        Self { sequence_number, kind }
    }

    /// The wire `type` string for this event.
    pub fn event_type(&self) -> String {
        match &self.kind {
            EventKind::ResponseCreated { .. } => "response.created".to_string(),
            EventKind::ResponseInProgress { .. } => "response.in_progress".to_string(),
            EventKind::ResponseCompleted { .. } => "response.completed".to_string(),
            EventKind::ResponseFailed { .. } => "response.failed".to_string(),
            EventKind::ResponseIncomplete { .. } => "response.incomplete".to_string(),
            EventKind::OutputItemAdded { .. } => "response.output_item.added".to_string(),
            EventKind::OutputItemDone { .. } => "response.output_item.done".to_string(),
            EventKind::ContentPartAdded { .. } => "response.content_part.added".to_string(),
            EventKind::ContentPartDone { .. } => "response.content_part.done".to_string(),
            EventKind::OutputTextDelta { .. } => "response.output_text.delta".to_string(),
            EventKind::OutputTextDone { .. } => "response.output_text.done".to_string(),
            EventKind::RefusalDelta { .. } => "response.refusal.delta".to_string(),
            EventKind::RefusalDone { .. } => "response.refusal.done".to_string(),
            EventKind::FunctionCallArgumentsDelta { .. } => "response.function_call_arguments.delta".to_string(),
            EventKind::FunctionCallArgumentsDone { .. } => "response.function_call_arguments.done".to_string(),
            EventKind::ReasoningTextDelta { .. } => "response.reasoning_text.delta".to_string(),
            EventKind::ReasoningTextDone { .. } => "response.reasoning_text.done".to_string(),
            EventKind::ToolCall { tool, phase, .. } => format!("response.{tool}_call.{}", phase.as_str()),
            EventKind::Error { .. } => "error".to_string(),
            EventKind::Extension { event_type, .. } => event_type.clone(),
        }
    }

    fn to_wire_value(&self) -> Value {
        let mut value = match &self.kind {
            EventKind::ResponseCreated { response }
            | EventKind::ResponseInProgress { response }
            | EventKind::ResponseCompleted { response }
            | EventKind::ResponseFailed { response }
            | EventKind::ResponseIncomplete { response } => json!({ "response": response }),
            EventKind::OutputItemAdded { output_index, item } | EventKind::OutputItemDone { output_index, item } => {
                json!({ "output_index": output_index, "item": item })
            }
            EventKind::ContentPartAdded {
                item_id,
                output_index,
                content_index,
                part,
            }
            | EventKind::ContentPartDone {
                item_id,
                output_index,
                content_index,
                part,
            } => json!({
                "item_id": item_id,
                "output_index": output_index,
                "content_index": content_index,
                "part": part,
            }),
            EventKind::OutputTextDelta {
                item_id,
                output_index,
                content_index,
                delta,
            }
            | EventKind::RefusalDelta {
                item_id,
                output_index,
                content_index,
                delta,
            } => json!({
                "item_id": item_id,
                "output_index": output_index,
                "content_index": content_index,
                "delta": delta,
            }),
            EventKind::OutputTextDone {
                item_id,
                output_index,
                content_index,
                text,
            } => json!({
                "item_id": item_id,
                "output_index": output_index,
                "content_index": content_index,
                "text": text,
            }),
            EventKind::RefusalDone {
                item_id,
                output_index,
                content_index,
                refusal,
            } => json!({
                "item_id": item_id,
                "output_index": output_index,
                "content_index": content_index,
                "refusal": refusal,
            }),
            EventKind::FunctionCallArgumentsDelta {
                item_id,
                output_index,
                delta,
            } => json!({ "item_id": item_id, "output_index": output_index, "delta": delta }),
            EventKind::FunctionCallArgumentsDone {
                item_id,
                output_index,
                arguments,
            } => json!({ "item_id": item_id, "output_index": output_index, "arguments": arguments }),
            EventKind::ReasoningTextDelta {
                item_id,
                output_index,
                delta,
            } => json!({ "item_id": item_id, "output_index": output_index, "delta": delta }),
            EventKind::ReasoningTextDone {
                item_id,
                output_index,
                text,
            } => json!({ "item_id": item_id, "output_index": output_index, "text": text }),
            EventKind::ToolCall {
                item_id, output_index, ..
            } => json!({ "item_id": item_id, "output_index": output_index }),
            EventKind::Error { error } => json!({ "error": error }),
            EventKind::Extension { data, .. } => Value::Object(data.clone()),
        };

        value["type"] = Value::String(self.event_type());
        value["sequence_number"] = json!(self.sequence_number);
        value
    }

    fn from_wire_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("stream event must be a JSON object".to_string());
        };

        let event_type = match map.remove("type") {
            Some(Value::String(t)) => t,
            _ => return Err("stream event is missing `type`".to_string()),
        };

        let sequence_number = map
            .remove("sequence_number")
            .and_then(|v| v.as_u64())
            .unwrap_or_default();

        let kind = match event_type.as_str() {
            "response.created" => EventKind::ResponseCreated {
                response: take(&mut map, "response")?,
            },
            "response.in_progress" => EventKind::ResponseInProgress {
                response: take(&mut map, "response")?,
            },
            "response.completed" => EventKind::ResponseCompleted {
                response: take(&mut map, "response")?,
            },
            "response.failed" => EventKind::ResponseFailed {
                response: take(&mut map, "response")?,
            },
            "response.incomplete" => EventKind::ResponseIncomplete {
                response: take(&mut map, "response")?,
            },
            "response.output_item.added" => EventKind::OutputItemAdded {
                output_index: take(&mut map, "output_index")?,
                item: take(&mut map, "item")?,
            },
            "response.output_item.done" => EventKind::OutputItemDone {
                output_index: take(&mut map, "output_index")?,
                item: take(&mut map, "item")?,
            },
            "response.content_part.added" => EventKind::ContentPartAdded {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                content_index: take(&mut map, "content_index")?,
                part: take(&mut map, "part")?,
            },
            "response.content_part.done" => EventKind::ContentPartDone {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                content_index: take(&mut map, "content_index")?,
                part: take(&mut map, "part")?,
            },
            "response.output_text.delta" => EventKind::OutputTextDelta {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                content_index: take(&mut map, "content_index")?,
                delta: take(&mut map, "delta")?,
            },
            "response.output_text.done" => EventKind::OutputTextDone {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                content_index: take(&mut map, "content_index")?,
                text: take(&mut map, "text")?,
            },
            "response.refusal.delta" => EventKind::RefusalDelta {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                content_index: take(&mut map, "content_index")?,
                delta: take(&mut map, "delta")?,
            },
            "response.refusal.done" => EventKind::RefusalDone {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                content_index: take(&mut map, "content_index")?,
                refusal: take(&mut map, "refusal")?,
            },
            "response.function_call_arguments.delta" => EventKind::FunctionCallArgumentsDelta {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                delta: take(&mut map, "delta")?,
            },
            "response.function_call_arguments.done" => EventKind::FunctionCallArgumentsDone {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                arguments: take(&mut map, "arguments")?,
            },
            "response.reasoning_text.delta" => EventKind::ReasoningTextDelta {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                delta: take(&mut map, "delta")?,
            },
            "response.reasoning_text.done" => EventKind::ReasoningTextDone {
                item_id: take(&mut map, "item_id")?,
                output_index: take(&mut map, "output_index")?,
                text: take(&mut map, "text")?,
            },
            "error" => EventKind::Error {
                error: take(&mut map, "error")?,
            },
            other => {
                if let Some((tool, phase)) = parse_tool_call_type(other) {
                    EventKind::ToolCall {
                        tool,
                        phase,
                        item_id: take(&mut map, "item_id")?,
                        output_index: take(&mut map, "output_index")?,
                    }
                } else if is_extension_type(other) {
                    EventKind::Extension {
                        event_type: other.to_string(),
                        data: map,
                    }
                } else {
                    return Err(format!("unknown stream event type `{other}`"));
                }
            }
        };

        Ok(StreamEvent {
            sequence_number,
            kind,
        })
    }
}

/// Parse `response.{tool}_call.{phase}` into its parts.
fn parse_tool_call_type(event_type: &str) -> Option<(String, ToolPhase)> {
    let rest = event_type.strip_prefix("response.")?;
    let (head, phase) = rest.rsplit_once('.')?;
    let tool = head.strip_suffix("_call")?;

    if tool.is_empty() {
        return None;
    }

    Some((tool.to_string(), ToolPhase::parse(phase)?))
}

fn take<T: DeserializeOwned>(map: &mut Map<String, Value>, key: &str) -> Result<T, String> {
    let value = map
        .remove(key)
        .ok_or_else(|| format!("stream event is missing `{key}`"))?;

    serde_json::from_value(value).map_err(|e| format!("invalid `{key}` in stream event: {e}"))
}

impl Serialize for StreamEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StreamEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        StreamEvent::from_wire_value(value).map_err(de::Error::custom)
    }
}
