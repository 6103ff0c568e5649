//! The atomic conversation unit.
//!
//! An [`Item`] is a discriminated sum internally, but serializes flat on the
//! wire: the payload fields sit next to `type`, `id` and `status`. The
//! deserializer additionally accepts the nested internal form
//! (`{"type":"message","message":{...}}`) emitted by earlier persistence
//! layers. Extension items (`<provider>:<type>`) round-trip their payload
//! untouched.

use serde::{Deserialize, Serialize, de};
use serde_json::{Map, Value};

use crate::{
    Error, Result,
    content::{CodeInterpreterOutput, InputContent, MessageContent, OutputContent},
    id,
};

/// Lifecycle status of an item. Terminal statuses admit no further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InProgress,
    Incomplete,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ItemStatus::InProgress)
    }

    /// Whether `self → to` is in the allowed transition set.
    pub fn can_transition_to(self, to: ItemStatus) -> bool {
        matches!(
            (self, to),
            (
                ItemStatus::InProgress,
                ItemStatus::Completed | ItemStatus::Incomplete | ItemStatus::Failed
            )
        )
    }
}

/// Message sender role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A message with role-asymmetric content parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePayload {
    pub role: Role,
    pub content: MessageContent,
}

/// A tool invocation requested by the model. `arguments` is an opaque
/// JSON-encoded string; its schema lives in the tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallPayload {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

/// The result of a tool invocation, paired to its call by `call_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallOutputPayload {
    pub call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Opaque provider-encrypted reasoning, forwarded unmodified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeInterpreterCallPayload {
    pub code: String,
    #[serde(default)]
    pub outputs: Vec<CodeInterpreterOutput>,
}

/// Type-discriminated item payload. Exactly one variant is populated and it
/// matches the wire `type`; extension types carry their payload opaquely.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemPayload {
    Message(MessagePayload),
    FunctionCall(FunctionCallPayload),
    FunctionCallOutput(FunctionCallOutputPayload),
    Reasoning(ReasoningPayload),
    CodeInterpreterCall(CodeInterpreterCallPayload),
    Extension { item_type: String, data: Map<String, Value> },
}

impl ItemPayload {
    /// The wire `type` discriminator.
    pub fn type_name(&self) -> &str {
        match self {
            ItemPayload::Message(_) => "message",
            ItemPayload::FunctionCall(_) => "function_call",
            ItemPayload::FunctionCallOutput(_) => "function_call_output",
            ItemPayload::Reasoning(_) => "reasoning",
            ItemPayload::CodeInterpreterCall(_) => "code_interpreter_call",
            ItemPayload::Extension { item_type, .. } => item_type,
        }
    }
}

/// Whether a type string is a provider extension (`<provider>:<type>` with
/// non-empty segments on both sides).
pub(crate) fn is_extension_type(item_type: &str) -> bool {
    item_type
        .split_once(':')
        .is_some_and(|(provider, name)| !provider.is_empty() && !name.is_empty())
}

/// The atomic conversation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub status: ItemStatus,
    pub payload: ItemPayload,
}

impl Item {
    pub fn new(payload: ItemPayload, status: ItemStatus) -> Self {
        Self {
            id: id::item_id(),
            status,
            payload,
        }
    }

    pub fn message(role: Role, content: MessageContent, status: ItemStatus) -> Self {
        Self::new(ItemPayload::Message(MessagePayload { role, content }), status)
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::message(
            Role::User,
            MessageContent::Input(vec![InputContent::InputText { text: text.into() }]),
            ItemStatus::Completed,
        )
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::message(
            Role::Assistant,
            MessageContent::Output(vec![OutputContent::text(text)]),
            ItemStatus::Completed,
        )
    }

    pub fn function_call(
        name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: impl Into<String>,
        status: ItemStatus,
    ) -> Self {
        Self::new(
            ItemPayload::FunctionCall(FunctionCallPayload {
                name: name.into(),
                call_id: call_id.into(),
                arguments: arguments.into(),
            }),
            status,
        )
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::new(
            ItemPayload::FunctionCallOutput(FunctionCallOutputPayload {
                call_id: call_id.into(),
                output: output.into(),
            }),
            ItemStatus::Completed,
        )
    }

    /// The wire `type` discriminator.
    pub fn item_type(&self) -> &str {
        self.payload.type_name()
    }

    pub fn as_message(&self) -> Option<&MessagePayload> {
        match &self.payload {
            ItemPayload::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCallPayload> {
        match &self.payload {
            ItemPayload::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_function_call_output(&self) -> Option<&FunctionCallOutputPayload> {
        match &self.payload {
            ItemPayload::FunctionCallOutput(output) => Some(output),
            _ => None,
        }
    }

    pub fn as_reasoning(&self) -> Option<&ReasoningPayload> {
        match &self.payload {
            ItemPayload::Reasoning(reasoning) => Some(reasoning),
            _ => None,
        }
    }

    /// Move this item to `to`, rejecting transitions out of terminal states.
    pub fn transition(&mut self, to: ItemStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::invalid_request(
                "status",
                format!("item {} cannot transition from {:?} to {to:?}", self.id, self.status),
            ));
        }

        self.status = to;
        Ok(())
    }

    fn to_wire_value(&self) -> Value {
        let mut map = Map::new();

        map.insert("type".to_string(), Value::String(self.item_type().to_string()));
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert(
            "status".to_string(),
            serde_json::to_value(self.status).unwrap_or(Value::Null),
        );

        let payload = match &self.payload {
            ItemPayload::Message(message) => serde_json::to_value(message),
            ItemPayload::FunctionCall(call) => serde_json::to_value(call),
            ItemPayload::FunctionCallOutput(output) => serde_json::to_value(output),
            ItemPayload::Reasoning(reasoning) => serde_json::to_value(reasoning),
            ItemPayload::CodeInterpreterCall(call) => serde_json::to_value(call),
            ItemPayload::Extension { data, .. } => Ok(Value::Object(data.clone())),
        };

        if let Ok(Value::Object(fields)) = payload {
            for (key, value) in fields {
                // type/id/status stay authoritative over payload fields.
                map.entry(key).or_insert(value);
            }
        }

        Value::Object(map)
    }

    fn from_wire_value(value: Value) -> std::result::Result<Self, String> {
        let Value::Object(mut map) = value else {
            return Err("item must be a JSON object".to_string());
        };

        let item_type = match map.remove("type") {
            Some(Value::String(t)) => t,
            Some(_) => return Err("item `type` must be a string".to_string()),
            None => return Err("item is missing `type`".to_string()),
        };

        let item_id = match map.remove("id") {
            Some(Value::String(existing)) => existing,
            _ => id::item_id(),
        };

        let status = match map.remove("status") {
            Some(value) => serde_json::from_value(value).map_err(|e| format!("invalid item status: {e}"))?,
            None => ItemStatus::Completed,
        };

        // Nested internal form keeps the payload under a key named after the
        // type; the flat wire form hoists the fields to the top level.
        let payload_value = match map.remove(&item_type) {
            Some(nested @ Value::Object(_)) => nested,
            _ => Value::Object(map),
        };

        let payload = match item_type.as_str() {
            "message" => ItemPayload::Message(parse_message(payload_value)?),
            "function_call" => ItemPayload::FunctionCall(
                serde_json::from_value(payload_value).map_err(|e| format!("invalid function_call item: {e}"))?,
            ),
            "function_call_output" => {
                ItemPayload::FunctionCallOutput(
                    serde_json::from_value(payload_value)
                        .map_err(|e| format!("invalid function_call_output item: {e}"))?,
                )
            }
            "reasoning" => ItemPayload::Reasoning(
                serde_json::from_value(payload_value).map_err(|e| format!("invalid reasoning item: {e}"))?,
            ),
            "code_interpreter_call" => ItemPayload::CodeInterpreterCall(
                serde_json::from_value(payload_value)
                    .map_err(|e| format!("invalid code_interpreter_call item: {e}"))?,
            ),
            other if is_extension_type(other) => {
                let data = match payload_value {
                    Value::Object(data) => data,
                    _ => Map::new(),
                };

                ItemPayload::Extension {
                    item_type: other.to_string(),
                    data,
                }
            }
            other => return Err(format!("unknown item type `{other}`")),
        };

        Ok(Item {
            id: item_id,
            status,
            payload,
        })
    }
}

fn parse_message(value: Value) -> std::result::Result<MessagePayload, String> {
    #[derive(Deserialize)]
    struct MessageWire {
        role: Role,
        #[serde(default)]
        content: Value,
    }

    let wire: MessageWire = serde_json::from_value(value).map_err(|e| format!("invalid message item: {e}"))?;

    let content = match (wire.role, wire.content) {
        // Bare string shorthand expands to a single text part.
        (Role::Assistant, Value::String(text)) => MessageContent::Output(vec![OutputContent::text(text)]),
        (_, Value::String(text)) => MessageContent::Input(vec![InputContent::InputText { text }]),
        (Role::Assistant, Value::Null) => MessageContent::Output(Vec::new()),
        (_, Value::Null) => MessageContent::Input(Vec::new()),
        (Role::Assistant, parts) => MessageContent::Output(
            serde_json::from_value(parts).map_err(|e| format!("invalid assistant message content: {e}"))?,
        ),
        (_, parts) => {
            MessageContent::Input(serde_json::from_value(parts).map_err(|e| format!("invalid message content: {e}"))?)
        }
    };

    Ok(MessagePayload {
        role: wire.role,
        content,
    })
}

impl Serialize for Item {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Item::from_wire_value(value).map_err(de::Error::custom)
    }
}
