//! Item ↔ message translation shared by the adapters.
//!
//! The outbound direction flattens an ordered item sequence into chat-style
//! messages with role merging: consecutive `function_call` items fold into
//! the most recent assistant turn, `function_call_output` becomes a tool
//! message, and reasoning items are dropped unless the backend advertises
//! reasoning support.

use protocol::{InputContent, Item, ItemPayload, MessageContent, Role};

use crate::request::{ProviderContent, ProviderMessage, ProviderPart, ProviderRole, ProviderToolCall};

/// Flatten items into provider messages, prepending `instructions` as a
/// system message.
pub fn items_to_messages(items: &[Item], instructions: Option<&str>, reasoning_supported: bool) -> Vec<ProviderMessage> {
    let mut messages = Vec::with_capacity(items.len() + 1);

    if let Some(instructions) = instructions
        && !instructions.is_empty()
    {
        messages.push(ProviderMessage::text(ProviderRole::System, instructions));
    }

    for item in items {
        match &item.payload {
            ItemPayload::Message(message) => messages.push(convert_message(message.role, &message.content)),
            ItemPayload::FunctionCall(call) => {
                let tool_call = ProviderToolCall {
                    id: call.call_id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                };

                match messages.last_mut() {
                    Some(last) if last.role == ProviderRole::Assistant => last.tool_calls.push(tool_call),
                    _ => {
                        let mut message = ProviderMessage::text(ProviderRole::Assistant, "");
                        message.tool_calls.push(tool_call);
                        messages.push(message);
                    }
                }
            }
            ItemPayload::FunctionCallOutput(output) => {
                messages.push(ProviderMessage::tool_result(&output.call_id, &output.output));
            }
            ItemPayload::Reasoning(reasoning) => {
                if !reasoning_supported {
                    log::debug!("dropping reasoning item {}: backend does not advertise reasoning", item.id);
                    continue;
                }

                let Some(content) = reasoning.content.as_deref() else {
                    continue;
                };

                match messages.last_mut() {
                    Some(last) if last.role == ProviderRole::Assistant => {
                        let merged = match last.reasoning_content.take() {
                            Some(existing) => format!("{existing}\n{content}"),
                            None => content.to_string(),
                        };
                        last.reasoning_content = Some(merged);
                    }
                    _ => {
                        let mut message = ProviderMessage::text(ProviderRole::Assistant, "");
                        message.reasoning_content = Some(content.to_string());
                        messages.push(message);
                    }
                }
            }
            ItemPayload::CodeInterpreterCall(_) => {
                log::debug!("skipping code_interpreter_call item {} in outbound translation", item.id);
            }
            ItemPayload::Extension { item_type, .. } => {
                log::debug!("skipping extension item {} of type {item_type} in outbound translation", item.id);
            }
        }
    }

    messages
}

fn convert_message(role: Role, content: &MessageContent) -> ProviderMessage {
    let provider_role = match role {
        Role::User => ProviderRole::User,
        Role::Assistant => ProviderRole::Assistant,
        Role::System => ProviderRole::System,
    };

    let content = match content {
        // Assistant output flattens to plain text; annotations don't travel
        // upstream.
        MessageContent::Output(_) => ProviderContent::Text(content.text()),
        MessageContent::Input(parts) => {
            if parts.len() == 1
                && let InputContent::InputText { text } = &parts[0]
            {
                ProviderContent::Text(text.clone())
            } else {
                ProviderContent::Parts(parts.iter().filter_map(convert_input_part).collect())
            }
        }
    };

    ProviderMessage {
        role: provider_role,
        content,
        tool_calls: Vec::new(),
        tool_call_id: None,
        reasoning_content: None,
    }
}

fn convert_input_part(part: &InputContent) -> Option<ProviderPart> {
    match part {
        InputContent::InputText { text } => Some(ProviderPart::Text { text: text.clone() }),
        InputContent::InputImage {
            image_url: Some(url), ..
        } => Some(ProviderPart::ImageUrl { url: url.clone() }),
        InputContent::InputImage {
            image_data: Some(data),
            media_type,
            ..
        } => {
            // Inline data travels as a data URI for chat-style backends.
            let media_type = media_type.as_deref().unwrap_or("image/png");
            Some(ProviderPart::ImageUrl {
                url: format!("data:{media_type};base64,{data}"),
            })
        }
        InputContent::InputImage { .. } => None,
        InputContent::InputAudio { audio_data, format } => Some(ProviderPart::Audio {
            data: audio_data.clone(),
            format: format.clone().unwrap_or_else(|| "wav".to_string()),
        }),
        InputContent::InputVideo { .. } => {
            log::debug!("dropping video input part: no chat-completions encoding");
            None
        }
    }
}

/// Inverse translation for the Responses-native passthrough: rebuild input
/// items (and separated instructions) from provider messages.
pub fn messages_to_items(messages: &[ProviderMessage]) -> (Option<String>, Vec<Item>) {
    let mut instructions: Vec<&str> = Vec::new();
    let mut items = Vec::new();

    for message in messages {
        match message.role {
            ProviderRole::System => {
                if let Some(text) = message.content.as_text() {
                    instructions.push(text);
                } else {
                    items.push(input_message_item(Role::System, &message.content));
                }
            }
            ProviderRole::User => items.push(input_message_item(Role::User, &message.content)),
            ProviderRole::Assistant => {
                let text = message.content.as_text().unwrap_or_default();

                if !text.is_empty() {
                    items.push(Item::assistant_text(text));
                }

                for call in &message.tool_calls {
                    items.push(Item::function_call(
                        &call.name,
                        &call.id,
                        &call.arguments,
                        protocol::ItemStatus::Completed,
                    ));
                }
            }
            ProviderRole::Tool => {
                let call_id = message.tool_call_id.clone().unwrap_or_default();
                let output = message.content.as_text().unwrap_or_default();
                items.push(Item::function_call_output(call_id, output));
            }
        }
    }

    let instructions = if instructions.is_empty() {
        None
    } else {
        Some(instructions.join("\n"))
    };

    (instructions, items)
}

fn input_message_item(role: Role, content: &ProviderContent) -> Item {
    let parts = match content {
        ProviderContent::Text(text) => vec![InputContent::InputText { text: text.clone() }],
        ProviderContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ProviderPart::Text { text } => InputContent::InputText { text: text.clone() },
                ProviderPart::ImageUrl { url } => InputContent::InputImage {
                    image_url: Some(url.clone()),
                    image_data: None,
                    media_type: None,
                },
                ProviderPart::Audio { data, format } => InputContent::InputAudio {
                    audio_data: data.clone(),
                    format: Some(format.clone()),
                },
            })
            .collect(),
    };

    Item::message(role, MessageContent::Input(parts), protocol::ItemStatus::Completed)
}

#[cfg(test)]
mod tests {
    use protocol::ItemStatus;

    use super::*;

    #[test]
    fn instructions_become_leading_system_message() {
        let items = vec![Item::user_text("hi")];
        let messages = items_to_messages(&items, Some("be terse"), false);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ProviderRole::System);
        assert_eq!(messages[0].content.as_text(), Some("be terse"));
        assert_eq!(messages[1].role, ProviderRole::User);
    }

    #[test]
    fn consecutive_function_calls_merge_into_one_assistant_turn() {
        let items = vec![
            Item::user_text("do two things"),
            Item::function_call("first", "call_1", "{}", ItemStatus::Completed),
            Item::function_call("second", "call_2", "{}", ItemStatus::Completed),
            Item::function_call_output("call_1", "a"),
            Item::function_call_output("call_2", "b"),
        ];

        let messages = items_to_messages(&items, None, false);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, ProviderRole::Assistant);
        assert_eq!(messages[1].tool_calls.len(), 2);
        assert_eq!(messages[2].role, ProviderRole::Tool);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_2"));
    }

    #[test]
    fn assistant_text_then_call_shares_the_turn() {
        let items = vec![
            Item::user_text("q"),
            Item::assistant_text("let me check"),
            Item::function_call("lookup", "call_1", "{}", ItemStatus::Completed),
        ];

        let messages = items_to_messages(&items, None, false);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content.as_text(), Some("let me check"));
        assert_eq!(messages[1].tool_calls.len(), 1);
    }

    #[test]
    fn reasoning_dropped_without_support() {
        let items = vec![
            Item::user_text("q"),
            Item::new(
                ItemPayload::Reasoning(protocol::ReasoningPayload {
                    content: Some("thinking".into()),
                    ..Default::default()
                }),
                ItemStatus::Completed,
            ),
            Item::assistant_text("a"),
        ];

        let dropped = items_to_messages(&items, None, false);
        assert_eq!(dropped.len(), 2);

        let mapped = items_to_messages(&items, None, true);
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[1].reasoning_content.as_deref(), Some("thinking"));
    }

    #[test]
    fn inline_image_becomes_data_uri() {
        let items = vec![Item::message(
            Role::User,
            MessageContent::Input(vec![
                InputContent::InputText { text: "look".into() },
                InputContent::InputImage {
                    image_url: None,
                    image_data: Some("aGk=".into()),
                    media_type: Some("image/jpeg".into()),
                },
            ]),
            ItemStatus::Completed,
        )];

        let messages = items_to_messages(&items, None, false);

        let ProviderContent::Parts(parts) = &messages[0].content else {
            unreachable!("multi-part content expected");
        };

        assert_eq!(
            parts[1],
            ProviderPart::ImageUrl {
                url: "data:image/jpeg;base64,aGk=".into()
            }
        );
    }

    #[test]
    fn inverse_translation_round_trips_tool_turns() {
        let items = vec![
            Item::user_text("q"),
            Item::function_call("lookup", "call_1", r#"{"q":1}"#, ItemStatus::Completed),
            Item::function_call_output("call_1", "found"),
            Item::assistant_text("answer"),
        ];

        let messages = items_to_messages(&items, Some("sys"), false);
        let (instructions, rebuilt) = messages_to_items(&messages);

        assert_eq!(instructions.as_deref(), Some("sys"));
        assert_eq!(rebuilt.len(), 4);
        assert_eq!(rebuilt[1].as_function_call().unwrap().name, "lookup");
        assert_eq!(rebuilt[2].as_function_call_output().unwrap().output, "found");
        assert_eq!(rebuilt[3].as_message().unwrap().content.text(), "answer");
    }
}
