//! Content parts carried inside message items.
//!
//! User and system messages carry *input* parts; assistant messages carry
//! *output* parts. The two sets are disjoint on the wire (`input_text` vs
//! `output_text`), which is what lets [`MessageContent`] pick the right side
//! from the message role during deserialization.

use serde::{Deserialize, Serialize};

/// Content of a message, asymmetric by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Parts of a user or system message.
    Input(Vec<InputContent>),
    /// Parts produced by the assistant.
    Output(Vec<OutputContent>),
}

impl MessageContent {
    /// Concatenated text of all textual parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Input(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    InputContent::InputText { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            MessageContent::Output(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    OutputContent::OutputText { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// A part of user or system input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    InputText {
        text: String,
    },
    /// Image by URL or inline base64 data; exactly one of the two is set.
    InputImage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    InputAudio {
        audio_data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    InputVideo {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        video_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

/// A part of assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        /// Citations attached to this text. Always an array, never null.
        #[serde(default)]
        annotations: Vec<Annotation>,
        /// Per-token log probabilities. Always an array, never null.
        #[serde(default)]
        logprobs: Vec<LogProb>,
    },
    Refusal {
        refusal: String,
    },
}

impl OutputContent {
    /// A plain text part with no annotations or logprobs.
    pub fn text(text: impl Into<String>) -> Self {
        OutputContent::OutputText {
            text: text.into(),
            annotations: Vec::new(),
            logprobs: Vec::new(),
        }
    }
}

/// A citation attached to assistant text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Annotation {
    UrlCitation {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        start_index: usize,
        end_index: usize,
    },
    FileCitation {
        file_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quote: Option<String>,
    },
}

/// Log probability record for one sampled token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogProb {
    pub token: String,
    pub logprob: f64,
    #[serde(default)]
    pub top_logprobs: Vec<TopLogProb>,
}

/// One alternative token in a logprob record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLogProb {
    pub token: String,
    pub logprob: f64,
}

/// One output of a code interpreter call, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodeInterpreterOutput {
    Logs {
        logs: String,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_text_arrays_never_null() {
        let part = OutputContent::text("hello");
        let json = serde_json::to_value(&part).unwrap();

        assert_eq!(json["annotations"], json!([]));
        assert_eq!(json["logprobs"], json!([]));
    }

    #[test]
    fn output_text_accepts_missing_arrays() {
        let part: OutputContent = serde_json::from_value(json!({
            "type": "output_text",
            "text": "hi"
        }))
        .unwrap();

        assert_eq!(part, OutputContent::text("hi"));
    }

    #[test]
    fn input_parts_round_trip() {
        let parts = vec![
            InputContent::InputText { text: "look:".into() },
            InputContent::InputImage {
                image_url: Some("https://example.com/cat.png".into()),
                image_data: None,
                media_type: None,
            },
        ];

        let json = serde_json::to_string(&parts).unwrap();
        let back: Vec<InputContent> = serde_json::from_str(&json).unwrap();

        assert_eq!(back, parts);
    }

    #[test]
    fn message_content_text_concatenates() {
        let content = MessageContent::Output(vec![
            OutputContent::text("hel"),
            OutputContent::text("lo"),
        ]);

        assert_eq!(content.text(), "hello");
    }
}
