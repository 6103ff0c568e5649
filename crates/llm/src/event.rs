//! The streaming event union providers emit.

use futures::stream::BoxStream;
use protocol::Usage;
use serde_json::{Map, Value};

use crate::error::LlmError;

/// A bounded, ordered stream of provider events. Ends with
/// [`ProviderEvent::Done`] on clean close.
pub type ProviderStream = BoxStream<'static, Result<ProviderEvent, LlmError>>;

/// Why the backend stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// One event of a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// Incremental assistant text.
    TextDelta { delta: String },
    /// The full assistant text, emitted once the part is closed.
    TextDone { text: String },
    /// A tool-call argument fragment. `id` and `name` arrive on the first
    /// fragment of a call; later fragments carry only the index.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_fragment: String,
    },
    /// A fully reassembled tool call.
    ToolCallDone {
        index: usize,
        id: String,
        name: String,
        arguments: String,
    },
    /// Incremental reasoning text.
    ReasoningDelta { delta: String },
    /// Reasoning closed for this turn.
    ReasoningDone { text: String },
    /// Token usage, typically once near the end of the stream.
    UsageReport { usage: Usage },
    /// The backend's stop condition for this turn.
    Finish { reason: FinishReason },
    /// Refusal text from a content filter.
    RefusalDelta { delta: String },
    /// An upstream error; the stream ends after this.
    Error { error: String },
    /// A provider-extension event forwarded opaquely.
    Extension { event_type: String, data: Map<String, Value> },
    /// Clean end of stream.
    Done,
}
