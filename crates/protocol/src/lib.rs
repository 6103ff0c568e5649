//! The OpenResponses data model.
//!
//! This crate defines the wire types the gateway speaks to clients: items and
//! their content parts, create-response requests, response snapshots, the
//! streaming event protocol, and the typed error model. It exposes
//! constructors and validators only; storage and I/O live elsewhere.
//!
//! Items are represented internally as a discriminated sum with one payload
//! slot per variant, but serialize *flat* on the wire (the payload fields are
//! hoisted next to `type`, `id` and `status`). Deserialization accepts both
//! the flat wire form and the nested internal form emitted by earlier
//! persistence layers.

mod content;
mod error;
mod event;
pub mod id;
mod item;
mod request;
mod response;

pub use content::{
    Annotation, CodeInterpreterOutput, InputContent, LogProb, MessageContent, OutputContent, TopLogProb,
};
pub use error::{Error, ErrorBody, ErrorKind, Result};
pub use event::{EventKind, StreamEvent, ToolPhase};
pub use item::{
    CodeInterpreterCallPayload, FunctionCallOutputPayload, FunctionCallPayload, Item, ItemPayload, ItemStatus,
    MessagePayload, ReasoningPayload, Role,
};
pub use request::{
    CreateResponseRequest, ForcedFunctionType, ReasoningConfig, StreamOptions, TextConfig, ToolChoice, ToolChoiceMode,
    ToolDefinition, ToolKind, Truncation,
};
pub use response::{IncompleteDetails, InputTokensDetails, OutputTokensDetails, Response, ResponseStatus, Usage};

/// The depth bound for `previous_response_id` chain traversal.
pub const MAX_CHAIN_DEPTH: usize = 100;
