//! Named agent profiles.

use serde::Deserialize;

/// Server-side defaults applied when a request names this profile.
///
/// Request-level values always win over profile values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentProfile {
    /// Instructions prepended when the request carries none.
    pub instructions: Option<String>,
    /// Model used when the request's model matches the profile trigger.
    pub model: Option<String>,
    /// Maximum turns override for this profile.
    pub max_turns: Option<u32>,
}
