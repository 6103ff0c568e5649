//! Agentic loop configuration.

use std::time::Duration;

use serde::Deserialize;

/// Agentic loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on inference turns before the response finishes
    /// `incomplete`.
    pub max_turns: u32,
    /// Per-call timeout against the inference backend.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub provider_timeout: Duration,
    /// Per-call timeout for server-side tool execution.
    #[serde(deserialize_with = "duration_str::deserialize_duration")]
    pub tool_timeout: Duration,
    /// Capacity of the per-stream event channel.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            provider_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(60),
            event_buffer: 64,
        }
    }
}
