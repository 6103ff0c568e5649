//! Response persistence configuration.

use secrecy::SecretString;
use serde::Deserialize;

/// Response persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum StorageConfig {
    /// In-process map, suitable for tests and stateless deployments.
    Memory(MemoryStorageConfig),
    /// Durable Postgres backend.
    Postgres(PostgresStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// In-memory store settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryStorageConfig {
    /// Evict least-recently-used responses beyond this count. Unset disables
    /// eviction.
    pub max_responses: Option<usize>,
}

/// Postgres store settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresStorageConfig {
    /// Connection string. Accepts `url_file` indirection via the loader.
    pub url: SecretString,
    /// Connection pool bound.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    25
}
