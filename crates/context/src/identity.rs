use std::collections::HashMap;

use serde_json::Value;

/// The resolved caller identity, produced by whichever authenticator in the
/// chain voted first.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Stable subject identifier (JWT `sub`, API key id, certificate CN).
    pub subject: String,
    /// Granted scopes, empty when the credential carries none.
    pub scopes: Vec<String>,
    /// Tenant isolation key, extracted from the configured claim or key record.
    pub tenant: Option<String>,
    /// Authenticator-specific extras (issuer, key label, certificate fields).
    pub metadata: HashMap<String, Value>,
}

impl Identity {
    /// Whether this identity carries the given scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
