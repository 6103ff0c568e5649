use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Custom JWT claims that include OAuth 2.0 scopes and standard JWT claims
#[serde_with::serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer claim - identifies the principal that issued the JWT
    #[serde(default, rename = "iss")]
    pub issuer: Option<String>,

    /// Audience claim - identifies the recipients that the JWT is intended for
    #[serde_as(deserialize_as = "Option<serde_with::OneOrMany<_>>")]
    #[serde(default, rename = "aud")]
    pub audience: Option<Vec<String>>,

    /// Subject claim - identifies the principal that is the subject of the JWT
    #[serde(default, rename = "sub")]
    pub subject: Option<String>,

    /// Space-separated OAuth scopes, when the issuer provides them.
    #[serde(default)]
    pub scope: Option<String>,

    /// Additional claims for flexible access to custom fields
    #[serde(flatten)]
    pub additional: HashMap<String, Value>,
}

impl Claims {
    /// Extract a claim value by path, supporting nested claims.
    ///
    /// Paths can be simple (e.g., "sub") or nested (e.g., "org.tenant").
    pub fn get_claim(&self, path: &str) -> Option<String> {
        match path {
            "iss" => return self.issuer.clone(),
            "sub" => return self.subject.clone(),
            "aud" => return self.audience.as_ref().and_then(|audiences| audiences.first().cloned()),
            _ => {}
        }

        let mut parts = path.split('.');
        let first = parts.next()?;
        let current = parts.fold(self.additional.get(first).unwrap_or(&Value::Null), |current, part| {
            current.get(part).unwrap_or(&Value::Null)
        });

        match current {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The scopes granted to this token, split from the `scope` claim.
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
