//! Request-scoped context shared between the transport, engine and storage.
//!
//! The server's auth layer resolves an [`Identity`] and stores it in a
//! [`RequestContext`] extension; storage reads the tenant from it unchanged.

mod claims;
mod identity;

pub use claims::Claims;
pub use identity::Identity;

/// Per-request context carried through the engine down to storage.
///
/// Constructed once by the transport layer. An absent identity means the
/// deployment runs unauthenticated and storage operates unscoped.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request correlation id, honored from `x-request-id` or generated.
    pub request_id: String,
    /// The authenticated caller, if any authenticator resolved one.
    pub identity: Option<Identity>,
}

impl RequestContext {
    /// The tenant isolation key for storage queries.
    ///
    /// `None` means unscoped (single-tenant deployment).
    pub fn tenant(&self) -> Option<&str> {
        self.identity.as_ref().and_then(|id| id.tenant.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_absent_without_identity() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.tenant(), None);
    }

    #[test]
    fn tenant_read_from_identity() {
        let ctx = RequestContext {
            request_id: "req-1".to_string(),
            identity: Some(Identity {
                tenant: Some("acme".to_string()),
                ..Default::default()
            }),
        };

        assert_eq!(ctx.tenant(), Some("acme"));
    }
}
