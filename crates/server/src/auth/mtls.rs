//! Identity from a client certificate forwarded by the TLS-terminating
//! ingress (XFCC-style header).

use async_trait::async_trait;
use config::MtlsConfig;
use context::Identity;
use http::request::Parts;

use super::{Authenticator, Vote};

pub(crate) struct MtlsAuthenticator {
    config: MtlsConfig,
}

impl MtlsAuthenticator {
    pub fn new(config: MtlsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for MtlsAuthenticator {
    async fn authenticate(&self, parts: &Parts) -> Vote {
        let Some(value) = parts
            .headers
            .get(&self.config.certificate_header)
            .and_then(|value| value.to_str().ok())
        else {
            return Vote::Abstain;
        };

        let Some(subject) = parse_subject(value) else {
            return Vote::Denied(protocol::Error::unauthenticated(
                "forwarded client certificate carries no subject",
            ));
        };

        let Some(common_name) = subject.common_name else {
            return Vote::Denied(protocol::Error::unauthenticated(
                "forwarded client certificate subject carries no CN",
            ));
        };

        let tenant = if self.config.tenant_from_organization {
            subject.organization
        } else {
            None
        };

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("auth_method".to_string(), serde_json::Value::from("mtls"));

        Vote::Granted(Identity {
            subject: common_name,
            scopes: Vec::new(),
            tenant,
            metadata,
        })
    }
}

struct CertSubject {
    common_name: Option<String>,
    organization: Option<String>,
}

/// Parse the `Subject="CN=...,O=..."` element of an XFCC-style header, or a
/// bare distinguished name.
fn parse_subject(header: &str) -> Option<CertSubject> {
    let dn = header
        .split(';')
        .find_map(|element| {
            let (key, value) = element.split_once('=')?;

            if key.trim().eq_ignore_ascii_case("subject") {
                Some(value.trim_matches('"').to_string())
            } else {
                None
            }
        })
        .or_else(|| {
            // A bare DN without the XFCC wrapping.
            header.contains('=').then(|| header.to_string())
        })?;

    let mut subject = CertSubject {
        common_name: None,
        organization: None,
    };

    for part in dn.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };

        match key.trim().to_ascii_uppercase().as_str() {
            "CN" => subject.common_name = Some(value.trim().to_string()),
            "O" => subject.organization = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Some(subject)
}
