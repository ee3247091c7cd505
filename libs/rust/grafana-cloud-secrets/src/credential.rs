//! Root credential codec.
//!
//! Grafana Cloud access policy tokens are self-describing: after an optional
//! `glc_` prefix they are standard base64 over a small JSON document naming
//! the organisation, the token, its key material, and the region the token
//! lives in. The region scopes every subsequent API call.
//!
//! Older API keys used a different document (`k`, `n`, `id`) bound to an
//! organisation slug and a role. That scheme is recognised and rejected.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix carried by access policy tokens.
pub const TOKEN_PREFIX: &str = "glc_";

/// Root credential decoding failures.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Token string is empty
    #[error("token is empty")]
    Empty,

    /// Token is not valid base64
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not the expected JSON document
    #[error("malformed token payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Token uses the retired organisation-slug API key scheme
    #[error("legacy API key format is not supported, use an access policy token")]
    LegacyScheme,

    /// A required field is empty
    #[error("token payload is missing '{0}'")]
    MissingField(&'static str),
}

/// Identity embedded in a root credential.
#[derive(Clone)]
pub struct DecodedCredential {
    /// Organisation identifier
    pub org: String,
    /// Upstream token name
    pub name: String,
    /// Region the token belongs to
    pub region: String,
    /// Raw key material
    pub key: SecretString,
}

impl std::fmt::Debug for DecodedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedCredential")
            .field("org", &self.org)
            .field("name", &self.name)
            .field("region", &self.region)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct WireCredential {
    #[serde(rename = "o")]
    org: String,
    #[serde(rename = "n")]
    name: String,
    #[serde(rename = "k")]
    key: String,
    #[serde(rename = "m")]
    metadata: WireMetadata,
}

#[derive(Serialize, Deserialize)]
struct WireMetadata {
    #[serde(rename = "r")]
    region: String,
}

/// Decode a root credential into its embedded identity.
pub fn decode(token: &str) -> Result<DecodedCredential, DecodeError> {
    let token = token.trim();
    let body = token.strip_prefix(TOKEN_PREFIX).unwrap_or(token);
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(body)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    if is_legacy(&value) {
        return Err(DecodeError::LegacyScheme);
    }

    let wire: WireCredential = serde_json::from_value(value)?;
    if wire.name.is_empty() {
        return Err(DecodeError::MissingField("n"));
    }
    if wire.metadata.region.is_empty() {
        return Err(DecodeError::MissingField("m.r"));
    }

    Ok(DecodedCredential {
        org: wire.org,
        name: wire.name,
        region: wire.metadata.region,
        key: SecretString::from(wire.key),
    })
}

/// Encode an identity back into a prefixed root credential string.
#[must_use]
pub fn encode(credential: &DecodedCredential) -> String {
    let wire = WireCredential {
        org: credential.org.clone(),
        name: credential.name.clone(),
        key: credential.key.expose_secret().to_string(),
        metadata: WireMetadata {
            region: credential.region.clone(),
        },
    };
    // Serializing plain string fields cannot fail.
    let json = serde_json::to_vec(&wire).unwrap_or_default();
    format!("{TOKEN_PREFIX}{}", STANDARD.encode(json))
}

fn is_legacy(value: &serde_json::Value) -> bool {
    value.get("id").is_some() && value.get("m").is_none()
}
