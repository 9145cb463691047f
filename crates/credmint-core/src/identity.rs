//! Identity assertions submitted to the certificate authority.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A bounded-lifetime proof of caller identity.
///
/// The proof is opaque to the client: for cloud roles it is a presigned
/// identity call the authority can replay against the provider. It never
/// contains a reusable secret and is used for a single issuance attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAssertion {
    /// Who is asking.
    pub principal: String,

    /// What the certificate should authorize (role ARN or username).
    pub capability_scope: String,

    /// Opaque proof bytes, base64 on the wire.
    #[serde(serialize_with = "encode_proof", deserialize_with = "decode_proof")]
    pub proof: Vec<u8>,

    /// After this instant the proof is worthless.
    pub proof_expiry: DateTime<Utc>,
}

impl IdentityAssertion {
    pub fn new(
        principal: impl Into<String>,
        capability_scope: impl Into<String>,
        proof: impl Into<Vec<u8>>,
        proof_expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            principal: principal.into(),
            capability_scope: capability_scope.into(),
            proof: proof.into(),
            proof_expiry,
        }
    }

    /// Check whether the proof has lapsed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.proof_expiry
    }
}

fn encode_proof<S: Serializer>(proof: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(proof))
}

fn decode_proof<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}
