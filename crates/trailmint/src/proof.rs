//! Zero-knowledge proof acquisition.
//!
//! The proving service turns `(token, extended epk, randomness, max_epoch,
//! salt)` into a partial proof that the token was issued for this ephemeral
//! key. The proof JSON is opaque to this crate and persisted as-is, alongside
//! the inputs it was requested for so that later composition can refuse to
//! pair it with a different key, epoch bound or salt.

use alloc::sync::Arc;
use core::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    constants::KEY_CLAIM_NAME,
    keys::public::PublicKey,
    primitives::Epoch,
    salt::Salt,
    session::Randomness,
    token::IdentityToken,
};

/// Proof acquisition failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    /// The request never produced a response (connect, TLS, timeout).
    /// Retryable by the caller; never retried here.
    #[error("proving service unreachable: {0}")]
    Network(String),

    /// The service answered 2xx with something that is not a proof object.
    #[error("proving service returned a malformed proof: {0}")]
    Malformed(String),

    /// The service refused the request. The body is kept verbatim.
    #[error("proving service rejected the request (status {status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

/// Base64 of the extended ephemeral public key (`flag || pk`).
#[must_use]
pub fn encode_extended_public_key(pk: &PublicKey) -> String {
    STANDARD.encode(pk.extended())
}

/// Request body sent to the proving service.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    /// The compact identity token.
    pub jwt: String,
    /// Base64 `flag || pk` of the ephemeral key.
    pub extended_ephemeral_public_key: String,
    /// Last epoch the proof is usable in.
    pub max_epoch: Epoch,
    /// Session randomness, decimal.
    pub jwt_randomness: String,
    /// User salt, decimal.
    pub salt: Salt,
    /// Always `"sub"`.
    pub key_claim_name: String,
}

impl ProofRequest {
    /// Assemble a request for one login session.
    #[must_use]
    pub fn new(
        token: &IdentityToken,
        ephemeral: &PublicKey,
        randomness: &Randomness,
        max_epoch: Epoch,
        salt: Salt,
    ) -> Self {
        Self {
            jwt: token.as_str().to_owned(),
            extended_ephemeral_public_key: encode_extended_public_key(ephemeral),
            max_epoch,
            jwt_randomness: randomness.to_string(),
            salt,
            key_claim_name: KEY_CLAIM_NAME.to_owned(),
        }
    }
}

/// The inputs a proof was requested for.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBinding {
    /// Base64 extended ephemeral public key.
    pub extended_ephemeral_public_key: String,
    /// Epoch bound.
    pub max_epoch: Epoch,
    /// Salt.
    pub salt: Salt,
}

/// A proof plus the exact inputs it is bound to.
///
/// Possessing this and the matching ephemeral secret key is enough to sign
/// for the account until `max_epoch`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    /// Opaque proof object as returned by the service.
    pub inputs: serde_json::Value,
    /// What the proof was requested for.
    pub binding: ProofBinding,
}

impl ZkProof {
    /// Wrap a service response, rejecting anything but a JSON object.
    pub fn from_response(
        request: &ProofRequest,
        inputs: serde_json::Value,
    ) -> Result<Self, ProofError> {
        if !inputs.is_object() {
            return Err(ProofError::Malformed(format!(
                "expected a JSON object, got {inputs}"
            )));
        }
        Ok(Self {
            inputs,
            binding: ProofBinding {
                extended_ephemeral_public_key: request.extended_ephemeral_public_key.clone(),
                max_epoch: request.max_epoch,
                salt: request.salt,
            },
        })
    }

    /// Whether this proof was requested for `pk`.
    #[must_use]
    pub fn is_bound_to_key(&self, pk: &PublicKey) -> bool {
        self.binding.extended_ephemeral_public_key == encode_extended_public_key(pk)
    }
}

/// A proving service.
#[async_trait]
pub trait ProofProvider: Send + Sync {
    /// Submit `request` and return the raw proof JSON.
    async fn prove(&self, request: &ProofRequest) -> Result<serde_json::Value, ProofError>;
}

#[async_trait]
impl<P: ProofProvider + ?Sized> ProofProvider for Arc<P> {
    async fn prove(&self, request: &ProofRequest) -> Result<serde_json::Value, ProofError> {
        (**self).prove(request).await
    }
}

/// Request a proof and bind it to its inputs.
pub async fn request_proof<P: ProofProvider + ?Sized>(
    provider: &P,
    request: &ProofRequest,
) -> Result<ZkProof, ProofError> {
    tracing::debug!(max_epoch = %request.max_epoch, "requesting zk proof");
    let response = provider.prove(request).await.inspect_err(|err| {
        tracing::warn!(error = %err, "proof request failed");
    })?;
    ZkProof::from_response(request, response)
}

/// Proving service over HTTPS.
#[derive(Clone, Debug)]
pub struct HttpProver {
    http: reqwest::Client,
    url: Url,
}

impl HttpProver {
    /// A client posting to `url` with a per-request `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ProofError> {
        let http = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|err| ProofError::Network(err.to_string()))?;
        Ok(Self { http, url })
    }

    /// Reuse an existing client (its timeout applies).
    #[must_use]
    pub const fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl ProofProvider for HttpProver {
    async fn prove(&self, request: &ProofRequest) -> Result<serde_json::Value, ProofError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|err| ProofError::Network(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| ProofError::Network(err.to_string()))?;
        if !status.is_success() {
            return Err(ProofError::Rejected {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        serde_json::from_slice(&body).map_err(|err| ProofError::Malformed(err.to_string()))
    }
}
