//! Client configuration.

use core::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{constants::DEFAULT_EPOCH_LOOKAHEAD, transaction::MintTarget};

/// Default timeout for every outbound call.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Identity provider settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcConfig {
    /// OAuth client id (the token's `aud`).
    pub client_id: String,
    /// Where the provider sends the user back.
    pub redirect_uri: Url,
    /// The provider's authorization endpoint, from its discovery document.
    pub authorization_endpoint: Url,
}

/// When the proof is fetched.
///
/// Eager adds the proving latency to login; lazy adds it to the first
/// transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofPolicy {
    /// On the first transaction.
    #[default]
    Lazy,
    /// Right after the login redirect.
    Eager,
}

/// Everything the client-side wallet needs.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConfig {
    /// Identity provider.
    pub oidc: OidcConfig,
    /// Proving service endpoint.
    pub prover_url: Url,
    /// Sponsorship endpoint base (`/sponsor`, `/execute` below it).
    pub sponsor_url: Url,
    /// Ledger JSON-RPC endpoint.
    pub ledger_rpc_url: Url,
    /// Network name sent with sponsorship requests.
    pub network: String,
    /// The mint entry point, `package::module::function`.
    pub mint_target: MintTarget,
    /// Epochs a login session stays valid for.
    #[serde(default = "default_lookahead")]
    pub epoch_lookahead: u64,
    /// Proof fetch policy.
    #[serde(default)]
    pub proof_policy: ProofPolicy,
    /// Timeout for every outbound call, seconds.
    #[serde(default = "default_timeout")]
    pub http_timeout_secs: u64,
}

const fn default_lookahead() -> u64 {
    DEFAULT_EPOCH_LOOKAHEAD
}

const fn default_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl WalletConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The outbound call timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
