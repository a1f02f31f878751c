//! OpenID Connect redirect helpers.

use reqwest::Response;
use serde::Deserialize;
use url::{Url, form_urlencoded};

use crate::config::OidcConfig;

/// Google's discovery document.
pub const GOOGLE_CONFIGURATION_URL: &str =
    "https://accounts.google.com/.well-known/openid-configuration";

/// Discovery failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The document could not be fetched.
    #[error("discovery document unreachable: {0}")]
    Network(String),

    /// The document has no usable `authorization_endpoint`.
    #[error("discovery document is malformed: {0}")]
    Malformed(String),
}

/// The provider URL to send the user to.
#[must_use]
pub fn authorization_url(config: &OidcConfig, nonce: &str) -> Url {
    let mut url = config.authorization_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", config.redirect_uri.as_str())
        .append_pair("response_type", "id_token")
        .append_pair("scope", "openid email profile")
        .append_pair("nonce", nonce)
        .append_pair("prompt", "select_account");
    url
}

#[derive(Deserialize)]
struct ProviderConfiguration {
    authorization_endpoint: Option<String>,
}

/// Fetch a provider's `authorization_endpoint` from its discovery document.
pub async fn discover(
    http: &reqwest::Client,
    configuration_url: &Url,
) -> Result<Url, DiscoveryError> {
    let response = http
        .get(configuration_url.clone())
        .send()
        .await
        .and_then(Response::error_for_status)
        .map_err(|err| DiscoveryError::Network(err.to_string()))?;
    let document: ProviderConfiguration = response
        .json()
        .await
        .map_err(|err| DiscoveryError::Malformed(err.to_string()))?;
    let endpoint = document
        .authorization_endpoint
        .ok_or_else(|| DiscoveryError::Malformed("no authorization_endpoint".to_owned()))?;
    endpoint
        .parse()
        .map_err(|err: url::ParseError| DiscoveryError::Malformed(err.to_string()))
}

/// The `id_token` carried in a redirect URL fragment.
#[must_use]
pub fn id_token_from_fragment(fragment: &str) -> Option<String> {
    let pairs = fragment.strip_prefix('#').unwrap_or(fragment);
    form_urlencoded::parse(pairs.as_bytes())
        .find(|pair| pair.0 == "id_token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample;

    #[test]
    fn authorization_url_parameters() {
        let url = authorization_url(&sample().oidc, "abc_-123");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("client_id", "client-123"),
                ("redirect_uri", "https://trail.example/auth"),
                ("response_type", "id_token"),
                ("scope", "openid email profile"),
                ("nonce", "abc_-123"),
                ("prompt", "select_account"),
            ]
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
        );
        assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    }

    #[test]
    fn token_from_fragment() {
        assert_eq!(
            id_token_from_fragment("#state=x&id_token=aaa.bbb.ccc&authuser=0").as_deref(),
            Some("aaa.bbb.ccc")
        );
        assert_eq!(
            id_token_from_fragment("id_token=aaa.bbb.ccc").as_deref(),
            Some("aaa.bbb.ccc")
        );
        assert_eq!(id_token_from_fragment("#error=access_denied"), None);
        assert_eq!(id_token_from_fragment("#id_token="), None);
    }
}
