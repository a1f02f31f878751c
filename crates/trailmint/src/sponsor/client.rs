//! The sponsorship endpoint over HTTP.

use core::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use super::{
    ExecuteRequest, ExecuteResponse, SponsorError, SponsorGateway, SponsorRequest, SponsorResponse,
};

/// Non-2xx body: `{error, code?}`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable code, see [`SponsorError::code`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&SponsorError> for ErrorBody {
    #[expect(clippy::ref_patterns, reason = "error payloads are borrowed")]
    fn from(err: &SponsorError) -> Self {
        let error = match *err {
            SponsorError::SponsorUnavailable(ref text)
            | SponsorError::UnknownDigest(ref text)
            | SponsorError::AlreadyExecuting(ref text)
            | SponsorError::InvalidSignature(ref text)
            | SponsorError::LedgerRejected(ref text) => text.clone(),
            SponsorError::MissingField(_)
            | SponsorError::InvalidField { .. }
            | SponsorError::NetworkMismatch { .. }
            | SponsorError::SenderNotAllowed(_)
            | SponsorError::PackageNotAllowed(_)
            | SponsorError::GasCoinsBusy
            | SponsorError::Transport(_)
            | SponsorError::Internal(_) => err.to_string(),
        };
        Self {
            error,
            code: Some(err.code().to_owned()),
        }
    }
}

/// A remote sponsor at `base` (`{base}/sponsor`, `{base}/execute`).
#[derive(Clone, Debug)]
pub struct HttpSponsorClient {
    http: reqwest::Client,
    base: Url,
}

impl HttpSponsorClient {
    /// A client with a per-request `timeout`.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, SponsorError> {
        let http = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|err| SponsorError::Transport(err.to_string()))?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SponsorError> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|err| SponsorError::Transport(err.to_string()))
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SponsorError> {
        let response = self
            .http
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await
            .map_err(|err| SponsorError::Transport(err.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| SponsorError::Transport(err.to_string()))?;

        if !status.is_success() {
            // Any non-2xx is a failure, whatever the body looks like.
            return Err(match serde_json::from_slice::<ErrorBody>(&bytes) {
                Ok(body) => SponsorError::from_wire(body.code.as_deref(), body.error),
                Err(_) => SponsorError::Transport(format!(
                    "status {status}: {}",
                    String::from_utf8_lossy(&bytes)
                )),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| SponsorError::Transport(err.to_string()))
    }
}

#[async_trait]
impl SponsorGateway for HttpSponsorClient {
    async fn sponsor(&self, request: &SponsorRequest) -> Result<SponsorResponse, SponsorError> {
        self.post("sponsor", request).await
    }

    async fn execute(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, SponsorError> {
        self.post("execute", request).await
    }
}
