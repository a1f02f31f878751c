//! # sponsor_server
//!
//! The HTTP surface of the gas sponsorship service.
//!
//! - `POST /sponsor` `{transactionKindBytes, sender, allowedAddresses?, network}`
//!   → `{bytes, digest}`
//! - `POST /execute` `{digest, signature}` → `{digest, status}`
//!
//! Every failure is a non-2xx status with a `{error, code}` JSON body.
//! Ledger rejections keep the ledger's text.

extern crate alloc;

use alloc::sync::Arc;
use core::{fmt, net::SocketAddr, time::Duration};
use std::io;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use clap::Parser;
use trailmint::{
    ObjectId,
    config::DEFAULT_HTTP_TIMEOUT_SECS,
    keys::private::SponsorSigningKey,
    ledger::{LedgerError, RpcLedger},
    sponsor::{
        DEFAULT_GAS_BUDGET, ExecuteRequest, ExecuteResponse, Sponsor, SponsorError, SponsorGateway,
        SponsorPolicy, SponsorRequest, SponsorResponse, client::ErrorBody,
    },
};
use tokio::net::TcpListener;
use url::Url;

/// Server settings. Every flag can also come from the environment.
#[derive(Clone, Parser)]
#[command(name = "sponsor-server", about = "Gas sponsorship endpoint for trailmint mints")]
pub struct ServerConfig {
    /// Hex-encoded sponsor signing key.
    #[arg(long, env = "SPONSOR_PRIVATE_KEY", hide_env_values = true)]
    pub sponsor_private_key: String,

    /// Ledger JSON-RPC endpoint.
    #[arg(long, env = "LEDGER_RPC_URL")]
    pub ledger_rpc_url: Url,

    /// Network this sponsor serves; requests for any other are refused.
    #[arg(long, env = "NETWORK", default_value = "testnet")]
    pub network: String,

    /// The only package the sponsor pays for. Unset pays for any call.
    #[arg(long, env = "MINT_PACKAGE")]
    pub mint_package: Option<ObjectId>,

    /// Gas budget attached to every sponsored transaction.
    #[arg(long, env = "GAS_BUDGET", default_value_t = DEFAULT_GAS_BUDGET)]
    pub gas_budget: u64,

    /// How long a sponsored transaction holds its gas coin, seconds.
    #[arg(long, env = "RESERVATION_TTL_SECS", default_value_t = 60)]
    pub reservation_ttl_secs: u64,

    /// Listen address.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Timeout for ledger calls, seconds.
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("sponsor_private_key", &"<redacted>")
            .field("ledger_rpc_url", &self.ledger_rpc_url.as_str())
            .field("network", &self.network)
            .field("mint_package", &self.mint_package)
            .field("gas_budget", &self.gas_budget)
            .field("reservation_ttl_secs", &self.reservation_ttl_secs)
            .field("bind_addr", &self.bind_addr)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

impl ServerConfig {
    /// The sponsorship policy these settings describe.
    #[must_use]
    pub fn policy(&self) -> SponsorPolicy {
        SponsorPolicy {
            gas_budget: self.gas_budget,
            reservation_ttl: Duration::from_secs(self.reservation_ttl_secs),
            allowed_packages: self.mint_package.into_iter().collect(),
            ..SponsorPolicy::new(self.network.clone())
        }
    }

    /// Parse the sponsor key. A bad key is a misconfiguration that leaves
    /// every request unsponsored, so it is logged as an alert.
    pub fn signing_key(&self) -> Result<SponsorSigningKey, ServerError> {
        SponsorSigningKey::from_hex(self.sponsor_private_key.trim()).map_err(|err| {
            tracing::error!(alert = true, %err, "sponsor key is misconfigured");
            ServerError::Key(err.to_string())
        })
    }
}

/// Startup and serving failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `SPONSOR_PRIVATE_KEY` is not a valid signing key.
    #[error("invalid sponsor key: {0}")]
    Key(String),

    /// The ledger client could not be built.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Binding or serving failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// An error response: the sponsor error's status and `{error, code}` body.
#[derive(Debug)]
pub struct ApiError(SponsorError);

impl From<SponsorError> for ApiError {
    fn from(err: SponsorError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SponsorError::InvalidField {
            field: "body",
            reason: rejection.body_text(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), err = %self.0, "request failed");
        } else {
            tracing::warn!(code = self.0.code(), err = %self.0, "request refused");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

async fn sponsor<G: SponsorGateway>(
    State(gateway): State<Arc<G>>,
    body: Result<Json<SponsorRequest>, JsonRejection>,
) -> Result<Json<SponsorResponse>, ApiError> {
    let Json(request) = body?;
    Ok(Json(gateway.sponsor(&request).await?))
}

async fn execute<G: SponsorGateway>(
    State(gateway): State<Arc<G>>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let Json(request) = body?;
    Ok(Json(gateway.execute(&request).await?))
}

/// The `/sponsor` and `/execute` routes over `gateway`.
pub fn router<G: SponsorGateway + 'static>(gateway: Arc<G>) -> Router {
    Router::new()
        .route("/sponsor", post(sponsor::<G>))
        .route("/execute", post(execute::<G>))
        .with_state(gateway)
}

/// Build the sponsor from `config` and serve until the listener fails.
pub async fn serve(config: ServerConfig) -> Result<(), ServerError> {
    let key = config.signing_key()?;
    let ledger = RpcLedger::new(
        config.ledger_rpc_url.clone(),
        Duration::from_secs(config.http_timeout_secs),
    )?;
    let sponsor = Sponsor::new(key, ledger, config.policy());

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "sponsorship endpoint listening");
    axum::serve(listener, router(Arc::new(sponsor))).await?;
    Ok(())
}
