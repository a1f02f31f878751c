//! JSON-RPC 2.0 ledger client.

use core::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use url::Url;

use super::{CoinListing, ExecutionOutcome, ExecutionStatus, LedgerClient, LedgerError};
use crate::{
    address::Address,
    composite::GenericSignature,
    constants::GAS_COIN_TYPE,
    primitives::{Epoch, ObjectDigest, ObjectId},
    transaction::TransactionDigest,
};

/// Page size for coin listings.
const COIN_PAGE_LIMIT: u64 = 50;

/// A `u64` the node may send as a JSON string or number.
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Text(String),
    Int(u64),
}

impl Number {
    fn get(self) -> Result<u64, LedgerError> {
        match self {
            Self::Int(value) => Ok(value),
            Self::Text(text) => text
                .parse()
                .map_err(|_err| LedgerError::Malformed(format!("not an integer: `{text}`"))),
        }
    }
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    message: String,
}

#[derive(Deserialize)]
struct SystemState {
    epoch: Number,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPage {
    data: Vec<RpcCoin>,
    next_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcCoin {
    coin_object_id: ObjectId,
    #[serde(default)]
    version: Option<Number>,
    #[serde(default)]
    digest: Option<ObjectDigest>,
    balance: Number,
}

#[derive(Deserialize)]
struct ExecuteResult {
    digest: TransactionDigest,
    #[serde(default)]
    effects: Option<Effects>,
}

#[derive(Deserialize)]
struct Effects {
    status: EffectsStatus,
}

#[derive(Deserialize)]
struct EffectsStatus {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// A ledger node reached over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcLedger {
    http: reqwest::Client,
    url: Url,
}

impl RpcLedger {
    /// A client for the node at `url` with a per-request `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, LedgerError> {
        let http = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::Transport(err.to_string()))?;
        Ok(Self { http, url })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        tracing::debug!(method, "ledger rpc");
        let response = self
            .http
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1u64,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|err| LedgerError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| LedgerError::Transport(err.to_string()))?;

        let envelope: RpcEnvelope<T> = serde_json::from_slice(&body).map_err(|err| {
            if status.is_success() {
                LedgerError::Malformed(err.to_string())
            } else {
                LedgerError::Transport(format!(
                    "status {status}: {}",
                    String::from_utf8_lossy(&body)
                ))
            }
        })?;

        match (envelope.result, envelope.error) {
            (_, Some(error)) => Err(LedgerError::Rejected(error.message)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::Malformed(format!(
                "{method}: neither result nor error"
            ))),
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn current_epoch(&self) -> Result<Epoch, LedgerError> {
        let state: SystemState = self.call("suix_getLatestSuiSystemState", json!([])).await?;
        state.epoch.get().map(Epoch::from)
    }

    async fn reference_gas_price(&self) -> Result<u64, LedgerError> {
        let price: Number = self.call("suix_getReferenceGasPrice", json!([])).await?;
        price.get()
    }

    async fn gas_coins(&self, owner: &Address) -> Result<Vec<CoinListing>, LedgerError> {
        let mut coins = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: CoinPage = self
                .call(
                    "suix_getCoins",
                    json!([owner.to_string(), GAS_COIN_TYPE, cursor, COIN_PAGE_LIMIT]),
                )
                .await?;
            for coin in page.data {
                coins.push(CoinListing {
                    object_id: coin.coin_object_id,
                    version: coin.version.map(Number::get).transpose()?,
                    digest: coin.digest,
                    balance: coin.balance.get()?,
                });
            }
            match page.next_cursor {
                Some(next) if page.has_next_page => cursor = Some(next),
                Some(_) | None => break,
            }
        }
        Ok(coins)
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[GenericSignature],
    ) -> Result<ExecutionOutcome, LedgerError> {
        let encoded = signatures
            .iter()
            .map(GenericSignature::to_base64)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| LedgerError::Malformed(err.to_string()))?;

        let result: ExecuteResult = self
            .call(
                "sui_executeTransactionBlock",
                json!([
                    STANDARD.encode(tx_bytes),
                    encoded,
                    { "showEffects": true },
                    "WaitForLocalExecution",
                ]),
            )
            .await?;

        let status = match result.effects {
            Some(Effects {
                status: EffectsStatus { status, error },
            }) if status != "success" => ExecutionStatus::Failure {
                error: error.unwrap_or(status),
            },
            Some(_) | None => ExecutionStatus::Success,
        };
        Ok(ExecutionOutcome {
            digest: result.digest,
            status,
        })
    }
}
