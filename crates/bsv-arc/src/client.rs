//! ARC HTTP client.

use bsv_primitives::chainhash::Hash;
use bsv_spv::{BroadcastFailure, BroadcastSuccess, Broadcaster};
use bsv_transaction::Transaction;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use tracing::{debug, info, instrument, warn};

use crate::error::ArcError;
use crate::types::{ArcConfig, ArcResponse};

/// Submits transactions to an ARC endpoint and queries their status.
#[derive(Debug, Clone)]
pub struct ArcClient {
    config: ArcConfig,
    client: reqwest::Client,
}

impl ArcClient {
    /// Build a client. Fails only if the HTTP stack cannot be initialised.
    pub fn new(config: ArcConfig) -> Result<Self, ArcError> {
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { config, client })
    }

    /// The client's settings.
    pub fn config(&self) -> &ArcConfig {
        &self.config
    }

    /// POST the raw transaction to `/tx`.
    ///
    /// Success means ARC took the transaction and did not report a terminal
    /// status for it.
    #[instrument(skip_all, fields(txid = %tx.tx_id()))]
    pub async fn submit(&self, tx: &Transaction) -> Result<ArcResponse, ArcError> {
        let url = format!("{}/tx", self.config.base_url);
        debug!(%url, bytes = tx.size(), "submitting transaction");

        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(tx.to_bytes())
            .send()
            .await?;
        let response = read_response(resp).await?;

        if let Some(status) = response.tx_status.filter(|s| s.is_rejection()) {
            return Err(ArcError::Rejected { status, detail: response.reason() });
        }
        Ok(response)
    }

    /// GET `/tx/{txid}`.
    #[instrument(skip_all, fields(%txid))]
    pub async fn status(&self, txid: &Hash) -> Result<ArcResponse, ArcError> {
        let url = format!("{}/tx/{}", self.config.base_url, txid);
        let resp = self.client.get(&url).headers(self.headers()).send().await?;
        read_response(resp).await
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut set = |name: &'static str, value: String| match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => warn!(header = name, "skipping header with invalid characters"),
        };

        if let Some(key) = &self.config.api_key {
            set("authorization", format!("Bearer {}", key));
        }
        if let Some(url) = &self.config.callback_url {
            set("X-CallbackUrl", url.clone());
        }
        if let Some(token) = &self.config.callback_token {
            set("X-CallbackToken", token.clone());
        }
        if let Some(status) = &self.config.wait_for_status {
            set("X-WaitForStatus", status.as_code().to_string());
        }
        if let Some(timeout) = self.config.max_timeout {
            set("X-MaxTimeout", timeout.to_string());
        }
        for (flag, name) in [
            (self.config.skip_fee_validation, "X-SkipFeeValidation"),
            (self.config.skip_script_validation, "X-SkipScriptValidation"),
            (self.config.cumulative_fee_validation, "X-CumulativeFeeValidation"),
        ] {
            if flag {
                set(name, "true".to_string());
            }
        }
        headers
    }
}

/// Decode a body, turning non-success answers into [`ArcError::Http`].
async fn read_response(resp: reqwest::Response) -> Result<ArcResponse, ArcError> {
    let http_status = resp.status();
    let body = resp.bytes().await?;

    if http_status.is_success() {
        return Ok(serde_json::from_slice(&body)?);
    }
    let (status, detail) = match serde_json::from_slice::<ArcResponse>(&body) {
        Ok(response) => {
            let status = response.status.filter(|s| *s >= 400).unwrap_or(http_status.as_u16());
            (status, response.reason())
        }
        Err(_) => (http_status.as_u16(), String::from_utf8_lossy(&body).into_owned()),
    };
    Err(ArcError::Http { status, detail })
}

impl Broadcaster for ArcClient {
    async fn broadcast(&self, tx: &Transaction) -> Result<BroadcastSuccess, BroadcastFailure> {
        let txid = tx.tx_id();
        match self.submit(tx).await {
            Ok(response) => {
                let message = response
                    .tx_status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| response.reason());
                info!(%txid, %message, "ARC accepted transaction");
                Ok(BroadcastSuccess { txid, message })
            }
            Err(error) => {
                let failure = BroadcastFailure::from(error);
                warn!(%txid, code = %failure.code, retryable = failure.retryable, "ARC did not accept transaction");
                Err(failure)
            }
        }
    }
}
