//! HTTP ledger gateway client
//!
//! Talks to a ledger gateway exposing the anchor chain over plain HTTP:
//!
//! - `POST {base}/logs` with `{log_hash, prev_hash, nonce}` → `{reference}`
//! - `GET {base}/logs/count` → `{count}`
//! - `GET {base}/logs/last` → `{log_hash}` (404 while the ledger is empty)

use super::{AnchorTx, LedgerClient, LedgerError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct LastAnchorResponse {
    log_hash: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    reference: String,
}

pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn transaction_count(&self) -> Result<u64, LedgerError> {
        let resp = self
            .client
            .get(format!("{}/logs/count", self.base_url))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LedgerError::Rejected(format!(
                "count query returned {}",
                resp.status()
            )));
        }

        let body: CountResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(body.count)
    }

    async fn last_anchor(&self) -> Result<Option<String>, LedgerError> {
        let resp = self
            .client
            .get(format!("{}/logs/last", self.base_url))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(LedgerError::Rejected(format!(
                "chain head query returned {}",
                resp.status()
            )));
        }

        let body: LastAnchorResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Some(body.log_hash))
    }

    async fn submit(&self, tx: &AnchorTx) -> Result<String, LedgerError> {
        let resp = self
            .client
            .post(format!("{}/logs", self.base_url))
            .json(&serde_json::json!({
                "log_hash": tx.digest,
                "prev_hash": tx.prev,
                "nonce": tx.nonce,
            }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{status}: {body}")));
        }

        let body: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(body.reference)
    }
}
