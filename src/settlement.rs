//! The settlement collaborator boundary.
//!
//! The gateway never talks to a chain directly. It asks a [`SettlementLedger`]
//! whether a settlement reference corresponds to a real, confirmed transaction,
//! and what that transaction actually paid. The ledger's answer is the
//! authoritative record; caller-claimed proof fields are only a fast pre-check.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::types::{Address, Asset, MoneyAmount, NetworkId, SettlementReference};

/// On-chain status of a settlement transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Confirmed,
    Pending,
    Failed,
}

/// The authoritative record of one settlement, as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub amount: MoneyAmount,
    pub asset: Asset,
    pub network: NetworkId,
    pub recipient: Address,
    pub status: ConfirmationStatus,
}

/// Errors raised while confirming a settlement reference.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The ledger has no record of this reference. Definitive.
    #[error("settlement reference not found: {0}")]
    NotFound(SettlementReference),
    /// The ledger could not be reached or answered malformed. Transient.
    #[error("settlement ledger unreachable: {0}")]
    Unreachable(String),
}

/// Asynchronous interface to whatever settles payments on-chain.
///
/// Implementors answer one question: what does the chain say about this
/// settlement reference? They perform no policy checks and keep no
/// anti-replay state; both belong to the verifier.
pub trait SettlementLedger: Send + Sync {
    /// Confirms a settlement reference against the chain data source.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotFound`] when the reference is unknown, or
    /// [`LedgerError::Unreachable`] when the data source cannot be queried.
    fn confirm(
        &self,
        reference: &SettlementReference,
    ) -> impl Future<Output = Result<Confirmation, LedgerError>> + Send;
}

impl<T: SettlementLedger> SettlementLedger for Arc<T> {
    fn confirm(
        &self,
        reference: &SettlementReference,
    ) -> impl Future<Output = Result<Confirmation, LedgerError>> + Send {
        self.as_ref().confirm(reference)
    }
}

/// In-process ledger backed by a concurrent map of seeded confirmations.
///
/// Used by tests and by the demo binary when no remote ledger is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<DashMap<SettlementReference, Confirmation>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a confirmation the ledger will report for `reference`.
    pub fn seed(&self, reference: SettlementReference, confirmation: Confirmation) {
        self.records.insert(reference, confirmation);
    }
}

impl SettlementLedger for MemoryLedger {
    async fn confirm(
        &self,
        reference: &SettlementReference,
    ) -> Result<Confirmation, LedgerError> {
        self.records
            .get(reference)
            .map(|record| record.clone())
            .ok_or_else(|| LedgerError::NotFound(reference.clone()))
    }
}

/// Ledger client for a remote confirmation service.
///
/// Expects `GET {base}/settlements/{reference}` to answer with a
/// [`Confirmation`] JSON body, or 404 when the reference is unknown.
#[derive(Debug, Clone)]
pub struct HttpSettlementLedger {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSettlementLedger {
    pub fn new(base_url: Url) -> Self {
        HttpSettlementLedger {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn settlement_url(&self, reference: &SettlementReference) -> Result<Url, LedgerError> {
        self.base_url
            .join(&format!("settlements/{}", reference))
            .map_err(|e| LedgerError::Unreachable(format!("invalid settlement URL: {e}")))
    }
}

impl SettlementLedger for HttpSettlementLedger {
    async fn confirm(
        &self,
        reference: &SettlementReference,
    ) -> Result<Confirmation, LedgerError> {
        let url = self.settlement_url(reference)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(reference.clone()));
        }
        let response = response
            .error_for_status()
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;
        response
            .json::<Confirmation>()
            .await
            .map_err(|e| LedgerError::Unreachable(format!("malformed confirmation: {e}")))
    }
}

/// Runtime dispatch over the configured ledger backends.
///
/// The server picks its backend from configuration; callers stay generic over
/// [`SettlementLedger`].
#[derive(Debug, Clone)]
pub enum AnyLedger {
    Http(HttpSettlementLedger),
    Memory(MemoryLedger),
}

impl SettlementLedger for AnyLedger {
    async fn confirm(
        &self,
        reference: &SettlementReference,
    ) -> Result<Confirmation, LedgerError> {
        match self {
            AnyLedger::Http(ledger) => ledger.confirm(reference).await,
            AnyLedger::Memory(ledger) => ledger.confirm(reference).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn confirmed_usdc(amount: &str, recipient: &str) -> Confirmation {
        Confirmation {
            amount: amount.parse().unwrap(),
            asset: Asset::from("USDC"),
            network: NetworkId::from("base-mainnet"),
            recipient: Address::from(recipient),
            status: ConfirmationStatus::Confirmed,
        }
    }

    #[tokio::test]
    async fn test_memory_ledger_confirm() {
        let ledger = MemoryLedger::new();
        let reference = SettlementReference::from("tx1");
        ledger.seed(reference.clone(), confirmed_usdc("0.001", "0xAAA"));

        let confirmation = ledger.confirm(&reference).await.unwrap();
        assert_eq!(confirmation.status, ConfirmationStatus::Confirmed);
        assert_eq!(confirmation.recipient, Address::from("0xAAA"));

        let missing = ledger
            .confirm(&SettlementReference::from("tx-missing"))
            .await
            .unwrap_err();
        assert!(matches!(missing, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_http_ledger_confirm() {
        let mock_server = MockServer::start().await;
        let confirmation = confirmed_usdc("0.001", "0xAAA");

        Mock::given(method("GET"))
            .and(path("/settlements/tx1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&confirmation))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/settlements/tx-missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let base: Url = format!("{}/", mock_server.uri()).parse().unwrap();
        let ledger = HttpSettlementLedger::new(base);

        let got = ledger
            .confirm(&SettlementReference::from("tx1"))
            .await
            .unwrap();
        assert_eq!(got, confirmation);

        let missing = ledger
            .confirm(&SettlementReference::from("tx-missing"))
            .await
            .unwrap_err();
        assert!(matches!(missing, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_http_ledger_server_error_is_transient() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/settlements/tx1"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let base: Url = format!("{}/", mock_server.uri()).parse().unwrap();
        let ledger = HttpSettlementLedger::new(base);
        let err = ledger
            .confirm(&SettlementReference::from("tx1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unreachable(_)));
    }
}
