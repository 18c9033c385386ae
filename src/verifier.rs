//! Payment verification and exactly-once settlement consumption.
//!
//! Verification runs in three phases:
//!
//! 1. Cheap checks of the caller's claimed proof fields against the policy.
//!    Failures here never touch the settlement index.
//! 2. A confirmation round-trip to the settlement ledger, retried a bounded
//!    number of times with backoff on transient failure. No index lock is held
//!    across this call.
//! 3. Authoritative checks against the confirmed record, then an atomic
//!    check-and-claim of the settlement reference. For any one reference,
//!    exactly one concurrent verification observes [`Settled`]; the rest get
//!    [`PaymentError::ReplayedSettlement`].

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::settlement::{ConfirmationStatus, LedgerError, SettlementLedger};
use crate::types::{
    Address, Asset, MoneyAmount, NetworkId, PaymentPolicy, PaymentProof, SettlementReference,
};

/// All rejection and failure modes of payment verification.
///
/// Every variant except [`PaymentError::CollaboratorUnavailable`] is a
/// definitive rejection: retrying with the same proof cannot succeed.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The policy requires payment and no proof was supplied.
    #[error("payment required but no proof was supplied")]
    MissingProof,
    /// The proof's asset differs from the policy's.
    #[error("asset mismatch (proof: {proof}, policy: {policy})")]
    AssetMismatch { proof: Asset, policy: Asset },
    /// The proof's network differs from the policy's.
    #[error("network mismatch (proof: {proof}, policy: {policy})")]
    NetworkMismatch { proof: NetworkId, policy: NetworkId },
    /// The paid amount is below the policy's price.
    #[error("insufficient amount (paid: {paid}, required: {required})")]
    InsufficientAmount {
        paid: MoneyAmount,
        required: MoneyAmount,
    },
    /// The settlement's on-chain recipient is not the policy's recipient.
    #[error("recipient mismatch (settled to: {settled}, policy: {policy})")]
    RecipientMismatch { settled: Address, policy: Address },
    /// The settlement reference was already consumed by an earlier invocation.
    #[error("settlement reference already consumed: {0}")]
    ReplayedSettlement(SettlementReference),
    /// The ledger has no record of the settlement reference.
    #[error("settlement not found: {0}")]
    SettlementNotFound(SettlementReference),
    /// The settlement exists but is not yet confirmed on-chain.
    #[error("settlement not yet confirmed: {0}")]
    SettlementPending(SettlementReference),
    /// The settlement transaction failed on-chain.
    #[error("settlement failed on-chain: {0}")]
    SettlementFailed(SettlementReference),
    /// The ledger could not be queried. Transient: distinct from rejection so
    /// callers can tell "payment rejected" from "could not check payment".
    #[error("settlement ledger unavailable: {0}")]
    CollaboratorUnavailable(String),
}

impl PaymentError {
    /// Whether retrying the same proof could ever succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::CollaboratorUnavailable(_))
    }
}

/// Proof that a payment was verified and its settlement reference consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    pub reference: SettlementReference,
    pub payer: Address,
    /// The authoritative settled amount, as confirmed by the ledger.
    pub amount: MoneyAmount,
}

/// Lifecycle status of a tracked settlement reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementStatus {
    /// Verification referencing this settlement is (or was) in flight.
    Pending,
    /// The reference has been consumed by a successful verification.
    Confirmed,
    /// The transaction definitively failed on-chain.
    Failed,
}

/// Index entry for one settlement reference.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub status: SettlementStatus,
}

/// Concurrent anti-replay index of settlement references.
///
/// `dashmap` entry locking scopes mutual exclusion to the reference being
/// updated; verifications of unrelated references do not contend. The index is
/// memory-only: durability across restarts is a deployment concern left to a
/// replacement backend.
#[derive(Clone, Default)]
pub struct SettlementIndex {
    records: Arc<DashMap<SettlementReference, SettlementRecord>>,
}

impl fmt::Debug for SettlementIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettlementIndex")
            .field("records", &self.records.len())
            .finish()
    }
}

impl SettlementIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast-fails replays and known-failed references before any network work.
    ///
    /// A missing record is created as `Pending`. An existing `Pending` record
    /// is not an error: another attempt may be in flight, or an earlier one
    /// aborted before deciding; the claim step arbitrates.
    fn begin(&self, reference: &SettlementReference) -> Result<(), PaymentError> {
        match self.records.entry(reference.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(SettlementRecord {
                    status: SettlementStatus::Pending,
                });
                Ok(())
            }
            Entry::Occupied(entry) => match entry.get().status {
                SettlementStatus::Pending => Ok(()),
                SettlementStatus::Confirmed => {
                    Err(PaymentError::ReplayedSettlement(reference.clone()))
                }
                SettlementStatus::Failed => {
                    Err(PaymentError::SettlementFailed(reference.clone()))
                }
            },
        }
    }

    /// Atomically consumes the reference.
    ///
    /// Exactly one caller transitions `Pending -> Confirmed`; every later (or
    /// concurrently losing) caller observes `Confirmed` and gets
    /// [`PaymentError::ReplayedSettlement`].
    fn claim(&self, reference: &SettlementReference) -> Result<(), PaymentError> {
        match self.records.entry(reference.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(SettlementRecord {
                    status: SettlementStatus::Confirmed,
                });
                Ok(())
            }
            Entry::Occupied(mut entry) => match entry.get().status {
                SettlementStatus::Pending => {
                    entry.get_mut().status = SettlementStatus::Confirmed;
                    Ok(())
                }
                SettlementStatus::Confirmed => {
                    Err(PaymentError::ReplayedSettlement(reference.clone()))
                }
                SettlementStatus::Failed => {
                    Err(PaymentError::SettlementFailed(reference.clone()))
                }
            },
        }
    }

    /// Records a definitive on-chain failure. Never downgrades a consumed
    /// reference.
    fn mark_failed(&self, reference: &SettlementReference) {
        match self.records.entry(reference.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(SettlementRecord {
                    status: SettlementStatus::Failed,
                });
            }
            Entry::Occupied(mut entry) => {
                if entry.get().status != SettlementStatus::Confirmed {
                    entry.get_mut().status = SettlementStatus::Failed;
                }
            }
        }
    }

    /// Whether the reference has been consumed by a successful verification.
    pub fn is_consumed(&self, reference: &SettlementReference) -> bool {
        self.records
            .get(reference)
            .map(|record| record.status == SettlementStatus::Confirmed)
            .unwrap_or(false)
    }

    /// The tracked status of a reference, if any verification has touched it.
    pub fn status(&self, reference: &SettlementReference) -> Option<SettlementStatus> {
        self.records.get(reference).map(|record| record.status)
    }
}

/// Bounded retry with exponential backoff for the ledger round-trip.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Backoff before the second attempt; doubles each retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

/// Verifies payment proofs against a policy and consumes settlement references
/// exactly once.
#[derive(Debug, Clone)]
pub struct PaymentVerifier<L> {
    ledger: L,
    index: SettlementIndex,
    retry: RetryPolicy,
}

impl<L> PaymentVerifier<L>
where
    L: SettlementLedger,
{
    pub fn new(ledger: L) -> Self {
        PaymentVerifier {
            ledger,
            index: SettlementIndex::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The anti-replay index, exposed for inspection.
    pub fn index(&self) -> &SettlementIndex {
        &self.index
    }

    /// Verifies a proof against the policy and, on success, atomically marks
    /// its settlement reference as consumed.
    ///
    /// The caller (the gateway) only invokes this when the policy is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] when any check fails. Only a fully passing
    /// verification consumes the reference; rejections leave it claimable.
    #[instrument(skip_all, err)]
    pub async fn verify(
        &self,
        policy: &PaymentPolicy,
        proof: Option<&PaymentProof>,
    ) -> Result<Settled, PaymentError> {
        debug_assert!(policy.enabled, "verifier invoked with a disabled policy");
        let proof = proof.ok_or(PaymentError::MissingProof)?;
        let reference = &proof.settlement_reference;

        assert_claimed_fields(policy, proof)?;
        self.index.begin(reference)?;

        let confirmation = self.confirm_with_retry(reference).await?;

        match confirmation.status {
            ConfirmationStatus::Confirmed => {}
            ConfirmationStatus::Pending => {
                return Err(PaymentError::SettlementPending(reference.clone()));
            }
            ConfirmationStatus::Failed => {
                self.index.mark_failed(reference);
                return Err(PaymentError::SettlementFailed(reference.clone()));
            }
        }

        if confirmation.asset != policy.asset {
            return Err(PaymentError::AssetMismatch {
                proof: confirmation.asset,
                policy: policy.asset.clone(),
            });
        }
        if confirmation.network != policy.network {
            return Err(PaymentError::NetworkMismatch {
                proof: confirmation.network,
                policy: policy.network.clone(),
            });
        }
        if confirmation.recipient != policy.recipient {
            return Err(PaymentError::RecipientMismatch {
                settled: confirmation.recipient,
                policy: policy.recipient.clone(),
            });
        }
        if confirmation.amount < policy.amount {
            return Err(PaymentError::InsufficientAmount {
                paid: confirmation.amount,
                required: policy.amount,
            });
        }

        self.index.claim(reference)?;
        tracing::info!(reference = %reference, payer = %proof.payer, "settlement consumed");
        Ok(Settled {
            reference: reference.clone(),
            payer: proof.payer.clone(),
            amount: confirmation.amount,
        })
    }

    /// Queries the ledger, retrying transient failures with doubling backoff.
    #[instrument(skip_all, err, fields(reference = %reference))]
    async fn confirm_with_retry(
        &self,
        reference: &SettlementReference,
    ) -> Result<crate::settlement::Confirmation, PaymentError> {
        let mut backoff = self.retry.initial_backoff;
        let mut last_error = String::new();
        for attempt in 1..=self.retry.attempts.max(1) {
            match self.ledger.confirm(reference).await {
                Ok(confirmation) => return Ok(confirmation),
                Err(LedgerError::NotFound(reference)) => {
                    return Err(PaymentError::SettlementNotFound(reference));
                }
                Err(LedgerError::Unreachable(reason)) => {
                    tracing::warn!(
                        reference = %reference,
                        attempt,
                        reason = %reason,
                        "settlement ledger unreachable"
                    );
                    last_error = reason;
                    if attempt < self.retry.attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(PaymentError::CollaboratorUnavailable(last_error))
    }
}

/// Cheap pre-checks of the caller's claimed proof fields against the policy.
///
/// These run before the index or the ledger is touched, so a proof that cannot
/// possibly pass never costs a round-trip and never creates a record.
fn assert_claimed_fields(policy: &PaymentPolicy, proof: &PaymentProof) -> Result<(), PaymentError> {
    if proof.asset != policy.asset {
        return Err(PaymentError::AssetMismatch {
            proof: proof.asset.clone(),
            policy: policy.asset.clone(),
        });
    }
    if proof.network != policy.network {
        return Err(PaymentError::NetworkMismatch {
            proof: proof.network.clone(),
            policy: policy.network.clone(),
        });
    }
    if proof.amount < policy.amount {
        return Err(PaymentError::InsufficientAmount {
            paid: proof.amount,
            required: policy.amount,
        });
    }
    Ok(())
}
