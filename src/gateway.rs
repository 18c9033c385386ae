//! The per-request orchestrator: lookup, input validation, payment check,
//! dispatch.
//!
//! A request moves through fixed phases — registry lookup, then input-schema
//! validation, then payment verification, then handler dispatch. Input
//! validation runs before the payment check so a malformed request can never
//! consume a valid settlement reference. A handler failure is wrapped and
//! surfaced; it never takes down the gateway or affects concurrent calls.
//!
//! There is no ambient global gateway. An instance is constructed explicitly
//! and handed to the HTTP layer as state.

use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::registry::{RegistryError, ToolError, ToolMetadata, ToolRegistry};
use crate::settlement::SettlementLedger;
use crate::types::{PaymentPolicy, PaymentProof};
use crate::verifier::{PaymentError, PaymentVerifier};

/// Everything a tool call can fail with, in gateway terms.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Registry-level failure; only `ToolNotFound` can occur at call time.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The input payload does not satisfy the tool's input schema.
    #[error("invalid input for tool {tool}: {reason}")]
    InvalidInput { tool: String, reason: String },
    /// Payment verification rejected the call or could not run.
    #[error(transparent)]
    Payment(#[from] PaymentError),
    /// The tool handler itself failed. Reported and logged, never fatal.
    #[error("tool {tool} failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: ToolError,
    },
}

/// Orchestrates tool invocations against one registry, one payment policy, and
/// one verifier.
#[derive(Debug)]
pub struct InvocationGateway<L> {
    registry: Arc<ToolRegistry>,
    policy: PaymentPolicy,
    verifier: PaymentVerifier<L>,
}

impl<L> InvocationGateway<L>
where
    L: SettlementLedger,
{
    pub fn new(
        registry: Arc<ToolRegistry>,
        policy: PaymentPolicy,
        verifier: PaymentVerifier<L>,
    ) -> Self {
        InvocationGateway {
            registry,
            policy,
            verifier,
        }
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Public metadata for every registered tool, in registration order.
    pub fn list_tools(&self) -> Vec<ToolMetadata> {
        self.registry.list()
    }

    /// Handles one tool call end to end.
    ///
    /// Phase order is a contract: schema validation happens before payment
    /// verification, so `InvalidInput` leaves the proof's settlement reference
    /// unconsumed and available for a corrected call. When the policy is
    /// disabled the verifier is never consulted, proof or no proof.
    ///
    /// Settlement consumption is irreversible: if the caller goes away after
    /// verification succeeds but before dispatch completes, the reference
    /// stays consumed. Refund or idempotency policy belongs to tool authors.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on unknown tool, schema violation, payment
    /// rejection, unavailable settlement collaborator, or handler failure.
    #[instrument(skip(self, input, proof), fields(tool = %name), err)]
    pub async fn handle_call(
        &self,
        name: &str,
        input: Value,
        proof: Option<&PaymentProof>,
    ) -> Result<Value, GatewayError> {
        let tool = self.registry.get(name)?;

        if let Some(validator) = &tool.validator {
            validator
                .validate(&input)
                .map_err(|e| GatewayError::InvalidInput {
                    tool: name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        if self.policy.enabled {
            let settled = self.verifier.verify(&self.policy, proof).await?;
            tracing::debug!(
                reference = %settled.reference,
                payer = %settled.payer,
                "payment settled, dispatching"
            );
        }

        match tool.definition.handler().call(input).await {
            Ok(output) => Ok(output),
            Err(source) => {
                tracing::error!(tool = %name, error = %source, "tool handler failed");
                Err(GatewayError::ToolExecution {
                    tool: name.to_string(),
                    source,
                })
            }
        }
    }

    /// The verifier's anti-replay index, exposed for inspection.
    pub fn settlement_index(&self) -> &crate::verifier::SettlementIndex {
        self.verifier.index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::{detect_language_tool, translate_tool};
    use crate::settlement::{
        Confirmation, ConfirmationStatus, LedgerError, MemoryLedger, SettlementLedger,
    };
    use crate::types::{Address, Asset, NetworkId, SettlementReference};
    use serde_json::json;

    fn paid_policy() -> PaymentPolicy {
        PaymentPolicy {
            enabled: true,
            amount: "0.001".parse().unwrap(),
            asset: Asset::from("USDC"),
            network: NetworkId::from("base-mainnet"),
            recipient: Address::from("0xAAA"),
        }
    }

    fn proof(reference: &str, amount: &str) -> PaymentProof {
        PaymentProof {
            payer: Address::from("0xBBB"),
            amount: amount.parse().unwrap(),
            asset: Asset::from("USDC"),
            network: NetworkId::from("base-mainnet"),
            settlement_reference: SettlementReference::from(reference),
            timestamp: None,
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(translate_tool()).unwrap();
        registry.register(detect_language_tool()).unwrap();
        Arc::new(registry)
    }

    fn paid_gateway(
        seeded: &[(&str, &str)],
    ) -> InvocationGateway<MemoryLedger> {
        let ledger = MemoryLedger::new();
        for (reference, amount) in seeded {
            ledger.seed(
                SettlementReference::from(*reference),
                Confirmation {
                    amount: amount.parse().unwrap(),
                    asset: Asset::from("USDC"),
                    network: NetworkId::from("base-mainnet"),
                    recipient: Address::from("0xAAA"),
                    status: ConfirmationStatus::Confirmed,
                },
            );
        }
        InvocationGateway::new(registry(), paid_policy(), PaymentVerifier::new(ledger))
    }

    /// Ledger that fails the test if the gateway ever consults it.
    struct UnreachableLedger;

    impl SettlementLedger for UnreachableLedger {
        async fn confirm(
            &self,
            _reference: &SettlementReference,
        ) -> Result<Confirmation, LedgerError> {
            panic!("verifier must not be consulted for a disabled policy");
        }
    }

    fn free_gateway() -> InvocationGateway<UnreachableLedger> {
        InvocationGateway::new(
            registry(),
            PaymentPolicy::disabled(),
            PaymentVerifier::new(UnreachableLedger),
        )
    }

    #[tokio::test]
    async fn test_paid_translate_succeeds() {
        let gateway = paid_gateway(&[("tx1", "0.001")]);
        let output = gateway
            .handle_call(
                "translate",
                json!({"text": "hello", "from": "en", "to": "es"}),
                Some(&proof("tx1", "0.001")),
            )
            .await
            .unwrap();
        assert_eq!(
            output,
            json!({"original": "hello", "translated": "hola", "from": "en", "to": "es"})
        );
        assert!(
            gateway
                .settlement_index()
                .is_consumed(&SettlementReference::from("tx1"))
        );
    }

    #[tokio::test]
    async fn test_insufficient_amount_rejected() {
        let gateway = paid_gateway(&[("tx1", "0.001")]);
        let err = gateway
            .handle_call(
                "translate",
                json!({"text": "hello", "from": "en", "to": "es"}),
                Some(&proof("tx1", "0.0005")),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Payment(PaymentError::InsufficientAmount { .. })
        ));
        // Settlement index untouched by the rejection.
        assert_eq!(
            gateway
                .settlement_index()
                .status(&SettlementReference::from("tx1")),
            None
        );
    }

    #[tokio::test]
    async fn test_free_mode_never_consults_verifier() {
        let gateway = free_gateway();

        // Identical output to the paid case, with and without a proof.
        let without_proof = gateway
            .handle_call(
                "translate",
                json!({"text": "hello", "from": "en", "to": "es"}),
                None,
            )
            .await
            .unwrap();
        let with_proof = gateway
            .handle_call(
                "translate",
                json!({"text": "hello", "from": "en", "to": "es"}),
                Some(&proof("tx1", "0.001")),
            )
            .await
            .unwrap();
        assert_eq!(without_proof, with_proof);
        assert_eq!(
            without_proof,
            json!({"original": "hello", "translated": "hola", "from": "en", "to": "es"})
        );
    }

    #[tokio::test]
    async fn test_missing_proof_when_payment_required() {
        let gateway = paid_gateway(&[]);
        let err = gateway
            .handle_call(
                "translate",
                json!({"text": "hello", "from": "en", "to": "es"}),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Payment(PaymentError::MissingProof)
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_precedes_settlement_consumption() {
        let gateway = paid_gateway(&[("tx1", "0.001")]);
        let reference = SettlementReference::from("tx1");

        // Malformed input with an otherwise-valid unused proof.
        let err = gateway
            .handle_call(
                "translate",
                json!({"text": "hello"}),
                Some(&proof("tx1", "0.001")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput { .. }));
        assert!(!gateway.settlement_index().is_consumed(&reference));

        // The same proof still works for a corrected call.
        let output = gateway
            .handle_call(
                "translate",
                json!({"text": "hello", "from": "en", "to": "es"}),
                Some(&proof("tx1", "0.001")),
            )
            .await
            .unwrap();
        assert_eq!(output["translated"], "hola");
    }

    #[tokio::test]
    async fn test_replay_rejected_after_successful_call() {
        let gateway = paid_gateway(&[("tx1", "0.001")]);
        let payment = proof("tx1", "0.001");
        gateway
            .handle_call(
                "detect_language",
                json!({"text": "hola señor"}),
                Some(&payment),
            )
            .await
            .unwrap();
        let err = gateway
            .handle_call(
                "detect_language",
                json!({"text": "hola señor"}),
                Some(&payment),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Payment(PaymentError::ReplayedSettlement(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let gateway = free_gateway();
        let err = gateway
            .handle_call("summarize", json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Registry(RegistryError::ToolNotFound(name)) if name == "summarize"
        ));
    }

    #[tokio::test]
    async fn test_handler_failure_is_contained() {
        let mut registry = ToolRegistry::new();
        registry
            .register(crate::registry::ToolDefinition::from_fn(
                "broken",
                "Always fails",
                |_input| async move { Err(ToolError::new("upstream exploded")) },
            ))
            .unwrap();
        registry.register(translate_tool()).unwrap();
        let gateway = InvocationGateway::new(
            Arc::new(registry),
            PaymentPolicy::disabled(),
            PaymentVerifier::new(MemoryLedger::new()),
        );

        let err = gateway.handle_call("broken", json!({}), None).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ToolExecution { tool, .. } if tool == "broken"
        ));

        // Subsequent calls are unaffected.
        let output = gateway
            .handle_call(
                "translate",
                json!({"text": "goodbye", "from": "en", "to": "fr"}),
                None,
            )
            .await
            .unwrap();
        assert_eq!(output["translated"], "au revoir");
    }

    #[tokio::test]
    async fn test_list_tools_delegates_to_registry() {
        let gateway = free_gateway();
        let tools = gateway.list_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "translate");
        assert_eq!(tools[1].name, "detect_language");
    }
}
