//! Core wire and domain types for the payment-gated gateway.
//!
//! Money amounts travel as decimal strings to avoid floating-point drift, and
//! every payment-relevant concept (asset, network, recipient, settlement
//! reference) gets its own newtype so the verifier cannot mix them up.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

/// A monetary amount with exact decimal semantics.
///
/// Serialized as a stringified decimal to avoid loss of precision in JSON.
/// For example, `0.001` becomes `"0.001"` in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MoneyAmount(pub Decimal);

mod money_amount_bounds {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: Lazy<Decimal> =
        Lazy::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: Lazy<Decimal> =
        Lazy::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

/// Errors produced when parsing a [`MoneyAmount`] from its wire format.
#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountError {
    #[error("invalid decimal format")]
    InvalidFormat,
    #[error(
        "amount must be between {} and {}",
        money_amount_bounds::MIN_STR,
        money_amount_bounds::MAX_STR
    )]
    OutOfRange,
    #[error("negative amount is not allowed")]
    Negative,
}

impl MoneyAmount {
    /// Parses a plain decimal string like `"0.001"`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyAmountError`] if the input is not a decimal, is negative,
    /// or falls outside the supported range.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountError> {
        let parsed =
            Decimal::from_str(input.trim()).map_err(|_| MoneyAmountError::InvalidFormat)?;
        if parsed.is_sign_negative() {
            return Err(MoneyAmountError::Negative);
        }
        if parsed < *money_amount_bounds::MIN || parsed > *money_amount_bounds::MAX {
            return Err(MoneyAmountError::OutOfRange);
        }
        Ok(MoneyAmount(parsed))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for MoneyAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MoneyAmount::parse(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_newtype!(
    /// A token or currency symbol, e.g. `"USDC"`.
    Asset
);
string_newtype!(
    /// A settlement network identifier, e.g. `"base-mainnet"`.
    NetworkId
);
string_newtype!(
    /// An on-chain account address, e.g. `"0x742d35Cc..."`.
    Address
);
string_newtype!(
    /// The unique identifier of a completed payment transaction, used as proof
    /// of payment. Each reference authorizes exactly one tool invocation.
    SettlementReference
);

/// A Unix timestamp in seconds, used to date payment proofs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The payment terms of a gateway instance.
///
/// One policy applies to every tool served by the gateway. A disabled policy
/// means all tools are free and the verifier is never consulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPolicy {
    pub enabled: bool,
    pub amount: MoneyAmount,
    pub asset: Asset,
    pub network: NetworkId,
    pub recipient: Address,
}

impl PaymentPolicy {
    /// A policy under which every invocation is free.
    ///
    /// The amount/asset/network/recipient fields are placeholders and are never
    /// read while `enabled` is false.
    pub fn disabled() -> Self {
        PaymentPolicy {
            enabled: false,
            amount: MoneyAmount(Decimal::ZERO),
            asset: Asset::new(""),
            network: NetworkId::new(""),
            recipient: Address::new(""),
        }
    }
}

/// A caller-supplied proof of payment, submitted alongside a tool call.
///
/// The claimed fields are checked cheaply against the policy before the
/// settlement ledger is consulted; the ledger's confirmation remains the
/// authoritative source for amount and recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Who paid, as known to the caller. Informational, echoed in logs.
    pub payer: Address,
    pub amount: MoneyAmount,
    pub asset: Asset,
    pub network: NetworkId,
    pub settlement_reference: SettlementReference,
    #[serde(default)]
    pub timestamp: Option<UnixTimestamp>,
}
