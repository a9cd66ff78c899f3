//! Native ledger records and the canonical transfer event.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CodecError;

/// A 128-bit unsigned ledger integer (identifiers and native amounts).
///
/// Serialized as a decimal string so that consumers without native 128-bit
/// integers (JSON numbers are doubles in many runtimes) never lose precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Uint128(pub u128);

impl fmt::Display for Uint128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Uint128 {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::malformed(format!(
                "'{s}' is not a decimal 128-bit unsigned integer"
            )));
        }
        s.parse::<u128>()
            .map(Uint128)
            .map_err(|e| CodecError::malformed(format!("'{s}': {e}")))
    }
}

impl From<u128> for Uint128 {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl Serialize for Uint128 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Uint128 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A transfer as the ledger returns it from a query.
///
/// `amount` is as wide as the ledger allows; narrowing happens only in the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransfer {
    pub id: Uint128,
    pub debit_account_id: Uint128,
    pub credit_account_id: Uint128,
    pub amount: Uint128,
    pub ledger: u32,
    pub code: u16,
    /// Ledger-assigned, strictly increasing per cluster.
    pub timestamp: u64,
}

/// Canonical transfer event carried on the log.
///
/// Wire form: `{"ID","DebitAccountID","CreditAccountID","Amount","Ledger","Code"}`.
/// The source timestamp is process-local bookkeeping for the extractor and is
/// not part of the wire schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    #[serde(rename = "ID")]
    pub id: Uint128,
    #[serde(rename = "DebitAccountID")]
    pub debit_account_id: Uint128,
    #[serde(rename = "CreditAccountID")]
    pub credit_account_id: Uint128,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "Ledger")]
    pub ledger: u32,
    #[serde(rename = "Code")]
    pub code: u16,
    #[serde(skip)]
    pub source_timestamp: u64,
}

impl TransferEvent {
    /// Partition key: the transfer id in decimal.
    pub fn partition_key(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrips_full_width() {
        let id: Uint128 = u128::MAX.to_string().parse().unwrap();
        assert_eq!(id.0, u128::MAX);
        assert_eq!(id.to_string(), "340282366920938463463374607431768211455");
    }

    #[test]
    fn test_id_rejects_non_decimal() {
        assert!("".parse::<Uint128>().is_err());
        assert!("-1".parse::<Uint128>().is_err());
        assert!("0x10".parse::<Uint128>().is_err());
        assert!(" 12".parse::<Uint128>().is_err());
        // one past u128::MAX
        assert!("340282366920938463463374607431768211456".parse::<Uint128>().is_err());
    }

    #[test]
    fn test_partition_key_is_decimal_id() {
        let event = TransferEvent {
            id: Uint128(12345),
            debit_account_id: Uint128(1),
            credit_account_id: Uint128(2),
            amount: 500,
            ledger: 1,
            code: 718,
            source_timestamp: 99,
        };
        assert_eq!(event.partition_key(), "12345");
    }
}
