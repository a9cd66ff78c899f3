//! Event codec: native ledger record <-> canonical [`TransferEvent`] <-> wire bytes.
//!
//! Pure and synchronous. Any value that cannot be represented exactly is a
//! [`CodecError`]; nothing is truncated.

use crate::error::CodecError;
use crate::event::{LedgerTransfer, TransferEvent, Uint128};

/// Convert a native ledger transfer into the canonical event.
///
/// Fails with [`CodecError::AmountOverflow`] when the native amount does not
/// fit in 64 bits.
pub fn from_ledger(transfer: &LedgerTransfer) -> Result<TransferEvent, CodecError> {
    let amount = u64::try_from(transfer.amount.0).map_err(|_| CodecError::AmountOverflow {
        transfer_id: transfer.id.to_string(),
        amount: transfer.amount.0,
    })?;

    Ok(TransferEvent {
        id: transfer.id,
        debit_account_id: transfer.debit_account_id,
        credit_account_id: transfer.credit_account_id,
        amount,
        ledger: transfer.ledger,
        code: transfer.code,
        source_timestamp: transfer.timestamp,
    })
}

/// Convert a canonical event back into the native record shape.
///
/// Widening is lossless; the timestamp is whatever the event carried locally
/// (zero for events decoded from the wire).
pub fn to_ledger(event: &TransferEvent) -> LedgerTransfer {
    LedgerTransfer {
        id: event.id,
        debit_account_id: event.debit_account_id,
        credit_account_id: event.credit_account_id,
        amount: Uint128(u128::from(event.amount)),
        ledger: event.ledger,
        code: event.code,
        timestamp: event.source_timestamp,
    }
}

/// Serialize an event to its JSON wire form.
pub fn encode(event: &TransferEvent) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(event)?)
}

/// Parse an event from its JSON wire form.
///
/// Field types enforce the bounds: `Amount` must be a non-negative integer
/// within `u64`, `Ledger` within `u32`, `Code` within `u16`, and the three
/// identifiers decimal strings within `u128`.
pub fn decode(payload: &[u8]) -> Result<TransferEvent, CodecError> {
    if payload.is_empty() {
        return Err(CodecError::malformed("empty payload"));
    }
    Ok(serde_json::from_slice(payload)?)
}
