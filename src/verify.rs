use base64::{Engine as _, prelude::BASE64_STANDARD};
use solana_signature::Signature;
use solana_transaction::Transaction;

use crate::{
    errors::{Error, Result},
    payment::Payment,
};

/// Encode a transaction the way it travels in x402 payloads: bincode wire
/// format wrapped in base64.
pub fn encode_transaction(tx: &Transaction) -> Result<String> {
    let bytes = bincode::serde::encode_to_vec(tx, bincode::config::legacy())?;
    Ok(BASE64_STANDARD.encode(bytes))
}

pub fn decode_transaction(blob: &str) -> Result<Transaction> {
    let bytes = BASE64_STANDARD.decode(blob)?;
    let (tx, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())?;
    Ok(tx)
}

/// Structural check of a payer-signed blob against the issued skeleton.
///
/// The message must be byte-identical to the skeleton's (same accounts,
/// amount, token program and recent blockhash), so a tampered copy (different
/// amount, swapped recipient, replaced blockhash window) is rejected before
/// the facilitator adds its signature. The payer's signature must be present
/// in their required-signer slot and verify over the message.
pub fn matches_skeleton(
    signed: &Transaction,
    skeleton: &Transaction,
    payment: &Payment,
) -> Result<()> {
    if signed.message != skeleton.message {
        return Err(Error::SignatureMismatch(
            "transaction does not match the issued skeleton".to_string(),
        ));
    }
    let payer_index = signed
        .message
        .account_keys
        .iter()
        .position(|key| *key == payment.payer)
        .ok_or_else(|| {
            Error::SignatureMismatch("payer account missing from transaction".to_string())
        })?;
    if payer_index >= signed.message.header.num_required_signatures as usize {
        return Err(Error::SignatureMismatch(
            "payer is not a required signer".to_string(),
        ));
    }
    let signature = signed
        .signatures
        .get(payer_index)
        .copied()
        .unwrap_or_default();
    if signature == Signature::default() {
        return Err(Error::SignatureMismatch(
            "payer signature missing".to_string(),
        ));
    }
    if !signature.verify(payment.payer.as_ref(), &signed.message_data()) {
        return Err(Error::SignatureMismatch(
            "payer signature does not verify".to_string(),
        ));
    }
    Ok(())
}
