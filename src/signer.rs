use std::fmt;

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::Transaction;

use crate::errors::{Error, Result};

/// Holds the facilitator's signing capability.
///
/// The keypair never leaves this type: callers get the public key and a
/// co-signature applied in place, nothing else.
pub struct FacilitatorSigner {
    keypair: Keypair,
}

impl FacilitatorSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Partially sign the facilitator's fee-payer slot of `tx`, leaving any
    /// other signatures untouched.
    pub fn cosign(&self, tx: &mut Transaction) -> Result<()> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|err| Error::Signer(err.to_string()))
    }
}

impl fmt::Debug for FacilitatorSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacilitatorSigner({})", self.pubkey())
    }
}

#[cfg(test)]
mod tests {
    use solana_hash::Hash;
    use solana_message::Message;
    use solana_signature::Signature;

    use super::*;
    use crate::{
        networks::Network,
        token::{TokenId, transfer_instructions},
    };

    #[test]
    fn test_cosign_fills_only_the_fee_payer_slot() {
        let signer = FacilitatorSigner::new(Keypair::new());
        let payer = Keypair::new();
        let instructions = transfer_instructions(
            &TokenId::Sol,
            &payer.pubkey(),
            &signer.pubkey(),
            1_000,
            Network::SolanaDevnet,
        )
        .unwrap();
        let message =
            Message::new_with_blockhash(&instructions, Some(&signer.pubkey()), &Hash::default());
        let mut tx = Transaction::new_unsigned(message);

        signer.cosign(&mut tx).unwrap();

        let fee_payer_index = tx
            .message
            .account_keys
            .iter()
            .position(|key| *key == signer.pubkey())
            .unwrap();
        let payer_index = tx
            .message
            .account_keys
            .iter()
            .position(|key| *key == payer.pubkey())
            .unwrap();
        assert_ne!(tx.signatures[fee_payer_index], Signature::default());
        assert_eq!(tx.signatures[payer_index], Signature::default());
    }

    #[test]
    fn test_cosign_rejects_foreign_transaction() {
        let signer = FacilitatorSigner::new(Keypair::new());
        let stranger = Keypair::new();
        let payer = Keypair::new();
        let instructions = transfer_instructions(
            &TokenId::Sol,
            &payer.pubkey(),
            &stranger.pubkey(),
            1_000,
            Network::SolanaDevnet,
        )
        .unwrap();
        // Fee payer is a stranger; the facilitator has no slot to sign.
        let message =
            Message::new_with_blockhash(&instructions, Some(&stranger.pubkey()), &Hash::default());
        let mut tx = Transaction::new_unsigned(message);

        assert!(matches!(signer.cosign(&mut tx), Err(Error::Signer(_))));
    }
}
