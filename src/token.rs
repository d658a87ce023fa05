use std::{
    fmt::{self, Display},
    str::FromStr,
};

use solana_instruction::Instruction;
use solana_pubkey::{Pubkey, pubkey};
use spl_associated_token_account::get_associated_token_address;

use crate::{
    errors::{Error, Result},
    networks::Network,
};

pub const USDC_MINT: Pubkey = pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v");
pub const USDC_MINT_DEVNET: Pubkey = pubkey!("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU");
pub const USDT_MINT: Pubkey = pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB");

/// Mint native SOL is advertised under in payment requirements.
pub const WRAPPED_SOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

/// Asset accepted for payment: the closed set of first-class tokens plus a
/// generic SPL variant carrying an explicit mint and its decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenId {
    Sol,
    Usdc,
    Usdt,
    Spl { mint: Pubkey, decimals: u8 },
}

impl TokenId {
    pub fn symbol(&self) -> &'static str {
        match self {
            TokenId::Sol => "SOL",
            TokenId::Usdc => "USDC",
            TokenId::Usdt => "USDT",
            TokenId::Spl { .. } => "SPL",
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            TokenId::Sol => 9,
            TokenId::Usdc | TokenId::Usdt => 6,
            TokenId::Spl { decimals, .. } => *decimals,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, TokenId::Sol)
    }

    /// Mint address on `network`. `None` for native SOL, and for tokens that
    /// have no deployment there.
    pub fn mint(&self, network: Network) -> Option<Pubkey> {
        match (self, network) {
            (TokenId::Sol, _) => None,
            (TokenId::Usdc, Network::Solana) => Some(USDC_MINT),
            (TokenId::Usdc, Network::SolanaDevnet) => Some(USDC_MINT_DEVNET),
            (TokenId::Usdt, Network::Solana) => Some(USDT_MINT),
            (TokenId::Usdt, Network::SolanaDevnet) => None,
            (TokenId::Spl { mint, .. }, _) => Some(*mint),
        }
    }

    /// Asset identifier for x402 payment requirements. Native SOL follows
    /// the wrapped-mint convention.
    pub fn asset_address(&self, network: Network) -> String {
        match self.mint(network) {
            Some(mint) => mint.to_string(),
            None => WRAPPED_SOL_MINT.to_string(),
        }
    }
}

impl Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenId::Spl { mint, .. } => write!(f, "SPL({mint})"),
            other => write!(f, "{}", other.symbol()),
        }
    }
}

impl FromStr for TokenId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SOL" => Ok(TokenId::Sol),
            "USDC" => Ok(TokenId::Usdc),
            "USDT" => Ok(TokenId::Usdt),
            other => Err(Error::UnsupportedToken(other.to_string())),
        }
    }
}

/// Instructions for the payer-funded transfer into the facilitator account.
///
/// Native SOL is a single System-program transfer. SPL tokens get a
/// `transfer_checked` between associated token accounts, preceded by an
/// idempotent creation of the facilitator's token account funded by the
/// facilitator. The facilitator never moves payer funds itself; the payer
/// remains the owner/signer of the transfer instruction.
pub fn transfer_instructions(
    token: &TokenId,
    payer: &Pubkey,
    facilitator: &Pubkey,
    amount: u64,
    network: Network,
) -> Result<Vec<Instruction>> {
    if token.is_native() {
        return Ok(vec![solana_system_interface::instruction::transfer(
            payer,
            facilitator,
            amount,
        )]);
    }
    let mint = token
        .mint(network)
        .ok_or_else(|| Error::UnsupportedToken(format!("{token} on {network}")))?;
    let source = get_associated_token_address(payer, &mint);
    let destination = get_associated_token_address(facilitator, &mint);

    let create_destination =
        spl_associated_token_account::instruction::create_associated_token_account_idempotent(
            facilitator,
            facilitator,
            &mint,
            &spl_token::id(),
        );
    let transfer = spl_token::instruction::transfer_checked(
        &spl_token::id(),
        &source,
        &mint,
        &destination,
        payer,
        &[],
        amount,
        token.decimals(),
    )?;
    Ok(vec![create_destination, transfer])
}
