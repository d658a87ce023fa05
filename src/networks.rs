use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Target Solana ledger environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Solana,
    SolanaDevnet,
}

impl Network {
    /// Network name as it appears in x402 payment requirements.
    pub fn network_name(&self) -> &'static str {
        match self {
            Network::Solana => "solana",
            Network::SolanaDevnet => "solana-devnet",
        }
    }

    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Solana => "https://api.mainnet-beta.solana.com",
            Network::SolanaDevnet => "https://api.devnet.solana.com",
        }
    }

    /// Block-explorer link for a transaction signature.
    pub fn explorer_tx_url(&self, signature: &impl Display) -> String {
        match self {
            Network::Solana => format!("https://solscan.io/tx/{signature}"),
            Network::SolanaDevnet => format!("https://solscan.io/tx/{signature}?cluster=devnet"),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network_name())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solana" => Ok(Network::Solana),
            "solana-devnet" => Ok(Network::SolanaDevnet),
            other => Err(Error::UnsupportedNetwork(other.to_string())),
        }
    }
}
