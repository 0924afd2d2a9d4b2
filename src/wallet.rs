//! Wallet boundary.
//!
//! Everything the session needs from a connected wallet goes through
//! [`WalletConnection`]: who is connected, the raw balance of an address,
//! signing and sending a transfer, and waiting for its confirmation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

const ADDRESS_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AddressError {
    #[error("Invalid address encoding")]
    InvalidEncoding,

    #[error("Invalid address length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Transaction signature rejected by the wallet")]
    Rejected,

    #[error("Insufficient funds: account has {available} lamports, needs {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Unknown account {0}")]
    UnknownAccount(String),

    #[error("Unknown transaction signature {0}")]
    UnknownSignature(String),

    #[error("Transaction {0} failed")]
    TransactionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An on-chain account address: 32 bytes, base58 encoded as text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// `abcd...wxyz` form used in listings.
    pub fn short(&self) -> String {
        crate::utils::format_address(&self.to_string())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding)?;
        let bytes: [u8; ADDRESS_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| AddressError::InvalidLength(v.len()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Identifier returned by the network for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durability level requested when waiting for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level '{}'", other)),
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// A single native-currency transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    pub from: Address,
    pub to: Address,
    pub lamports: u64,
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

pub fn sol_to_lamports(sol: f64) -> u64 {
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// What the session consumes from a wallet adapter.
#[async_trait]
pub trait WalletConnection: Send + Sync {
    /// The connected account, if any.
    fn account(&self) -> Option<Address>;

    /// Raw balance in lamports.
    async fn get_balance(&self, address: &Address) -> Result<u64, WalletError>;

    /// Have the wallet sign the transfer and submit it.
    async fn send_transfer(
        &self,
        instruction: TransferInstruction,
    ) -> Result<Signature, WalletError>;

    /// Resolves once the transaction reaches `commitment`.
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<(), WalletError>;

    fn is_connected(&self) -> bool {
        self.account().is_some()
    }
}
