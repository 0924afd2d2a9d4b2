//! In-process ledger that plays the role of the network for the node.
//!
//! Accounts live in a map keyed by address and are saved to a JSON file after
//! every mutation. Transfers are applied when sent and confirmed on request.

use crate::utils::hash_bytes;
use crate::wallet::{
    Address, Commitment, Signature, TransferInstruction, WalletConnection, WalletError,
};
use async_trait::async_trait;
use bip39::Mnemonic;
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Processed,
    Confirmed,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    accounts: HashMap<Address, u64>,
    signatures: HashMap<String, SignatureStatus>,
    nonce: u64,
}

/// A freshly created account and the phrase that derives it.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub address: Address,
    pub mnemonic: String,
}

pub struct LocalLedger {
    state: Mutex<LedgerState>,
    connected: Mutex<Option<Address>>,
    rejecting: Mutex<bool>,
    path: Option<PathBuf>,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalLedger {
    /// A ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            connected: Mutex::new(None),
            rejecting: Mutex::new(false),
            path: None,
        }
    }

    /// Load the ledger from `path`, or start empty when the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let data = fs::read_to_string(&path)?;
            let state: LedgerState = serde_json::from_str(&data)?;
            info!(
                "📂 Loaded ledger from '{}' ({} accounts)",
                path.display(),
                state.accounts.len()
            );
            state
        } else {
            LedgerState::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            connected: Mutex::new(None),
            rejecting: Mutex::new(false),
            path: Some(path),
        })
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, state: &LedgerState) -> Result<(), WalletError> {
        if let Some(path) = &self.path {
            let data = serde_json::to_string(state)?;
            fs::write(path, data)?;
        }
        Ok(())
    }

    /// Create an account from 32 random bytes => 24 words in bip39.
    pub fn create_account(&self, airdrop_lamports: u64) -> Result<NewAccount, WalletError> {
        let mut entropy = [0u8; 32];
        thread_rng().fill_bytes(&mut entropy);

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| WalletError::Network(format!("mnemonic generation failed: {}", e)))?;
        let phrase = mnemonic.to_string();
        let address = Address::from_bytes(hash_bytes(&phrase));

        let mut state = self.state();
        state.accounts.insert(address, airdrop_lamports);
        self.save(&state)?;
        info!("✅ Account created: {}", address);

        Ok(NewAccount {
            address,
            mnemonic: phrase,
        })
    }

    /// Credit an account, creating it if needed.
    pub fn airdrop(&self, address: &Address, lamports: u64) -> Result<(), WalletError> {
        let mut state = self.state();
        *state.accounts.entry(*address).or_insert(0) += lamports;
        self.save(&state)
    }

    pub fn accounts(&self) -> Vec<(Address, u64)> {
        let mut accounts: Vec<_> = self
            .state()
            .accounts
            .iter()
            .map(|(a, b)| (*a, *b))
            .collect();
        accounts.sort();
        accounts
    }

    pub fn connect(&self, address: Address) {
        *self.connected.lock().unwrap_or_else(|p| p.into_inner()) = Some(address);
        info!("🔌 Wallet connected: {}", address.short());
    }

    pub fn disconnect(&self) {
        *self.connected.lock().unwrap_or_else(|p| p.into_inner()) = None;
        info!("🔌 Wallet disconnected");
    }

    /// While set, the wallet refuses to sign.
    pub fn set_rejecting(&self, rejecting: bool) {
        *self.rejecting.lock().unwrap_or_else(|p| p.into_inner()) = rejecting;
    }

    pub fn signature_status(&self, signature: &Signature) -> Option<SignatureStatus> {
        self.state().signatures.get(signature.as_str()).copied()
    }

    fn sign(instruction: &TransferInstruction, nonce: u64) -> Signature {
        let input = format!(
            "{}{}{}{}",
            instruction.from, instruction.to, instruction.lamports, nonce
        );
        let first = hash_bytes(&input);
        let second = hash_bytes(&format!("{:?}", first));
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&first);
        bytes[32..].copy_from_slice(&second);
        Signature::new(bs58::encode(bytes).into_string())
    }
}

#[async_trait]
impl WalletConnection for LocalLedger {
    fn account(&self) -> Option<Address> {
        *self.connected.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn get_balance(&self, address: &Address) -> Result<u64, WalletError> {
        self.state()
            .accounts
            .get(address)
            .copied()
            .ok_or_else(|| WalletError::UnknownAccount(address.to_string()))
    }

    async fn send_transfer(
        &self,
        instruction: TransferInstruction,
    ) -> Result<Signature, WalletError> {
        if self.account() != Some(instruction.from) {
            return Err(WalletError::NotConnected);
        }
        if *self.rejecting.lock().unwrap_or_else(|p| p.into_inner()) {
            warn!("Wallet refused to sign transfer to {}", instruction.to.short());
            return Err(WalletError::Rejected);
        }

        let mut state = self.state();
        let available = state.accounts.get(&instruction.from).copied().unwrap_or(0);
        if available < instruction.lamports {
            return Err(WalletError::InsufficientFunds {
                available,
                required: instruction.lamports,
            });
        }

        state.nonce += 1;
        let signature = Self::sign(&instruction, state.nonce);
        state
            .accounts
            .insert(instruction.from, available - instruction.lamports);
        *state.accounts.entry(instruction.to).or_insert(0) += instruction.lamports;
        state
            .signatures
            .insert(signature.as_str().to_string(), SignatureStatus::Processed);
        self.save(&state)?;

        debug!(
            "Transfer {} -> {} ({} lamports) sent as {}",
            instruction.from.short(),
            instruction.to.short(),
            instruction.lamports,
            signature
        );
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: Commitment,
    ) -> Result<(), WalletError> {
        let mut state = self.state();
        let status = state
            .signatures
            .get_mut(signature.as_str())
            .ok_or_else(|| WalletError::UnknownSignature(signature.to_string()))?;
        if commitment >= Commitment::Confirmed {
            *status = SignatureStatus::Confirmed;
        }
        self.save(&state)?;
        debug!("Transaction {} reached {}", signature, commitment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::LAMPORTS_PER_SOL;

    fn funded() -> (LocalLedger, Address, Address) {
        let ledger = LocalLedger::in_memory();
        let alice = ledger.create_account(2 * LAMPORTS_PER_SOL).unwrap().address;
        let bob = ledger.create_account(0).unwrap().address;
        ledger.connect(alice);
        (ledger, alice, bob)
    }

    #[test]
    fn create_account_yields_24_word_phrase() {
        let ledger = LocalLedger::in_memory();
        let account = ledger.create_account(10).unwrap();
        assert_eq!(account.mnemonic.split_whitespace().count(), 24);
        assert_eq!(ledger.accounts(), vec![(account.address, 10)]);
    }

    #[tokio::test]
    async fn transfer_moves_lamports_and_confirms() {
        let (ledger, alice, bob) = funded();
        let sig = ledger
            .send_transfer(TransferInstruction {
                from: alice,
                to: bob,
                lamports: LAMPORTS_PER_SOL / 2,
            })
            .await
            .unwrap();

        assert_eq!(ledger.signature_status(&sig), Some(SignatureStatus::Processed));
        ledger
            .confirm_transaction(&sig, Commitment::Confirmed)
            .await
            .unwrap();
        assert_eq!(ledger.signature_status(&sig), Some(SignatureStatus::Confirmed));

        assert_eq!(ledger.get_balance(&alice).await.unwrap(), 3 * LAMPORTS_PER_SOL / 2);
        assert_eq!(ledger.get_balance(&bob).await.unwrap(), LAMPORTS_PER_SOL / 2);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_without_side_effects() {
        let (ledger, alice, bob) = funded();
        let err = ledger
            .send_transfer(TransferInstruction {
                from: alice,
                to: bob,
                lamports: 3 * LAMPORTS_PER_SOL,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WalletError::InsufficientFunds { available, required }
                if available == 2 * LAMPORTS_PER_SOL && required == 3 * LAMPORTS_PER_SOL
        ));
        assert_eq!(ledger.get_balance(&alice).await.unwrap(), 2 * LAMPORTS_PER_SOL);
        assert_eq!(ledger.get_balance(&bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejecting_wallet_refuses_to_sign() {
        let (ledger, alice, bob) = funded();
        ledger.set_rejecting(true);
        let err = ledger
            .send_transfer(TransferInstruction {
                from: alice,
                to: bob,
                lamports: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Rejected));
    }

    #[tokio::test]
    async fn only_connected_account_can_send() {
        let (ledger, alice, bob) = funded();
        ledger.disconnect();
        let err = ledger
            .send_transfer(TransferInstruction {
                from: alice,
                to: bob,
                lamports: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::NotConnected));
    }

    #[tokio::test]
    async fn unknown_signature_cannot_be_confirmed() {
        let ledger = LocalLedger::in_memory();
        let err = ledger
            .confirm_transaction(&Signature::new("nope"), Commitment::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::UnknownSignature(_)));
    }

    #[tokio::test]
    async fn ledger_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let address = {
            let ledger = LocalLedger::open(&path).unwrap();
            ledger.create_account(42).unwrap().address
        };

        let reopened = LocalLedger::open(&path).unwrap();
        assert_eq!(reopened.get_balance(&address).await.unwrap(), 42);
    }
}
