//! Native SOL transfers from the connected account.
//!
//! A transfer runs in three steps: [`TransferSubmitter::prepare`] validates
//! the form against the cached balance and marks the submitter busy,
//! [`PreparedTransfer::execute`] signs, sends and waits for confirmation, and
//! [`TransferSubmitter::finish`] applies the outcome to the session. The
//! middle step borrows nothing from the session, so callers holding shared
//! state can release it while the network call is pending.

use crate::balance::BalanceReader;
use crate::notify::Notifications;
use crate::transaction::{TransactionHistory, TransactionRecord, TxKind, TxStatus};
use crate::utils::short_signature;
use crate::wallet::{
    lamports_to_sol, sol_to_lamports, Address, AddressError, Commitment, Signature,
    TransferInstruction, WalletConnection, WalletError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Please connect your wallet first")]
    NotConnected,

    #[error("Please fill in all fields")]
    MissingFields,

    #[error("Please enter a valid amount")]
    InvalidAmount,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(#[from] AddressError),

    #[error("A transfer is already in progress")]
    InFlight,

    #[error("Transfer failed: {0}")]
    Wallet(#[from] WalletError),
}

impl TransferError {
    /// True when the request never reached the wallet.
    pub fn is_validation(&self) -> bool {
        !matches!(self, TransferError::Wallet(_))
    }
}

/// The send form as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferForm {
    pub recipient: String,
    pub amount: String,
}

impl TransferForm {
    pub fn new(recipient: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            amount: amount.into(),
        }
    }

    pub fn clear(&mut self) {
        self.recipient.clear();
        self.amount.clear();
    }
}

/// A validated transfer: at least one lamport, within the cached balance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub recipient: Address,
    pub lamports: u64,
}

impl TransferRequest {
    /// Check the form against the cached balance, both in lamports.
    ///
    /// Amounts are rounded to the nearest lamport; one that rounds to zero
    /// is not a valid amount.
    pub fn validate(form: &TransferForm, available: u64) -> Result<Self, TransferError> {
        let recipient = form.recipient.trim();
        let amount = form.amount.trim();
        if recipient.is_empty() || amount.is_empty() {
            return Err(TransferError::MissingFields);
        }

        let amount: f64 = amount.parse().map_err(|_| TransferError::InvalidAmount)?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(TransferError::InvalidAmount);
        }
        let lamports = sol_to_lamports(amount);
        if lamports == 0 {
            return Err(TransferError::InvalidAmount);
        }
        if lamports > available {
            return Err(TransferError::InsufficientBalance);
        }

        let recipient: Address = recipient.parse()?;
        Ok(Self {
            recipient,
            lamports,
        })
    }

    /// The amount in SOL.
    pub fn amount(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }
}

/// A transfer that passed validation and is waiting to be sent.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub from: Address,
    pub request: TransferRequest,
}

impl PreparedTransfer {
    pub fn instruction(&self) -> TransferInstruction {
        TransferInstruction {
            from: self.from,
            to: self.request.recipient,
            lamports: self.request.lamports,
        }
    }

    /// Sign, send and wait for `commitment`. No retry and no timeout.
    pub async fn execute(
        &self,
        wallet: &dyn WalletConnection,
        commitment: Commitment,
    ) -> Result<Signature, WalletError> {
        let signature = wallet.send_transfer(self.instruction()).await?;
        wallet.confirm_transaction(&signature, commitment).await?;
        Ok(signature)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub signature: String,
    pub amount: f64,
    pub recipient: String,
}

#[derive(Debug)]
pub struct TransferSubmitter {
    in_flight: bool,
    commitment: Commitment,
    reconcile: bool,
}

impl Default for TransferSubmitter {
    fn default() -> Self {
        Self::new(Commitment::Confirmed, false)
    }
}

impl TransferSubmitter {
    pub fn new(commitment: Commitment, reconcile: bool) -> Self {
        Self {
            in_flight: false,
            commitment,
            reconcile,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn commitment(&self) -> Commitment {
        self.commitment
    }

    /// Validate the form and mark a transfer as in flight.
    pub fn prepare(
        &mut self,
        account: Option<Address>,
        form: &TransferForm,
        balance: &BalanceReader,
        notes: &mut Notifications,
    ) -> Result<PreparedTransfer, TransferError> {
        let checked = if self.in_flight {
            Err(TransferError::InFlight)
        } else {
            account
                .ok_or(TransferError::NotConnected)
                .and_then(|from| {
                    TransferRequest::validate(form, balance.lamports())
                        .map(|request| PreparedTransfer { from, request })
                })
        };

        match checked {
            Ok(prepared) => {
                self.in_flight = true;
                Ok(prepared)
            }
            Err(e) => {
                notes.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Apply the outcome of [`PreparedTransfer::execute`].
    #[allow(clippy::too_many_arguments)]
    pub async fn finish(
        &mut self,
        prepared: PreparedTransfer,
        outcome: Result<Signature, WalletError>,
        wallet: &dyn WalletConnection,
        form: &mut TransferForm,
        balance: &mut BalanceReader,
        history: &mut TransactionHistory,
        notes: &mut Notifications,
    ) -> Result<TransferReceipt, TransferError> {
        self.in_flight = false;

        let signature = match outcome {
            Ok(signature) => signature,
            Err(e) => {
                error!("Transfer failed: {}", e);
                notes.error("Transfer failed. Please try again.");
                return Err(e.into());
            }
        };

        let amount = prepared.request.amount();
        let recipient = prepared.request.recipient.to_string();
        history.prepend(TransactionRecord::new(
            short_signature(signature.as_str()),
            TxKind::Send,
            amount,
            prepared.from.to_string(),
            recipient.clone(),
            TxStatus::Confirmed,
        ));

        balance.debit(prepared.request.lamports);
        if self.reconcile {
            // The optimistic value stays if the re-fetch fails.
            let _ = balance.refresh(wallet, notes).await;
        }

        form.clear();
        info!("Transfer {} confirmed at {}", signature, self.commitment);
        notes.success(format!("Successfully transferred {} SOL", amount));

        Ok(TransferReceipt {
            signature: signature.to_string(),
            amount,
            recipient,
        })
    }

    /// Prepare, execute and finish in one call.
    pub async fn submit(
        &mut self,
        wallet: &dyn WalletConnection,
        form: &mut TransferForm,
        balance: &mut BalanceReader,
        history: &mut TransactionHistory,
        notes: &mut Notifications,
    ) -> Result<TransferReceipt, TransferError> {
        let prepared = self.prepare(wallet.account(), form, balance, notes)?;
        let outcome = prepared.execute(wallet, self.commitment).await;
        self.finish(prepared, outcome, wallet, form, balance, history, notes)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use crate::notify::Level;
    use crate::transaction::HistoryFilter;
    use crate::wallet::LAMPORTS_PER_SOL;

    const TEN_SOL: u64 = 10 * LAMPORTS_PER_SOL;

    struct Fixture {
        ledger: LocalLedger,
        bob: Address,
        balance: BalanceReader,
        history: TransactionHistory,
        notes: Notifications,
    }

    async fn fixture(lamports: u64) -> Fixture {
        let ledger = LocalLedger::in_memory();
        let alice = ledger.create_account(lamports).unwrap().address;
        let bob = ledger.create_account(0).unwrap().address;
        ledger.connect(alice);
        let mut balance = BalanceReader::new();
        let mut notes = Notifications::new();
        balance.refresh(&ledger, &mut notes).await.unwrap();
        Fixture {
            ledger,
            bob,
            balance,
            history: TransactionHistory::new(),
            notes,
        }
    }

    #[test]
    fn validation_order_matches_form_checks() {
        let valid = Address::from_bytes([5u8; 32]).to_string();

        assert!(matches!(
            TransferRequest::validate(&TransferForm::new("", "1"), TEN_SOL),
            Err(TransferError::MissingFields)
        ));
        assert!(matches!(
            TransferRequest::validate(&TransferForm::new(valid.clone(), "abc"), TEN_SOL),
            Err(TransferError::InvalidAmount)
        ));
        assert!(matches!(
            TransferRequest::validate(&TransferForm::new(valid.clone(), "-1"), TEN_SOL),
            Err(TransferError::InvalidAmount)
        ));
        assert!(matches!(
            TransferRequest::validate(&TransferForm::new(valid.clone(), "NaN"), TEN_SOL),
            Err(TransferError::InvalidAmount)
        ));
        assert!(matches!(
            TransferRequest::validate(&TransferForm::new(valid.clone(), "10.5"), TEN_SOL),
            Err(TransferError::InsufficientBalance)
        ));
        assert!(matches!(
            TransferRequest::validate(&TransferForm::new("not-an-address", "1"), TEN_SOL),
            Err(TransferError::InvalidRecipient(_))
        ));

        let ok = TransferRequest::validate(&TransferForm::new(valid, "10"), TEN_SOL).unwrap();
        assert_eq!(ok.lamports, TEN_SOL);
        assert_eq!(ok.amount(), 10.0);
    }

    #[test]
    fn sub_lamport_amounts_are_invalid() {
        let valid = Address::from_bytes([5u8; 32]).to_string();
        for amount in ["0.0000000001", "0.0000000004", "1e-12"] {
            assert!(matches!(
                TransferRequest::validate(&TransferForm::new(valid.clone(), amount), TEN_SOL),
                Err(TransferError::InvalidAmount)
            ));
        }

        // Half a lamport or more rounds up to one.
        let one = TransferRequest::validate(&TransferForm::new(valid.clone(), "0.0000000006"), 1)
            .unwrap();
        assert_eq!(one.lamports, 1);
        assert!(matches!(
            TransferRequest::validate(&TransferForm::new(valid, "0.000000002"), 1),
            Err(TransferError::InsufficientBalance)
        ));
    }

    #[tokio::test]
    async fn debit_matches_lamports_sent() {
        let mut f = fixture(LAMPORTS_PER_SOL).await;
        let mut submitter = TransferSubmitter::default();
        let mut form = TransferForm::new(f.bob.to_string(), "0.1234567891");

        submitter
            .submit(&f.ledger, &mut form, &mut f.balance, &mut f.history, &mut f.notes)
            .await
            .unwrap();

        assert_eq!(f.ledger.get_balance(&f.bob).await.unwrap(), 123_456_789);
        assert_eq!(f.balance.lamports(), LAMPORTS_PER_SOL - 123_456_789);
    }

    #[tokio::test]
    async fn confirmed_transfer_debits_cache_and_records_history() {
        let mut f = fixture(2 * LAMPORTS_PER_SOL).await;
        let mut submitter = TransferSubmitter::default();
        let mut form = TransferForm::new(f.bob.to_string(), "0.75");

        let receipt = submitter
            .submit(&f.ledger, &mut form, &mut f.balance, &mut f.history, &mut f.notes)
            .await
            .unwrap();

        assert_eq!(receipt.amount, 0.75);
        assert_eq!(f.balance.balance(), 1.25);
        assert_eq!(form, TransferForm::default());
        assert!(!submitter.is_in_flight());

        let sent = f.history.filtered(HistoryFilter::Sent);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].signature.ends_with("..."));
        assert_eq!(sent[0].signature.len(), 11);
        assert_eq!(f.ledger.get_balance(&f.bob).await.unwrap(), 750_000_000);
        assert_eq!(
            f.notes.pending().last().map(|n| n.message.as_str()),
            Some("Successfully transferred 0.75 SOL")
        );
    }

    #[tokio::test]
    async fn rejected_signature_leaves_state_unchanged() {
        let mut f = fixture(LAMPORTS_PER_SOL).await;
        f.ledger.set_rejecting(true);
        let mut submitter = TransferSubmitter::default();
        let mut form = TransferForm::new(f.bob.to_string(), "0.5");

        let err = submitter
            .submit(&f.ledger, &mut form, &mut f.balance, &mut f.history, &mut f.notes)
            .await
            .unwrap_err();

        assert!(!err.is_validation());
        assert_eq!(f.balance.balance(), 1.0);
        assert!(f.history.is_empty());
        assert_eq!(form.amount, "0.5");
        assert!(!submitter.is_in_flight());
        assert_eq!(
            f.notes.pending().last().map(|n| n.message.as_str()),
            Some("Transfer failed. Please try again.")
        );
    }

    #[tokio::test]
    async fn second_prepare_while_in_flight_is_refused() {
        let mut f = fixture(LAMPORTS_PER_SOL).await;
        let mut submitter = TransferSubmitter::default();
        let form = TransferForm::new(f.bob.to_string(), "0.1");

        let first = submitter
            .prepare(f.ledger.account(), &form, &f.balance, &mut f.notes)
            .unwrap();
        assert!(submitter.is_in_flight());
        assert!(matches!(
            submitter.prepare(f.ledger.account(), &form, &f.balance, &mut f.notes),
            Err(TransferError::InFlight)
        ));
        assert_eq!(f.notes.count(Level::Error), 1);

        let outcome = first.execute(&f.ledger, submitter.commitment()).await;
        let mut form = form;
        submitter
            .finish(
                first,
                outcome,
                &f.ledger,
                &mut form,
                &mut f.balance,
                &mut f.history,
                &mut f.notes,
            )
            .await
            .unwrap();
        assert!(!submitter.is_in_flight());
    }

    #[tokio::test]
    async fn reconcile_refetches_authoritative_balance() {
        let mut f = fixture(LAMPORTS_PER_SOL).await;
        let mut submitter = TransferSubmitter::new(Commitment::Confirmed, true);
        let mut form = TransferForm::new(f.bob.to_string(), "0.25");

        submitter
            .submit(&f.ledger, &mut form, &mut f.balance, &mut f.history, &mut f.notes)
            .await
            .unwrap();
        assert_eq!(f.balance.balance(), 0.75);
    }

    #[tokio::test]
    async fn disconnected_wallet_short_circuits() {
        let mut f = fixture(LAMPORTS_PER_SOL).await;
        f.ledger.disconnect();
        let mut submitter = TransferSubmitter::default();
        let mut form = TransferForm::new(f.bob.to_string(), "0.25");

        let err = submitter
            .submit(&f.ledger, &mut form, &mut f.balance, &mut f.history, &mut f.notes)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NotConnected));
        assert!(!submitter.is_in_flight());
    }
}
