//! One user's session: the connected wallet plus everything shown for it.
//!
//! The wallet and history ports are injected; nothing here reaches for
//! ambient state.

use crate::balance::BalanceReader;
use crate::config::Config;
use crate::notify::Notifications;
use crate::progress::{
    CompletionOutcome, PendingCompletion, ProgressError, ProgressService, ProgressStore, TaskState,
};
use crate::rewards::{PendingRedemption, RedeemError, RedemptionReceipt, RewardRedeemer};
use crate::transaction::{HistoryFilter, HistorySource, TransactionHistory, TransactionRecord};
use crate::transfer::{
    PreparedTransfer, TransferError, TransferForm, TransferReceipt, TransferSubmitter,
};
use crate::wallet::{Address, Signature, WalletConnection, WalletError};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Session {
    wallet: Arc<dyn WalletConnection>,
    history_source: Arc<dyn HistorySource>,
    pub balance: BalanceReader,
    pub history: TransactionHistory,
    pub form: TransferForm,
    pub transfers: TransferSubmitter,
    pub progress: ProgressService,
    pub rewards: RewardRedeemer,
    pub notes: Notifications,
}

impl Session {
    pub fn new(
        wallet: Arc<dyn WalletConnection>,
        history_source: Arc<dyn HistorySource>,
        store: ProgressStore,
        config: &Config,
    ) -> Self {
        Self {
            wallet,
            history_source,
            balance: BalanceReader::new(),
            history: TransactionHistory::new(),
            form: TransferForm::default(),
            transfers: TransferSubmitter::new(config.commitment, config.reconcile_after_transfer),
            progress: ProgressService::new(store, config.completion_delay),
            rewards: RewardRedeemer::new(config.redemption_delay),
            notes: Notifications::new(),
        }
    }

    pub fn wallet(&self) -> Arc<dyn WalletConnection> {
        Arc::clone(&self.wallet)
    }

    pub fn account(&self) -> Option<Address> {
        self.wallet.account()
    }

    /// Bring the session in line with the wallet's connection state.
    ///
    /// Connected: fetch balance, load history and restore stored progress.
    /// Disconnected: drop everything back to defaults. Stats are reset along
    /// with the tasks, so a disconnected session never shows the previous
    /// account's numbers.
    pub async fn sync_connection(&mut self) {
        let Some(account) = self.wallet.account() else {
            self.balance.reset();
            self.history.clear();
            self.progress.restore(false);
            return;
        };

        info!("Session connected for {}", account.short());
        let _ = self.balance.refresh(&*self.wallet, &mut self.notes).await;
        match self.history_source.recent(&account).await {
            Ok(records) => self.history.replace(records),
            Err(e) => warn!("Could not load transaction history: {}", e),
        }
        self.progress.restore(true);
    }

    pub async fn refresh_balance(&mut self) -> Result<f64, WalletError> {
        self.balance.refresh(&*self.wallet, &mut self.notes).await
    }

    /// Validate and send the transfer currently in the form.
    pub async fn submit_transfer(&mut self) -> Result<TransferReceipt, TransferError> {
        self.transfers
            .submit(
                &*self.wallet,
                &mut self.form,
                &mut self.balance,
                &mut self.history,
                &mut self.notes,
            )
            .await
    }

    /// First half of a transfer for callers that release the session while
    /// the network call runs.
    pub fn prepare_transfer(&mut self) -> Result<PreparedTransfer, TransferError> {
        self.transfers.prepare(
            self.wallet.account(),
            &self.form,
            &self.balance,
            &mut self.notes,
        )
    }

    pub async fn finish_transfer(
        &mut self,
        prepared: PreparedTransfer,
        outcome: Result<Signature, WalletError>,
    ) -> Result<TransferReceipt, TransferError> {
        self.transfers
            .finish(
                prepared,
                outcome,
                &*self.wallet,
                &mut self.form,
                &mut self.balance,
                &mut self.history,
                &mut self.notes,
            )
            .await
    }

    pub fn transactions(&self, filter: HistoryFilter) -> Vec<TransactionRecord> {
        self.history.filtered(filter).into_iter().cloned().collect()
    }

    pub fn start_task(&mut self, id: &str) -> Result<TaskState, ProgressError> {
        self.progress.start_task(id, &mut self.notes)
    }

    pub fn update_task_progress(&mut self, id: &str, progress: u8) -> Result<u8, ProgressError> {
        self.progress.update_task_progress(id, progress)
    }

    /// Complete a task, holding the session for the whole delay.
    pub async fn complete_task(&mut self, id: &str) -> Result<CompletionOutcome, ProgressError> {
        let Some(pending) = self.begin_completion(id)? else {
            return Ok(CompletionOutcome::AlreadyCompleted);
        };
        pending.wait().await;
        self.finish_completion(pending)
    }

    /// First half of a completion for callers that release the session
    /// during the delay. `None` means the task is already completed.
    pub fn begin_completion(&mut self, id: &str) -> Result<Option<PendingCompletion>, ProgressError> {
        let connected = self.wallet.is_connected();
        self.progress.begin_completion(connected, id, &mut self.notes)
    }

    pub fn finish_completion(
        &mut self,
        pending: PendingCompletion,
    ) -> Result<CompletionOutcome, ProgressError> {
        let connected = self.wallet.is_connected();
        self.progress
            .finish_completion(connected, pending, &mut self.notes)
    }

    pub async fn redeem_reward(&mut self, id: &str) -> Result<RedemptionReceipt, RedeemError> {
        let pending = self.begin_redemption(id)?;
        pending.wait().await;
        self.finish_redemption(pending)
    }

    pub fn begin_redemption(&mut self, id: &str) -> Result<PendingRedemption, RedeemError> {
        self.rewards
            .begin(self.wallet.account(), id, &self.balance, &mut self.notes)
    }

    pub fn finish_redemption(
        &mut self,
        pending: PendingRedemption,
    ) -> Result<RedemptionReceipt, RedeemError> {
        let connected = self.wallet.is_connected();
        self.rewards
            .finish(connected, pending, &mut self.balance, &mut self.notes)
    }

    pub fn reset_progress(&mut self) -> Result<(), ProgressError> {
        self.progress.reset()
    }
}
