//! Task rewards node: a connected wallet, its balance and transfers, reward
//! redemption, and the locally persisted task progress of the user behind it.

pub mod api;
pub mod balance;
pub mod config;
pub mod ledger;
pub mod notify;
pub mod progress;
pub mod rewards;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod transfer;
pub mod utils;
pub mod wallet;

pub use balance::BalanceReader;
pub use config::{Config, ConfigError};
pub use ledger::LocalLedger;
pub use notify::{Level, Notification, Notifications};
pub use progress::{
    CompletionOutcome, Difficulty, PendingCompletion, ProgressError, ProgressService,
    ProgressStore, Task, TaskState, UserProgress, UserStats, PROGRESS_KEY,
};
pub use rewards::{RedeemError, RedemptionReceipt, Reward, RewardRedeemer};
pub use session::Session;
pub use storage::{FileStorage, MemoryStorage, StorageError, StoragePort};
pub use transaction::{
    HistoryFilter, HistorySource, SampleHistory, TransactionHistory, TransactionRecord, TxKind,
    TxStatus,
};
pub use transfer::{TransferError, TransferForm, TransferReceipt, TransferRequest, TransferSubmitter};
pub use wallet::{
    Address, Commitment, Signature, TransferInstruction, WalletConnection, WalletError,
    LAMPORTS_PER_SOL,
};
