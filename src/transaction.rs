use crate::wallet::{Address, WalletError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Send,
    Receive,
    TaskReward,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub signature: String,
    pub kind: TxKind,
    pub amount: f64,
    pub from: String,
    pub to: String,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
}

impl TransactionRecord {
    pub fn new(
        signature: String,
        kind: TxKind,
        amount: f64,
        from: String,
        to: String,
        status: TxStatus,
    ) -> Self {
        Self {
            signature,
            kind,
            amount,
            from,
            to,
            timestamp: Utc::now(),
            status,
        }
    }
}

/// History tabs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryFilter {
    #[default]
    All,
    Sent,
    Received,
    Rewards,
}

impl HistoryFilter {
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        match self {
            HistoryFilter::All => true,
            HistoryFilter::Sent => record.kind == TxKind::Send,
            HistoryFilter::Received => record.kind == TxKind::Receive,
            HistoryFilter::Rewards => record.kind == TxKind::TaskReward,
        }
    }
}

impl FromStr for HistoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(HistoryFilter::All),
            "sent" => Ok(HistoryFilter::Sent),
            "received" => Ok(HistoryFilter::Received),
            "rewards" => Ok(HistoryFilter::Rewards),
            other => Err(format!("unknown history filter '{}'", other)),
        }
    }
}

/// In-memory transaction list, newest first.
#[derive(Debug, Default, Clone)]
pub struct TransactionHistory {
    records: Vec<TransactionRecord>,
}

impl TransactionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, records: Vec<TransactionRecord>) {
        self.records = records;
    }

    pub fn prepend(&mut self, record: TransactionRecord) {
        self.records.insert(0, record);
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn filtered(&self, filter: HistoryFilter) -> Vec<&TransactionRecord> {
        self.records.iter().filter(|r| filter.matches(r)).collect()
    }
}

/// Where past transactions for an account come from.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn recent(&self, account: &Address) -> Result<Vec<TransactionRecord>, WalletError>;
}

/// Fixed demo history shown to a freshly connected account.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleHistory;

#[async_trait]
impl HistorySource for SampleHistory {
    async fn recent(&self, account: &Address) -> Result<Vec<TransactionRecord>, WalletError> {
        let me = account.to_string();
        let now = Utc::now();
        Ok(vec![
            TransactionRecord {
                signature: "5J7X...".to_string(),
                kind: TxKind::TaskReward,
                amount: 0.5,
                from: "Task System".to_string(),
                to: me.clone(),
                timestamp: now - Duration::hours(1),
                status: TxStatus::Confirmed,
            },
            TransactionRecord {
                signature: "3K9Y...".to_string(),
                kind: TxKind::Receive,
                amount: 2.0,
                from: "0x1234...5678".to_string(),
                to: me.clone(),
                timestamp: now - Duration::hours(2),
                status: TxStatus::Confirmed,
            },
            TransactionRecord {
                signature: "7M2N...".to_string(),
                kind: TxKind::Send,
                amount: 1.5,
                from: me,
                to: "0x8765...4321".to_string(),
                timestamp: now - Duration::hours(3),
                status: TxStatus::Confirmed,
            },
        ])
    }
}
