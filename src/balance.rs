use crate::notify::Notifications;
use crate::wallet::{lamports_to_sol, WalletConnection, WalletError};
use tracing::{debug, error};

/// Last fetched balance of the connected account.
#[derive(Debug, Default)]
pub struct BalanceReader {
    lamports: u64,
    loading: bool,
}

impl BalanceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached balance in SOL.
    pub fn balance(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }

    pub fn lamports(&self) -> u64 {
        self.lamports
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Fetch the connected account's balance and cache it.
    ///
    /// On failure the cached value is kept and an error notification is
    /// raised. Without a connected account nothing is fetched.
    pub async fn refresh(
        &mut self,
        wallet: &dyn WalletConnection,
        notes: &mut Notifications,
    ) -> Result<f64, WalletError> {
        let Some(account) = wallet.account() else {
            return Ok(self.balance());
        };

        self.loading = true;
        let result = wallet.get_balance(&account).await;
        self.loading = false;

        match result {
            Ok(lamports) => {
                self.lamports = lamports;
                debug!("Balance of {} is {:.4} SOL", account.short(), self.balance());
                Ok(self.balance())
            }
            Err(e) => {
                error!("Error fetching balance: {}", e);
                notes.error("Failed to fetch balance");
                Err(e)
            }
        }
    }

    /// Optimistic local debit after a confirmed send or a redemption.
    pub(crate) fn debit(&mut self, lamports: u64) {
        self.lamports = self.lamports.saturating_sub(lamports);
    }

    /// Drop the cached value, e.g. when the wallet disconnects.
    pub fn reset(&mut self) {
        self.lamports = 0;
        self.loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use crate::notify::Level;
    use crate::wallet::{Address, LAMPORTS_PER_SOL};

    #[tokio::test]
    async fn refresh_converts_lamports_to_sol() {
        let ledger = LocalLedger::in_memory();
        let account = ledger.create_account(2_500_000_000).unwrap();
        ledger.connect(account.address);

        let mut reader = BalanceReader::new();
        let mut notes = Notifications::new();
        let sol = reader.refresh(&ledger, &mut notes).await.unwrap();

        assert_eq!(sol, 2.5);
        assert_eq!(reader.balance(), 2.5);
        assert!(!reader.is_loading());
        assert!(notes.pending().is_empty());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_last_value() {
        let ledger = LocalLedger::in_memory();
        let account = ledger.create_account(LAMPORTS_PER_SOL).unwrap();
        ledger.connect(account.address);

        let mut reader = BalanceReader::new();
        let mut notes = Notifications::new();
        reader.refresh(&ledger, &mut notes).await.unwrap();

        // An address the ledger has never seen makes the query fail.
        ledger.connect(Address::from_bytes([9u8; 32]));
        assert!(reader.refresh(&ledger, &mut notes).await.is_err());

        assert_eq!(reader.balance(), 1.0);
        assert_eq!(notes.count(Level::Error), 1);
        assert_eq!(notes.pending()[0].message, "Failed to fetch balance");
    }

    #[tokio::test]
    async fn debit_never_goes_below_zero() {
        let ledger = LocalLedger::in_memory();
        let account = ledger.create_account(LAMPORTS_PER_SOL).unwrap();
        ledger.connect(account.address);

        let mut reader = BalanceReader::new();
        let mut notes = Notifications::new();
        reader.refresh(&ledger, &mut notes).await.unwrap();
        reader.debit(400_000_000);
        assert_eq!(reader.lamports(), 600_000_000);
        assert_eq!(reader.balance(), 0.6);
        reader.debit(LAMPORTS_PER_SOL);
        assert_eq!(reader.lamports(), 0);
    }

    #[tokio::test]
    async fn no_account_means_no_query() {
        let ledger = LocalLedger::in_memory();
        let mut reader = BalanceReader::new();
        let mut notes = Notifications::new();
        assert_eq!(reader.refresh(&ledger, &mut notes).await.unwrap(), 0.0);
        assert!(notes.pending().is_empty());
    }
}
