//! Reward catalog and redemption against the cached balance.
//!
//! Redemption is simulated: after a short wait the cost is taken off the
//! cached balance. Nothing is sent to the network, so the next balance
//! refresh shows the on-chain value again.

use crate::balance::BalanceReader;
use crate::notify::Notifications;
use crate::wallet::{sol_to_lamports, Address};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RedeemError {
    #[error("Please connect your wallet first")]
    NotConnected,

    #[error("Unknown reward '{0}'")]
    UnknownReward(String),

    #[error("This reward is not available")]
    Unavailable,

    #[error("Insufficient balance for this reward")]
    InsufficientBalance,

    #[error("A redemption is already in progress")]
    InFlight,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionType {
    GiftCard,
    Subscription,
    Merchandise,
    Crypto,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// Price in SOL.
    pub cost: f64,
    pub available: bool,
    pub popular: bool,
    pub redemption_type: RedemptionType,
}

fn reward(
    id: &str,
    title: &str,
    description: &str,
    category: &str,
    cost: f64,
    popular: bool,
    redemption_type: RedemptionType,
) -> Reward {
    Reward {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        cost,
        available: true,
        popular,
        redemption_type,
    }
}

/// The built-in reward catalog.
pub fn sample_rewards() -> Vec<Reward> {
    use RedemptionType::*;
    vec![
        reward(
            "1",
            "Netflix Gift Card",
            "1 month subscription to Netflix streaming service",
            "Entertainment",
            0.5,
            true,
            Subscription,
        ),
        reward(
            "2",
            "Amazon Gift Card",
            "$25 Amazon gift card for online shopping",
            "Shopping",
            0.4,
            true,
            GiftCard,
        ),
        reward(
            "3",
            "Spotify Premium",
            "3 months of Spotify Premium music streaming",
            "Entertainment",
            0.3,
            false,
            Subscription,
        ),
        reward(
            "4",
            "Starbucks Gift Card",
            "$20 Starbucks gift card for coffee and food",
            "Food & Beverage",
            0.35,
            false,
            GiftCard,
        ),
        reward(
            "5",
            "Solana Merchandise",
            "Exclusive Solana branded t-shirt and hoodie",
            "Merchandise",
            0.8,
            false,
            Merchandise,
        ),
        reward(
            "6",
            "USDC Stablecoin",
            "Convert your SOL to USDC stablecoin",
            "Crypto",
            0.1,
            true,
            Crypto,
        ),
        reward(
            "7",
            "Discord Nitro",
            "1 month Discord Nitro subscription",
            "Gaming",
            0.25,
            false,
            Subscription,
        ),
        reward(
            "8",
            "Uber Eats Credit",
            "$30 Uber Eats delivery credit",
            "Food & Beverage",
            0.45,
            false,
            GiftCard,
        ),
    ]
}

/// A redemption that passed its checks and is waiting out the delay.
#[derive(Debug, Clone)]
pub struct PendingRedemption {
    reward: Reward,
    delay: Duration,
}

impl PendingRedemption {
    pub fn reward(&self) -> &Reward {
        &self.reward
    }

    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionReceipt {
    pub reward_id: String,
    pub title: String,
    pub cost: f64,
}

#[derive(Debug)]
pub struct RewardRedeemer {
    catalog: Vec<Reward>,
    in_flight: bool,
    delay: Duration,
}

impl RewardRedeemer {
    pub fn new(delay: Duration) -> Self {
        Self::with_catalog(sample_rewards(), delay)
    }

    pub fn with_catalog(catalog: Vec<Reward>, delay: Duration) -> Self {
        Self {
            catalog,
            in_flight: false,
            delay,
        }
    }

    pub fn catalog(&self) -> &[Reward] {
        &self.catalog
    }

    pub fn reward(&self, id: &str) -> Option<&Reward> {
        self.catalog.iter().find(|r| r.id == id)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    fn check(
        &self,
        account: Option<Address>,
        id: &str,
        balance: &BalanceReader,
    ) -> Result<Reward, RedeemError> {
        if self.in_flight {
            return Err(RedeemError::InFlight);
        }
        if account.is_none() {
            return Err(RedeemError::NotConnected);
        }
        let reward = self
            .reward(id)
            .ok_or_else(|| RedeemError::UnknownReward(id.to_string()))?;
        if !reward.available {
            return Err(RedeemError::Unavailable);
        }
        if sol_to_lamports(reward.cost) > balance.lamports() {
            return Err(RedeemError::InsufficientBalance);
        }
        Ok(reward.clone())
    }

    /// Check the reward against the cached balance and mark a redemption
    /// as in flight.
    pub fn begin(
        &mut self,
        account: Option<Address>,
        id: &str,
        balance: &BalanceReader,
        notes: &mut Notifications,
    ) -> Result<PendingRedemption, RedeemError> {
        match self.check(account, id, balance) {
            Ok(reward) => {
                self.in_flight = true;
                Ok(PendingRedemption {
                    reward,
                    delay: self.delay,
                })
            }
            Err(e) => {
                notes.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Take the cost off the cached balance.
    pub fn finish(
        &mut self,
        connected: bool,
        pending: PendingRedemption,
        balance: &mut BalanceReader,
        notes: &mut Notifications,
    ) -> Result<RedemptionReceipt, RedeemError> {
        self.in_flight = false;
        let reward = pending.reward;
        if !connected {
            error!("Redemption of '{}' failed: wallet disconnected", reward.id);
            notes.error("Failed to redeem reward. Please try again.");
            return Err(RedeemError::NotConnected);
        }

        balance.debit(sol_to_lamports(reward.cost));
        info!("Redeemed '{}' for {} SOL", reward.title, reward.cost);
        notes.success(format!("🎉 {} redeemed successfully!", reward.title));

        Ok(RedemptionReceipt {
            reward_id: reward.id,
            title: reward.title,
            cost: reward.cost,
        })
    }

    /// Begin, wait and finish in one call.
    pub async fn redeem(
        &mut self,
        account: Option<Address>,
        id: &str,
        balance: &mut BalanceReader,
        notes: &mut Notifications,
    ) -> Result<RedemptionReceipt, RedeemError> {
        let pending = self.begin(account, id, balance, notes)?;
        pending.wait().await;
        self.finish(account.is_some(), pending, balance, notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LocalLedger;
    use crate::notify::Level;
    use crate::wallet::{WalletConnection, LAMPORTS_PER_SOL};

    async fn funded(lamports: u64) -> (LocalLedger, BalanceReader) {
        let ledger = LocalLedger::in_memory();
        let account = ledger.create_account(lamports).unwrap();
        ledger.connect(account.address);
        let mut balance = BalanceReader::new();
        balance
            .refresh(&ledger, &mut Notifications::new())
            .await
            .unwrap();
        (ledger, balance)
    }

    #[test]
    fn catalog_has_eight_rewards() {
        let redeemer = RewardRedeemer::new(Duration::ZERO);
        assert_eq!(redeemer.catalog().len(), 8);
        assert_eq!(redeemer.reward("6").map(|r| r.cost), Some(0.1));
        assert!(redeemer.catalog().iter().all(|r| r.available));
    }

    #[tokio::test]
    async fn redemption_debits_cached_balance_only() {
        let (ledger, mut balance) = funded(LAMPORTS_PER_SOL).await;
        let mut notes = Notifications::new();
        let mut redeemer = RewardRedeemer::new(Duration::ZERO);

        let receipt = redeemer
            .redeem(ledger.account(), "2", &mut balance, &mut notes)
            .await
            .unwrap();

        assert_eq!(receipt.title, "Amazon Gift Card");
        assert_eq!(balance.balance(), 0.6);
        assert!(!redeemer.is_in_flight());
        assert_eq!(
            notes.pending().last().map(|n| n.message.as_str()),
            Some("🎉 Amazon Gift Card redeemed successfully!")
        );

        let account = ledger.account().unwrap();
        assert_eq!(ledger.get_balance(&account).await.unwrap(), LAMPORTS_PER_SOL);
    }

    #[tokio::test]
    async fn exact_balance_is_enough() {
        let (ledger, mut balance) = funded(500_000_000).await;
        let mut notes = Notifications::new();
        let mut redeemer = RewardRedeemer::new(Duration::ZERO);

        redeemer
            .redeem(ledger.account(), "1", &mut balance, &mut notes)
            .await
            .unwrap();
        assert_eq!(balance.lamports(), 0);
    }

    #[tokio::test]
    async fn rejected_redemptions_leave_balance_alone() {
        let (ledger, mut balance) = funded(300_000_000).await;
        let mut notes = Notifications::new();
        let mut redeemer = RewardRedeemer::new(Duration::ZERO);

        assert!(matches!(
            redeemer.redeem(None, "3", &mut balance, &mut notes).await,
            Err(RedeemError::NotConnected)
        ));
        assert!(matches!(
            redeemer
                .redeem(ledger.account(), "5", &mut balance, &mut notes)
                .await,
            Err(RedeemError::InsufficientBalance)
        ));
        assert!(matches!(
            redeemer
                .redeem(ledger.account(), "42", &mut balance, &mut notes)
                .await,
            Err(RedeemError::UnknownReward(_))
        ));

        assert_eq!(balance.lamports(), 300_000_000);
        assert_eq!(notes.count(Level::Error), 3);
        assert_eq!(
            notes.pending()[1].message,
            "Insufficient balance for this reward"
        );
    }

    #[tokio::test]
    async fn unavailable_reward_is_refused() {
        let (ledger, mut balance) = funded(LAMPORTS_PER_SOL).await;
        let mut notes = Notifications::new();
        let mut catalog = sample_rewards();
        catalog[0].available = false;
        let mut redeemer = RewardRedeemer::with_catalog(catalog, Duration::ZERO);

        assert!(matches!(
            redeemer
                .redeem(ledger.account(), "1", &mut balance, &mut notes)
                .await,
            Err(RedeemError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn one_redemption_at_a_time() {
        let (ledger, mut balance) = funded(LAMPORTS_PER_SOL).await;
        let mut notes = Notifications::new();
        let mut redeemer = RewardRedeemer::new(Duration::ZERO);

        let pending = redeemer
            .begin(ledger.account(), "6", &balance, &mut notes)
            .unwrap();
        assert!(matches!(
            redeemer.begin(ledger.account(), "7", &balance, &mut notes),
            Err(RedeemError::InFlight)
        ));

        redeemer
            .finish(true, pending, &mut balance, &mut notes)
            .unwrap();
        assert_eq!(balance.balance(), 0.9);
        assert!(redeemer
            .begin(ledger.account(), "7", &balance, &mut notes)
            .is_ok());
    }

    #[tokio::test]
    async fn disconnect_during_redemption_fails() {
        let (ledger, mut balance) = funded(LAMPORTS_PER_SOL).await;
        let mut notes = Notifications::new();
        let mut redeemer = RewardRedeemer::new(Duration::ZERO);

        let pending = redeemer
            .begin(ledger.account(), "6", &balance, &mut notes)
            .unwrap();
        assert!(matches!(
            redeemer.finish(false, pending, &mut balance, &mut notes),
            Err(RedeemError::NotConnected)
        ));
        assert_eq!(balance.lamports(), LAMPORTS_PER_SOL);
        assert!(!redeemer.is_in_flight());
        assert_eq!(
            notes.pending().last().map(|n| n.message.as_str()),
            Some("Failed to redeem reward. Please try again.")
        );
    }
}
