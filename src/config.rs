use crate::wallet::{sol_to_lamports, Commitment};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const LEDGER_FILE: &str = "ledger.json";
const STORAGE_FILE: &str = "storage.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// HTTP API listen address (e.g. "0.0.0.0:3030")
    pub api_addr: SocketAddr,
    /// Directory holding the ledger and storage files
    pub data_dir: PathBuf,
    /// Commitment level awaited after sending a transfer. `processed` is
    /// parsed but refused by [`Config::validate`].
    pub commitment: Commitment,
    /// Simulated processing time before a task completion lands
    #[serde(serialize_with = "serialize_millis")]
    pub completion_delay: Duration,
    /// Simulated processing time before a reward redemption lands
    #[serde(serialize_with = "serialize_millis")]
    pub redemption_delay: Duration,
    /// Re-fetch the balance after a confirmed transfer instead of trusting
    /// the local debit
    pub reconcile_after_transfer: bool,
    /// SOL credited to the demo account when the ledger is empty
    pub faucet_sol: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([0, 0, 0, 0], 3030)),
            data_dir: PathBuf::from("."),
            commitment: Commitment::Confirmed,
            completion_delay: Duration::from_millis(2000),
            redemption_delay: Duration::from_millis(2000),
            reconcile_after_transfer: false,
            faucet_sol: 5.0,
        }
    }
}

fn parse_var<T, F>(var: &'static str, parse: F) -> Result<Option<T>, ConfigError>
where
    F: FnOnce(&str) -> Result<T, String>,
{
    match std::env::var(var) {
        Ok(raw) => parse(raw.trim())
            .map(Some)
            .map_err(|reason| ConfigError::Invalid { var, reason }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Defaults overridden by `REWARDS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = parse_var("REWARDS_API_ADDR", |s| {
            s.parse::<SocketAddr>().map_err(|e| e.to_string())
        })? {
            config.api_addr = addr;
        }
        if let Some(dir) = parse_var("REWARDS_DATA_DIR", |s| Ok(PathBuf::from(s)))? {
            config.data_dir = dir;
        }
        if let Some(commitment) = parse_var("REWARDS_COMMITMENT", |s| s.parse::<Commitment>())? {
            config.commitment = commitment;
        }
        if let Some(ms) = parse_var("REWARDS_COMPLETION_DELAY_MS", |s| {
            s.parse::<u64>().map_err(|e| e.to_string())
        })? {
            config.completion_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var("REWARDS_REDEMPTION_DELAY_MS", |s| {
            s.parse::<u64>().map_err(|e| e.to_string())
        })? {
            config.redemption_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = parse_var("REWARDS_RECONCILE", parse_bool)? {
            config.reconcile_after_transfer = flag;
        }
        if let Some(sol) = parse_var("REWARDS_FAUCET_SOL", |s| {
            s.parse::<f64>().map_err(|e| e.to_string())
        })? {
            config.faucet_sol = sol;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.faucet_sol.is_finite() || self.faucet_sol < 0.0 {
            return Err(ConfigError::Invalid {
                var: "REWARDS_FAUCET_SOL",
                reason: format!("must be a non-negative number, got {}", self.faucet_sol),
            });
        }
        if self.commitment == Commitment::Processed {
            return Err(ConfigError::Invalid {
                var: "REWARDS_COMMITMENT",
                reason: "transfers must wait for at least 'confirmed'".to_string(),
            });
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(STORAGE_FILE)
    }

    pub fn faucet_lamports(&self) -> u64 {
        sol_to_lamports(self.faucet_sol)
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::LAMPORTS_PER_SOL;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.api_addr.port(), 3030);
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.faucet_lamports(), 5 * LAMPORTS_PER_SOL);
        assert!(config.ledger_path().ends_with("ledger.json"));
    }

    #[test]
    fn processed_commitment_is_rejected() {
        let config = Config {
            commitment: Commitment::Processed,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_faucet_is_rejected() {
        let config = Config {
            faucet_sol: -1.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool("YES"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn config_serializes_delay_as_millis() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["completion_delay"], 2000);
        assert_eq!(json["redemption_delay"], 2000);
        assert_eq!(json["commitment"], "confirmed");
    }
}
