use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Game-wide settings.
///
/// Every field has a default, so a config file only needs the values it changes.
///
/// # Examples
///
/// ```
/// use funding_network::game::config::GameConfig;
/// use rust_decimal_macros::dec;
///
/// let config = GameConfig::from_json(r#"{"policies_per_player": 3}"#).unwrap();
/// assert_eq!(config.policies_per_player, 3);
/// assert_eq!(config.standard_max_player_outflow, dec!(1000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Balance every player is reset to on each budget cycle.
    pub money_per_budget_cycle: Decimal,
    pub standard_max_player_outflow: Decimal,
    pub default_offer_price: Decimal,
    /// Starter policies handed to a new player, funded at rate 0.
    pub policies_per_player: usize,
    pub year_length_secs: u64,
    pub ticks_per_budget_cycle: u32,
    /// Seed for player setup; random when absent.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            money_per_budget_cycle: dec!(1500000),
            standard_max_player_outflow: dec!(1000),
            default_offer_price: dec!(20000),
            policies_per_player: 5,
            year_length_secs: 7200,
            ticks_per_budget_cycle: 10,
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let money = [
            ("money_per_budget_cycle", self.money_per_budget_cycle),
            ("standard_max_player_outflow", self.standard_max_player_outflow),
            ("default_offer_price", self.default_offer_price),
        ];
        for (name, value) in money {
            if value < Decimal::ZERO {
                return Err(ConfigError::Invalid(format!("{} must not be negative, got {}", name, value)));
            }
        }
        if self.year_length_secs == 0 {
            return Err(ConfigError::Invalid("year_length_secs must be positive".into()));
        }
        if self.ticks_per_budget_cycle == 0 {
            return Err(ConfigError::Invalid("ticks_per_budget_cycle must be positive".into()));
        }
        Ok(())
    }

    pub fn year_length(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.year_length_secs).unwrap_or(i64::MAX))
    }
}
