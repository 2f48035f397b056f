use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::ledger::TokenMetadata;
use crate::units::{parse_ether, parse_units, Amount, UnitsError, DEFAULT_DECIMALS};

/// 1 gwei.
pub const DEFAULT_GAS_PRICE: Amount = 1_000_000_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field}: {source}")]
    Amount {
        field: &'static str,
        #[source]
        source: UnitsError,
    },
    #[error("at least 2 accounts are required, got {0}")]
    TooFewAccounts(usize),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Decimal string in whole tokens, scaled by `decimals`.
    pub initial_supply: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "ERC20".to_string(),
            symbol: "ERC20".to_string(),
            decimals: DEFAULT_DECIMALS,
            initial_supply: "10".to_string(),
        }
    }
}

impl TokenConfig {
    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        }
    }

    pub fn supply(&self) -> Result<Amount, ConfigError> {
        parse_units(&self.initial_supply, self.decimals).map_err(|source| ConfigError::Amount {
            field: "token.initial_supply",
            source,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DevnetConfig {
    pub accounts: usize,
    pub seed: u64,
    /// Native balance of every signer, in whole ether.
    pub initial_balance: String,
    /// Base units per gas when a transaction does not set its own price.
    pub gas_price: Amount,
    pub token: TokenConfig,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            accounts: 20,
            seed: 1337,
            initial_balance: "10000".to_string(),
            gas_price: DEFAULT_GAS_PRICE,
            token: TokenConfig::default(),
        }
    }
}

impl DevnetConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts < 2 {
            return Err(ConfigError::TooFewAccounts(self.accounts));
        }
        self.initial_balance()?;
        self.token.supply()?;
        Ok(())
    }

    pub fn initial_balance(&self) -> Result<Amount, ConfigError> {
        parse_ether(&self.initial_balance).map_err(|source| ConfigError::Amount {
            field: "initial_balance",
            source,
        })
    }
}
