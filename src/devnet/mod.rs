//! In-process development chain hosting token ledgers.
//!
//! Every successful transaction is mined into its own block. Fees are
//! `gas * gas_price` with a fixed gas figure per transaction kind; there is
//! no metering. A token call that fails in the ledger reverts before
//! anything is charged, and a value transfer that cannot be funded or
//! credited fails before either balance moves, so a failed transaction
//! leaves the devnet state unchanged.

pub mod signers;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::address::Address;
use crate::config::{ConfigError, DevnetConfig};
use crate::ledger::{LedgerError, TokenCall, TokenEvent, TokenLedger, TokenMetadata};
use crate::units::Amount;

pub use signers::{Signer, SignerSet};

pub const TRANSFER_GAS: u64 = 21_000;
pub const TOKEN_CALL_GAS: u64 = 52_000;
pub const DEPLOY_GAS: u64 = 1_200_000;

#[derive(Debug, thiserror::Error)]
pub enum DevnetError {
    #[error("insufficient funds for value + fee: {account} has {available}, needs {needed}")]
    InsufficientFunds {
        account: Address,
        available: Amount,
        needed: Amount,
    },
    #[error("no token deployed at {0}")]
    UnknownToken(Address),
    #[error("{0} is not a devnet signer")]
    UnknownSigner(Address),
    #[error("no signer at index {0}")]
    SignerIndex(usize),
    #[error("fee overflow")]
    FeeOverflow,
    #[error("crediting {account} would overflow its balance")]
    BalanceOverflow { account: Address },
    #[error("transaction reverted: {reason}")]
    Reverted {
        reason: String,
        #[source]
        source: LedgerError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DevnetError {
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            DevnetError::Reverted { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub value: Amount,
    /// Falls back to the devnet default when unset.
    pub gas_price: Option<Amount>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub effective_gas_price: Amount,
    pub fee: Amount,
    pub logs: Vec<TokenEvent>,
}

pub struct Devnet {
    signers: SignerSet,
    balances: BTreeMap<Address, Amount>,
    nonces: BTreeMap<Address, u64>,
    tokens: BTreeMap<Address, TokenLedger>,
    gas_price: Amount,
    block_number: u64,
}

impl Devnet {
    pub fn new(config: &DevnetConfig) -> Result<Self, DevnetError> {
        config.validate()?;
        let signers = SignerSet::generate(config.accounts, config.seed);
        let funding = config.initial_balance()?;
        let balances = signers.iter().map(|s| (s.address(), funding)).collect();
        info!(
            accounts = config.accounts,
            funding,
            gas_price = config.gas_price,
            "devnet started"
        );
        Ok(Self {
            signers,
            balances,
            nonces: BTreeMap::new(),
            tokens: BTreeMap::new(),
            gas_price: config.gas_price,
            block_number: 0,
        })
    }

    pub fn signers(&self) -> &SignerSet {
        &self.signers
    }

    /// Address of the `index`-th signer; index 0 is the conventional deployer.
    pub fn signer(&self, index: usize) -> Result<Address, DevnetError> {
        self.signers
            .get(index)
            .map(Signer::address)
            .ok_or(DevnetError::SignerIndex(index))
    }

    pub fn native_balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn nonce(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn gas_price(&self) -> Amount {
        self.gas_price
    }

    pub fn token(&self, address: &Address) -> Result<&TokenLedger, DevnetError> {
        self.tokens
            .get(address)
            .ok_or(DevnetError::UnknownToken(*address))
    }

    pub fn send_transaction(&mut self, tx: TxRequest) -> Result<Receipt, DevnetError> {
        let gas_price = tx.gas_price.unwrap_or(self.gas_price);
        // a self-send nets to -fee, so only a distinct receiver can overflow
        if tx.from != tx.to
            && self.native_balance(&tx.to).checked_add(tx.value).is_none()
        {
            return Err(DevnetError::BalanceOverflow { account: tx.to });
        }
        let fee = self.charge(&tx.from, TRANSFER_GAS, gas_price, tx.value)?;
        *self.balances.entry(tx.to).or_insert(0) += tx.value;
        let receipt = self.mine(&tx.from, tx.to, None, TRANSFER_GAS, gas_price, fee, Vec::new());
        info!(from = %tx.from, to = %tx.to, value = tx.value, fee, block = receipt.block_number, "value transfer mined");
        Ok(receipt)
    }

    /// Deploys a new token whose whole supply belongs to `deployer`.
    pub fn deploy_token(
        &mut self,
        deployer: &Address,
        metadata: TokenMetadata,
        initial_supply: Amount,
        gas_price: Option<Amount>,
    ) -> Result<Receipt, DevnetError> {
        if !self.signers.contains(deployer) {
            return Err(DevnetError::UnknownSigner(*deployer));
        }
        let gas_price = gas_price.unwrap_or(self.gas_price);
        let contract = Address::for_deployment(deployer, self.nonce(deployer));
        let fee = self.charge(deployer, DEPLOY_GAS, gas_price, 0)?;
        let ledger = TokenLedger::new(*deployer, metadata, initial_supply);
        let logs = ledger.events().to_vec();
        info!(%contract, %deployer, symbol = ledger.symbol(), supply = initial_supply, "token deployed");
        self.tokens.insert(contract, ledger);
        Ok(self.mine(deployer, contract, Some(contract), DEPLOY_GAS, gas_price, fee, logs))
    }

    /// Executes `call` on behalf of `caller`. Ledger failures surface as
    /// [`DevnetError::Reverted`] and leave the devnet untouched.
    pub fn call_token(
        &mut self,
        caller: &Address,
        token: &Address,
        call: &TokenCall,
        gas_price: Option<Amount>,
    ) -> Result<Receipt, DevnetError> {
        let gas_price = gas_price.unwrap_or(self.gas_price);
        let fee = Self::fee(TOKEN_CALL_GAS, gas_price)?;
        self.ensure_funds(caller, fee)?;

        let ledger = self
            .tokens
            .get_mut(token)
            .ok_or(DevnetError::UnknownToken(*token))?;
        let cursor = ledger.events().len();
        if let Err(source) = ledger.apply(caller, call) {
            warn!(%caller, %token, reason = %source, "token call reverted");
            return Err(DevnetError::Reverted {
                reason: source.to_string(),
                source,
            });
        }
        let logs = ledger.events_since(cursor).to_vec();

        self.charge(caller, TOKEN_CALL_GAS, gas_price, 0)?;
        Ok(self.mine(caller, *token, None, TOKEN_CALL_GAS, gas_price, fee, logs))
    }

    pub fn token_transfer(
        &mut self,
        caller: &Address,
        token: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<Receipt, DevnetError> {
        self.call_token(caller, token, &TokenCall::Transfer { to: *to, amount }, None)
    }

    fn fee(gas: u64, gas_price: Amount) -> Result<Amount, DevnetError> {
        (gas as Amount)
            .checked_mul(gas_price)
            .ok_or(DevnetError::FeeOverflow)
    }

    fn ensure_funds(&self, account: &Address, needed: Amount) -> Result<(), DevnetError> {
        let available = self.native_balance(account);
        if available < needed {
            return Err(DevnetError::InsufficientFunds {
                account: *account,
                available,
                needed,
            });
        }
        Ok(())
    }

    /// Debits `value + gas * gas_price` from `from` and returns the fee.
    fn charge(
        &mut self,
        from: &Address,
        gas: u64,
        gas_price: Amount,
        value: Amount,
    ) -> Result<Amount, DevnetError> {
        let fee = Self::fee(gas, gas_price)?;
        let needed = value.checked_add(fee).ok_or(DevnetError::FeeOverflow)?;
        self.ensure_funds(from, needed)?;
        *self.balances.entry(*from).or_insert(0) -= needed;
        Ok(fee)
    }

    #[allow(clippy::too_many_arguments)]
    fn mine(
        &mut self,
        from: &Address,
        to: Address,
        contract_address: Option<Address>,
        gas_used: u64,
        effective_gas_price: Amount,
        fee: Amount,
        logs: Vec<TokenEvent>,
    ) -> Receipt {
        let nonce = self.nonce(from);
        self.nonces.insert(*from, nonce + 1);
        self.block_number += 1;

        let mut hasher = Sha256::new();
        hasher.update(from.as_bytes());
        hasher.update(to.as_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.update(self.block_number.to_le_bytes());
        Receipt {
            tx_hash: format!("0x{}", hex::encode(hasher.finalize())),
            block_number: self.block_number,
            from: *from,
            to,
            contract_address,
            gas_used,
            effective_gas_price,
            fee,
            logs,
        }
    }
}
