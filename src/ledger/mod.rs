use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::address::Address;
use crate::units::{Amount, DEFAULT_DECIMALS};

/// Allowance value that `transfer_from` never decrements.
pub const UNLIMITED_ALLOWANCE: Amount = Amount::MAX;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ERC20: transfer amount exceeds balance")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        needed: Amount,
    },
    #[error("ERC20: transfer amount exceeds allowance")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        needed: Amount,
    },
    #[error("ERC20: decreased allowance below zero")]
    AllowanceUnderflow {
        owner: Address,
        spender: Address,
    },
    #[error("ERC20: allowance overflow")]
    AllowanceOverflow {
        owner: Address,
        spender: Address,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: "ERC20".to_string(),
            symbol: "ERC20".to_string(),
            decimals: DEFAULT_DECIMALS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenEvent {
    Transfer {
        from: Address,
        to: Address,
        value: Amount,
    },
    Approval {
        owner: Address,
        spender: Address,
        value: Amount,
    },
}

/// A state-changing call against the ledger; the caller is supplied separately.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenCall {
    Transfer {
        to: Address,
        amount: Amount,
    },
    Approve {
        spender: Address,
        amount: Amount,
    },
    TransferFrom {
        from: Address,
        to: Address,
        amount: Amount,
    },
    IncreaseAllowance {
        spender: Address,
        added: Amount,
    },
    DecreaseAllowance {
        spender: Address,
        subtracted: Amount,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceEntry {
    pub owner: Address,
    pub spender: Address,
    pub amount: Amount,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub metadata: TokenMetadata,
    pub total_supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
    pub allowances: Vec<AllowanceEntry>,
    pub event_count: usize,
    #[serde(with = "hex_root")]
    pub state_root: [u8; 32],
}

/// ERC20 balance ledger. Total supply is fixed at construction and the sum
/// of all balances always equals it.
#[derive(Clone, Debug)]
pub struct TokenLedger {
    metadata: TokenMetadata,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
    events: Vec<TokenEvent>,
}

impl TokenLedger {
    /// Mints `initial_supply` to `deployer`.
    pub fn new(deployer: Address, metadata: TokenMetadata, initial_supply: Amount) -> Self {
        let mut ledger = Self {
            metadata,
            total_supply: initial_supply,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
            events: Vec::new(),
        };
        ledger.credit(&deployer, initial_supply);
        ledger.events.push(TokenEvent::Transfer {
            from: Address::ZERO,
            to: deployer,
            value: initial_supply,
        });
        debug!(%deployer, supply = initial_supply, symbol = %ledger.metadata.symbol, "token minted");
        ledger
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Zero for accounts that were never credited.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of every balance; equals `total_supply` at all times.
    pub fn circulating(&self) -> Amount {
        self.balances.values().sum()
    }

    pub fn events(&self) -> &[TokenEvent] {
        &self.events
    }

    /// Events appended after the first `cursor` entries.
    pub fn events_since(&self, cursor: usize) -> &[TokenEvent] {
        self.events.get(cursor..).unwrap_or(&[])
    }

    pub fn transfer(
        &mut self,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        self.move_balance(caller, to, amount)?;
        Ok(true)
    }

    pub fn approve(
        &mut self,
        caller: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        self.set_allowance(caller, spender, amount);
        Ok(true)
    }

    pub fn transfer_from(
        &mut self,
        caller: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<bool, LedgerError> {
        let allowance = self.allowance(from, caller);
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                spender: *caller,
                allowance,
                needed: amount,
            });
        }
        // balance is checked before the allowance is touched
        self.move_balance(from, to, amount)?;
        if allowance != UNLIMITED_ALLOWANCE {
            self.allowances.insert((*from, *caller), allowance - amount);
        }
        Ok(true)
    }

    pub fn increase_allowance(
        &mut self,
        caller: &Address,
        spender: &Address,
        added: Amount,
    ) -> Result<bool, LedgerError> {
        let current = self.allowance(caller, spender);
        let next = current
            .checked_add(added)
            .ok_or(LedgerError::AllowanceOverflow {
                owner: *caller,
                spender: *spender,
            })?;
        self.set_allowance(caller, spender, next);
        Ok(true)
    }

    pub fn decrease_allowance(
        &mut self,
        caller: &Address,
        spender: &Address,
        subtracted: Amount,
    ) -> Result<bool, LedgerError> {
        let current = self.allowance(caller, spender);
        let next = current
            .checked_sub(subtracted)
            .ok_or(LedgerError::AllowanceUnderflow {
                owner: *caller,
                spender: *spender,
            })?;
        self.set_allowance(caller, spender, next);
        Ok(true)
    }

    pub fn apply(&mut self, caller: &Address, call: &TokenCall) -> Result<bool, LedgerError> {
        match call {
            TokenCall::Transfer { to, amount } => self.transfer(caller, to, *amount),
            TokenCall::Approve { spender, amount } => self.approve(caller, spender, *amount),
            TokenCall::TransferFrom { from, to, amount } => {
                self.transfer_from(caller, from, to, *amount)
            }
            TokenCall::IncreaseAllowance { spender, added } => {
                self.increase_allowance(caller, spender, *added)
            }
            TokenCall::DecreaseAllowance {
                spender,
                subtracted,
            } => self.decrease_allowance(caller, spender, *subtracted),
        }
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            metadata: self.metadata.clone(),
            total_supply: self.total_supply,
            balances: self.balances.clone(),
            allowances: self
                .allowances
                .iter()
                .map(|((owner, spender), amount)| AllowanceEntry {
                    owner: *owner,
                    spender: *spender,
                    amount: *amount,
                })
                .collect(),
            event_count: self.events.len(),
            state_root: compute_state_root(&self.balances, &self.allowances),
        }
    }

    fn move_balance(
        &mut self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                balance,
                needed: amount,
            });
        }
        self.balances.insert(*from, balance - amount);
        self.credit(to, amount);
        self.events.push(TokenEvent::Transfer {
            from: *from,
            to: *to,
            value: amount,
        });
        debug!(%from, %to, amount, "token transfer");
        Ok(())
    }

    // Cannot overflow: every balance is bounded by total_supply.
    fn credit(&mut self, account: &Address, amount: Amount) {
        *self.balances.entry(*account).or_insert(0) += amount;
    }

    fn set_allowance(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        self.allowances.insert((*owner, *spender), amount);
        self.events.push(TokenEvent::Approval {
            owner: *owner,
            spender: *spender,
            value: amount,
        });
        debug!(%owner, %spender, amount, "allowance set");
    }
}

fn compute_state_root(
    balances: &BTreeMap<Address, Amount>,
    allowances: &BTreeMap<(Address, Address), Amount>,
) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, balance) in balances {
        let mut hasher = Sha256::new();
        hasher.update(b"bal");
        hasher.update(account.as_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for ((owner, spender), amount) in allowances {
        let mut hasher = Sha256::new();
        hasher.update(b"allow");
        hasher.update(owner.as_bytes());
        hasher.update(spender.as_bytes());
        hasher.update(amount.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"erc20-ledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

mod hex_root {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(root: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(root))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("state root must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPLY: Amount = 10_000_000_000_000_000_000;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn ledger() -> (TokenLedger, Address, Address) {
        let deployer = addr(1);
        let user = addr(2);
        (
            TokenLedger::new(deployer, TokenMetadata::default(), SUPPLY),
            deployer,
            user,
        )
    }

    fn last_event(ledger: &TokenLedger) -> &TokenEvent {
        ledger.events().last().unwrap()
    }

    #[test]
    fn construction_credits_deployer_only() {
        let (ledger, deployer, user) = ledger();
        assert_eq!(ledger.balance_of(&deployer), SUPPLY);
        assert_eq!(ledger.balance_of(&user), 0);
        assert_eq!(ledger.balance_of(&Address::ZERO), 0);
        assert_eq!(ledger.total_supply(), SUPPLY);
        assert_eq!(ledger.circulating(), SUPPLY);
        assert_eq!(
            ledger.events(),
            &[TokenEvent::Transfer {
                from: Address::ZERO,
                to: deployer,
                value: SUPPLY
            }]
        );
    }

    #[test]
    fn transfer_moves_value_and_logs_once() {
        let (mut ledger, deployer, user) = ledger();
        assert!(ledger.transfer(&deployer, &user, 7).unwrap());
        assert_eq!(ledger.balance_of(&deployer), SUPPLY - 7);
        assert_eq!(ledger.balance_of(&user), 7);
        assert_eq!(ledger.events_since(1).len(), 1);
        assert_eq!(
            last_event(&ledger),
            &TokenEvent::Transfer {
                from: deployer,
                to: user,
                value: 7
            }
        );
    }

    #[test]
    fn overdraft_is_rejected_without_effect() {
        let (mut ledger, deployer, _) = ledger();
        let before = ledger.snapshot();
        let err = ledger.transfer(&deployer, &deployer, SUPPLY + 1).unwrap_err();
        assert_eq!(err.to_string(), "ERC20: transfer amount exceeds balance");
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: deployer,
                balance: SUPPLY,
                needed: SUPPLY + 1
            }
        );
        assert_eq!(ledger.snapshot(), before);
    }

    #[test]
    fn unfunded_account_cannot_send() {
        let (mut ledger, deployer, user) = ledger();
        assert!(ledger.transfer(&user, &deployer, 1).is_err());
        assert!(ledger.transfer(&user, &deployer, 0).unwrap());
    }

    #[test]
    fn zero_and_self_transfers_emit_without_moving_value() {
        let (mut ledger, deployer, user) = ledger();
        ledger.transfer(&deployer, &user, 0).unwrap();
        assert_eq!(ledger.balance_of(&user), 0);
        assert_eq!(
            last_event(&ledger),
            &TokenEvent::Transfer {
                from: deployer,
                to: user,
                value: 0
            }
        );

        ledger.transfer(&deployer, &deployer, 5).unwrap();
        assert_eq!(ledger.balance_of(&deployer), SUPPLY);
        assert_eq!(
            last_event(&ledger),
            &TokenEvent::Transfer {
                from: deployer,
                to: deployer,
                value: 5
            }
        );
        assert_eq!(ledger.events().len(), 3);
    }

    #[test]
    fn conservation_holds_across_transfer_sequences() {
        let (mut ledger, deployer, _) = ledger();
        let accounts: Vec<Address> = (2..8).map(addr).collect();
        for (i, to) in accounts.iter().enumerate() {
            ledger.transfer(&deployer, to, (i as Amount + 1) * 1_000).unwrap();
        }
        for window in accounts.windows(2) {
            let amount = ledger.balance_of(&window[0]) / 2;
            ledger.transfer(&window[0], &window[1], amount).unwrap();
            let _ = ledger.transfer(&window[1], &window[0], Amount::MAX);
            assert_eq!(ledger.circulating(), ledger.total_supply());
        }
    }

    #[test]
    fn transfer_from_spends_allowance() {
        let (mut ledger, deployer, spender) = ledger();
        let receiver = addr(3);
        ledger.approve(&deployer, &spender, 100).unwrap();
        assert_eq!(
            last_event(&ledger),
            &TokenEvent::Approval {
                owner: deployer,
                spender,
                value: 100
            }
        );

        ledger.transfer_from(&spender, &deployer, &receiver, 60).unwrap();
        assert_eq!(ledger.allowance(&deployer, &spender), 40);
        assert_eq!(ledger.balance_of(&receiver), 60);

        let err = ledger
            .transfer_from(&spender, &deployer, &receiver, 41)
            .unwrap_err();
        assert_eq!(err.to_string(), "ERC20: transfer amount exceeds allowance");
        assert_eq!(ledger.allowance(&deployer, &spender), 40);
        assert_eq!(ledger.balance_of(&receiver), 60);
    }

    #[test]
    fn transfer_from_checks_owner_balance_before_spending_allowance() {
        let (mut ledger, _, owner) = ledger();
        let spender = addr(4);
        ledger.approve(&owner, &spender, 10).unwrap();
        let events = ledger.events().len();
        let err = ledger.transfer_from(&spender, &owner, &spender, 10).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.allowance(&owner, &spender), 10);
        assert_eq!(ledger.events().len(), events);
    }

    #[test]
    fn unlimited_allowance_is_not_decremented() {
        let (mut ledger, deployer, spender) = ledger();
        ledger
            .approve(&deployer, &spender, UNLIMITED_ALLOWANCE)
            .unwrap();
        ledger.transfer_from(&spender, &deployer, &spender, 500).unwrap();
        assert_eq!(ledger.allowance(&deployer, &spender), UNLIMITED_ALLOWANCE);
    }

    #[test]
    fn allowance_adjustments_are_checked() {
        let (mut ledger, deployer, spender) = ledger();
        ledger.increase_allowance(&deployer, &spender, 5).unwrap();
        ledger.increase_allowance(&deployer, &spender, 5).unwrap();
        assert_eq!(ledger.allowance(&deployer, &spender), 10);
        ledger.decrease_allowance(&deployer, &spender, 4).unwrap();
        assert_eq!(ledger.allowance(&deployer, &spender), 6);
        let err = ledger
            .decrease_allowance(&deployer, &spender, 7)
            .unwrap_err();
        assert_eq!(err.to_string(), "ERC20: decreased allowance below zero");
        assert!(ledger
            .increase_allowance(&deployer, &spender, Amount::MAX)
            .is_err());
        assert_eq!(ledger.allowance(&deployer, &spender), 6);
    }

    #[test]
    fn apply_dispatches_calls() {
        let (mut ledger, deployer, user) = ledger();
        ledger
            .apply(&deployer, &TokenCall::Transfer { to: user, amount: 9 })
            .unwrap();
        ledger
            .apply(
                &user,
                &TokenCall::Approve {
                    spender: deployer,
                    amount: 3,
                },
            )
            .unwrap();
        ledger
            .apply(
                &deployer,
                &TokenCall::TransferFrom {
                    from: user,
                    to: deployer,
                    amount: 3,
                },
            )
            .unwrap();
        assert_eq!(ledger.balance_of(&user), 6);
        assert_eq!(ledger.allowance(&user, &deployer), 0);
    }

    #[test]
    fn state_root_tracks_balances() {
        let (mut ledger, deployer, user) = ledger();
        let root1 = ledger.snapshot().state_root;
        assert_eq!(root1, ledger.snapshot().state_root);
        ledger.transfer(&deployer, &user, 1).unwrap();
        let snapshot = ledger.snapshot();
        assert_ne!(root1, snapshot.state_root);

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: TokenSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
