use serde::Serialize;
use tracing::{info, warn};

use crate::address::Address;
use crate::config::DevnetConfig;
use crate::devnet::{Devnet, DevnetError, TxRequest};
use crate::harness::{
    assert_emitted, change_balance, change_balances, expect_balance, expect_deltas,
    expect_revert_with, HarnessError,
};
use crate::ledger::TokenEvent;
use crate::units::Amount;

const NATIVE_SEND: Amount = 200;
const TOKEN_SEND: Amount = 7;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    /// Set when the check could not be expressed for this configuration.
    pub skipped: bool,
    pub detail: Option<String>,
}

/// Fresh devnet with the configured token deployed by signer 0.
struct Fixture {
    devnet: Devnet,
    token: Address,
    deployer: Address,
    user: Address,
    total: Amount,
}

impl Fixture {
    fn new(config: &DevnetConfig) -> Result<Self, HarnessError> {
        let mut devnet = Devnet::new(config)?;
        let deployer = devnet.signer(0)?;
        let user = devnet.signer(1)?;
        let total = config.token.supply().map_err(DevnetError::from)?;
        let receipt = devnet.deploy_token(&deployer, config.token.metadata(), total, None)?;
        let token = receipt
            .contract_address
            .ok_or(DevnetError::UnknownToken(receipt.to))?;
        Ok(Self {
            devnet,
            token,
            deployer,
            user,
            total,
        })
    }
}

type Check = fn(&mut Fixture) -> Result<(), HarnessError>;

fn assigns_initial_balance(f: &mut Fixture) -> Result<(), HarnessError> {
    let balance = f.devnet.token(&f.token)?.balance_of(&f.deployer);
    expect_balance(&f.deployer, balance, f.total)
}

fn transfer_emits_event(f: &mut Fixture) -> Result<(), HarnessError> {
    let receipt = f
        .devnet
        .token_transfer(&f.deployer, &f.token, &f.user, TOKEN_SEND)?;
    assert_emitted(
        &receipt,
        &TokenEvent::Transfer {
            from: f.deployer,
            to: f.user,
            value: TOKEN_SEND,
        },
    )
}

fn cannot_transfer_above_amount(f: &mut Fixture) -> Result<(), HarnessError> {
    let above = f.total.checked_add(1).ok_or_else(|| {
        HarnessError::NotApplicable("supply is the largest representable amount".to_string())
    })?;
    let result = f
        .devnet
        .token_transfer(&f.deployer, &f.token, &f.deployer, above);
    expect_revert_with(result, "ERC20: transfer amount exceeds balance")
}

fn zero_fee_send(f: &Fixture) -> TxRequest {
    TxRequest {
        from: f.deployer,
        to: f.user,
        value: NATIVE_SEND,
        gas_price: Some(0),
    }
}

fn send_changes_receiver_balance(f: &mut Fixture) -> Result<(), HarnessError> {
    let tx = zero_fee_send(f);
    let (_, delta) = change_balance(&mut f.devnet, &f.user, |net| net.send_transaction(tx))?;
    expect_deltas(&[f.user], &[delta], &[NATIVE_SEND as i128])
}

fn send_changes_both_balances(f: &mut Fixture) -> Result<(), HarnessError> {
    let tx = zero_fee_send(f);
    let accounts = [f.deployer, f.user];
    let (_, deltas) = change_balances(&mut f.devnet, &accounts, |net| net.send_transaction(tx))?;
    expect_deltas(
        &accounts,
        &deltas,
        &[-(NATIVE_SEND as i128), NATIVE_SEND as i128],
    )
}

const CHECKS: &[(&str, Check)] = &[
    ("assigns initial balance", assigns_initial_balance),
    ("transfer emits event", transfer_emits_event),
    ("can not transfer above the amount", cannot_transfer_above_amount),
    ("send transaction changes receiver balance", send_changes_receiver_balance),
    (
        "send transaction changes sender and receiver balances",
        send_changes_both_balances,
    ),
];

/// Runs every ERC20 check, each against its own freshly deployed token.
pub fn run_erc20_suite(config: &DevnetConfig) -> Vec<CheckOutcome> {
    CHECKS
        .iter()
        .map(|&(name, check)| {
            let result = Fixture::new(config).and_then(|mut fixture| check(&mut fixture));
            match result {
                Ok(()) => {
                    info!(check = name, "passed");
                    CheckOutcome {
                        name,
                        passed: true,
                        skipped: false,
                        detail: None,
                    }
                }
                Err(HarnessError::NotApplicable(reason)) => {
                    info!(check = name, %reason, "skipped");
                    CheckOutcome {
                        name,
                        passed: true,
                        skipped: true,
                        detail: Some(reason),
                    }
                }
                Err(err) => {
                    warn!(check = name, error = %err, "failed");
                    CheckOutcome {
                        name,
                        passed: false,
                        skipped: false,
                        detail: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_suite_passes() {
        let outcomes = run_erc20_suite(&DevnetConfig::default());
        assert_eq!(outcomes.len(), 5);
        for outcome in &outcomes {
            assert!(outcome.passed, "{}: {:?}", outcome.name, outcome.detail);
            assert!(!outcome.skipped);
        }
    }

    #[test]
    fn maximal_supply_skips_the_overdraft_check() {
        let mut config = DevnetConfig::default();
        config.token.initial_supply = "340282366920938463463.374607431768211455".to_string();
        assert_eq!(config.token.supply().unwrap(), Amount::MAX);
        let outcomes = run_erc20_suite(&config);
        assert_eq!(outcomes.len(), 5);
        for outcome in &outcomes {
            assert!(outcome.passed, "{}: {:?}", outcome.name, outcome.detail);
        }
        let skipped: Vec<_> = outcomes
            .iter()
            .filter(|o| o.skipped)
            .map(|o| o.name)
            .collect();
        assert_eq!(skipped, vec!["can not transfer above the amount"]);
    }

    #[test]
    fn unfunded_signers_fail_native_checks() {
        let config = DevnetConfig {
            initial_balance: "0".to_string(),
            gas_price: 0,
            ..DevnetConfig::default()
        };
        let outcomes = run_erc20_suite(&config);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| !o.passed)
            .map(|o| o.name)
            .collect();
        assert_eq!(
            failed,
            vec![
                "send transaction changes receiver balance",
                "send transaction changes sender and receiver balances"
            ]
        );
    }
}
