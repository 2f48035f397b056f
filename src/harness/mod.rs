//! Assertion helpers in the style of chain test matchers: balance deltas
//! around an action, emitted events, and revert reasons.

use crate::address::Address;
use crate::devnet::{Devnet, DevnetError, Receipt};
use crate::ledger::TokenEvent;
use crate::units::Amount;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("expected event {expected:?}, receipt logged {logged:?}")]
    EventNotEmitted {
        expected: TokenEvent,
        logged: Vec<TokenEvent>,
    },
    #[error("expected revert with {expected:?}, but the transaction succeeded")]
    DidNotRevert { expected: String },
    #[error("expected revert with {expected:?}, got {actual}")]
    WrongRevert { expected: String, actual: String },
    #[error("balance of {account} changed by {actual}, expected {expected}")]
    BalanceDelta {
        account: Address,
        expected: i128,
        actual: i128,
    },
    #[error("balance of {account} is {actual}, expected {expected}")]
    Balance {
        account: Address,
        expected: Amount,
        actual: Amount,
    },
    #[error("got {accounts} accounts, {actual} measured and {expected} expected deltas")]
    LengthMismatch {
        accounts: usize,
        actual: usize,
        expected: usize,
    },
    #[error("check does not apply: {0}")]
    NotApplicable(String),
    #[error("balance of {account} does not fit a signed delta")]
    DeltaOutOfRange { account: Address },
    #[error(transparent)]
    Devnet(#[from] DevnetError),
}

fn delta(account: &Address, before: Amount, after: Amount) -> Result<i128, HarnessError> {
    match (i128::try_from(before), i128::try_from(after)) {
        // both non-negative, so the difference cannot overflow
        (Ok(before), Ok(after)) => Ok(after - before),
        _ => Err(HarnessError::DeltaOutOfRange { account: *account }),
    }
}

/// Runs `action` and reports how the native balance of `account` moved.
pub fn change_balance<T, F>(
    devnet: &mut Devnet,
    account: &Address,
    action: F,
) -> Result<(T, i128), HarnessError>
where
    F: FnOnce(&mut Devnet) -> Result<T, DevnetError>,
{
    let (out, deltas) = change_balances(devnet, std::slice::from_ref(account), action)?;
    Ok((out, deltas[0]))
}

pub fn change_balances<T, F>(
    devnet: &mut Devnet,
    accounts: &[Address],
    action: F,
) -> Result<(T, Vec<i128>), HarnessError>
where
    F: FnOnce(&mut Devnet) -> Result<T, DevnetError>,
{
    let before: Vec<Amount> = accounts.iter().map(|a| devnet.native_balance(a)).collect();
    let out = action(&mut *devnet)?;
    let deltas = accounts
        .iter()
        .zip(before)
        .map(|(a, b)| delta(a, b, devnet.native_balance(a)))
        .collect::<Result<_, _>>()?;
    Ok((out, deltas))
}

/// Same as [`change_balances`] but reads balances of the token at `token`.
pub fn change_token_balances<T, F>(
    devnet: &mut Devnet,
    token: &Address,
    accounts: &[Address],
    action: F,
) -> Result<(T, Vec<i128>), HarnessError>
where
    F: FnOnce(&mut Devnet) -> Result<T, DevnetError>,
{
    let before: Vec<Amount> = {
        let ledger = devnet.token(token)?;
        accounts.iter().map(|a| ledger.balance_of(a)).collect()
    };
    let out = action(&mut *devnet)?;
    let ledger = devnet.token(token)?;
    let deltas = accounts
        .iter()
        .zip(before)
        .map(|(a, b)| delta(a, b, ledger.balance_of(a)))
        .collect::<Result<_, _>>()?;
    Ok((out, deltas))
}

pub fn expect_deltas(
    accounts: &[Address],
    actual: &[i128],
    expected: &[i128],
) -> Result<(), HarnessError> {
    if accounts.len() != actual.len() || accounts.len() != expected.len() {
        return Err(HarnessError::LengthMismatch {
            accounts: accounts.len(),
            actual: actual.len(),
            expected: expected.len(),
        });
    }
    for ((account, actual), expected) in accounts.iter().zip(actual).zip(expected) {
        if actual != expected {
            return Err(HarnessError::BalanceDelta {
                account: *account,
                expected: *expected,
                actual: *actual,
            });
        }
    }
    Ok(())
}

pub fn expect_balance(
    account: &Address,
    actual: Amount,
    expected: Amount,
) -> Result<(), HarnessError> {
    if actual == expected {
        return Ok(());
    }
    Err(HarnessError::Balance {
        account: *account,
        expected,
        actual,
    })
}

pub fn assert_emitted(receipt: &Receipt, expected: &TokenEvent) -> Result<(), HarnessError> {
    if receipt.logs.contains(expected) {
        return Ok(());
    }
    Err(HarnessError::EventNotEmitted {
        expected: expected.clone(),
        logged: receipt.logs.clone(),
    })
}

/// Passes only when `result` is a revert carrying exactly `reason`.
pub fn expect_revert_with<T>(
    result: Result<T, DevnetError>,
    reason: &str,
) -> Result<(), HarnessError> {
    match result {
        Ok(_) => Err(HarnessError::DidNotRevert {
            expected: reason.to_string(),
        }),
        Err(err) => match err.revert_reason() {
            Some(actual) if actual == reason => Ok(()),
            _ => Err(HarnessError::WrongRevert {
                expected: reason.to_string(),
                actual: err.to_string(),
            }),
        },
    }
}
