//! ERC20 token ledger and the in-process devnet used to exercise it.
//!
//! * [`ledger`] — balances, fixed supply, transfers, allowances and the
//!   append-only event log.
//! * [`devnet`] — signers, native value transfers with fees, token
//!   deployment and calls producing receipts.
//! * [`harness`] — balance-change, event and revert matchers.
//! * [`scenario`] — the stock ERC20 check suite built on the above.

pub mod address;
pub mod config;
pub mod devnet;
pub mod harness;
pub mod ledger;
pub mod scenario;
pub mod units;

pub use address::Address;
pub use devnet::{Devnet, DevnetError, Receipt, TxRequest};
pub use ledger::{LedgerError, TokenCall, TokenEvent, TokenLedger, TokenMetadata};
pub use units::Amount;
