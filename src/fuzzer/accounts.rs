//! Sender accounts for fuzzed calls.
//!
//! The pool grows as it is used: each draw opens a fresh account with a configured chance (always
//! on the first draw), funding it through a [`Faucet`], and otherwise reuses a known one. Call
//! values are drawn from the sender's tracked balance and deducted from it.

use crate::abi::scalar::random_up_to;
use crate::env::Faucet;
use alloy::primitives::{Address, U256};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

pub const DEFAULT_NEW_ACCOUNT_PERCENT: u8 = 25;
pub const DEFAULT_MAX_BALANCE: u128 = 10_000_000_000;

#[derive(Debug, Clone)]
pub struct AccountPool {
    accounts: Vec<Address>,
    balances: HashMap<Address, U256>,
    new_account_percent: u8,
    max_balance: U256,
}

impl Default for AccountPool {
    fn default() -> Self {
        Self::new(DEFAULT_NEW_ACCOUNT_PERCENT, DEFAULT_MAX_BALANCE)
    }
}

impl AccountPool {
    pub fn new(new_account_percent: u8, max_balance: u128) -> Self {
        Self {
            accounts: Vec::new(),
            balances: HashMap::new(),
            new_account_percent: new_account_percent.min(100),
            max_balance: U256::from(max_balance),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Accounts in the order they were opened.
    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    /// Funds not yet spent as call value. Unknown accounts hold nothing.
    pub fn balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    /// Picks the sender of the next call.
    pub fn next_sender<R: Rng + ?Sized>(&mut self, rng: &mut R, faucet: &mut dyn Faucet) -> Address {
        let open = self.accounts.is_empty()
            || rng.gen_range(0..100u8) < self.new_account_percent;
        if open {
            return self.open(rng, faucet);
        }
        match self.accounts.choose(rng) {
            Some(account) => *account,
            None => self.open(rng, faucet),
        }
    }

    /// Uniform value in `[0, balance]` for `sender`, deducted from its tracked balance.
    pub fn draw_value<R: Rng + ?Sized>(&mut self, rng: &mut R, sender: Address) -> U256 {
        let Some(balance) = self.balances.get_mut(&sender) else {
            return U256::ZERO;
        };
        let value = random_up_to(rng, *balance);
        *balance -= value;
        value
    }

    fn open<R: Rng + ?Sized>(&mut self, rng: &mut R, faucet: &mut dyn Faucet) -> Address {
        let account = loop {
            let candidate = Address::from(rng.gen::<[u8; 20]>());
            if candidate != Address::ZERO && !self.balances.contains_key(&candidate) {
                break candidate;
            }
        };
        let balance = random_up_to(rng, self.max_balance);
        faucet.credit(account, balance);
        self.accounts.push(account);
        self.balances.insert(account, balance);
        tracing::debug!(%account, %balance, accounts = self.accounts.len(), "sender account opened");
        account
    }
}
