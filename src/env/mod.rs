//! Execution-environment seam.
//!
//! The fuzzer never talks to a VM directly. Live bounds go through [`StateReader`], and
//! anything that needs to run a call goes through [`ExecutionEnvironment`]. [`RevmEnvironment`]
//! is the in-memory implementation; [`ContractReader`] turns an environment plus a contract ABI
//! into a state reader.

pub mod reader;
pub mod revm_env;

pub use reader::ContractReader;
pub use revm_env::RevmEnvironment;

use crate::abi::Scalar;
use crate::error::{ExecutionError, StateReadError};
use alloy::primitives::{Address, Selector, U256};

pub const DEFAULT_CALL_GAS_LIMIT: u64 = 1_000_000;

/// Resolves the value of a zero-argument getter on the contract under test.
pub trait StateReader {
    fn read(&mut self, name: &str) -> Result<Scalar, StateReadError>;
}

impl<F> StateReader for F
where
    F: FnMut(&str) -> Result<Scalar, StateReadError>,
{
    fn read(&mut self, name: &str) -> Result<Scalar, StateReadError> {
        self(name)
    }
}

/// Reader for sessions with no environment bound. Every read fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedReader;

impl StateReader for DetachedReader {
    fn read(&mut self, name: &str) -> Result<Scalar, StateReadError> {
        Err(StateReadError::Unbound(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub caller: Address,
    pub value: U256,
    /// ABI-encoded arguments, without the selector.
    pub data: Vec<u8>,
    /// Persist state changes. Read-only calls leave the environment untouched.
    pub commit: bool,
    pub gas_limit: u64,
}

impl CallRequest {
    pub fn read_only(caller: Address) -> Self {
        Self {
            caller,
            value: U256::ZERO,
            data: Vec::new(),
            commit: false,
            gas_limit: DEFAULT_CALL_GAS_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Reverted,
    Halted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub status: CallStatus,
    pub gas_used: u64,
    pub output: Vec<u8>,
    pub block_number: u64,
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CallStatus::Success
    }

    /// Returns the output bytes, or the failure as an error.
    pub fn into_output(self) -> Result<Vec<u8>, ExecutionError> {
        match self.status {
            CallStatus::Success => Ok(self.output),
            CallStatus::Reverted => Err(ExecutionError::Reverted {
                gas_used: self.gas_used,
                output: self.output,
            }),
            CallStatus::Halted(reason) => Err(ExecutionError::Halted {
                gas_used: self.gas_used,
                reason,
            }),
        }
    }
}

pub trait ExecutionEnvironment {
    fn call_function(
        &mut self,
        target: Address,
        selector: Selector,
        request: &CallRequest,
    ) -> Result<CallOutcome, ExecutionError>;
}

/// Source of funds for fuzzed sender accounts.
pub trait Faucet {
    /// Adds `amount` to the balance of `account`.
    fn credit(&mut self, account: Address, amount: U256);
}

impl<F> Faucet for F
where
    F: FnMut(Address, U256),
{
    fn credit(&mut self, account: Address, amount: U256) {
        self(account, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcomes_raise_on_access() {
        let reverted = CallOutcome {
            status: CallStatus::Reverted,
            gas_used: 21_500,
            output: vec![1, 2],
            block_number: 3,
        };
        assert_eq!(
            reverted.into_output(),
            Err(ExecutionError::Reverted {
                gas_used: 21_500,
                output: vec![1, 2]
            })
        );
        let ok = CallOutcome {
            status: CallStatus::Success,
            gas_used: 1,
            output: vec![7],
            block_number: 0,
        };
        assert_eq!(ok.into_output(), Ok(vec![7]));
    }

    #[test]
    fn closures_and_detached_readers_implement_state_reads() {
        let mut calls = 0;
        let mut reader = |name: &str| {
            calls += 1;
            if name == "cap" {
                Ok(Scalar::from_u64(10))
            } else {
                Err(StateReadError::UnknownGetter(name.to_string()))
            }
        };
        assert_eq!(reader.read("cap"), Ok(Scalar::from_u64(10)));
        assert!(reader.read("missing").is_err());
        assert_eq!(calls, 2);
        assert_eq!(
            DetachedReader.read("cap"),
            Err(StateReadError::Unbound("cap".to_string()))
        );
    }
}
