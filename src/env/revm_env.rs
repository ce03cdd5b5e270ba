use super::{CallOutcome, CallRequest, CallStatus, ExecutionEnvironment, Faucet};
use crate::error::ExecutionError;
use alloy::primitives::{Address, Selector, U256};
use revm::db::{AccountState, InMemoryDB};
use revm::primitives::{
    AccountInfo, Address as RAddress, Bytecode, Bytes, ExecutionResult, Output, TransactTo,
    U256 as RU256,
};
use revm::Evm;

const DEFAULT_BLOCK_TIME: u64 = 12;

/// In-memory EVM session. Every call sees the state left by earlier committed calls.
#[derive(Debug, Default)]
pub struct RevmEnvironment {
    db: InMemoryDB,
    block_number: u64,
    timestamp: u64,
}

impl RevmEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Moves the block environment forward by `blocks`, at twelve seconds per block.
    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block_number = self.block_number.saturating_add(blocks);
        self.timestamp = self
            .timestamp
            .saturating_add(blocks.saturating_mul(DEFAULT_BLOCK_TIME));
    }

    /// Sets the balance of `account`, creating it if needed.
    pub fn fund(&mut self, account: Address, amount: U256) {
        let key = to_revm_address(account);
        let mut info = self.account(key);
        info.balance = to_revm_u256(amount);
        self.store(key, info);
    }

    pub fn balance(&self, account: Address) -> U256 {
        let info = self.account(to_revm_address(account));
        U256::from_be_bytes(info.balance.to_be_bytes::<32>())
    }

    /// Places runtime code directly at `address`, skipping the constructor.
    pub fn install_code(&mut self, address: Address, runtime: Vec<u8>) {
        let key = to_revm_address(address);
        let mut info = self.account(key);
        let code = Bytecode::new_raw(Bytes::from(runtime));
        info.code_hash = code.hash_slow();
        info.code = Some(code);
        self.store(key, info);
    }

    /// Runs `init_code` (constructor arguments already appended) and returns the new address.
    pub fn deploy(
        &mut self,
        deployer: Address,
        init_code: Vec<u8>,
        gas_limit: u64,
    ) -> Result<Address, ExecutionError> {
        let result = self.execute(
            deployer,
            TransactTo::Create,
            Bytes::from(init_code),
            U256::ZERO,
            gas_limit,
            true,
        )?;
        match result {
            ExecutionResult::Success {
                output: Output::Create(_, Some(created)),
                ..
            } => {
                let address = Address::from_slice(created.as_slice());
                tracing::info!(%address, block = self.block_number, "contract deployed");
                Ok(address)
            }
            ExecutionResult::Success { .. } => Err(ExecutionError::NoCreatedAddress),
            ExecutionResult::Revert { gas_used, output } => Err(ExecutionError::Reverted {
                gas_used,
                output: output.to_vec(),
            }),
            ExecutionResult::Halt { reason, gas_used } => Err(ExecutionError::Halted {
                gas_used,
                reason: format!("{reason:?}"),
            }),
        }
    }

    // Reads the cache directly. `Database::basic` would pin unknown addresses as non-existent.
    fn account(&self, key: RAddress) -> AccountInfo {
        self.db
            .accounts
            .get(&key)
            .and_then(|account| account.info())
            .unwrap_or_default()
    }

    fn store(&mut self, key: RAddress, info: AccountInfo) {
        self.db.insert_account_info(key, info);
        if let Some(account) = self.db.accounts.get_mut(&key) {
            if matches!(account.account_state, AccountState::NotExisting) {
                account.account_state = AccountState::None;
            }
        }
    }

    fn execute(
        &mut self,
        caller: Address,
        transact_to: TransactTo,
        data: Bytes,
        value: U256,
        gas_limit: u64,
        commit: bool,
    ) -> Result<ExecutionResult, ExecutionError> {
        let block_number = RU256::from(self.block_number);
        let timestamp = RU256::from(self.timestamp);
        let mut evm = Evm::builder()
            .with_db(&mut self.db)
            .modify_tx_env(|tx| {
                tx.caller = to_revm_address(caller);
                tx.transact_to = transact_to;
                tx.data = data;
                tx.value = to_revm_u256(value);
                tx.gas_limit = gas_limit;
            })
            .build();
        evm.context.evm.env.block.number = block_number;
        evm.context.evm.env.block.timestamp = timestamp;

        let result = if commit {
            evm.transact_commit()
        } else {
            evm.transact().map(|outcome| outcome.result)
        };
        result.map_err(|err| ExecutionError::Rejected(format!("{err:?}")))
    }
}

impl Faucet for RevmEnvironment {
    fn credit(&mut self, account: Address, amount: U256) {
        let balance = self.balance(account).saturating_add(amount);
        self.fund(account, balance);
        tracing::debug!(%account, %amount, "account credited");
    }
}

impl ExecutionEnvironment for RevmEnvironment {
    fn call_function(
        &mut self,
        target: Address,
        selector: Selector,
        request: &CallRequest,
    ) -> Result<CallOutcome, ExecutionError> {
        let mut calldata = Vec::with_capacity(4 + request.data.len());
        calldata.extend_from_slice(selector.as_slice());
        calldata.extend_from_slice(&request.data);
        let result = self.execute(
            request.caller,
            TransactTo::Call(to_revm_address(target)),
            Bytes::from(calldata),
            request.value,
            request.gas_limit,
            request.commit,
        )?;
        let (status, gas_used, output) = match result {
            ExecutionResult::Success {
                gas_used, output, ..
            } => (CallStatus::Success, gas_used, output.into_data().to_vec()),
            ExecutionResult::Revert { gas_used, output } => {
                (CallStatus::Reverted, gas_used, output.to_vec())
            }
            ExecutionResult::Halt { reason, gas_used } => {
                (CallStatus::Halted(format!("{reason:?}")), gas_used, Vec::new())
            }
        };
        tracing::debug!(
            %target,
            selector = %selector,
            gas_used,
            commit = request.commit,
            ?status,
            "call executed"
        );
        Ok(CallOutcome {
            status,
            gas_used,
            output,
            block_number: self.block_number,
        })
    }
}

fn to_revm_address(address: Address) -> RAddress {
    RAddress::from_slice(address.as_slice())
}

fn to_revm_u256(value: U256) -> RU256 {
    RU256::from_be_bytes(value.to_be_bytes::<32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    // PUSH1 0x2a PUSH1 0 MSTORE PUSH1 0x20 PUSH1 0 RETURN
    const RETURNS_42: [u8; 10] = [0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];

    // slot0 += 1; return slot0
    const COUNTER: [u8; 18] = [
        0x60, 0x00, 0x54, 0x60, 0x01, 0x01, 0x80, 0x60, 0x00, 0x55, 0x60, 0x00, 0x52, 0x60, 0x20,
        0x60, 0x00, 0xf3,
    ];

    fn init_code(runtime: &[u8]) -> Vec<u8> {
        let len = runtime.len() as u8;
        // PUSH1 len PUSH1 12 PUSH1 0 CODECOPY PUSH1 len PUSH1 0 RETURN
        let mut code = vec![0x60, len, 0x60, 0x0c, 0x60, 0x00, 0x39, 0x60, len, 0x60, 0x00, 0xf3];
        code.extend_from_slice(runtime);
        code
    }

    fn word(value: u64) -> Vec<u8> {
        U256::from(value).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn deployed_code_answers_calls() {
        let mut env = RevmEnvironment::new();
        let deployer = Address::repeat_byte(0x11);
        let target = env
            .deploy(deployer, init_code(&RETURNS_42), 500_000)
            .expect("deploys");
        let outcome = env
            .call_function(target, Selector::ZERO, &CallRequest::read_only(deployer))
            .expect("executes");
        assert!(outcome.is_success());
        assert!(outcome.gas_used > 21_000);
        assert_eq!(outcome.output, word(42));
    }

    #[test]
    fn only_committed_calls_persist_state() {
        let mut env = RevmEnvironment::new();
        let target = Address::repeat_byte(0x42);
        env.install_code(target, COUNTER.to_vec());
        let caller = Address::repeat_byte(0x01);

        let peek = CallRequest::read_only(caller);
        let first = env.call_function(target, Selector::ZERO, &peek).expect("executes");
        let second = env.call_function(target, Selector::ZERO, &peek).expect("executes");
        assert_eq!(first.output, word(1));
        assert_eq!(second.output, word(1));

        let mut write = CallRequest::read_only(caller);
        write.commit = true;
        env.call_function(target, Selector::ZERO, &write).expect("executes");
        env.call_function(target, Selector::ZERO, &write).expect("executes");
        let after = env.call_function(target, Selector::ZERO, &peek).expect("executes");
        assert_eq!(after.output, word(3));
    }

    #[test]
    fn funding_and_block_advance_are_visible() {
        let mut env = RevmEnvironment::new();
        let account = Address::repeat_byte(0x07);
        env.fund(account, U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(env.balance(account), U256::from(10u64).pow(U256::from(18u64)));
        env.advance_blocks(3);
        assert_eq!(env.block_number(), 3);
        assert_eq!(env.timestamp(), 36);
    }

    #[test]
    fn accounts_touched_by_reads_can_still_be_funded() {
        let mut env = RevmEnvironment::new();
        let target = Address::repeat_byte(0x42);
        let caller = Address::repeat_byte(0x09);
        // a read-only call caches both addresses as non-existent
        let empty = env
            .call_function(target, Selector::ZERO, &CallRequest::read_only(caller))
            .expect("executes");
        assert!(empty.output.is_empty());

        env.install_code(target, RETURNS_42.to_vec());
        env.fund(caller, U256::from(1_000u64));
        assert_eq!(env.balance(caller), U256::from(1_000u64));
        let outcome = env
            .call_function(target, Selector::ZERO, &CallRequest::read_only(caller))
            .expect("executes");
        assert_eq!(outcome.output, word(42));
    }

    #[test]
    fn funded_accounts_can_send_value() {
        let mut env = RevmEnvironment::new();
        let target = Address::repeat_byte(0x42);
        let sender = Address::repeat_byte(0x0b);
        env.install_code(target, RETURNS_42.to_vec());
        env.fund(sender, U256::from(5_000u64));

        let mut request = CallRequest::read_only(sender);
        request.commit = true;
        request.value = U256::from(1_200u64);
        let outcome = env
            .call_function(target, Selector::ZERO, &request)
            .expect("executes");
        assert!(outcome.is_success());
        assert_eq!(env.balance(sender), U256::from(3_800u64));
        assert_eq!(env.balance(target), U256::from(1_200u64));
    }

    #[test]
    fn credits_add_to_the_existing_balance() {
        let mut env = RevmEnvironment::new();
        let account = Address::repeat_byte(0x0c);
        env.credit(account, U256::from(10u64));
        env.credit(account, U256::from(15u64));
        assert_eq!(env.balance(account), U256::from(25u64));
    }
}
