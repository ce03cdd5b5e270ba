//! Per-argument fuzzer assembly.
//!
//! The first request for a `(contract, function, type, argument)` key builds a generator, applies
//! the matching rule-file constraints and then the function's guard constraints for that
//! argument, and caches the result. Later requests re-sample the cached generator.
//!
//! Whole calls also get a sender from the [`AccountPool`] and, for payable functions, a value
//! drawn from that sender's balance.

pub mod accounts;

pub use accounts::AccountPool;

use crate::abi::codec::encode_arguments;
use crate::abi::AbiType;
use crate::ast::{GuardIndex, Node};
use crate::config::FuzzConfig;
use crate::constraints::NarrowingError;
use crate::env::{CallRequest, ContractReader, ExecutionEnvironment, Faucet, StateReader};
use crate::error::{FuzzError, InvalidRuleSpec, Result, UnsatisfiableConstraints};
use crate::generators::{GenContext, Generator};
use crate::rules::RuleSet;
use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::{Function, JsonAbi, StateMutability};
use alloy::primitives::{Address, Selector, U256};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuzzKey {
    pub contract: String,
    pub function: String,
    pub arg_type: AbiType,
    pub arg_name: String,
}

impl FuzzKey {
    pub fn new(contract: &str, function: &str, arg_type: AbiType, arg_name: &str) -> Self {
        Self {
            contract: contract.to_string(),
            function: function.to_string(),
            arg_type,
            arg_name: arg_name.to_string(),
        }
    }
}

/// A complete fuzzed call: who sends it, what it carries and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzedCall {
    pub sender: Address,
    pub value: U256,
    pub selector: Selector,
    /// ABI-encoded arguments, without the selector.
    pub data: Vec<u8>,
    pub gas_limit: u64,
}

impl FuzzedCall {
    pub fn calldata(&self) -> Vec<u8> {
        let mut calldata = self.selector.to_vec();
        calldata.extend_from_slice(&self.data);
        calldata
    }

    /// A committing request carrying this call's sender, value and arguments.
    pub fn request(&self) -> CallRequest {
        CallRequest {
            caller: self.sender,
            value: self.value,
            data: self.data.clone(),
            commit: true,
            gas_limit: self.gas_limit,
        }
    }
}

pub struct ArgumentFuzzer {
    config: FuzzConfig,
    rules: RuleSet,
    guards: GuardIndex,
    cache: HashMap<FuzzKey, Generator>,
    accounts: AccountPool,
    rng: StdRng,
}

impl ArgumentFuzzer {
    pub fn new(config: FuzzConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let accounts = AccountPool::new(config.new_account_percent, config.max_balance);
        Self {
            config,
            rules: RuleSet::empty(),
            guards: GuardIndex::new(),
            cache: HashMap::new(),
            accounts,
            rng,
        }
    }

    /// Builds a fuzzer and loads the configured rule file, if any.
    pub fn from_config(config: FuzzConfig) -> Result<Self> {
        let rules = match &config.rules_path {
            Some(path) => RuleSet::load(path)?,
            None => RuleSet::empty(),
        };
        Ok(Self::new(config).with_rules(rules))
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self.cache.clear();
        self
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    pub fn guards(&self) -> &GuardIndex {
        &self.guards
    }

    pub fn accounts(&self) -> &AccountPool {
        &self.accounts
    }

    /// Indexes the guards of every function in a solc source unit.
    pub fn index_source_unit(&mut self, unit: &Node) {
        self.guards.add_source_unit(unit);
    }

    pub fn generator(&self, key: &FuzzKey) -> Option<&Generator> {
        self.cache.get(key)
    }

    pub fn cached_generators(&self) -> usize {
        self.cache.len()
    }

    /// Drops every cached generator; the next request for each key rebuilds it.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    pub fn fuzz_arg(
        &mut self,
        contract: &str,
        function: &str,
        arg_type: &str,
        arg_name: &str,
        reader: &mut dyn StateReader,
    ) -> Result<DynSolValue> {
        let ty = AbiType::parse(arg_type)?;
        self.fuzz_key(FuzzKey::new(contract, function, ty, arg_name), reader)
    }

    pub fn fuzz_key(&mut self, key: FuzzKey, reader: &mut dyn StateReader) -> Result<DynSolValue> {
        let generator = match self.cache.entry(key.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let generator = assemble(&self.rules, &self.guards, &key, reader)?;
                entry.insert(generator)
            }
        };
        let mut ctx = GenContext {
            rng: &mut self.rng,
            reader,
            lengths: self.config.lengths(),
            max_attempts: self.config.max_attempts,
        };
        let value = generator.next(&mut ctx).map_err(|err| match err {
            NarrowingError::Bound(err) => err,
            NarrowingError::Empty(reason) => {
                let live = generator
                    .domain()
                    .map(|d| d.describe())
                    .unwrap_or_else(|| generator.name());
                unsatisfiable(&key, &live, reason, &[])
            }
            NarrowingError::NotApplicable(kind) => unsatisfiable(
                &key,
                &kind.as_str(),
                "constraint does not apply".to_string(),
                &[],
            ),
        })?;
        generator.validate(&value)?;
        Ok(value)
    }

    /// One value per declared input of `function`, in order.
    pub fn generate_arguments(
        &mut self,
        contract: &str,
        function: &Function,
        reader: &mut dyn StateReader,
    ) -> Result<Vec<DynSolValue>> {
        function
            .inputs
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let name = if param.name.is_empty() {
                    format!("_{i}")
                } else {
                    param.name.clone()
                };
                self.fuzz_arg(contract, &function.name, &param.selector_type(), &name, reader)
            })
            .collect()
    }

    /// Selector followed by ABI-encoded fuzzed arguments.
    pub fn generate_calldata(
        &mut self,
        contract: &str,
        function: &Function,
        reader: &mut dyn StateReader,
    ) -> Result<Vec<u8>> {
        let args = self.generate_arguments(contract, function, reader)?;
        let mut calldata = function.selector().to_vec();
        calldata.extend(encode_arguments(args));
        Ok(calldata)
    }

    /// Sender, value and arguments for one call of `function` on the contract at `target`.
    ///
    /// New senders are funded through `env`. Non-payable functions always get a zero value. Live
    /// bounds are read from `target` with the chosen sender as caller.
    pub fn generate_call<E>(
        &mut self,
        contract: &str,
        function: &Function,
        env: &mut E,
        target: Address,
        abi: &JsonAbi,
    ) -> Result<FuzzedCall>
    where
        E: ExecutionEnvironment + Faucet,
    {
        let sender = self.accounts.next_sender(&mut self.rng, env);
        let value = if function.state_mutability == StateMutability::Payable {
            self.accounts.draw_value(&mut self.rng, sender)
        } else {
            U256::ZERO
        };
        let mut reader = ContractReader::new(env, target, abi).with_caller(sender);
        let args = self.generate_arguments(contract, function, &mut reader)?;
        debug!(
            contract,
            function = %function.name,
            %sender,
            %value,
            "call generated"
        );
        Ok(FuzzedCall {
            sender,
            value,
            selector: function.selector(),
            data: encode_arguments(args),
            gas_limit: self.config.call_gas_limit,
        })
    }
}

fn assemble(
    rules: &RuleSet,
    guards: &GuardIndex,
    key: &FuzzKey,
    reader: &mut dyn StateReader,
) -> Result<Generator> {
    let mut generator = Generator::for_type(&key.arg_type);
    let mut applied = Vec::new();
    apply_rules(rules, key, &mut generator, &mut applied, reader)?;

    for constraint in guards.constraints_for(&key.contract, &key.function, &key.arg_name) {
        match generator.apply(constraint, reader) {
            Ok(()) => applied.push(constraint.to_string()),
            Err(NarrowingError::NotApplicable(kind)) => {
                warn!(
                    constraint = %constraint,
                    generator = kind.as_str(),
                    argument = %key.arg_name,
                    "guard constraint does not apply to argument type, skipped"
                );
            }
            Err(NarrowingError::Empty(reason)) => {
                return Err(unsatisfiable(key, constraint, reason, &applied))
            }
            Err(NarrowingError::Bound(err)) => return Err(err),
        }
    }

    debug!(
        contract = %key.contract,
        function = %key.function,
        argument = %key.arg_name,
        ty = %key.arg_type,
        constraints = applied.len(),
        "generator assembled"
    );
    Ok(generator)
}

/// Rule-file constraints for the generator's own type, then for every nested element type.
fn apply_rules(
    rules: &RuleSet,
    key: &FuzzKey,
    generator: &mut Generator,
    applied: &mut Vec<String>,
    reader: &mut dyn StateReader,
) -> Result<()> {
    if let Some(entry) = rules.lookup(&key.contract, &key.function, &generator.abi_type()) {
        for constraint in entry.selected() {
            match generator.apply(constraint, reader) {
                Ok(()) => applied.push(constraint.to_string()),
                Err(NarrowingError::NotApplicable(kind)) => {
                    return Err(InvalidRuleSpec::new(
                        format!("{}.{}.{}", key.contract, key.function, entry.ty),
                        format!("{constraint} does not apply to {}", kind.as_str()),
                    )
                    .into())
                }
                Err(NarrowingError::Empty(reason)) => {
                    return Err(unsatisfiable(key, constraint, reason, applied))
                }
                Err(NarrowingError::Bound(err)) => return Err(err),
            }
        }
    }
    for element in generator.elements_mut() {
        apply_rules(rules, key, element, applied, reader)?;
    }
    Ok(())
}

fn unsatisfiable(
    key: &FuzzKey,
    constraint: &dyn std::fmt::Display,
    reason: String,
    applied: &[String],
) -> FuzzError {
    let err = UnsatisfiableConstraints {
        contract: key.contract.clone(),
        function: key.function.clone(),
        argument: key.arg_name.clone(),
        arg_type: key.arg_type.to_string(),
        constraint: constraint.to_string(),
        reason,
        applied: applied.to_vec(),
    };
    warn!(
        contract = %err.contract,
        function = %err.function,
        argument = %err.argument,
        ty = %err.arg_type,
        constraint = %err.constraint,
        reason = %err.reason,
        applied = ?err.applied,
        "unsatisfiable constraint set"
    );
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::codec::scalar_from_value;
    use crate::abi::Scalar;
    use crate::env::DetachedReader;

    fn fuzzer() -> ArgumentFuzzer {
        ArgumentFuzzer::new(FuzzConfig::default().with_seed(7))
    }

    #[test]
    fn generators_are_cached_per_composite_key() {
        let mut fuzzer = fuzzer();
        let mut reader = DetachedReader;
        for _ in 0..5 {
            fuzzer.fuzz_arg("A", "f", "uint8", "x", &mut reader).expect("value");
        }
        fuzzer.fuzz_arg("A", "f", "uint8", "y", &mut reader).expect("value");
        fuzzer.fuzz_arg("A", "g", "uint8", "x", &mut reader).expect("value");
        fuzzer.fuzz_arg("A", "f", "uint16", "x", &mut reader).expect("value");
        assert_eq!(fuzzer.cached_generators(), 4);
    }

    #[test]
    fn rule_file_constraints_reach_nested_elements() {
        let rules = RuleSet::from_json_str(
            r#"{"*": {"*": {"uint8": {"rules": [{"rule-type": "limits", "min": 10, "max": 12}]}}}}"#,
        )
        .expect("valid");
        let mut fuzzer = fuzzer().with_rules(rules);
        let mut reader = DetachedReader;
        for _ in 0..10 {
            let value = fuzzer
                .fuzz_arg("C", "f", "(uint8,bool)[]", "items", &mut reader)
                .expect("value");
            let DynSolValue::Array(items) = value else {
                panic!("expected array");
            };
            for item in items {
                let DynSolValue::Tuple(fields) = item else {
                    panic!("expected tuple");
                };
                let n = scalar_from_value(&fields[0]).expect("numeric");
                assert!(n >= Scalar::from_u64(10) && n <= Scalar::from_u64(12));
            }
        }
    }

    #[test]
    fn malformed_types_are_type_errors() {
        let mut fuzzer = fuzzer();
        let err = fuzzer
            .fuzz_arg("C", "f", "uint9", "x", &mut DetachedReader)
            .expect_err("bad width");
        assert!(matches!(err, FuzzError::Type(_)));
    }

    #[test]
    fn calldata_starts_with_the_selector() {
        let function = Function::parse("function transfer(address to, uint256 amount)").expect("valid");
        let mut fuzzer = fuzzer();
        let calldata = fuzzer
            .generate_calldata("Token", &function, &mut DetachedReader)
            .expect("calldata");
        assert_eq!(calldata.len(), 4 + 64);
        assert_eq!(&calldata[..4], function.selector().as_slice());
    }

    #[test]
    fn fuzzed_calls_become_committing_requests() {
        let call = FuzzedCall {
            sender: Address::repeat_byte(0x03),
            value: U256::from(9u64),
            selector: Selector::from([1, 2, 3, 4]),
            data: vec![0xaa; 32],
            gas_limit: 80_000,
        };
        assert_eq!(call.calldata().len(), 36);
        assert_eq!(&call.calldata()[..4], &[1, 2, 3, 4]);
        let request = call.request();
        assert!(request.commit);
        assert_eq!(request.caller, call.sender);
        assert_eq!(request.value, call.value);
        assert_eq!(request.data, call.data);
        assert_eq!(request.gas_limit, 80_000);
    }
}
