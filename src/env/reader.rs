use super::{CallRequest, CallStatus, ExecutionEnvironment, StateReader, DEFAULT_CALL_GAS_LIMIT};
use crate::abi::codec::{decode_arguments, scalar_from_value};
use crate::abi::{AbiType, Scalar};
use crate::error::StateReadError;
use crate::generators::NumericDomain;
use alloy::json_abi::{JsonAbi, StateMutability};
use alloy::primitives::{Address, Selector};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Getter {
    selector: Selector,
    takes_arguments: bool,
    output: Option<String>,
}

/// State reads against one deployed contract: a read-only call to a zero-argument `view`/`pure`
/// function, decoding its first return value.
pub struct ContractReader<'e, E: ExecutionEnvironment + ?Sized> {
    env: &'e mut E,
    target: Address,
    caller: Address,
    gas_limit: u64,
    getters: HashMap<String, Getter>,
}

impl<'e, E: ExecutionEnvironment + ?Sized> ContractReader<'e, E> {
    pub fn new(env: &'e mut E, target: Address, abi: &JsonAbi) -> Self {
        let mut getters: HashMap<String, Getter> = HashMap::new();
        for function in abi.functions() {
            if !matches!(
                function.state_mutability,
                StateMutability::View | StateMutability::Pure
            ) {
                continue;
            }
            let getter = Getter {
                selector: function.selector(),
                takes_arguments: !function.inputs.is_empty(),
                output: function.outputs.first().map(|p| p.selector_type().into_owned()),
            };
            // overloads: the zero-argument variant wins
            let replace = getters
                .get(&function.name)
                .map_or(true, |existing| existing.takes_arguments && !getter.takes_arguments);
            if replace {
                getters.insert(function.name.clone(), getter);
            }
        }
        Self {
            env,
            target,
            caller: Address::ZERO,
            gas_limit: DEFAULT_CALL_GAS_LIMIT,
            getters,
        }
    }

    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn target(&self) -> Address {
        self.target
    }
}

impl<E: ExecutionEnvironment + ?Sized> StateReader for ContractReader<'_, E> {
    fn read(&mut self, name: &str) -> Result<Scalar, StateReadError> {
        let getter = self
            .getters
            .get(name)
            .ok_or_else(|| StateReadError::UnknownGetter(name.to_string()))?;
        if getter.takes_arguments {
            return Err(StateReadError::GetterTakesArguments(name.to_string()));
        }
        let output_type = getter
            .output
            .as_deref()
            .ok_or_else(|| StateReadError::NoOutput(name.to_string()))?;
        let ty = AbiType::parse(output_type).map_err(|err| StateReadError::Decode {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        if NumericDomain::for_type(&ty).is_none() {
            return Err(StateReadError::NonNumeric {
                name: name.to_string(),
                type_name: ty.to_string(),
            });
        }

        let mut request = CallRequest::read_only(self.caller);
        request.gas_limit = self.gas_limit;
        let outcome = self
            .env
            .call_function(self.target, getter.selector, &request)
            .map_err(|err| StateReadError::Environment {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        match outcome.status {
            CallStatus::Success => {}
            CallStatus::Reverted => {
                return Err(StateReadError::Reverted {
                    name: name.to_string(),
                    reason: format!("0x{}", alloy::primitives::hex::encode(&outcome.output)),
                })
            }
            CallStatus::Halted(reason) => {
                return Err(StateReadError::Halted {
                    name: name.to_string(),
                    reason,
                })
            }
        }

        let values = decode_arguments(std::slice::from_ref(&ty), &outcome.output).map_err(|err| {
            StateReadError::Decode {
                name: name.to_string(),
                reason: err.to_string(),
            }
        })?;
        let value = values
            .first()
            .and_then(scalar_from_value)
            .ok_or_else(|| StateReadError::Decode {
                name: name.to_string(),
                reason: "empty output".to_string(),
            })?;
        tracing::debug!(getter = name, value = %value, gas_used = outcome.gas_used, "state read");
        Ok(value)
    }
}
