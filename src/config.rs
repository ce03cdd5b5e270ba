use crate::env::DEFAULT_CALL_GAS_LIMIT;
use crate::fuzzer::accounts::{DEFAULT_MAX_BALANCE, DEFAULT_NEW_ACCOUNT_PERCENT};
use crate::generators::length::{DEFAULT_MEAN_LENGTH, MAX_DYNAMIC_LENGTH};
use crate::generators::LengthDistribution;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_ATTEMPTS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzConfig {
    /// Fixed RNG seed; entropy-seeded when absent.
    pub seed: Option<u64>,
    pub max_attempts: usize,
    pub mean_length: usize,
    pub max_length: usize,
    pub call_gas_limit: u64,
    pub rules_path: Option<PathBuf>,
    /// Chance, in percent, that a call is sent from a freshly funded account.
    pub new_account_percent: u8,
    /// Upper bound of the balance given to a new sender account.
    pub max_balance: u128,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            mean_length: DEFAULT_MEAN_LENGTH,
            max_length: MAX_DYNAMIC_LENGTH,
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT,
            rules_path: None,
            new_account_percent: DEFAULT_NEW_ACCOUNT_PERCENT,
            max_balance: DEFAULT_MAX_BALANCE,
        }
    }
}

impl FuzzConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn lengths(&self) -> LengthDistribution {
        LengthDistribution::new(self.mean_length, self.max_length)
    }

    /// Reads `GAS_FUZZ_*` variables over the defaults. Unset or blank variables keep the default;
    /// malformed ones are an error naming the variable.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let config = Self {
            seed: parse_var::<u64>("GAS_FUZZ_SEED")?,
            max_attempts: parse_var("GAS_FUZZ_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            mean_length: parse_var("GAS_FUZZ_MEAN_LENGTH")?.unwrap_or(defaults.mean_length),
            max_length: parse_var("GAS_FUZZ_MAX_LENGTH")?.unwrap_or(defaults.max_length),
            call_gas_limit: parse_var("GAS_FUZZ_CALL_GAS_LIMIT")?
                .unwrap_or(defaults.call_gas_limit),
            rules_path: std::env::var("GAS_FUZZ_RULES")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            new_account_percent: parse_var("GAS_FUZZ_NEW_ACCOUNT_PERCENT")?
                .unwrap_or(defaults.new_account_percent),
            max_balance: parse_var("GAS_FUZZ_MAX_BALANCE")?.unwrap_or(defaults.max_balance),
        };
        if config.new_account_percent > 100 {
            return Err(anyhow::anyhow!(
                "GAS_FUZZ_NEW_ACCOUNT_PERCENT ({}) exceeds 100",
                config.new_account_percent
            ));
        }
        if config.mean_length == 0 || config.max_length == 0 {
            return Err(anyhow::anyhow!(
                "GAS_FUZZ_MEAN_LENGTH and GAS_FUZZ_MAX_LENGTH must be positive"
            ));
        }
        if config.mean_length > config.max_length {
            return Err(anyhow::anyhow!(
                "GAS_FUZZ_MEAN_LENGTH ({}) exceeds GAS_FUZZ_MAX_LENGTH ({})",
                config.mean_length,
                config.max_length
            ));
        }
        Ok(config)
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            let trimmed = raw.trim();
            trimmed
                .replace('_', "")
                .parse::<T>()
                .map(Some)
                .map_err(|err| anyhow::anyhow!("invalid {name} '{trimmed}': {err}"))
        }
        _ => Ok(None),
    }
}
