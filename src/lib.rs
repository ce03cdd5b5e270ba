//! Gas Fuzz library surface.
//!
//! Constraint-aware argument fuzzing for EVM contract functions: guard conditions from the
//! solc AST and declarative rule files narrow per-argument generators, which then produce
//! calldata for gas measurement in an in-memory EVM.

pub mod abi;
pub mod ast;
pub mod config;
pub mod constraints;
pub mod env;
pub mod error;
pub mod fuzzer;
pub mod generators;
pub mod rules;
pub mod samples;

pub use abi::{AbiType, Scalar};
pub use config::FuzzConfig;
pub use error::{FuzzError, Result};
pub use fuzzer::{ArgumentFuzzer, FuzzKey, FuzzedCall};
