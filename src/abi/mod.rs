//! ABI vocabulary: structured type descriptors, wide scalars for bounds, and the codec used
//! for generated arguments and read-only call results.

pub mod codec;
pub mod scalar;
pub mod types;

pub use scalar::{LiteralError, Scalar};
pub use types::{AbiType, GeneratorKind};
