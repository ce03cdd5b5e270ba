//! Per-type random value generators.
//!
//! One [`Generator`] is built per argument from its [`AbiType`] tree. Numeric-like generators
//! own a [`NumericDomain`] that constraints narrow; structural generators own their element
//! generators and delegate to them.

pub mod length;
pub mod numeric;

pub use length::LengthDistribution;
pub use numeric::NumericDomain;

use crate::abi::codec::{scalar_from_value, value_from_scalar};
use crate::abi::types::FUNCTION_BYTES;
use crate::abi::{AbiType, GeneratorKind};
use crate::constraints::{accepts, Constraint, NarrowingError};
use crate::env::StateReader;
use crate::error::DomainError;
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Function, B256};
use rand::rngs::StdRng;
use rand::Rng;

const PRINTABLE: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ \t\n\r\x0b\x0c";

/// Everything a generator needs for one draw.
pub struct GenContext<'a> {
    pub rng: &'a mut StdRng,
    pub reader: &'a mut dyn StateReader,
    pub lengths: LengthDistribution,
    pub max_attempts: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generator {
    /// uint, int, ufixed, fixed, address and bool.
    Numeric { ty: AbiType, domain: NumericDomain },
    FixedBytes { size: usize },
    Function,
    Bytes,
    String,
    FixedArray { element: Box<Generator>, len: usize },
    Array { element: Box<Generator> },
    Tuple(Vec<Generator>),
}

impl Generator {
    pub fn for_type(ty: &AbiType) -> Self {
        match ty {
            AbiType::Uint(_)
            | AbiType::Int(_)
            | AbiType::Ufixed { .. }
            | AbiType::Fixed { .. }
            | AbiType::Address
            | AbiType::Bool => Self::Numeric {
                ty: ty.clone(),
                domain: NumericDomain::bounded(ty),
            },
            AbiType::FixedBytes(size) => Self::FixedBytes { size: *size },
            AbiType::Function => Self::Function,
            AbiType::Bytes => Self::Bytes,
            AbiType::String => Self::String,
            AbiType::FixedArray(inner, len) => Self::FixedArray {
                element: Box::new(Self::for_type(inner)),
                len: *len,
            },
            AbiType::Array(inner) => Self::Array {
                element: Box::new(Self::for_type(inner)),
            },
            AbiType::Tuple(items) => Self::Tuple(items.iter().map(Self::for_type).collect()),
        }
    }

    pub fn abi_type(&self) -> AbiType {
        match self {
            Self::Numeric { ty, .. } => ty.clone(),
            Self::FixedBytes { size } => AbiType::FixedBytes(*size),
            Self::Function => AbiType::Function,
            Self::Bytes => AbiType::Bytes,
            Self::String => AbiType::String,
            Self::FixedArray { element, len } => {
                AbiType::FixedArray(Box::new(element.abi_type()), *len)
            }
            Self::Array { element } => AbiType::Array(Box::new(element.abi_type())),
            Self::Tuple(items) => AbiType::Tuple(items.iter().map(Self::abi_type).collect()),
        }
    }

    pub fn kind(&self) -> GeneratorKind {
        self.abi_type().kind()
    }

    pub fn name(&self) -> String {
        self.abi_type().to_string()
    }

    pub fn domain(&self) -> Option<&NumericDomain> {
        match self {
            Self::Numeric { domain, .. } => Some(domain),
            _ => None,
        }
    }

    /// Direct element generators, for rule propagation into nested types.
    pub fn elements_mut(&mut self) -> Vec<&mut Generator> {
        match self {
            Self::FixedArray { element, .. } | Self::Array { element } => vec![element.as_mut()],
            Self::Tuple(items) => items.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    pub fn apply(
        &mut self,
        constraint: &Constraint,
        reader: &mut dyn StateReader,
    ) -> Result<(), NarrowingError> {
        let kind = self.kind();
        if !accepts(kind, constraint.kind) {
            return Err(NarrowingError::NotApplicable(kind));
        }
        match self {
            Self::Numeric { domain, .. } => domain.apply(constraint, reader),
            _ => Err(NarrowingError::NotApplicable(kind)),
        }
    }

    pub fn next(&self, ctx: &mut GenContext<'_>) -> Result<DynSolValue, NarrowingError> {
        match self {
            Self::Numeric { ty, domain } => {
                let scalar = domain.sample(&mut *ctx.rng, &mut *ctx.reader, ctx.max_attempts)?;
                value_from_scalar(ty, scalar).ok_or_else(|| {
                    NarrowingError::Empty(format!("{scalar} does not fit `{ty}`"))
                })
            }
            Self::FixedBytes { size } => {
                let mut word = [0u8; 32];
                ctx.rng.fill(&mut word[..*size]);
                Ok(DynSolValue::FixedBytes(B256::from(word), *size))
            }
            Self::Function => {
                let mut raw = [0u8; FUNCTION_BYTES];
                ctx.rng.fill(&mut raw[..]);
                Ok(DynSolValue::Function(Function::from(raw)))
            }
            Self::Bytes => {
                let len = ctx.lengths.sample(&mut *ctx.rng);
                let mut data = vec![0u8; len];
                ctx.rng.fill(data.as_mut_slice());
                Ok(DynSolValue::Bytes(data))
            }
            Self::String => {
                let len = ctx.lengths.sample(&mut *ctx.rng);
                let text: String = (0..len)
                    .map(|_| PRINTABLE[ctx.rng.gen_range(0..PRINTABLE.len())] as char)
                    .collect();
                Ok(DynSolValue::String(text))
            }
            Self::FixedArray { element, len } => {
                let values = (0..*len)
                    .map(|_| element.next(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::FixedArray(values))
            }
            Self::Array { element } => {
                let len = ctx.lengths.sample(&mut *ctx.rng);
                let values = (0..len)
                    .map(|_| element.next(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::Array(values))
            }
            Self::Tuple(items) => {
                let values = items
                    .iter()
                    .map(|item| item.next(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(DynSolValue::Tuple(values))
            }
        }
    }

    /// Checks that `value` lies in the legal domain of this generator's type.
    pub fn validate(&self, value: &DynSolValue) -> Result<(), DomainError> {
        let legal = match (self, value) {
            (Self::Numeric { ty, domain }, _) => {
                let width_matches = match (ty, value) {
                    (AbiType::Uint(bits) | AbiType::Ufixed { bits, .. }, DynSolValue::Uint(_, b))
                    | (AbiType::Int(bits) | AbiType::Fixed { bits, .. }, DynSolValue::Int(_, b)) => {
                        bits == b
                    }
                    (AbiType::Address, DynSolValue::Address(_))
                    | (AbiType::Bool, DynSolValue::Bool(_)) => true,
                    _ => false,
                };
                width_matches && scalar_from_value(value).is_some_and(|s| domain.is_legal(s))
            }
            (Self::FixedBytes { size }, DynSolValue::FixedBytes(word, width)) => {
                size == width && word[*size..].iter().all(|b| *b == 0)
            }
            (Self::Function, DynSolValue::Function(_))
            | (Self::Bytes, DynSolValue::Bytes(_))
            | (Self::String, DynSolValue::String(_)) => true,
            (Self::FixedArray { element, len }, DynSolValue::FixedArray(values)) => {
                if values.len() != *len {
                    false
                } else {
                    return values.iter().try_for_each(|v| element.validate(v));
                }
            }
            (Self::Array { element }, DynSolValue::Array(values)) => {
                return values.iter().try_for_each(|v| element.validate(v));
            }
            (Self::Tuple(items), DynSolValue::Tuple(values)) => {
                if items.len() != values.len() {
                    false
                } else {
                    return items
                        .iter()
                        .zip(values)
                        .try_for_each(|(item, v)| item.validate(v));
                }
            }
            _ => false,
        };
        if legal {
            Ok(())
        } else {
            Err(DomainError {
                type_name: self.name(),
                value: format!("{value:?}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DetachedReader;
    use alloy::primitives::U256;
    use rand::SeedableRng;

    fn draw(ty: &str, seed: u64) -> (Generator, DynSolValue) {
        let generator = Generator::for_type(&AbiType::parse(ty).expect("parses"));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut reader = DetachedReader;
        let mut ctx = GenContext {
            rng: &mut rng,
            reader: &mut reader,
            lengths: LengthDistribution::new(4, 16),
            max_attempts: 8,
        };
        let value = generator.next(&mut ctx).expect("unconstrained draw");
        (generator, value)
    }

    #[test]
    fn every_unconstrained_draw_validates() {
        let types = [
            "uint8",
            "int",
            "fixed128x18",
            "ufixed8x1",
            "address",
            "bool",
            "bytes7",
            "function",
            "bytes",
            "string",
            "uint16[3]",
            "(bool,int24)[]",
            "(string,bytes32[2])",
        ];
        for (seed, ty) in types.iter().enumerate() {
            let (generator, value) = draw(ty, seed as u64);
            generator.validate(&value).unwrap_or_else(|e| panic!("{ty}: {e}"));
            assert_eq!(generator.name(), AbiType::parse(ty).expect("parses").to_string());
        }
    }

    #[test]
    fn fixed_bytes_are_left_aligned() {
        let (_, value) = draw("bytes3", 5);
        match value {
            DynSolValue::FixedBytes(word, 3) => assert!(word[3..].iter().all(|b| *b == 0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_values_outside_the_type() {
        let generator = Generator::for_type(&AbiType::Uint(8));
        assert!(generator.validate(&DynSolValue::Uint(U256::from(255u64), 8)).is_ok());
        assert!(generator.validate(&DynSolValue::Uint(U256::from(256u64), 8)).is_err());
        assert!(generator.validate(&DynSolValue::Bool(true)).is_err());

        let array = Generator::for_type(&AbiType::parse("bool[2]").expect("parses"));
        assert!(array.validate(&DynSolValue::FixedArray(vec![DynSolValue::Bool(true)])).is_err());
    }

    #[test]
    fn structural_generators_reject_constraints() {
        use crate::constraints::{ConstraintKind, Literal};
        let mut generator = Generator::for_type(&AbiType::String);
        let constraint = Constraint::from_rule(ConstraintKind::Equal, Literal::new("1"), "constant");
        assert!(matches!(
            generator.apply(&constraint, &mut DetachedReader),
            Err(NarrowingError::NotApplicable(GeneratorKind::String))
        ));
    }
}
