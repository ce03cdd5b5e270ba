//! Constraint model.
//!
//! A [`Constraint`] is one narrowing rule on one generator: a [`ConstraintKind`] plus a
//! [`Bound`]. Bounds are either literals or live reads of contract state; live bounds are
//! resolved through an explicit [`StateReader`] every time they are evaluated, never cached.
//! Which kinds a generator accepts is fixed by [`accepts`], the capability table.

use crate::abi::{AbiType, GeneratorKind, Scalar};
use crate::ast::SourceLocation;
use crate::env::StateReader;
use crate::error::{FuzzError, UnsupportedConstruct};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl ConstraintKind {
    pub fn from_operator(op: &str) -> Option<Self> {
        match op {
            "==" => Some(Self::Equal),
            "!=" => Some(Self::NotEqual),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessOrEqual),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
        }
    }

    /// The kind seen from the other operand: `value > arg` constrains `arg < value`.
    pub fn mirrored(self) -> Self {
        match self {
            Self::GreaterThan => Self::LessThan,
            Self::LessThan => Self::GreaterThan,
            Self::GreaterOrEqual => Self::LessOrEqual,
            Self::LessOrEqual => Self::GreaterOrEqual,
            other => other,
        }
    }

    pub fn is_ordering(self) -> bool {
        !matches!(self, Self::Equal | Self::NotEqual)
    }
}

/// Capability table: which constraint kinds each generator kind can honour.
pub fn accepts(generator: GeneratorKind, kind: ConstraintKind) -> bool {
    match generator {
        GeneratorKind::Unsigned
        | GeneratorKind::Signed
        | GeneratorKind::FixedPoint
        | GeneratorKind::Address => true,
        GeneratorKind::Bool => !kind.is_ordering(),
        GeneratorKind::FixedBytes
        | GeneratorKind::Function
        | GeneratorKind::Bytes
        | GeneratorKind::String
        | GeneratorKind::FixedArray
        | GeneratorKind::Array
        | GeneratorKind::Tuple => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Literal {
    pub text: String,
    pub subdenomination: Option<String>,
}

impl Literal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            subdenomination: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Literal(Literal),
    /// Zero-argument read-only getter evaluated on the contract under test.
    StateRead(String),
}

impl Bound {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::StateRead(_))
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => match &lit.subdenomination {
                Some(unit) => write!(f, "{} {unit}", lit.text),
                None => f.write_str(&lit.text),
            },
            Self::StateRead(name) => write!(f, "{name}()"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Source {
        location: SourceLocation,
        related_args: Vec<String>,
    },
    RuleFile {
        rule_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub bound: Bound,
    pub origin: Origin,
}

/// Why a constraint could not be applied or a value could not be drawn.
#[derive(Debug)]
pub enum NarrowingError {
    NotApplicable(GeneratorKind),
    Empty(String),
    Bound(FuzzError),
}

impl Constraint {
    pub fn from_rule(kind: ConstraintKind, literal: Literal, rule_type: impl Into<String>) -> Self {
        Self {
            kind,
            bound: Bound::Literal(literal),
            origin: Origin::RuleFile {
                rule_type: rule_type.into(),
            },
        }
    }

    pub fn related_args(&self) -> &[String] {
        match &self.origin {
            Origin::Source { related_args, .. } => related_args,
            Origin::RuleFile { .. } => &[],
        }
    }

    pub fn location(&self) -> String {
        match &self.origin {
            Origin::Source { location, .. } => location.to_string(),
            Origin::RuleFile { rule_type } => format!("rule `{rule_type}`"),
        }
    }

    pub fn applicable_to(&self, ty: &AbiType) -> bool {
        accepts(ty.kind(), self.kind)
    }

    /// Evaluates the bound. Live bounds perform a read on every call.
    pub fn resolve(&self, decimals: usize, reader: &mut dyn StateReader) -> Result<Scalar, FuzzError> {
        match &self.bound {
            Bound::Literal(lit) => {
                Scalar::parse_literal(&lit.text, lit.subdenomination.as_deref(), decimals).map_err(|err| {
                    UnsupportedConstruct::new(err.to_string(), self.location()).into()
                })
            }
            Bound::StateRead(name) => Ok(reader.read(name)?),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::Source {
                location,
                related_args,
            } => write!(
                f,
                "{} {} {} @{location}",
                related_args.join(","),
                self.kind.symbol(),
                self.bound
            ),
            Origin::RuleFile { rule_type } => {
                write!(f, "{rule_type}: {} {}", self.kind.symbol(), self.bound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirroring_flips_only_orderings() {
        assert_eq!(ConstraintKind::GreaterThan.mirrored(), ConstraintKind::LessThan);
        assert_eq!(ConstraintKind::LessOrEqual.mirrored(), ConstraintKind::GreaterOrEqual);
        assert_eq!(ConstraintKind::Equal.mirrored(), ConstraintKind::Equal);
        assert_eq!(ConstraintKind::NotEqual.mirrored(), ConstraintKind::NotEqual);
    }

    #[test]
    fn capability_table_limits_bool_and_structural_kinds() {
        assert!(accepts(GeneratorKind::Unsigned, ConstraintKind::LessThan));
        assert!(accepts(GeneratorKind::Address, ConstraintKind::NotEqual));
        assert!(accepts(GeneratorKind::Bool, ConstraintKind::NotEqual));
        assert!(!accepts(GeneratorKind::Bool, ConstraintKind::GreaterThan));
        assert!(!accepts(GeneratorKind::String, ConstraintKind::Equal));
        assert!(!accepts(GeneratorKind::Array, ConstraintKind::LessOrEqual));
    }

    #[test]
    fn display_names_argument_operator_and_bound() {
        let constraint = Constraint {
            kind: ConstraintKind::GreaterThan,
            bound: Bound::StateRead("balance".to_string()),
            origin: Origin::Source {
                location: SourceLocation::parse("120:15:0"),
                related_args: vec!["x".to_string()],
            },
        };
        assert_eq!(constraint.to_string(), "x > balance() @120:15:0");
    }
}
