//! Structured ABI type descriptors.
//!
//! A type string such as `(uint8,bytes32)[3][]` is parsed once by a small recursive-descent
//! parser into an [`AbiType`] tree. Everything downstream (generator construction, rule lookup,
//! encoding) works on the tree and never re-inspects the text.

use crate::error::TypeParseError;
use alloy::dyn_abi::DynSolType;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_INT_BITS: usize = 256;
pub const DEFAULT_FIXED_BITS: usize = 128;
pub const DEFAULT_FIXED_DECIMALS: usize = 18;
pub const FUNCTION_BYTES: usize = 24;
pub const MAX_FIXED_DECIMALS: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbiType {
    Uint(usize),
    Int(usize),
    Ufixed { bits: usize, decimals: usize },
    Fixed { bits: usize, decimals: usize },
    Address,
    Bool,
    FixedBytes(usize),
    /// 20-byte address followed by a 4-byte selector.
    Function,
    Bytes,
    String,
    FixedArray(Box<AbiType>, usize),
    Array(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

/// Coarse classification used by the constraint capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    Unsigned,
    Signed,
    FixedPoint,
    Address,
    Bool,
    FixedBytes,
    Function,
    Bytes,
    String,
    FixedArray,
    Array,
    Tuple,
}

impl GeneratorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unsigned => "unsigned integer",
            Self::Signed => "signed integer",
            Self::FixedPoint => "fixed-point",
            Self::Address => "address",
            Self::Bool => "bool",
            Self::FixedBytes => "fixed bytes",
            Self::Function => "function",
            Self::Bytes => "dynamic bytes",
            Self::String => "string",
            Self::FixedArray => "fixed array",
            Self::Array => "dynamic array",
            Self::Tuple => "tuple",
        }
    }
}

impl AbiType {
    pub fn parse(raw: &str) -> Result<Self, TypeParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TypeParseError::Empty);
        }
        let mut parser = TypeParser {
            src: trimmed,
            pos: 0,
        };
        let ty = parser.parse_type()?;
        if parser.pos != trimmed.len() {
            return Err(parser.malformed());
        }
        Ok(ty)
    }

    pub fn kind(&self) -> GeneratorKind {
        match self {
            Self::Uint(_) => GeneratorKind::Unsigned,
            Self::Int(_) => GeneratorKind::Signed,
            Self::Ufixed { .. } | Self::Fixed { .. } => GeneratorKind::FixedPoint,
            Self::Address => GeneratorKind::Address,
            Self::Bool => GeneratorKind::Bool,
            Self::FixedBytes(_) => GeneratorKind::FixedBytes,
            Self::Function => GeneratorKind::Function,
            Self::Bytes => GeneratorKind::Bytes,
            Self::String => GeneratorKind::String,
            Self::FixedArray(..) => GeneratorKind::FixedArray,
            Self::Array(_) => GeneratorKind::Array,
            Self::Tuple(_) => GeneratorKind::Tuple,
        }
    }

    /// Decimal places a literal must be scaled by before it is compared with values of this
    /// type. Zero for everything except fixed-point numbers.
    pub fn decimals(&self) -> usize {
        match self {
            Self::Ufixed { decimals, .. } | Self::Fixed { decimals, .. } => *decimals,
            _ => 0,
        }
    }

    /// Names this type is looked up under in a rule file, most specific first.
    pub fn rule_names(&self) -> Vec<String> {
        let canonical = self.to_string();
        let alias = match self {
            Self::Uint(DEFAULT_INT_BITS) => Some("uint"),
            Self::Int(DEFAULT_INT_BITS) => Some("int"),
            Self::Ufixed {
                bits: DEFAULT_FIXED_BITS,
                decimals: DEFAULT_FIXED_DECIMALS,
            } => Some("ufixed"),
            Self::Fixed {
                bits: DEFAULT_FIXED_BITS,
                decimals: DEFAULT_FIXED_DECIMALS,
            } => Some("fixed"),
            _ => None,
        };
        let mut names = vec![canonical];
        names.extend(alias.map(str::to_string));
        names
    }

    /// The wire type. Fixed-point numbers travel as their integer mantissa.
    pub fn to_sol_type(&self) -> DynSolType {
        match self {
            Self::Uint(bits) => DynSolType::Uint(*bits),
            Self::Int(bits) => DynSolType::Int(*bits),
            Self::Ufixed { bits, .. } => DynSolType::Uint(*bits),
            Self::Fixed { bits, .. } => DynSolType::Int(*bits),
            Self::Address => DynSolType::Address,
            Self::Bool => DynSolType::Bool,
            Self::FixedBytes(size) => DynSolType::FixedBytes(*size),
            Self::Function => DynSolType::Function,
            Self::Bytes => DynSolType::Bytes,
            Self::String => DynSolType::String,
            Self::FixedArray(inner, len) => DynSolType::FixedArray(Box::new(inner.to_sol_type()), *len),
            Self::Array(inner) => DynSolType::Array(Box::new(inner.to_sol_type())),
            Self::Tuple(items) => DynSolType::Tuple(items.iter().map(Self::to_sol_type).collect()),
        }
    }
}

impl FromStr for AbiType {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Int(bits) => write!(f, "int{bits}"),
            Self::Ufixed { bits, decimals } => write!(f, "ufixed{bits}x{decimals}"),
            Self::Fixed { bits, decimals } => write!(f, "fixed{bits}x{decimals}"),
            Self::Address => f.write_str("address"),
            Self::Bool => f.write_str("bool"),
            Self::FixedBytes(size) => write!(f, "bytes{size}"),
            Self::Function => f.write_str("function"),
            Self::Bytes => f.write_str("bytes"),
            Self::String => f.write_str("string"),
            Self::FixedArray(inner, len) => write!(f, "{inner}[{len}]"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn malformed(&self) -> TypeParseError {
        TypeParseError::Malformed {
            ty: self.src.to_string(),
            position: self.pos,
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), TypeParseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.malformed())
        }
    }

    fn parse_type(&mut self) -> Result<AbiType, TypeParseError> {
        let mut ty = match self.peek() {
            Some(b'(') => self.parse_tuple()?,
            Some(c) if c.is_ascii_alphabetic() => self.parse_elementary()?,
            _ => return Err(self.malformed()),
        };
        while self.peek() == Some(b'[') {
            self.pos += 1;
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits = &self.src[start..self.pos];
            self.expect(b']')?;
            ty = if digits.is_empty() {
                AbiType::Array(Box::new(ty))
            } else {
                let len = digits.parse::<usize>().map_err(|_| self.malformed())?;
                if len == 0 {
                    return Err(TypeParseError::InvalidWidth {
                        ty: self.src.to_string(),
                        reason: "static array length must be positive".to_string(),
                    });
                }
                AbiType::FixedArray(Box::new(ty), len)
            };
        }
        Ok(ty)
    }

    fn parse_tuple(&mut self) -> Result<AbiType, TypeParseError> {
        self.expect(b'(')?;
        let mut items = Vec::new();
        if self.peek() == Some(b')') {
            self.pos += 1;
            return Ok(AbiType::Tuple(items));
        }
        loop {
            self.skip_spaces();
            items.push(self.parse_type()?);
            self.skip_spaces();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {
                    self.pos += 1;
                    return Ok(AbiType::Tuple(items));
                }
                _ => return Err(self.malformed()),
            }
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn parse_elementary(&mut self) -> Result<AbiType, TypeParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        self.elementary(word)
    }

    fn elementary(&self, word: &str) -> Result<AbiType, TypeParseError> {
        match word {
            "address" => return Ok(AbiType::Address),
            "bool" => return Ok(AbiType::Bool),
            "string" => return Ok(AbiType::String),
            "function" => return Ok(AbiType::Function),
            "bytes" => return Ok(AbiType::Bytes),
            _ => {}
        }

        if let Some(rest) = word.strip_prefix("uint") {
            return self.int_width(rest).map(AbiType::Uint);
        }
        if let Some(rest) = word.strip_prefix("int") {
            return self.int_width(rest).map(AbiType::Int);
        }
        if let Some(rest) = word.strip_prefix("ufixed") {
            let (bits, decimals) = self.fixed_shape(rest)?;
            return Ok(AbiType::Ufixed { bits, decimals });
        }
        if let Some(rest) = word.strip_prefix("fixed") {
            let (bits, decimals) = self.fixed_shape(rest)?;
            return Ok(AbiType::Fixed { bits, decimals });
        }
        if let Some(rest) = word.strip_prefix("bytes") {
            let size = self.number(rest)?;
            if size == 0 || size > 32 {
                return Err(self.invalid_width(format!("bytes{size} is outside bytes1..bytes32")));
            }
            return Ok(AbiType::FixedBytes(size));
        }

        Err(TypeParseError::Unknown(word.to_string()))
    }

    fn number(&self, digits: &str) -> Result<usize, TypeParseError> {
        if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_digit()) {
            return Err(TypeParseError::Unknown(self.src.to_string()));
        }
        digits
            .parse::<usize>()
            .map_err(|_| self.invalid_width(format!("`{digits}` is not a width")))
    }

    fn int_width(&self, rest: &str) -> Result<usize, TypeParseError> {
        if rest.is_empty() {
            return Ok(DEFAULT_INT_BITS);
        }
        let bits = self.number(rest)?;
        check_bits(bits).map_err(|reason| self.invalid_width(reason))?;
        Ok(bits)
    }

    fn fixed_shape(&self, rest: &str) -> Result<(usize, usize), TypeParseError> {
        if rest.is_empty() {
            return Ok((DEFAULT_FIXED_BITS, DEFAULT_FIXED_DECIMALS));
        }
        let (bits, decimals) = rest
            .split_once('x')
            .ok_or_else(|| TypeParseError::Unknown(self.src.to_string()))?;
        let bits = self.number(bits)?;
        let decimals = self.number(decimals)?;
        check_bits(bits).map_err(|reason| self.invalid_width(reason))?;
        if decimals == 0 || decimals > MAX_FIXED_DECIMALS {
            return Err(self.invalid_width(format!(
                "fixed-point exponent {decimals} is outside 1..={MAX_FIXED_DECIMALS}"
            )));
        }
        Ok((bits, decimals))
    }

    fn invalid_width(&self, reason: String) -> TypeParseError {
        TypeParseError::InvalidWidth {
            ty: self.src.to_string(),
            reason,
        }
    }
}

fn check_bits(bits: usize) -> Result<(), String> {
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(format!("bit width {bits} must be a multiple of 8 in 8..=256"));
    }
    Ok(())
}
