use thiserror::Error;

pub type Result<T> = std::result::Result<T, FuzzError>;

#[derive(Debug, Error)]
pub enum FuzzError {
    #[error("unsupported construct: {0}")]
    Unsupported(#[from] UnsupportedConstruct),
    #[error("unsatisfiable constraints: {0}")]
    Unsatisfiable(#[from] UnsatisfiableConstraints),
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] InvalidRuleSpec),
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("state read failed: {0}")]
    StateRead(#[from] StateReadError),
    #[error("type error: {0}")]
    Type(#[from] TypeParseError),
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// An AST construct the expression compiler does not translate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{construct} at {location}")]
pub struct UnsupportedConstruct {
    pub construct: String,
    pub location: String,
}

impl UnsupportedConstruct {
    pub fn new(construct: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            construct: construct.into(),
            location: location.into(),
        }
    }
}

/// The merged constraint set of one argument admits no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{contract}.{function}({arg_type} {argument}): `{constraint}` leaves no admissible value ({reason}); applied before it: [{}]",
    applied.join(", ")
)]
pub struct UnsatisfiableConstraints {
    pub contract: String,
    pub function: String,
    pub argument: String,
    pub arg_type: String,
    pub constraint: String,
    pub reason: String,
    pub applied: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct InvalidRuleSpec {
    pub path: String,
    pub reason: String,
}

impl InvalidRuleSpec {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A value that lies outside the legal domain of its ABI type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value {value} is not a valid `{type_name}`")]
pub struct DomainError {
    pub type_name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateReadError {
    #[error("no read-only getter `{0}` in contract ABI")]
    UnknownGetter(String),
    #[error("getter `{0}` takes arguments")]
    GetterTakesArguments(String),
    #[error("getter `{0}` has no return value")]
    NoOutput(String),
    #[error("call to `{name}` reverted: {reason}")]
    Reverted { name: String, reason: String },
    #[error("call to `{name}` halted: {reason}")]
    Halted { name: String, reason: String },
    #[error("output of `{name}` could not be decoded: {reason}")]
    Decode { name: String, reason: String },
    #[error("`{name}` returned non-numeric `{type_name}`")]
    NonNumeric { name: String, type_name: String },
    #[error("no execution environment bound for reading `{0}`")]
    Unbound(String),
    #[error("environment failure while reading `{name}`: {reason}")]
    Environment { name: String, reason: String },
}

/// ABI bytes that do not decode as the expected type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode `{ty}`: {reason}")]
pub struct DecodeError {
    pub ty: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeParseError {
    #[error("empty type string")]
    Empty,
    #[error("unknown type `{0}`")]
    Unknown(String),
    #[error("invalid width in `{ty}`: {reason}")]
    InvalidWidth { ty: String, reason: String },
    #[error("malformed type `{ty}` at byte {position}")]
    Malformed { ty: String, position: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("transaction rejected by the VM: {0}")]
    Rejected(String),
    #[error("call reverted")]
    Reverted { gas_used: u64, output: Vec<u8> },
    #[error("call halted: {reason}")]
    Halted { gas_used: u64, reason: String },
    #[error("contract creation returned no address")]
    NoCreatedAddress,
    #[error("encoding failed: {0}")]
    Encoding(String),
}
