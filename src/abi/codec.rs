use super::scalar::Scalar;
use super::types::AbiType;
use crate::error::DecodeError;
use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Address, U256};

/// ABI-encode a single generated value.
pub fn encode_value(value: &DynSolValue) -> Vec<u8> {
    value.abi_encode()
}

/// Decode bytes produced by [`encode_value`] back into a value of `ty`.
pub fn decode_value(ty: &AbiType, data: &[u8]) -> Result<DynSolValue, DecodeError> {
    ty.to_sol_type().abi_decode(data).map_err(|err| DecodeError {
        ty: ty.to_string(),
        reason: err.to_string(),
    })
}

/// Encode a full argument list the way it follows a selector in calldata.
pub fn encode_arguments(values: Vec<DynSolValue>) -> Vec<u8> {
    DynSolValue::Tuple(values).abi_encode_params()
}

pub fn decode_arguments(types: &[AbiType], data: &[u8]) -> Result<Vec<DynSolValue>, DecodeError> {
    let tuple = DynSolType::Tuple(types.iter().map(AbiType::to_sol_type).collect());
    let decoded = tuple.abi_decode_params(data).map_err(|err| DecodeError {
        ty: format!(
            "({})",
            types.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
        ),
        reason: err.to_string(),
    })?;
    match decoded {
        DynSolValue::Tuple(values) => Ok(values),
        other => Ok(vec![other]),
    }
}

/// Numeric view of a decoded value; `None` for non-numeric values.
pub fn scalar_from_value(value: &DynSolValue) -> Option<Scalar> {
    match value {
        DynSolValue::Uint(v, _) => Some(Scalar::from_u256(*v)),
        DynSolValue::Int(v, _) => Some(Scalar::from_i256(*v)),
        DynSolValue::Bool(b) => Some(Scalar::from_bool(*b)),
        DynSolValue::Address(a) => Some(Scalar::from_u256(U256::from_be_slice(a.as_slice()))),
        _ => None,
    }
}

/// Builds the value of a numeric-like type from its scalar; `None` if `scalar` does not fit.
pub fn value_from_scalar(ty: &AbiType, scalar: Scalar) -> Option<DynSolValue> {
    match ty {
        AbiType::Uint(bits) | AbiType::Ufixed { bits, .. } => {
            let v = scalar.to_u256()?;
            (Scalar::from_u256(v) <= Scalar::unsigned_max(*bits)).then_some(DynSolValue::Uint(v, *bits))
        }
        AbiType::Int(bits) | AbiType::Fixed { bits, .. } => {
            if scalar < Scalar::signed_min(*bits) || scalar > Scalar::signed_max(*bits) {
                return None;
            }
            Some(DynSolValue::Int(scalar.to_i256()?, *bits))
        }
        AbiType::Address => {
            let v = scalar.to_u256()?;
            if v > Scalar::unsigned_max(160).magnitude() {
                return None;
            }
            let word = v.to_be_bytes::<32>();
            Some(DynSolValue::Address(Address::from_slice(&word[12..])))
        }
        AbiType::Bool => match scalar.to_u256()? {
            v if v.is_zero() => Some(DynSolValue::Bool(false)),
            v if v == U256::from(1u8) => Some(DynSolValue::Bool(true)),
            _ => None,
        },
        _ => None,
    }
}

/// Human-readable fixed-point rendering of a mantissa, e.g. `-1.50` for `-150` with 2 decimals.
pub fn render_fixed(mantissa: Scalar, decimals: usize) -> String {
    let digits = mantissa.magnitude().to_string();
    let padded = if digits.len() <= decimals {
        format!("{}{digits}", "0".repeat(decimals + 1 - digits.len()))
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let sign = if mantissa.is_negative() { "-" } else { "" };
    format!("{sign}{int_part}.{frac_part}")
}
