//! Sign-magnitude integers wide enough to hold every `uint256` and every `int256`.
//!
//! All numeric bounds, pins and exclusions are kept as [`Scalar`]s so one domain type serves
//! unsigned, signed, fixed-point, address and boolean generators alike.

use alloy::primitives::{I256, U256};
use rand::Rng;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot use literal `{literal}`: {reason}")]
pub struct LiteralError {
    pub literal: String,
    pub reason: String,
}

impl LiteralError {
    fn new(literal: &str, reason: impl Into<String>) -> Self {
        Self {
            literal: literal.to_string(),
            reason: reason.into(),
        }
    }
}

/// Zero is always stored as non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scalar {
    negative: bool,
    magnitude: U256,
}

impl Scalar {
    pub const ZERO: Self = Self {
        negative: false,
        magnitude: U256::ZERO,
    };

    pub fn from_u256(value: U256) -> Self {
        Self {
            negative: false,
            magnitude: value,
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_u256(U256::from(value))
    }

    pub fn from_i64(value: i64) -> Self {
        let magnitude = U256::from(value.unsigned_abs());
        if value < 0 {
            Self::negative(magnitude)
        } else {
            Self::from_u256(magnitude)
        }
    }

    pub fn negative(magnitude: U256) -> Self {
        Self {
            negative: !magnitude.is_zero(),
            magnitude,
        }
    }

    pub fn from_i256(value: I256) -> Self {
        if value.is_negative() {
            Self::negative(value.unsigned_abs())
        } else {
            Self::from_u256(value.into_raw())
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::from_u64(1)
        } else {
            Self::ZERO
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn magnitude(&self) -> U256 {
        self.magnitude
    }

    pub fn to_u256(self) -> Option<U256> {
        (!self.negative).then_some(self.magnitude)
    }

    pub fn to_i256(self) -> Option<I256> {
        if self.negative {
            I256::checked_from_sign_and_abs(alloy::primitives::Sign::Negative, self.magnitude)
        } else {
            I256::checked_from_sign_and_abs(alloy::primitives::Sign::Positive, self.magnitude)
        }
    }

    /// Largest value of an unsigned integer of `bits` width.
    pub fn unsigned_max(bits: usize) -> Self {
        Self::from_u256(low_mask(bits))
    }

    /// `-2^(bits-1)`
    pub fn signed_min(bits: usize) -> Self {
        Self::negative(U256::from(1u8) << (bits - 1))
    }

    /// `2^(bits-1) - 1`
    pub fn signed_max(bits: usize) -> Self {
        Self::from_u256(low_mask(bits - 1))
    }

    pub fn checked_add_u256(self, offset: U256) -> Option<Self> {
        if !self.negative {
            return self.magnitude.checked_add(offset).map(Self::from_u256);
        }
        if offset >= self.magnitude {
            Some(Self::from_u256(offset - self.magnitude))
        } else {
            Some(Self::negative(self.magnitude - offset))
        }
    }

    pub fn checked_sub_u256(self, offset: U256) -> Option<Self> {
        if self.negative {
            return self.magnitude.checked_add(offset).map(Self::negative);
        }
        if self.magnitude >= offset {
            Some(Self::from_u256(self.magnitude - offset))
        } else {
            Some(Self::negative(offset - self.magnitude))
        }
    }

    pub fn checked_succ(self) -> Option<Self> {
        self.checked_add_u256(U256::from(1u8))
    }

    pub fn checked_pred(self) -> Option<Self> {
        self.checked_sub_u256(U256::from(1u8))
    }

    pub fn checked_mul_u256(self, factor: U256) -> Option<Self> {
        let magnitude = self.magnitude.checked_mul(factor)?;
        Some(if self.negative {
            Self::negative(magnitude)
        } else {
            Self::from_u256(magnitude)
        })
    }

    /// `hi - lo` for `lo <= hi`, `None` when the difference does not fit 256 bits.
    pub fn distance(lo: Self, hi: Self) -> Option<U256> {
        if hi < lo {
            return None;
        }
        match (lo.negative, hi.negative) {
            (false, false) => Some(hi.magnitude - lo.magnitude),
            (true, false) => hi.magnitude.checked_add(lo.magnitude),
            (true, true) => Some(lo.magnitude - hi.magnitude),
            (false, true) => None,
        }
    }

    /// Parses a source or rule-file literal.
    ///
    /// Accepts decimal (`1_000`, `2.5`, `1e18`), hexadecimal (`0xff`) and boolean literals, an
    /// optional leading minus, and an optional solc sub-denomination. `decimals` shifts the
    /// result for fixed-point targets; a literal that still has a fractional part afterwards is
    /// rejected.
    pub fn parse_literal(
        text: &str,
        subdenomination: Option<&str>,
        decimals: usize,
    ) -> Result<Self, LiteralError> {
        let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
        match cleaned.as_str() {
            "" => return Err(LiteralError::new(text, "empty literal")),
            "true" => return Ok(Self::from_u64(1)),
            "false" => return Ok(Self::ZERO),
            _ => {}
        }

        let (negative, body) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };

        let unit = subdenomination_factor(subdenomination)
            .ok_or_else(|| LiteralError::new(text, "unknown sub-denomination"))?;

        let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
            let raw = U256::from_str_radix(hex, 16)
                .map_err(|err| LiteralError::new(text, format!("bad hex digits: {err}")))?;
            let scale =
                pow10(unit.1 + decimals).ok_or_else(|| LiteralError::new(text, "scale overflow"))?;
            raw.checked_mul(scale)
                .ok_or_else(|| LiteralError::new(text, "exceeds 256 bits"))?
        } else {
            parse_decimal(text, body, unit.1 + decimals)?
        };

        let magnitude = magnitude
            .checked_mul(unit.0)
            .ok_or_else(|| LiteralError::new(text, "exceeds 256 bits"))?;

        Ok(if negative {
            Self::negative(magnitude)
        } else {
            Self::from_u256(magnitude)
        })
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

fn low_mask(bits: usize) -> U256 {
    if bits >= 256 {
        U256::MAX
    } else {
        (U256::from(1u8) << bits) - U256::from(1u8)
    }
}

fn pow10(exp: usize) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// (multiplier, extra decimal exponent)
fn subdenomination_factor(unit: Option<&str>) -> Option<(U256, usize)> {
    let one = U256::from(1u8);
    Some(match unit {
        None | Some("wei") | Some("seconds") => (one, 0),
        Some("gwei") => (one, 9),
        Some("szabo") => (one, 12),
        Some("finney") => (one, 15),
        Some("ether") => (one, 18),
        Some("minutes") => (U256::from(60u64), 0),
        Some("hours") => (U256::from(3_600u64), 0),
        Some("days") => (U256::from(86_400u64), 0),
        Some("weeks") => (U256::from(604_800u64), 0),
        Some(_) => return None,
    })
}

fn parse_decimal(original: &str, body: &str, shift: usize) -> Result<U256, LiteralError> {
    let (mantissa, exponent) = match body.split_once(['e', 'E']) {
        Some((m, e)) => {
            let exp = e
                .parse::<i64>()
                .map_err(|_| LiteralError::new(original, "bad exponent"))?;
            (m, exp)
        }
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(LiteralError::new(original, "no digits"));
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|c| c.is_ascii_digit()) {
        return Err(LiteralError::new(original, "not a number"));
    }

    let digits = format!("{int_part}{frac_part}");
    let mut value = U256::from_str_radix(&digits, 10)
        .map_err(|_| LiteralError::new(original, "exceeds 256 bits"))?;
    let scale = exponent + shift as i64 - frac_part.len() as i64;
    if scale >= 0 {
        let factor = pow10(scale as usize).ok_or_else(|| LiteralError::new(original, "exceeds 256 bits"))?;
        value = value
            .checked_mul(factor)
            .ok_or_else(|| LiteralError::new(original, "exceeds 256 bits"))?;
    } else {
        let divisor = pow10(scale.unsigned_abs() as usize)
            .ok_or_else(|| LiteralError::new(original, "fractional part too long"))?;
        if !(value % divisor).is_zero() {
            return Err(LiteralError::new(original, "fractional value for an integer domain"));
        }
        value /= divisor;
    }
    Ok(value)
}

pub(crate) fn random_u256<R: Rng + ?Sized>(rng: &mut R) -> U256 {
    U256::from_limbs([rng.gen(), rng.gen(), rng.gen(), rng.gen()])
}

/// Uniform draw from `[0, span]`.
pub(crate) fn random_up_to<R: Rng + ?Sized>(rng: &mut R, span: U256) -> U256 {
    if span == U256::MAX {
        return random_u256(rng);
    }
    let mask = low_mask(span.bit_len());
    loop {
        let candidate = random_u256(rng) & mask;
        if candidate <= span {
            return candidate;
        }
    }
}

/// Uniform draw from `[lo, hi]`. The caller guarantees `lo <= hi` and a span of at most 256 bits.
pub(crate) fn random_between<R: Rng + ?Sized>(rng: &mut R, lo: Scalar, hi: Scalar) -> Scalar {
    match Scalar::distance(lo, hi) {
        Some(span) => lo.checked_add_u256(random_up_to(rng, span)).unwrap_or(lo),
        None => lo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn lit(text: &str) -> Scalar {
        Scalar::parse_literal(text, None, 0).expect("literal should parse")
    }

    #[test]
    fn ordering_spans_both_signs() {
        let mut values = vec![lit("3"), lit("-7"), lit("0"), lit("-1"), lit("12")];
        values.sort();
        assert_eq!(
            values,
            vec![lit("-7"), lit("-1"), lit("0"), lit("3"), lit("12")]
        );
        assert_eq!(Scalar::negative(U256::ZERO), Scalar::ZERO);
    }

    #[test]
    fn literal_forms_parse() {
        assert_eq!(lit("0xff"), Scalar::from_u64(255));
        assert_eq!(lit("1_000"), Scalar::from_u64(1000));
        assert_eq!(lit("2e3"), Scalar::from_u64(2000));
        assert_eq!(lit("-5"), Scalar::from_i64(-5));
        assert_eq!(lit("true"), Scalar::from_u64(1));
        assert_eq!(
            Scalar::parse_literal("1", Some("gwei"), 0).expect("gwei"),
            Scalar::from_u64(1_000_000_000)
        );
        assert_eq!(
            Scalar::parse_literal("2", Some("days"), 0).expect("days"),
            Scalar::from_u64(172_800)
        );
    }

    #[test]
    fn fixed_point_literals_are_scaled() {
        assert_eq!(
            Scalar::parse_literal("1.5", None, 2).expect("scaled"),
            Scalar::from_u64(150)
        );
        assert!(Scalar::parse_literal("1.5", None, 0).is_err());
        assert!(Scalar::parse_literal("0.125", None, 2).is_err());
    }

    #[test]
    fn hex_and_decimal_literals_scale_alike() {
        for unit in ["gwei", "ether", "minutes"] {
            assert_eq!(
                Scalar::parse_literal("0x10", Some(unit), 0).expect("hex"),
                Scalar::parse_literal("16", Some(unit), 0).expect("decimal"),
                "{unit}"
            );
        }
        assert_eq!(
            Scalar::parse_literal("0x1", Some("gwei"), 0).expect("hex gwei"),
            Scalar::from_u64(1_000_000_000)
        );
        assert_eq!(
            Scalar::parse_literal("0x2", Some("gwei"), 2).expect("scaled hex gwei"),
            Scalar::from_u64(200_000_000_000)
        );
    }

    #[test]
    fn width_limits_match_twos_complement() {
        assert_eq!(Scalar::unsigned_max(8), Scalar::from_u64(255));
        assert_eq!(Scalar::signed_min(8), Scalar::from_i64(-128));
        assert_eq!(Scalar::signed_max(8), Scalar::from_i64(127));
        assert_eq!(Scalar::unsigned_max(256).magnitude(), U256::MAX);
        assert_eq!(
            Scalar::distance(Scalar::signed_min(256), Scalar::signed_max(256)),
            Some(U256::MAX)
        );
    }

    #[test]
    fn i256_conversion_round_trips() {
        for raw in [-1i64, 0, 1, i64::MIN, i64::MAX] {
            let scalar = Scalar::from_i64(raw);
            let signed = scalar.to_i256().expect("fits");
            assert_eq!(Scalar::from_i256(signed), scalar);
        }
        assert_eq!(Scalar::signed_min(256).to_i256(), Some(I256::MIN));
        assert!(Scalar::unsigned_max(256).to_i256().is_none());
    }

    #[test]
    fn random_between_stays_inside_the_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        let lo = Scalar::from_i64(-3);
        let hi = Scalar::from_i64(4);
        for _ in 0..1_000 {
            let v = random_between(&mut rng, lo, hi);
            assert!(lo <= v && v <= hi);
        }
    }
}
