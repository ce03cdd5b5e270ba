//! Interval-with-exclusions domain shared by every numeric-like generator.
//!
//! Literal bounds are folded into `[min, max]` at application time and can only ever
//! tighten it. State-read bounds are kept aside and re-resolved against the environment on
//! every draw, so a getter whose value changes between calls is observed each time.

use crate::abi::codec::render_fixed;
use crate::abi::scalar::random_between;
use crate::abi::{AbiType, Scalar};
use crate::constraints::{Constraint, ConstraintKind, NarrowingError};
use crate::env::StateReader;
use rand::Rng;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericDomain {
    floor: Scalar,
    ceiling: Scalar,
    min: Scalar,
    max: Scalar,
    excluded: BTreeSet<Scalar>,
    pinned: Option<Scalar>,
    live: Vec<Constraint>,
    decimals: usize,
}

impl NumericDomain {
    pub fn new(floor: Scalar, ceiling: Scalar, decimals: usize) -> Self {
        Self {
            floor,
            ceiling,
            min: floor,
            max: ceiling,
            excluded: BTreeSet::new(),
            pinned: None,
            live: Vec::new(),
            decimals,
        }
    }

    /// Legal range of a numeric-like type, expressed on its integer mantissa.
    pub fn for_type(ty: &AbiType) -> Option<Self> {
        match ty {
            AbiType::Uint(_)
            | AbiType::Int(_)
            | AbiType::Ufixed { .. }
            | AbiType::Fixed { .. }
            | AbiType::Address
            | AbiType::Bool => Some(Self::bounded(ty)),
            _ => None,
        }
    }

    /// Non-numeric types fall through to the boolean range `[0, 1]`.
    pub(crate) fn bounded(ty: &AbiType) -> Self {
        let (floor, ceiling) = match ty {
            AbiType::Uint(bits) | AbiType::Ufixed { bits, .. } => {
                (Scalar::ZERO, Scalar::unsigned_max(*bits))
            }
            AbiType::Int(bits) | AbiType::Fixed { bits, .. } => {
                (Scalar::signed_min(*bits), Scalar::signed_max(*bits))
            }
            AbiType::Address => (Scalar::ZERO, Scalar::unsigned_max(160)),
            _ => (Scalar::ZERO, Scalar::from_u64(1)),
        };
        Self::new(floor, ceiling, ty.decimals())
    }

    pub fn min(&self) -> Scalar {
        self.min
    }

    pub fn max(&self) -> Scalar {
        self.max
    }

    pub fn pinned(&self) -> Option<Scalar> {
        self.pinned
    }

    pub fn excluded(&self) -> &BTreeSet<Scalar> {
        &self.excluded
    }

    pub fn decimals(&self) -> usize {
        self.decimals
    }

    pub fn has_live_bounds(&self) -> bool {
        !self.live.is_empty()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.min == self.floor
            && self.max == self.ceiling
            && self.excluded.is_empty()
            && self.pinned.is_none()
            && self.live.is_empty()
    }

    /// Membership in the type's legal range, independent of any applied constraint.
    pub fn is_legal(&self, value: Scalar) -> bool {
        value >= self.floor && value <= self.ceiling
    }

    /// Whether `value` satisfies every literal constraint applied so far.
    pub fn admits(&self, value: Scalar) -> bool {
        value >= self.min
            && value <= self.max
            && !self.excluded.contains(&value)
            && self.pinned.map_or(true, |p| p == value)
    }

    /// Applies one constraint, resolving its bound once to check for emptiness.
    pub fn apply(
        &mut self,
        constraint: &Constraint,
        reader: &mut dyn StateReader,
    ) -> Result<(), NarrowingError> {
        let value = constraint
            .resolve(self.decimals, reader)
            .map_err(NarrowingError::Bound)?;
        if constraint.bound.is_live() {
            let mut trial = self.clone();
            trial.narrow(constraint.kind, value).map_err(NarrowingError::Empty)?;
            self.live.push(constraint.clone());
            return Ok(());
        }
        self.narrow(constraint.kind, value).map_err(NarrowingError::Empty)
    }

    /// Folds a resolved bound into the interval. Returns the reason if the domain became empty.
    pub fn narrow(&mut self, kind: ConstraintKind, value: Scalar) -> Result<(), String> {
        match kind {
            ConstraintKind::Equal => match self.pinned {
                Some(existing) if existing != value => {
                    return Err(format!("conflicting pins {existing} and {value}"));
                }
                _ => self.pinned = Some(value),
            },
            ConstraintKind::NotEqual => {
                self.excluded.insert(value);
            }
            ConstraintKind::GreaterThan => match value.checked_succ() {
                Some(next) => self.raise_min(next),
                None => return Err(format!("no value is greater than {value}")),
            },
            ConstraintKind::GreaterOrEqual => self.raise_min(value),
            ConstraintKind::LessThan => match value.checked_pred() {
                Some(prev) => self.lower_max(prev),
                None => return Err(format!("no value is less than {value}")),
            },
            ConstraintKind::LessOrEqual => self.lower_max(value),
        }
        match self.emptiness() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn raise_min(&mut self, value: Scalar) {
        if value > self.min {
            self.min = value;
        }
    }

    fn lower_max(&mut self, value: Scalar) {
        if value < self.max {
            self.max = value;
        }
    }

    /// Describes why no value can be produced, or `None` if at least one can.
    pub fn emptiness(&self) -> Option<String> {
        if self.max < self.min {
            return Some(format!(
                "lower bound {} exceeds upper bound {}",
                self.min, self.max
            ));
        }
        if let Some(pin) = self.pinned {
            if pin < self.min || pin > self.max {
                return Some(format!(
                    "pinned value {pin} outside [{}, {}]",
                    self.min, self.max
                ));
            }
            if self.excluded.contains(&pin) {
                return Some(format!("pinned value {pin} is also excluded"));
            }
            return None;
        }
        let blocked = self.excluded.range(self.min..=self.max).count();
        match Scalar::distance(self.min, self.max) {
            Some(span) if span < alloy::primitives::U256::from(blocked) => Some(format!(
                "every value in [{}, {}] is excluded",
                self.min, self.max
            )),
            _ => None,
        }
    }

    /// The domain with every live bound re-read and folded in.
    pub fn effective(&self, reader: &mut dyn StateReader) -> Result<Cow<'_, Self>, NarrowingError> {
        if self.live.is_empty() {
            return Ok(Cow::Borrowed(self));
        }
        let mut resolved = self.clone();
        resolved.live.clear();
        for constraint in &self.live {
            let value = constraint
                .resolve(self.decimals, reader)
                .map_err(NarrowingError::Bound)?;
            resolved.narrow(constraint.kind, value).map_err(|reason| {
                NarrowingError::Empty(format!("{reason} (after reading {})", constraint.bound))
            })?;
        }
        Ok(Cow::Owned(resolved))
    }

    /// Draws one admissible value.
    ///
    /// Excluded values are rejected and redrawn up to `max_attempts` times; after that the
    /// nearest admissible value above the last draw (wrapping to `min`) is returned.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        reader: &mut dyn StateReader,
        max_attempts: usize,
    ) -> Result<Scalar, NarrowingError> {
        let domain = self.effective(reader)?;
        if let Some(pin) = domain.pinned {
            return Ok(pin);
        }
        let mut candidate = random_between(rng, domain.min, domain.max);
        for _ in 0..max_attempts {
            if !domain.excluded.contains(&candidate) {
                return Ok(candidate);
            }
            candidate = random_between(rng, domain.min, domain.max);
        }
        domain.walk_from(candidate).ok_or_else(|| {
            NarrowingError::Empty(format!(
                "every value in [{}, {}] is excluded",
                domain.min, domain.max
            ))
        })
    }

    fn walk_from(&self, start: Scalar) -> Option<Scalar> {
        tracing::warn!(
            start = %start,
            excluded = self.excluded.len(),
            "rejection sampling exhausted, walking to nearest admissible value"
        );
        let mut cursor = start;
        let mut wrapped = false;
        loop {
            if !self.excluded.contains(&cursor) {
                return Some(cursor);
            }
            match cursor.checked_succ().filter(|next| *next <= self.max) {
                Some(next) => cursor = next,
                None if !wrapped => {
                    wrapped = true;
                    cursor = self.min;
                }
                None => return None,
            }
            if wrapped && cursor >= start {
                return None;
            }
        }
    }

    /// Short human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        let mut out = format!("[{}, {}]", self.render(self.min), self.render(self.max));
        if let Some(pin) = self.pinned {
            let _ = write!(out, " == {}", self.render(pin));
        }
        if !self.excluded.is_empty() {
            let excluded: Vec<String> = self.excluded.iter().map(|v| self.render(*v)).collect();
            let _ = write!(out, " except {{{}}}", excluded.join(", "));
        }
        for constraint in &self.live {
            let _ = write!(out, " {} {}", constraint.kind.symbol(), constraint.bound);
        }
        out
    }

    /// Fixed-point values are shown with their decimal point.
    fn render(&self, value: Scalar) -> String {
        if self.decimals == 0 {
            value.to_string()
        } else {
            render_fixed(value, self.decimals)
        }
    }
}
