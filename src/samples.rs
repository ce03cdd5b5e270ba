//! Gas samples per function and their comparison with static estimates.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasEstimate {
    /// The static analyser could not bound the cost.
    Infinite,
    Bounded(u64),
}

impl GasEstimate {
    /// The less constraining of two estimates: unbounded beats any bound, else the larger bound.
    pub fn wider(self, other: Self) -> Self {
        match (self, other) {
            (Self::Bounded(a), Self::Bounded(b)) => Self::Bounded(a.max(b)),
            _ => Self::Infinite,
        }
    }
}

impl FromStr for GasEstimate {
    type Err = std::num::ParseIntError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("infinite") {
            return Ok(Self::Infinite);
        }
        trimmed.parse().map(Self::Bounded)
    }
}

impl fmt::Display for GasEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => f.write_str("infinite"),
            Self::Bounded(gas) => write!(f, "{gas}"),
        }
    }
}

/// Static estimate relative to the observed average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimateClass {
    LessThan,
    GreaterThan,
    Equal,
    None,
}

impl EstimateClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
            Self::Equal => "equal",
            Self::None => "none",
        }
    }
}

/// How sample frequency evolves as cost grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostShape {
    Constant,
    Decreasing,
    Increasing,
    Other,
}

impl CostShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Decreasing => "decreasing",
            Self::Increasing => "increasing",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasSummary {
    pub count: usize,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSamples {
    estimates: BTreeMap<String, GasEstimate>,
    costs: BTreeMap<String, Vec<u64>>,
}

impl GasSamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_estimate(&mut self, function: &str, estimate: GasEstimate) {
        self.estimates.insert(function.to_string(), estimate);
    }

    pub fn estimate(&self, function: &str) -> Option<GasEstimate> {
        self.estimates.get(function).copied()
    }

    pub fn record(&mut self, function: &str, gas_used: u64) {
        self.costs.entry(function.to_string()).or_default().push(gas_used);
    }

    pub fn costs(&self, function: &str) -> &[u64] {
        self.costs.get(function).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.costs.keys().map(String::as_str)
    }

    /// Appends another session's samples. The result is independent of merge order when costs
    /// are compared as multisets. Conflicting estimates for one function resolve to the wider one.
    pub fn merge(&mut self, other: GasSamples) {
        for (function, estimate) in other.estimates {
            match self.estimates.entry(function) {
                Entry::Vacant(slot) => {
                    slot.insert(estimate);
                }
                Entry::Occupied(mut slot) => {
                    let current = *slot.get();
                    if current != estimate {
                        tracing::warn!(
                            function = %slot.key(),
                            %current,
                            incoming = %estimate,
                            "sessions disagree on the static estimate"
                        );
                        slot.insert(current.wider(estimate));
                    }
                }
            }
        }
        for (function, costs) in other.costs {
            self.costs.entry(function).or_default().extend(costs);
        }
    }

    pub fn summary(&self, function: &str) -> Option<GasSummary> {
        let costs = self.costs.get(function).filter(|c| !c.is_empty())?;
        let total: u128 = costs.iter().map(|c| u128::from(*c)).sum();
        Some(GasSummary {
            count: costs.len(),
            min: costs.iter().copied().min().unwrap_or(0),
            max: costs.iter().copied().max().unwrap_or(0),
            mean: total as f64 / costs.len() as f64,
        })
    }

    pub fn classify(&self, function: &str) -> Option<(EstimateClass, CostShape)> {
        let summary = self.summary(function)?;
        let estimate = match self.estimate(function) {
            None | Some(GasEstimate::Infinite) => EstimateClass::None,
            Some(GasEstimate::Bounded(gas)) => {
                let gas = gas as f64;
                if gas < summary.mean {
                    EstimateClass::LessThan
                } else if gas > summary.mean {
                    EstimateClass::GreaterThan
                } else {
                    EstimateClass::Equal
                }
            }
        };
        Some((estimate, cost_shape(self.costs(function))))
    }
}

fn cost_shape(costs: &[u64]) -> CostShape {
    let mut frequencies: BTreeMap<u64, usize> = BTreeMap::new();
    for cost in costs {
        *frequencies.entry(*cost).or_default() += 1;
    }
    if frequencies.len() == 1 {
        return CostShape::Constant;
    }
    let counts: Vec<usize> = frequencies.into_values().collect();
    if counts.windows(2).all(|w| w[1] <= w[0]) {
        CostShape::Decreasing
    } else if counts.windows(2).all(|w| w[1] >= w[0]) {
        CostShape::Increasing
    } else {
        CostShape::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(function: &str, costs: &[u64]) -> GasSamples {
        let mut s = GasSamples::new();
        for c in costs {
            s.record(function, *c);
        }
        s
    }

    #[test]
    fn shapes_follow_frequency_by_ascending_cost() {
        assert_eq!(cost_shape(&[5, 5, 5]), CostShape::Constant);
        assert_eq!(cost_shape(&[1, 1, 1, 2, 2, 3]), CostShape::Decreasing);
        assert_eq!(cost_shape(&[1, 2, 2, 3, 3, 3]), CostShape::Increasing);
        assert_eq!(cost_shape(&[1, 2, 2, 3]), CostShape::Other);
        // equal frequencies read as non-increasing first
        assert_eq!(cost_shape(&[1, 2]), CostShape::Decreasing);
    }

    #[test]
    fn estimates_compare_against_the_mean() {
        let mut s = samples("f", &[100, 200]);
        assert_eq!(s.classify("f").map(|c| c.0), Some(EstimateClass::None));
        s.set_estimate("f", GasEstimate::Bounded(120));
        assert_eq!(s.classify("f").map(|c| c.0), Some(EstimateClass::LessThan));
        s.set_estimate("f", GasEstimate::Bounded(150));
        assert_eq!(s.classify("f").map(|c| c.0), Some(EstimateClass::Equal));
        s.set_estimate("f", "infinite".parse().expect("parses"));
        assert_eq!(s.classify("f").map(|c| c.0), Some(EstimateClass::None));
        assert!(s.classify("g").is_none());
    }

    #[test]
    fn merge_is_order_independent() {
        let a = samples("f", &[1, 2]);
        let mut b = samples("f", &[3]);
        b.record("g", 9);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        for function in ["f", "g"] {
            let mut x = ab.costs(function).to_vec();
            let mut y = ba.costs(function).to_vec();
            x.sort_unstable();
            y.sort_unstable();
            assert_eq!(x, y);
        }
        assert_eq!(ab.summary("f").map(|s| (s.min, s.max, s.count)), Some((1, 3, 3)));
    }

    #[test]
    fn conflicting_estimates_merge_to_the_wider_one() {
        let mut a = samples("f", &[1]);
        a.set_estimate("f", GasEstimate::Bounded(100));
        a.set_estimate("h", GasEstimate::Bounded(5));
        let mut b = samples("f", &[2]);
        b.set_estimate("f", GasEstimate::Bounded(300));
        b.set_estimate("h", GasEstimate::Infinite);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);

        for merged in [&ab, &ba] {
            assert_eq!(merged.estimate("f"), Some(GasEstimate::Bounded(300)));
            assert_eq!(merged.estimate("h"), Some(GasEstimate::Infinite));
        }
        assert_eq!(ab.estimates, ba.estimates);
    }
}
