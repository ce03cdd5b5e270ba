use rand::Rng;

pub const DEFAULT_MEAN_LENGTH: usize = 64;
pub const MAX_DYNAMIC_LENGTH: usize = 1024;

/// Length law for dynamic bytes, strings and arrays: exponential shifted to start at 1,
/// with the configured mean, truncated at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthDistribution {
    mean: f64,
    max: usize,
}

impl Default for LengthDistribution {
    fn default() -> Self {
        Self::new(DEFAULT_MEAN_LENGTH, MAX_DYNAMIC_LENGTH)
    }
}

impl LengthDistribution {
    pub fn new(mean: usize, max: usize) -> Self {
        Self {
            mean: mean.max(1) as f64,
            max: max.max(1),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let scale = self.mean - 1.0;
        if scale <= 0.0 {
            return 1;
        }
        let u: f64 = rng.gen();
        let tail = -(1.0 - u).ln() * scale;
        let len = 1usize.saturating_add(tail.floor() as usize);
        len.min(self.max)
    }
}
