//! Exploration statistics

use std::fmt;

/// Default number of buckets for out-degree histograms.
pub const OUT_DEGREE_BUCKETS: usize = 32;

/// Histogram over small non-negative samples with a fixed number of
/// buckets. Samples at or above the last bucket are counted in it; min,
/// max and mean still use the exact values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStatistics {
    name: String,
    buckets: Vec<u64>,
    observations: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl BucketStatistics {
    pub fn new(name: impl Into<String>, buckets: usize) -> Self {
        BucketStatistics {
            name: name.into(),
            buckets: vec![0; buckets.max(1)],
            observations: 0,
            sum: 0,
            min: u64::MAX,
            max: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_sample(&mut self, sample: u64) {
        let last = self.buckets.len() - 1;
        let idx = usize::try_from(sample).map_or(last, |s| s.min(last));
        self.buckets[idx] += 1;
        self.observations += 1;
        self.sum = self.sum.saturating_add(sample);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn min(&self) -> Option<u64> {
        (self.observations > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<u64> {
        (self.observations > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.observations > 0).then(|| self.sum as f64 / self.observations as f64)
    }

    /// Smallest bucket value at or below which a `q` fraction of samples fall.
    pub fn percentile(&self, q: f64) -> Option<u64> {
        if self.observations == 0 {
            return None;
        }
        let target = ((self.observations as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (value, count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen >= target {
                return Some(value as u64);
            }
        }
        Some((self.buckets.len() - 1) as u64)
    }

    pub fn median(&self) -> Option<u64> {
        self.percentile(0.5)
    }

    /// Fold another histogram with the same bucket layout into this one.
    pub fn merge(&mut self, other: &BucketStatistics) {
        if self.buckets.len() < other.buckets.len() {
            self.buckets.resize(other.buckets.len(), 0);
        }
        for (mine, theirs) in self.buckets.iter_mut().zip(&other.buckets) {
            *mine += theirs;
        }
        self.observations += other.observations;
        self.sum = self.sum.saturating_add(other.sum);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

impl fmt::Display for BucketStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min(), self.max(), self.mean(), self.median()) {
            (Some(min), Some(max), Some(mean), Some(median)) => write!(
                f,
                "{}: min {} max {} mean {:.2} median {} ({} samples)",
                self.name, min, max, mean, median, self.observations
            ),
            _ => write!(f, "{}: no samples", self.name),
        }
    }
}

/// Summary of a finished run, merged over all workers.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Successor states computed, including duplicates
    pub states_generated: u64,
    /// Distinct states reached, including initial states
    pub distinct_states: u64,
    /// Deepest BFS level reached
    pub max_level: u32,
    pub out_degree: BucketStatistics,
    pub workers: usize,
}

impl RunStats {
    pub fn new(workers: usize) -> Self {
        RunStats {
            states_generated: 0,
            distinct_states: 0,
            max_level: 0,
            out_degree: BucketStatistics::new("out-degree", OUT_DEGREE_BUCKETS),
            workers,
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} states generated, {} distinct states found, depth {} ({} workers)",
            self.states_generated, self.distinct_states, self.max_level, self.workers
        )?;
        write!(f, "{}", self.out_degree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_statistics() {
        let stats = BucketStatistics::new("empty", 4);
        assert_eq!(stats.observations(), 0);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.median(), None);
        assert_eq!(stats.to_string(), "empty: no samples");
    }

    #[test]
    fn test_samples_and_overflow_bucket() {
        let mut stats = BucketStatistics::new("deg", 4);
        for s in [0, 1, 1, 2, 9] {
            stats.add_sample(s);
        }
        assert_eq!(stats.observations(), 5);
        assert_eq!(stats.min(), Some(0));
        assert_eq!(stats.max(), Some(9));
        assert_eq!(stats.mean(), Some(13.0 / 5.0));
        assert_eq!(stats.median(), Some(1));
        // 9 lands in the last bucket
        assert_eq!(stats.percentile(1.0), Some(3));
    }

    #[test]
    fn test_merge() {
        let mut a = BucketStatistics::new("deg", 8);
        let mut b = BucketStatistics::new("deg", 8);
        a.add_sample(2);
        b.add_sample(4);
        b.add_sample(6);
        a.merge(&b);
        assert_eq!(a.observations(), 3);
        assert_eq!(a.min(), Some(2));
        assert_eq!(a.max(), Some(6));
        assert_eq!(a.median(), Some(4));
    }

    #[test]
    fn test_merge_into_empty_keeps_min() {
        let mut total = BucketStatistics::new("deg", 8);
        let empty = BucketStatistics::new("deg", 8);
        let mut one = BucketStatistics::new("deg", 8);
        one.add_sample(3);
        total.merge(&empty);
        total.merge(&one);
        assert_eq!(total.min(), Some(3));
    }
}
