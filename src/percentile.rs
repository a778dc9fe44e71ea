use rayon::prelude::*;
use serde::Serialize;

/// Size thresholds reported as "fraction of bases at or above"
pub const EXCEEDANCE_THRESHOLDS: [u32; 4] = [5_000, 10_000, 15_000, 20_000];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Exceedance {
    pub threshold: u32,
    pub fraction: f64,
}

/// 101-point descending percentile curve over a per-base metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileCurve {
    /// Entry i (0..100) is the value at descending rank len * i / 100;
    /// entry 100 is the minimum
    pub values: Vec<u32>,
    /// Integer (floored) mean over all elements
    pub mean: u64,
    pub exceedance: Vec<Exceedance>,
}

impl PercentileCurve {
    /// Build the curve, consuming the flattened array.
    ///
    /// Sorting runs on the current rayon pool.
    pub fn build(mut values: Vec<u32>) -> Self {
        if values.is_empty() {
            return PercentileCurve {
                values: vec![0; 101],
                mean: 0,
                exceedance: EXCEEDANCE_THRESHOLDS
                    .iter()
                    .map(|&threshold| Exceedance { threshold, fraction: 0.0 })
                    .collect(),
            };
        }

        values.par_sort_unstable_by(|a, b| b.cmp(a));

        let n = values.len();
        let mut curve: Vec<u32> = (0..100).map(|i| values[n * i / 100]).collect();
        curve.push(values[n - 1]);

        let sum: u64 = values.par_iter().map(|&v| v as u64).sum();

        let exceedance = EXCEEDANCE_THRESHOLDS
            .iter()
            .map(|&threshold| {
                let at_or_above = values.partition_point(|&v| v >= threshold);
                Exceedance {
                    threshold,
                    fraction: at_or_above as f64 / n as f64,
                }
            })
            .collect();

        PercentileCurve {
            values: curve,
            mean: sum / n as u64,
            exceedance,
        }
    }

    pub fn at(&self, percent: usize) -> u32 {
        self.values[percent.min(100)]
    }

    pub fn fraction_at_least(&self, threshold: u32) -> Option<f64> {
        self.exceedance
            .iter()
            .find(|e| e.threshold == threshold)
            .map(|e| e.fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_over_uniform_ramp() {
        // 1..=200 shuffled a bit
        let mut values: Vec<u32> = (1..=200).collect();
        values.reverse();
        values.swap(3, 150);

        let curve = PercentileCurve::build(values);
        assert_eq!(curve.values.len(), 101);
        assert_eq!(curve.at(0), 200);
        assert_eq!(curve.at(50), 100);
        assert_eq!(curve.at(99), 2);
        assert_eq!(curve.at(100), 1);
        assert_eq!(curve.mean, 100); // 20100 / 200 = 100.5, floored
    }

    #[test]
    fn test_exceedance_fractions() {
        let values = vec![0, 4_999, 5_000, 12_000, 20_000, 30_000, 0, 0];
        let curve = PercentileCurve::build(values);
        assert_eq!(curve.fraction_at_least(5_000), Some(4.0 / 8.0));
        assert_eq!(curve.fraction_at_least(10_000), Some(3.0 / 8.0));
        assert_eq!(curve.fraction_at_least(15_000), Some(2.0 / 8.0));
        assert_eq!(curve.fraction_at_least(20_000), Some(2.0 / 8.0));
        assert_eq!(curve.fraction_at_least(1), None);
    }

    #[test]
    fn test_small_array_repeats_ranks() {
        let curve = PercentileCurve::build(vec![7, 3]);
        assert!(curve.values[..50].iter().all(|&v| v == 7));
        assert!(curve.values[50..].iter().all(|&v| v == 3));
    }

    #[test]
    fn test_empty_array() {
        let curve = PercentileCurve::build(Vec::new());
        assert!(curve.values.iter().all(|&v| v == 0));
        assert_eq!(curve.mean, 0);
        assert_eq!(curve.fraction_at_least(5_000), Some(0.0));
    }
}
