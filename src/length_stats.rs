//! Nx/Lx size statistics over a length distribution.
//!
//! The same routine serves N50 (target = assembly length over contig
//! lengths), NA50 (aligned block lengths over assembly length) and NGA50
//! (aligned block lengths over reference length); only the inputs change.

use serde::Serialize;
use std::borrow::Cow;

/// One (Nx, Lx) pair: the length reaching the threshold and how many of the
/// largest elements were needed to get there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeStat {
    pub size: u32,
    pub count: usize,
}

/// Compute (Nx, Lx) for `lengths` against `target`.
///
/// Walks the lengths in descending order and stops at the first index whose
/// running sum reaches `percent / 100 * target`. Returns `None` when the sum
/// never gets there, which is normal for assemblies with little aligned
/// content.
pub fn nx_and_lx(lengths: &[u32], target: u64, percent: f64, already_sorted: bool) -> Option<SizeStat> {
    debug_assert!((0.0..=100.0).contains(&percent));

    let sorted: Cow<[u32]> = if already_sorted {
        Cow::Borrowed(lengths)
    } else {
        let mut owned = lengths.to_vec();
        owned.sort_unstable_by(|a, b| b.cmp(a));
        Cow::Owned(owned)
    };

    let threshold = target as f64 * percent / 100.0;
    let mut running: u64 = 0;

    for (i, &len) in sorted.iter().enumerate() {
        running += len as u64;
        if running as f64 >= threshold {
            return Some(SizeStat {
                size: len,
                count: i + 1,
            });
        }
    }

    None
}

/// Nx for every x in 0..=100, 0 where undefined
pub fn nx_curve(lengths: &[u32], target: u64) -> Vec<u32> {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    (0..=100)
        .map(|x| {
            nx_and_lx(&sorted, target, x as f64, true)
                .map(|stat| stat.size)
                .unwrap_or(0)
        })
        .collect()
}

/// Length statistics over one assembly's aligned blocks
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlignedLengthStats {
    pub largest_alignment: u32,
    pub total_aligned_length: u64,
    pub na50: Option<SizeStat>,
    pub na75: Option<SizeStat>,
    /// Genome-relative stats are skipped in combined-reference mode
    pub nga50: Option<SizeStat>,
    pub nga75: Option<SizeStat>,
}

impl AlignedLengthStats {
    pub fn compute(aligned_lengths: &[u32], assembly_length: u64, reference_length: Option<u64>) -> Self {
        let mut sorted = aligned_lengths.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        let genome_relative = |percent: f64| {
            reference_length.and_then(|len| nx_and_lx(&sorted, len, percent, true))
        };

        AlignedLengthStats {
            largest_alignment: sorted.first().copied().unwrap_or(0),
            total_aligned_length: sorted.iter().map(|&l| l as u64).sum(),
            na50: nx_and_lx(&sorted, assembly_length, 50.0, true),
            na75: nx_and_lx(&sorted, assembly_length, 75.0, true),
            nga50: genome_relative(50.0),
            nga75: genome_relative(75.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n50_reaches_on_first_element() {
        let stat = nx_and_lx(&[500, 300, 200, 100], 1000, 50.0, true).unwrap();
        assert_eq!(stat, SizeStat { size: 500, count: 1 });
    }

    #[test]
    fn test_n75_needs_more_elements() {
        let stat = nx_and_lx(&[500, 300, 200, 100], 1000, 75.0, true).unwrap();
        assert_eq!(stat, SizeStat { size: 300, count: 2 });
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let stat = nx_and_lx(&[100, 500, 200, 300], 1000, 50.0, false).unwrap();
        assert_eq!(stat, SizeStat { size: 500, count: 1 });
    }

    #[test]
    fn test_unreached_threshold_is_undefined() {
        // Genome-relative target larger than everything aligned
        assert_eq!(nx_and_lx(&[100, 50], 1000, 50.0, true), None);
        assert_eq!(nx_and_lx(&[], 1000, 50.0, true), None);
    }

    #[test]
    fn test_nx_curve_shape() {
        let curve = nx_curve(&[100, 500, 200, 300], 1100);
        assert_eq!(curve.len(), 101);
        assert_eq!(curve[0], 500);
        assert_eq!(curve[50], 300);
        // N100 needs every block
        assert_eq!(curve[100], 100);
        assert_eq!(nx_curve(&[100], 1000)[50], 0);
        assert!(curve.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_aligned_length_stats() {
        let stats = AlignedLengthStats::compute(&[300, 500, 200, 100], 1000, Some(2000));
        assert_eq!(stats.largest_alignment, 500);
        assert_eq!(stats.total_aligned_length, 1100);
        assert_eq!(stats.na50, Some(SizeStat { size: 500, count: 1 }));
        assert_eq!(stats.nga50, Some(SizeStat { size: 200, count: 3 }));
        assert_eq!(stats.nga75, None);

        let combined = AlignedLengthStats::compute(&[300, 500], 1000, None);
        assert_eq!(combined.nga50, None);
    }
}
