/// Property-based tests for the statistics engine
///
/// Uses proptest to check the invariants that must hold for any input:
/// Nx/Lx threshold minimality, fold-order independence of coverage maxima,
/// monotone percentile curves and cursor arithmetic on match-only streams.
use asmqual::alignment::AlignmentRecord;
use asmqual::coverage::CoverageTracker;
use asmqual::length_stats::nx_and_lx;
use asmqual::percentile::PercentileCurve;
use asmqual::reference::ReferenceDescriptor;
use asmqual::variants::{extract_variants, IndelsInfo};
use proptest::prelude::*;

const CHROM_LEN: u32 = 1_000;

fn reference(ambiguous: Vec<u32>) -> ReferenceDescriptor {
    let mut reference = ReferenceDescriptor::new();
    reference
        .add_chromosome("chr1", CHROM_LEN, ambiguous)
        .expect("fresh descriptor");
    reference
}

fn record(ref_start: u32, ref_end: u32, len: u32, excluding: u32, ops: &str) -> AlignmentRecord {
    AlignmentRecord::from_line(&format!(
        "ctg\tchr1\t{ref_start}\t{ref_end}\t1\t{len}\t100.0\t{len}\t{excluding}\t{len}\t{ops}"
    ))
    .expect("well-formed line")
}

fn block_strategy() -> impl Strategy<Value = (u32, u32, u32, u32, u32)> {
    (1u32..CHROM_LEN, 1u32..CHROM_LEN, 1u32..50_000, 1u32..50_000, 0u32..100_000)
}

/// Property: (Nx, Lx) is the first prefix reaching the threshold
#[test]
fn prop_nx_prefix_is_minimal() {
    proptest!(|(
        lengths in prop::collection::vec(1u32..100_000, 0..200),
        target in 1u64..5_000_000,
        percent in 1u32..=100
    )| {
        let mut lengths = lengths;
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let threshold = target as f64 * percent as f64 / 100.0;

        if let Some(stat) = nx_and_lx(&lengths, target, percent as f64, true) {
            let through: u64 = lengths[..stat.count].iter().map(|&l| l as u64).sum();
            let before: u64 = lengths[..stat.count - 1].iter().map(|&l| l as u64).sum();
            prop_assert!(through as f64 >= threshold);
            prop_assert!((before as f64) < threshold);
            prop_assert_eq!(stat.size, lengths[stat.count - 1]);
        } else {
            let total: u64 = lengths.iter().map(|&l| l as u64).sum();
            prop_assert!((total as f64) < threshold);
        }
    });
}

/// Property: coverage maxima never decrease and do not depend on fold order
#[test]
fn prop_coverage_fold_order_independent() {
    proptest!(|(blocks in prop::collection::vec(block_strategy(), 1..20))| {
        let reference = reference(vec![]);
        let records: Vec<(AlignmentRecord, u32)> = blocks
            .iter()
            .map(|&(start, end, len, excluding, contig)| (record(start, end, len, excluding, &format!(":{len}")), contig))
            .collect();

        let mut forward = CoverageTracker::new(&reference);
        for (rec, contig) in &records {
            let before = forward.chromosome("chr1").expect("chr1 tracked").clone();
            forward.add_alignment(rec, *contig);
            let after = forward.chromosome("chr1").expect("chr1 tracked");
            for pos in 0..after.slots() {
                prop_assert!(after.max_alignment_size[pos] >= before.max_alignment_size[pos]);
                prop_assert!(after.max_alignment_size_excluding[pos] >= before.max_alignment_size_excluding[pos]);
                prop_assert!(after.max_contig_length[pos] >= before.max_contig_length[pos]);
                prop_assert!(after.covered[pos] || !before.covered[pos]);
            }
        }

        let mut reversed = CoverageTracker::new(&reference);
        for (rec, contig) in records.iter().rev() {
            reversed.add_alignment(rec, *contig);
        }

        prop_assert_eq!(forward.chromosome("chr1"), reversed.chromosome("chr1"));
        prop_assert_eq!(forward.total_aligned_length(), reversed.total_aligned_length());
    });
}

/// Property: percentile curves are non-increasing
#[test]
fn prop_percentile_curve_non_increasing() {
    proptest!(|(values in prop::collection::vec(any::<u32>(), 0..2_000))| {
        let min = values.iter().copied().min().unwrap_or(0);
        let curve = PercentileCurve::build(values);
        prop_assert_eq!(curve.values.len(), 101);
        for pair in curve.values.windows(2) {
            prop_assert!(pair[0] >= pair[1]);
        }
        prop_assert_eq!(curve.values[100], min);
    });
}

/// Property: match-only streams touch no counters and move cursors by the span
#[test]
fn prop_match_only_stream_is_clean() {
    proptest!(|(
        runs in prop::collection::vec(1u32..500, 1..30),
        ref_start in 1u32..10_000,
        contig_start in 1u32..10_000,
        reverse in any::<bool>()
    )| {
        let span: u32 = runs.iter().sum();
        let ops: String = runs.iter().map(|n| format!(":{n}")).collect();
        let contig_end = if reverse { contig_start.saturating_sub(span) } else { contig_start + span };
        let alignment = AlignmentRecord::from_line(&format!(
            "ctg\tchr1\t{ref_start}\t{}\t{contig_start}\t{contig_end}\t100.0\t{span}\t{span}\t{span}\t{ops}",
            ref_start + span
        ))
        .expect("well-formed line");

        let mut indels = IndelsInfo::default();
        let cursors = extract_variants(&alignment, &mut indels, None).expect("no log to fail");

        prop_assert_eq!(indels, IndelsInfo::default());
        prop_assert_eq!(cursors.ref_pos, ref_start as i64 + span as i64);
        let step = alignment.strand_step();
        prop_assert_eq!(cursors.contig_pos, contig_start as i64 + step * span as i64);
    });
}

#[test]
fn test_wraparound_marks_both_ends() {
    let mut reference = ReferenceDescriptor::new();
    reference.add_chromosome("chr1", 100, vec![]).unwrap();
    let mut tracker = CoverageTracker::new(&reference);
    tracker.add_alignment(&record(95, 5, 10, 10, ":10"), 10);

    let chrom = tracker.chromosome("chr1").unwrap();
    let covered: Vec<usize> = (0..chrom.slots()).filter(|&p| chrom.covered[p]).collect();
    let expected: Vec<usize> = (0..5).chain(95..100).collect();
    assert_eq!(covered, expected);
}

#[test]
fn test_zero_coverage_floors_to_one() {
    // The only covered base is ambiguous
    let reference = reference(vec![10]);
    let mut tracker = CoverageTracker::new(&reference);
    tracker.add_alignment(&record(10, 11, 37, 25, ":1"), 37);

    let summary = tracker.summarize();
    assert_eq!(summary.covered_bases, 1);
    assert_eq!(summary.duplication_ratio, 25.0);
    assert_eq!(summary.genome_fraction, 0.0);
}
