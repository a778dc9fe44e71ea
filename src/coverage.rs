//! Per-reference-base coverage and maximum-alignment-size tracking.
//!
//! Every chromosome gets four arrays of length `chromosome_length + 1`,
//! indexed by reference position. Alignments only ever raise the stored
//! maxima, so the result does not depend on fold order.

use crate::alignment::AlignmentRecord;
use crate::percentile::PercentileCurve;
use crate::reference::ReferenceDescriptor;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::Serialize;

/// Per-base arrays for one chromosome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromCoverage {
    pub covered: Vec<bool>,
    /// Largest raw alignment length covering each base
    pub max_alignment_size: Vec<u32>,
    /// Largest alignment length excluding local misassemblies
    pub max_alignment_size_excluding: Vec<u32>,
    /// Longest declared contig length covering each base
    pub max_contig_length: Vec<u32>,
}

/// Sizes one alignment writes at every base it covers
#[derive(Debug, Clone, Copy)]
struct BlockSizes {
    alignment: u32,
    excluding: u32,
    contig: u32,
}

impl ChromCoverage {
    fn new(chromosome_length: u32) -> Self {
        let slots = chromosome_length as usize + 1;
        ChromCoverage {
            covered: vec![false; slots],
            max_alignment_size: vec![0; slots],
            max_alignment_size_excluding: vec![0; slots],
            max_contig_length: vec![0; slots],
        }
    }

    pub fn slots(&self) -> usize {
        self.covered.len()
    }

    /// Mark `[start, end)`; returns how many positions fell past the arrays
    fn mark_range(&mut self, start: usize, end: usize, sizes: BlockSizes) -> usize {
        let slots = self.slots();
        let skipped = end.saturating_sub(start.max(slots));
        let end = end.min(slots);
        if start >= end {
            return skipped;
        }

        for pos in start..end {
            self.covered[pos] = true;
            self.max_alignment_size[pos] = self.max_alignment_size[pos].max(sizes.alignment);
            self.max_alignment_size_excluding[pos] =
                self.max_alignment_size_excluding[pos].max(sizes.excluding);
            self.max_contig_length[pos] = self.max_contig_length[pos].max(sizes.contig);
        }

        skipped
    }

    fn clear(&mut self, pos: usize) {
        if pos < self.slots() {
            self.covered[pos] = false;
            self.max_alignment_size[pos] = 0;
            self.max_alignment_size_excluding[pos] = 0;
            self.max_contig_length[pos] = 0;
        }
    }

    pub fn covered_bases(&self) -> u64 {
        self.covered.iter().filter(|&&c| c).count() as u64
    }
}

/// Headline coverage numbers and the three percentile curves
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageSummary {
    /// Covered reference bases, floored to 1
    pub covered_bases: u64,
    /// Covered bases over total reference length, in percent
    pub genome_fraction: f64,
    pub duplication_ratio: f64,
    pub total_aligned_length: u64,
    /// EAx max: raw alignment size per reference base
    pub ea_max: PercentileCurve,
    /// EAx max over lengths that exclude local misassemblies
    pub ea_max_excluding: PercentileCurve,
    /// Ex max: declared contig length per reference base
    pub e_max: PercentileCurve,
}

pub struct CoverageTracker<'r> {
    reference: &'r ReferenceDescriptor,
    chromosomes: IndexMap<String, ChromCoverage>,
    total_aligned_length: u64,
    skipped_positions: u64,
}

impl<'r> CoverageTracker<'r> {
    pub fn new(reference: &'r ReferenceDescriptor) -> Self {
        let chromosomes = reference
            .chromosomes()
            .map(|(name, len)| (name.to_string(), ChromCoverage::new(len)))
            .collect();

        CoverageTracker {
            reference,
            chromosomes,
            total_aligned_length: 0,
            skipped_positions: 0,
        }
    }

    /// Fold one alignment in. Forward blocks cover `[start, end)`; blocks with
    /// `start > end` wrap the origin and cover `[start, length)` then
    /// `[0, end)`. Positions past the arrays are skipped with a warning.
    pub fn add_alignment(&mut self, alignment: &AlignmentRecord, contig_length: u32) {
        let Some(chrom) = self.chromosomes.get_mut(&alignment.reference) else {
            warn!(
                "Skipping alignment of {} to unknown reference chromosome {}",
                alignment.contig, alignment.reference
            );
            return;
        };

        self.total_aligned_length += alignment.len_excluding_local_misassemblies as u64;

        let sizes = BlockSizes {
            alignment: alignment.len,
            excluding: alignment.len_excluding_local_misassemblies,
            contig: contig_length,
        };

        let start = alignment.ref_start as usize;
        let end = alignment.ref_end as usize;

        let skipped = if alignment.is_wraparound() {
            let chrom_len = chrom.slots() - 1;
            chrom.mark_range(start, chrom_len, sizes) + chrom.mark_range(0, end, sizes)
        } else {
            chrom.mark_range(start, end, sizes)
        };

        if skipped > 0 {
            warn!(
                "Alignment out of reference bounds: contig {}, reference {} (bounds [0, {})), alignment [{}, {}]; skipped {} positions",
                alignment.contig,
                alignment.reference,
                chrom.slots(),
                alignment.ref_start,
                alignment.ref_end,
                skipped
            );
            self.skipped_positions += skipped as u64;
        }
    }

    /// Reset ambiguous reference positions in all four arrays
    pub fn mask_ambiguous(&mut self) {
        for (name, chrom) in self.chromosomes.iter_mut() {
            for &pos in self.reference.ambiguous_positions(name) {
                chrom.clear(pos as usize);
            }
        }
    }

    pub fn chromosome(&self, name: &str) -> Option<&ChromCoverage> {
        self.chromosomes.get(name)
    }

    /// Covered bases, floored to 1 so ratios never divide by zero
    pub fn covered_bases(&self) -> u64 {
        let covered: u64 = self.chromosomes.values().map(|c| c.covered_bases()).sum();
        if covered == 0 {
            warn!("Found no covered bases, using 1 to avoid division by zero");
            1
        } else {
            covered
        }
    }

    pub fn total_aligned_length(&self) -> u64 {
        self.total_aligned_length
    }

    pub fn skipped_positions(&self) -> u64 {
        self.skipped_positions
    }

    pub fn duplication_ratio(&self) -> f64 {
        self.total_aligned_length as f64 / self.covered_bases() as f64
    }

    /// Mask ambiguous bases, then flatten each array across chromosomes and
    /// build the percentile curves
    pub fn summarize(mut self) -> CoverageSummary {
        self.mask_ambiguous();

        let raw_covered: u64 = self.chromosomes.values().map(|c| c.covered_bases()).sum();
        let covered_bases = self.covered_bases();
        let duplication_ratio = self.total_aligned_length as f64 / covered_bases as f64;
        let reference_length = self.reference.total_length();
        let genome_fraction = if reference_length > 0 {
            raw_covered as f64 * 100.0 / reference_length as f64
        } else {
            0.0
        };

        debug!(
            "Duplication ratio = {:.2} = {}/{}",
            duplication_ratio, self.total_aligned_length, covered_bases
        );

        let total_slots: usize = self.chromosomes.values().map(|c| c.slots()).sum();
        let mut alignment = Vec::with_capacity(total_slots);
        let mut excluding = Vec::with_capacity(total_slots);
        let mut contig = Vec::with_capacity(total_slots);
        for chrom in self.chromosomes.into_values() {
            alignment.extend(chrom.max_alignment_size);
            excluding.extend(chrom.max_alignment_size_excluding);
            contig.extend(chrom.max_contig_length);
        }

        CoverageSummary {
            covered_bases,
            genome_fraction,
            duplication_ratio,
            total_aligned_length: self.total_aligned_length,
            ea_max: PercentileCurve::build(alignment),
            ea_max_excluding: PercentileCurve::build(excluding),
            e_max: PercentileCurve::build(contig),
        }
    }
}
