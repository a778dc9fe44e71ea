//! Per-assembly result record and the writers that consume it.

use crate::breakpoints::ContigBreakpoints;
use crate::coverage::CoverageSummary;
use crate::length_stats::{nx_curve, AlignedLengthStats, SizeStat};
use crate::percentile::PercentileCurve;
use crate::variants::IndelsInfo;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Everything computed for one successfully aligned assembly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub label: String,
    pub assembly_length: u64,
    pub alignments: usize,
    #[serde(flatten)]
    pub lengths: AlignedLengthStats,
    pub covered_bases: u64,
    pub genome_fraction: f64,
    pub duplication_ratio: f64,
    pub mismatches: u64,
    pub insertions: u64,
    pub deletions: u64,
    pub indels: usize,
    pub short_indels: usize,
    pub long_indels: usize,
    pub mismatches_per_100kbp: f64,
    pub indels_per_100kbp: f64,
    pub ea_max: PercentileCurve,
    pub ea_max_excluding: PercentileCurve,
    pub e_max: PercentileCurve,
    /// NAx for x in 0..=100
    pub nax: Vec<u32>,
    /// NGAx for x in 0..=100; absent in combined-reference mode
    pub ngax: Option<Vec<u32>>,
    pub breakpoints: ContigBreakpoints,
}

/// Inputs gathered by one analysis pass
pub struct ReportInputs<'a> {
    pub label: &'a str,
    pub assembly_length: u64,
    pub aligned_lengths: &'a [u32],
    /// None in combined-reference mode
    pub reference_length: Option<u64>,
    pub coverage: CoverageSummary,
    pub indels: &'a IndelsInfo,
    pub breakpoints: ContigBreakpoints,
}

fn per_100kbp(count: u64, covered_bases: u64) -> f64 {
    count as f64 * 100_000.0 / covered_bases.max(1) as f64
}

impl AssemblyReport {
    pub fn build(inputs: ReportInputs) -> Self {
        let ReportInputs {
            label,
            assembly_length,
            aligned_lengths,
            reference_length,
            coverage,
            indels,
            breakpoints,
        } = inputs;

        let lengths = AlignedLengthStats::compute(aligned_lengths, assembly_length, reference_length);
        let covered = coverage.covered_bases;

        AssemblyReport {
            label: label.to_string(),
            assembly_length,
            alignments: aligned_lengths.len(),
            lengths,
            covered_bases: covered,
            genome_fraction: coverage.genome_fraction,
            duplication_ratio: coverage.duplication_ratio,
            mismatches: indels.mismatches,
            insertions: indels.insertions,
            deletions: indels.deletions,
            indels: indels.indel_count(),
            short_indels: indels.short_indels(),
            long_indels: indels.long_indels(),
            mismatches_per_100kbp: per_100kbp(indels.mismatches, covered),
            indels_per_100kbp: per_100kbp(indels.indel_count() as u64, covered),
            ea_max: coverage.ea_max,
            ea_max_excluding: coverage.ea_max_excluding,
            e_max: coverage.e_max,
            nax: nx_curve(aligned_lengths, assembly_length),
            ngax: reference_length.map(|len| nx_curve(aligned_lengths, len)),
            breakpoints,
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

fn size_cell(stat: Option<SizeStat>) -> String {
    stat.map(|s| s.size.to_string()).unwrap_or_else(|| "-".to_string())
}

fn count_cell(stat: Option<SizeStat>) -> String {
    stat.map(|s| s.count.to_string()).unwrap_or_else(|| "-".to_string())
}

fn curve_mean(curve: &PercentileCurve) -> String {
    curve.mean.to_string()
}

type Row = (&'static str, fn(&AssemblyReport) -> String);

const TSV_ROWS: &[Row] = &[
    ("Largest alignment", |r: &AssemblyReport| r.lengths.largest_alignment.to_string()),
    ("Total aligned length", |r: &AssemblyReport| r.lengths.total_aligned_length.to_string()),
    ("NA50", |r: &AssemblyReport| size_cell(r.lengths.na50)),
    ("NA75", |r: &AssemblyReport| size_cell(r.lengths.na75)),
    ("LA50", |r: &AssemblyReport| count_cell(r.lengths.na50)),
    ("LA75", |r: &AssemblyReport| count_cell(r.lengths.na75)),
    ("NGA50", |r: &AssemblyReport| size_cell(r.lengths.nga50)),
    ("NGA75", |r: &AssemblyReport| size_cell(r.lengths.nga75)),
    ("LGA50", |r: &AssemblyReport| count_cell(r.lengths.nga50)),
    ("LGA75", |r: &AssemblyReport| count_cell(r.lengths.nga75)),
    ("Genome fraction (%)", |r: &AssemblyReport| format!("{:.3}", r.genome_fraction)),
    ("Duplication ratio", |r: &AssemblyReport| format!("{:.3}", r.duplication_ratio)),
    ("# mismatches", |r: &AssemblyReport| r.mismatches.to_string()),
    ("# indels", |r: &AssemblyReport| r.indels.to_string()),
    ("# indels (<= 5 bp)", |r: &AssemblyReport| r.short_indels.to_string()),
    ("# indels (> 5 bp)", |r: &AssemblyReport| r.long_indels.to_string()),
    ("Indels length", |r: &AssemblyReport| (r.insertions + r.deletions).to_string()),
    ("# mismatches per 100 kbp", |r: &AssemblyReport| format!("{:.2}", r.mismatches_per_100kbp)),
    ("# indels per 100 kbp", |r: &AssemblyReport| format!("{:.2}", r.indels_per_100kbp)),
    ("EAxmax mean", |r: &AssemblyReport| curve_mean(&r.ea_max)),
    ("EAxmax mean (excluding local)", |r: &AssemblyReport| curve_mean(&r.ea_max_excluding)),
    ("Exmax mean", |r: &AssemblyReport| curve_mean(&r.e_max)),
];

/// One row per metric, one column per report
pub fn write_report_tsv<P: AsRef<Path>>(path: P, reports: &[&AssemblyReport]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    write!(writer, "Assembly")?;
    for report in reports {
        write!(writer, "\t{}", report.label)?;
    }
    writeln!(writer)?;

    for (name, cell) in TSV_ROWS {
        write!(writer, "{name}")?;
        for report in reports {
            write!(writer, "\t{}", cell(report))?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

fn format_stat(stat: Option<SizeStat>) -> String {
    match stat {
        Some(s) => format!("{} bp ({} alignments)", format_number(s.size as u64), s.count),
        None => "-".to_string(),
    }
}

/// Human-readable summary on stdout
pub fn print_report(report: &AssemblyReport) {
    println!("=== {} ===", report.label);
    println!("  Alignments:           {}", format_number(report.alignments as u64));
    println!("  Assembly length:      {} bp", format_number(report.assembly_length));
    println!("  Total aligned:        {} bp", format_number(report.lengths.total_aligned_length));
    println!("  Largest alignment:    {} bp", format_number(report.lengths.largest_alignment as u64));
    println!("  NA50:                 {}", format_stat(report.lengths.na50));
    println!("  NGA50:                {}", format_stat(report.lengths.nga50));
    println!(
        "  Covered bases:        {} ({:.2}% of reference)",
        format_number(report.covered_bases),
        report.genome_fraction
    );
    println!("  Duplication ratio:    {:.3}", report.duplication_ratio);
    println!(
        "  Mismatches:           {} ({:.2} per 100 kbp)",
        format_number(report.mismatches),
        report.mismatches_per_100kbp
    );
    println!(
        "  Indels:               {} short, {} long ({:.2} per 100 kbp)",
        format_number(report.short_indels as u64),
        format_number(report.long_indels as u64),
        report.indels_per_100kbp
    );
    println!("  EAxmax mean:          {} bp", format_number(report.ea_max.mean));
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(values: Vec<u32>) -> PercentileCurve {
        PercentileCurve::build(values)
    }

    fn sample_report(reference_length: Option<u64>) -> AssemblyReport {
        let indels = IndelsInfo {
            mismatches: 3,
            insertions: 2,
            deletions: 10,
            indels_list: vec![2, 10],
        };
        let coverage = CoverageSummary {
            covered_bases: 200_000,
            genome_fraction: 80.0,
            duplication_ratio: 1.05,
            total_aligned_length: 210_000,
            ea_max: curve(vec![100, 50]),
            ea_max_excluding: curve(vec![100, 50]),
            e_max: curve(vec![120, 60]),
        };
        AssemblyReport::build(ReportInputs {
            label: "asm",
            assembly_length: 1000,
            aligned_lengths: &[300, 500, 200],
            reference_length,
            coverage,
            indels: &indels,
            breakpoints: ContigBreakpoints::default(),
        })
    }

    #[test]
    fn test_report_fields() {
        let report = sample_report(Some(2000));
        assert_eq!(report.alignments, 3);
        assert_eq!(report.lengths.largest_alignment, 500);
        assert_eq!(report.lengths.na50, Some(SizeStat { size: 500, count: 1 }));
        assert_eq!(report.lengths.nga50, Some(SizeStat { size: 200, count: 3 }));
        assert_eq!(report.short_indels, 1);
        assert_eq!(report.long_indels, 1);
        assert!((report.mismatches_per_100kbp - 1.5).abs() < 1e-9);
        assert!((report.indels_per_100kbp - 1.0).abs() < 1e-9);
        assert_eq!(report.nax.len(), 101);
        assert_eq!(report.ngax.as_ref().map(|c| c.len()), Some(101));
    }

    #[test]
    fn test_combined_mode_has_no_genome_relative_stats() {
        let report = sample_report(None);
        assert_eq!(report.lengths.nga50, None);
        assert!(report.ngax.is_none());
    }

    #[test]
    fn test_json_flattens_length_stats() {
        let report = sample_report(None);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["largest_alignment"], 500);
        assert!(value["nga50"].is_null());
        assert_eq!(value["na50"]["size"], 500);
    }

    #[test]
    fn test_tsv_layout() {
        let a = sample_report(Some(2000));
        let mut b = sample_report(None);
        b.label = "other".to_string();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.tsv");
        write_report_tsv(&path, &[&a, &b]).unwrap();

        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Assembly\tasm\tother");
        assert_eq!(lines.len(), TSV_ROWS.len() + 1);
        assert!(lines.contains(&"NGA50\t200\t-"));
        assert!(lines.contains(&"Indels length\t12\t12"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
