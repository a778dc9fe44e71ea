//! Combined-reference mode: which contigs align to which chromosome, and
//! which contigs can be attributed to a single source genome.

use crate::alignment::AlignmentRecord;
use crate::reference::ReferenceDescriptor;
use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A contig is attributed once its aligned length exceeds this share of
/// the length declared in its name
pub const UNIQUE_CONTIG_MIN_FRACTION: f64 = 0.9;

/// One row of the alignment table: a chromosome and every contig aligning to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChromosomeContigs {
    pub chromosome: String,
    pub contigs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniqueContig {
    pub reference_label: String,
    pub contig: String,
    pub aligned_length: u64,
    /// Coverage annotation copied verbatim from the contig name
    pub coverage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinedReferenceTables {
    pub alignments: Vec<ChromosomeContigs>,
    pub unique_contigs: Vec<UniqueContig>,
}

/// Pull `(length, coverage)` out of a `..._length_<L>_cov_<C>...` contig name.
/// The first well-formed occurrence wins.
pub fn parse_length_and_coverage(contig: &str) -> Option<(f64, &str)> {
    fn numeric_run(s: &str) -> &str {
        let end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        &s[..end]
    }

    for (idx, _) in contig.match_indices("_length_") {
        let rest = &contig[idx + "_length_".len()..];
        let length = numeric_run(rest);
        if length.is_empty() {
            continue;
        }
        let Some(after) = rest[length.len()..].strip_prefix("_cov_") else {
            continue;
        };
        let coverage = numeric_run(after);
        if coverage.is_empty() {
            continue;
        }
        if let Ok(length) = length.parse::<f64>() {
            return Some((length, coverage));
        }
    }

    None
}

/// Build the alignment table and attribute contigs to source genomes.
///
/// Chromosomes are visited in map order. The first chromosome a contig
/// aligns to claims it, whether or not the contig passes the coverage
/// threshold there; later chromosomes never reconsider it.
pub fn resolve_unique_contigs(
    ref_aligns: &IndexMap<String, Vec<AlignmentRecord>>,
    reference: &ReferenceDescriptor,
) -> CombinedReferenceTables {
    let mut tables = CombinedReferenceTables::default();
    let mut claimed: HashSet<&str> = HashSet::new();

    for (chromosome, aligns) in ref_aligns {
        let contigs: IndexSet<&str> = aligns.iter().map(|a| a.contig.as_str()).collect();
        tables.alignments.push(ChromosomeContigs {
            chromosome: chromosome.clone(),
            contigs: contigs.iter().map(|c| c.to_string()).collect(),
        });

        let mut aligned_by_contig: IndexMap<&str, u64> = IndexMap::new();
        for align in aligns {
            *aligned_by_contig.entry(align.contig.as_str()).or_insert(0) += align.len as u64;
        }

        let reference_label = reference.label_of(chromosome);
        for (contig, aligned_length) in aligned_by_contig {
            if !claimed.insert(contig) {
                continue;
            }
            let Some((declared_length, coverage)) = parse_length_and_coverage(contig) else {
                continue;
            };
            if declared_length > 0.0
                && aligned_length as f64 / declared_length > UNIQUE_CONTIG_MIN_FRACTION
            {
                tables.unique_contigs.push(UniqueContig {
                    reference_label: reference_label.to_string(),
                    contig: contig.to_string(),
                    aligned_length,
                    coverage: coverage.to_string(),
                });
            }
        }
    }

    tables
}

impl CombinedReferenceTables {
    /// `chromosome<TAB>contig<TAB>contig...` per line
    pub fn write_alignment_table<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create alignment table {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        for row in &self.alignments {
            write!(writer, "{}", row.chromosome)?;
            for contig in &row.contigs {
                write!(writer, "\t{contig}")?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// `reference_label<TAB>aligned_length<TAB>coverage` per unique contig
    pub fn write_unique_contigs<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create unique contig table {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        for unique in &self.unique_contigs {
            writeln!(
                writer,
                "{}\t{}\t{}",
                unique.reference_label, unique.aligned_length, unique.coverage
            )?;
        }

        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn align(contig: &str, chromosome: &str, len: u32) -> AlignmentRecord {
        AlignmentRecord::from_line(&format!(
            "{contig}\t{chromosome}\t1\t{len}\t1\t{len}\t100.0\t{len}\t{len}\t{len}\t:{len}"
        ))
        .unwrap()
    }

    fn combined_reference() -> ReferenceDescriptor {
        let mut reference = ReferenceDescriptor::new();
        reference.add_chromosome("ecoli_chr", 10_000, vec![]).unwrap();
        reference.add_chromosome("phage_chr", 10_000, vec![]).unwrap();
        let labels = HashMap::from([
            ("ecoli_chr".to_string(), "ecoli".to_string()),
            ("phage_chr".to_string(), "phage".to_string()),
        ]);
        reference.with_labels(labels)
    }

    #[test]
    fn test_parse_length_and_coverage() {
        assert_eq!(
            parse_length_and_coverage("NODE_1_length_1500_cov_12.5"),
            Some((1500.0, "12.5"))
        );
        assert_eq!(
            parse_length_and_coverage("x_length_abc_y_length_200_cov_3_extra"),
            Some((200.0, "3"))
        );
        assert_eq!(parse_length_and_coverage("contig_7"), None);
        assert_eq!(parse_length_and_coverage("NODE_length_100_cov_"), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        let reference = combined_reference();
        let mut ref_aligns = IndexMap::new();
        ref_aligns.insert(
            "ecoli_chr".to_string(),
            vec![
                align("NODE_1_length_1000_cov_5.0", "ecoli_chr", 600),
                align("NODE_1_length_1000_cov_5.0", "ecoli_chr", 350),
                align("NODE_2_length_1000_cov_7.0", "ecoli_chr", 900),
            ],
        );

        let tables = resolve_unique_contigs(&ref_aligns, &reference);
        assert_eq!(tables.unique_contigs.len(), 1);
        let unique = &tables.unique_contigs[0];
        assert_eq!(unique.reference_label, "ecoli");
        assert_eq!(unique.aligned_length, 950);
        assert_eq!(unique.coverage, "5.0");

        assert_eq!(tables.alignments[0].contigs.len(), 2);
    }

    #[test]
    fn test_first_claim_wins() {
        let reference = combined_reference();
        let mut ref_aligns = IndexMap::new();
        // Claimed by ecoli even though it falls short there
        ref_aligns.insert(
            "ecoli_chr".to_string(),
            vec![align("NODE_3_length_1000_cov_1", "ecoli_chr", 100)],
        );
        ref_aligns.insert(
            "phage_chr".to_string(),
            vec![
                align("NODE_3_length_1000_cov_1", "phage_chr", 1000),
                align("NODE_4_length_500_cov_2", "phage_chr", 500),
            ],
        );

        let tables = resolve_unique_contigs(&ref_aligns, &reference);
        assert_eq!(tables.unique_contigs.len(), 1);
        assert_eq!(tables.unique_contigs[0].contig, "NODE_4_length_500_cov_2");
        assert_eq!(tables.unique_contigs[0].reference_label, "phage");
    }

    #[test]
    fn test_write_tables() {
        let reference = combined_reference();
        let mut ref_aligns = IndexMap::new();
        ref_aligns.insert(
            "phage_chr".to_string(),
            vec![
                align("NODE_4_length_500_cov_2", "phage_chr", 500),
                align("plain", "phage_chr", 50),
            ],
        );
        let tables = resolve_unique_contigs(&ref_aligns, &reference);

        let dir = tempfile::tempdir().unwrap();
        let aln_path = dir.path().join("alignments.tsv");
        let unique_path = dir.path().join("unique.tsv");
        tables.write_alignment_table(&aln_path).unwrap();
        tables.write_unique_contigs(&unique_path).unwrap();

        assert_eq!(
            std::fs::read_to_string(aln_path).unwrap(),
            "phage_chr\tNODE_4_length_500_cov_2\tplain\n"
        );
        assert_eq!(std::fs::read_to_string(unique_path).unwrap(), "phage\t500\t2\n");
    }
}
