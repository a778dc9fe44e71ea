//! Reference chromosome lengths and ambiguous-base positions.
//!
//! A descriptor is built once per run and shared read-only by every
//! assembly job.

use crate::io_utils::{label_from_path, open_input};
use anyhow::{bail, Result};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ReferenceDescriptor {
    /// Chromosome id -> length, in FASTA order
    chromosomes: IndexMap<String, u32>,
    /// Chromosome id -> 1-based positions of `N` bases
    ambiguous: HashMap<String, Vec<u32>>,
    /// Chromosome id -> source genome label (combined-reference mode only)
    labels: HashMap<String, String>,
}

/// Length and ambiguous positions of one FASTA record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSummary {
    pub name: String,
    pub length: u32,
    pub ambiguous: Vec<u32>,
}

impl ReferenceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a chromosome; ids must be unique across all sources
    pub fn add_chromosome(&mut self, name: &str, length: u32, ambiguous: Vec<u32>) -> Result<()> {
        if self.chromosomes.contains_key(name) {
            bail!("Duplicate reference chromosome '{}'", name);
        }
        self.chromosomes.insert(name.to_string(), length);
        if !ambiguous.is_empty() {
            self.ambiguous.insert(name.to_string(), ambiguous);
        }
        Ok(())
    }

    /// Load one FASTA per genome. More than one file switches on
    /// combined-reference mode, labelling each chromosome by its file stem.
    pub fn from_fasta_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            bail!("No reference FASTA given");
        }

        let mut descriptor = ReferenceDescriptor::new();
        for path in paths {
            let label = label_from_path(path);
            for summary in scan_fasta(path)? {
                debug!(
                    "Chromosome {} has length {} ({} ambiguous bases)",
                    summary.name,
                    summary.length,
                    summary.ambiguous.len()
                );
                if paths.len() > 1 {
                    descriptor.labels.insert(summary.name.clone(), label.clone());
                }
                descriptor.add_chromosome(&summary.name, summary.length, summary.ambiguous)?;
            }
        }

        Ok(descriptor)
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn is_combined(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = (&str, u32)> {
        self.chromosomes.iter().map(|(name, &len)| (name.as_str(), len))
    }

    pub fn ambiguous_positions(&self, name: &str) -> &[u32] {
        self.ambiguous.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Source genome of a chromosome; the chromosome id itself outside
    /// combined-reference mode
    pub fn label_of<'a>(&'a self, name: &'a str) -> &'a str {
        self.labels.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    pub fn total_length(&self) -> u64 {
        self.chromosomes.values().map(|&len| len as u64).sum()
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }
}

/// Scan a FASTA file for record names, lengths and `N` positions
pub fn scan_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<SequenceSummary>> {
    let reader = open_input(path)?;

    let mut summaries = Vec::new();
    let mut current: Option<SequenceSummary> = None;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        if let Some(header) = trimmed.strip_prefix('>') {
            if let Some(done) = current.take() {
                summaries.push(done);
            }
            let name = header.split_whitespace().next().unwrap_or("").to_string();
            current = Some(SequenceSummary {
                name,
                length: 0,
                ambiguous: Vec::new(),
            });
        } else if !trimmed.is_empty() {
            let Some(record) = current.as_mut() else {
                bail!("Sequence data before the first FASTA header");
            };
            let extended = extend_length(&record.name, record.length, trimmed.len())?;
            for (offset, base) in trimmed.bytes().enumerate() {
                if base == b'N' || base == b'n' {
                    // offset < line length, so this stays within `extended`
                    record.ambiguous.push(record.length + offset as u32 + 1);
                }
            }
            record.length = extended;
        }
    }

    if let Some(done) = current {
        summaries.push(done);
    }

    Ok(summaries)
}

/// Grow a sequence length by one line, refusing lengths past `u32::MAX`
fn extend_length(name: &str, length: u32, line_len: usize) -> Result<u32> {
    match u32::try_from(line_len).ok().and_then(|n| length.checked_add(n)) {
        Some(extended) => Ok(extended),
        None => bail!("Sequence {} is longer than {} bases", name, u32::MAX),
    }
}

/// Contig name -> length map for one assembly
pub fn sequence_lengths<P: AsRef<Path>>(path: P) -> Result<IndexMap<String, u32>> {
    Ok(scan_fasta(path)?
        .into_iter()
        .map(|summary| (summary.name, summary.length))
        .collect())
}
