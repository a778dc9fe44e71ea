//! Breakpoint lists per contig and their batch-wide aggregation.
//!
//! Deciding where a contig breaks is a classifier's job; this module only
//! defines the seam and merges whatever the classifier reports.

use crate::alignment::AlignmentRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Contig positions where alignments break, split by severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContigBreakpoints {
    pub local: BTreeMap<String, Vec<u32>>,
    pub extensive: BTreeMap<String, Vec<u32>>,
}

/// Misassembly classifier run on one assembly's alignments
pub trait BreakpointClassifier: Sync {
    fn classify(&self, alignments: &[AlignmentRecord]) -> ContigBreakpoints;
}

/// Merge breakpoints from every assembly, keyed by contig id. For each
/// assembly local breakpoints are appended before extensive ones.
pub fn merge_breakpoints<'a, I>(all: I) -> BTreeMap<String, Vec<u32>>
where
    I: IntoIterator<Item = &'a ContigBreakpoints>,
{
    let mut merged: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for breakpoints in all {
        for (contig, positions) in breakpoints.local.iter().chain(&breakpoints.extensive) {
            merged
                .entry(contig.clone())
                .or_default()
                .extend(positions.iter().copied());
        }
    }
    merged
}

/// Write the merged breakpoints as a JSON object with sorted keys
pub fn write_breakpoints_json<P: AsRef<Path>>(path: P, merged: &BTreeMap<String, Vec<u32>>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create breakpoint file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, merged)?;
    writer.flush()?;
    Ok(())
}
