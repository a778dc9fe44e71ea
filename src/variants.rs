//! Mismatch and indel extraction from an alignment's operation stream.

use crate::alignment::AlignmentRecord;
use crate::cs_tag::CsOp;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::{Add, AddAssign};
use std::path::Path;

/// Indels at or below this length count as short
pub const SHORT_INDEL_THRESHOLD: u32 = 5;

/// Default cap on indel length for the variant log
pub const DEFAULT_MAX_INDEL_LENGTH: u32 = 85;

/// Mismatch and indel totals, merged field-wise
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndelsInfo {
    pub mismatches: u64,
    pub insertions: u64,
    pub deletions: u64,
    /// One entry per indel run, in no particular order
    pub indels_list: Vec<u32>,
}

impl IndelsInfo {
    pub fn indel_count(&self) -> usize {
        self.indels_list.len()
    }

    pub fn short_indels(&self) -> usize {
        self.indels_list
            .iter()
            .filter(|&&len| len <= SHORT_INDEL_THRESHOLD)
            .count()
    }

    pub fn long_indels(&self) -> usize {
        self.indel_count() - self.short_indels()
    }
}

impl AddAssign for IndelsInfo {
    fn add_assign(&mut self, other: IndelsInfo) {
        self.mismatches += other.mismatches;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
        self.indels_list.extend(other.indels_list);
    }
}

impl Add for IndelsInfo {
    type Output = IndelsInfo;

    fn add(mut self, other: IndelsInfo) -> IndelsInfo {
        self += other;
        self
    }
}

/// Tab-separated variant log, one line per substitution or short indel
pub struct VariantLog {
    writer: Box<dyn Write + Send>,
    max_indel_length: u32,
    written: usize,
}

impl VariantLog {
    pub fn new(writer: Box<dyn Write + Send>, max_indel_length: u32) -> Self {
        VariantLog {
            writer,
            max_indel_length,
            written: 0,
        }
    }

    pub fn create<P: AsRef<Path>>(path: P, max_indel_length: u32) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create variant log {}", path.display()))?;
        Ok(Self::new(Box::new(BufWriter::new(file)), max_indel_length))
    }

    fn write_line(
        &mut self,
        alignment: &AlignmentRecord,
        ref_pos: i64,
        ref_base: &[u8],
        contig_base: &[u8],
        contig_pos: i64,
    ) -> Result<()> {
        writeln!(
            self.writer,
            "{}\t{}\t{}\t{}\t{}\t{}",
            alignment.reference,
            alignment.contig,
            ref_pos,
            String::from_utf8_lossy(ref_base),
            String::from_utf8_lossy(contig_base),
            contig_pos
        )?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Where the two cursors stopped after walking an operation stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub ref_pos: i64,
    pub contig_pos: i64,
}

/// Walk one alignment's operations, folding mismatches and indels into
/// `indels` and writing variant lines to `log` when given.
///
/// The reference cursor always moves forward; the contig cursor moves by the
/// alignment's strand step.
pub fn extract_variants(
    alignment: &AlignmentRecord,
    indels: &mut IndelsInfo,
    mut log: Option<&mut VariantLog>,
) -> Result<Cursors> {
    let step = alignment.strand_step();
    let mut ref_pos = alignment.ref_start as i64;
    let mut contig_pos = alignment.contig_start as i64;

    for op in &alignment.ops {
        match op {
            CsOp::Match(n) => {
                ref_pos += *n as i64;
                contig_pos += *n as i64 * step;
            }
            CsOp::Substitution { ref_base, contig_base } => {
                if *ref_base != b'N' && *contig_base != b'N' {
                    indels.mismatches += 1;
                    if let Some(log) = log.as_deref_mut() {
                        log.write_line(alignment, ref_pos, &[*ref_base], &[*contig_base], contig_pos)?;
                    }
                }
                ref_pos += 1;
                contig_pos += step;
            }
            CsOp::Insertion(bases) => {
                let n = bases.len() as u32;
                indels.indels_list.push(n);
                indels.insertions += n as u64;
                if let Some(log) = log.as_deref_mut() {
                    if n < log.max_indel_length {
                        log.write_line(alignment, ref_pos, b".", bases, contig_pos)?;
                    }
                }
                contig_pos += n as i64 * step;
            }
            CsOp::Deletion(bases) => {
                let n = bases.len() as u32;
                indels.indels_list.push(n);
                indels.deletions += n as u64;
                if let Some(log) = log.as_deref_mut() {
                    if n < log.max_indel_length {
                        log.write_line(alignment, ref_pos, bases, b".", contig_pos)?;
                    }
                }
                ref_pos += n as i64;
            }
        }
    }

    Ok(Cursors { ref_pos, contig_pos })
}
