use crate::cs_tag::{parse_cs, CsOp};
use crate::io_utils::open_input;
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::io::BufRead;
use std::path::Path;

/// One contig-to-reference alignment block, as produced by the aligner
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    pub contig: String,
    pub reference: String,
    /// 1-based reference start; greater than `ref_end` for blocks that wrap
    /// around the origin of a circular chromosome
    pub ref_start: u32,
    pub ref_end: u32,
    /// Contig coordinates; `contig_start > contig_end` on the reverse strand
    pub contig_start: u32,
    pub contig_end: u32,
    pub identity: f64,
    pub len: u32,
    pub len_excluding_local_misassemblies: u32,
    pub len_including_local_misassemblies: u32,
    pub ops: Vec<CsOp>,
}

impl AlignmentRecord {
    /// +1 when the contig runs forward along the reference, -1 otherwise
    pub fn strand_step(&self) -> i64 {
        if self.contig_start < self.contig_end {
            1
        } else {
            -1
        }
    }

    pub fn is_wraparound(&self) -> bool {
        self.ref_start > self.ref_end
    }

    /// Parse one tab-separated coordinate line (see `write_line` for the layout)
    pub fn from_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();

        if fields.len() < 11 {
            bail!(
                "Alignment line has {} fields, expected 11",
                fields.len()
            );
        }

        Ok(AlignmentRecord {
            contig: fields[0].to_string(),
            reference: fields[1].to_string(),
            ref_start: fields[2].parse().context("Invalid reference start")?,
            ref_end: fields[3].parse().context("Invalid reference end")?,
            contig_start: fields[4].parse().context("Invalid contig start")?,
            contig_end: fields[5].parse().context("Invalid contig end")?,
            identity: fields[6].parse().context("Invalid identity")?,
            len: fields[7].parse().context("Invalid alignment length")?,
            len_excluding_local_misassemblies: fields[8]
                .parse()
                .context("Invalid length excluding local misassemblies")?,
            len_including_local_misassemblies: fields[9]
                .parse()
                .context("Invalid length including local misassemblies")?,
            ops: parse_cs(fields[10]).context("Invalid operation stream")?,
        })
    }

    /// Render back to the coordinate-line layout:
    /// contig, reference, ref start/end, contig start/end, identity,
    /// len, len excluding / including local misassemblies, cs ops
    pub fn write_line(&self) -> String {
        let ops: String = self.ops.iter().map(|op| op.to_string()).collect();
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{}\t{}\t{}\t{}",
            self.contig,
            self.reference,
            self.ref_start,
            self.ref_end,
            self.contig_start,
            self.contig_end,
            self.identity,
            self.len,
            self.len_excluding_local_misassemblies,
            self.len_including_local_misassemblies,
            ops
        )
    }
}

/// Streaming reader over a coordinate file
pub struct AlignmentReader<R: BufRead> {
    reader: R,
    line_no: usize,
}

impl<R: BufRead> AlignmentReader<R> {
    pub fn new(reader: R) -> Self {
        AlignmentReader { reader, line_no: 0 }
    }

    pub fn read_record(&mut self) -> Result<Option<AlignmentRecord>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let record = AlignmentRecord::from_line(&line)
                .with_context(|| format!("Malformed alignment on line {}", self.line_no))?;
            return Ok(Some(record));
        }
    }

    pub fn read_all(&mut self) -> Result<Vec<AlignmentRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Read every alignment from a coordinate file (auto-detects compression)
pub fn read_alignment_file<P: AsRef<Path>>(path: P) -> Result<Vec<AlignmentRecord>> {
    let path = path.as_ref();
    let input = open_input(path)?;
    AlignmentReader::new(input)
        .read_all()
        .with_context(|| format!("Failed to read alignments from {}", path.display()))
}

/// Group alignments by reference chromosome, keeping first-seen order
pub fn group_by_reference(records: Vec<AlignmentRecord>) -> IndexMap<String, Vec<AlignmentRecord>> {
    let mut grouped: IndexMap<String, Vec<AlignmentRecord>> = IndexMap::new();
    for record in records {
        grouped.entry(record.reference.clone()).or_default().push(record);
    }
    grouped
}
