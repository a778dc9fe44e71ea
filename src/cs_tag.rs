use anyhow::{bail, Result};
use std::fmt;

/// One edit of a short-form `cs` operation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsOp {
    /// `:N` or `=SEQ` - bases identical on both sides
    Match(u32),
    /// `*rc` - one reference base replaced by one contig base
    Substitution { ref_base: u8, contig_base: u8 },
    /// `+seq` - contig bases absent from the reference
    Insertion(Vec<u8>),
    /// `-seq` - reference bases absent from the contig
    Deletion(Vec<u8>),
}

impl CsOp {
    /// Number of bases the operation spans on whichever side it consumes
    pub fn run_length(&self) -> u32 {
        match self {
            CsOp::Match(n) => *n,
            CsOp::Substitution { .. } => 1,
            CsOp::Insertion(bases) | CsOp::Deletion(bases) => bases.len() as u32,
        }
    }
}

impl fmt::Display for CsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsOp::Match(n) => write!(f, ":{n}"),
            CsOp::Substitution { ref_base, contig_base } => {
                write!(f, "*{}{}", (*ref_base as char).to_ascii_lowercase(), (*contig_base as char).to_ascii_lowercase())
            }
            CsOp::Insertion(bases) => write!(f, "+{}", String::from_utf8_lossy(bases).to_ascii_lowercase()),
            CsOp::Deletion(bases) => write!(f, "-{}", String::from_utf8_lossy(bases).to_ascii_lowercase()),
        }
    }
}

/// Parse a `cs` string (with or without the `cs:Z:` prefix) into typed edits.
/// Bases are upper-cased.
pub fn parse_cs(cs: &str) -> Result<Vec<CsOp>> {
    let cs = cs.trim();
    let bytes = cs.strip_prefix("cs:Z:").unwrap_or(cs).as_bytes();

    let mut ops = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let op = bytes[i];
        i += 1;

        match op {
            b':' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if start == i {
                    bail!("Empty match run at offset {} in cs string", start - 1);
                }
                // Digits only, so this can only fail on overflow
                let n: u32 = std::str::from_utf8(&bytes[start..i])?
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Match run too long in cs string at offset {}", start - 1))?;
                ops.push(CsOp::Match(n));
            }
            b'=' => {
                let bases = take_bases(bytes, &mut i);
                if bases.is_empty() {
                    bail!("Empty match sequence at offset {} in cs string", i - 1);
                }
                ops.push(CsOp::Match(bases.len() as u32));
            }
            b'*' => {
                if i + 1 >= bytes.len()
                    || !bytes[i].is_ascii_alphabetic()
                    || !bytes[i + 1].is_ascii_alphabetic()
                {
                    bail!("Malformed substitution at offset {} in cs string", i - 1);
                }
                ops.push(CsOp::Substitution {
                    ref_base: bytes[i].to_ascii_uppercase(),
                    contig_base: bytes[i + 1].to_ascii_uppercase(),
                });
                i += 2;
            }
            b'+' | b'-' => {
                let bases = take_bases(bytes, &mut i);
                if bases.is_empty() {
                    bail!("Empty indel at offset {} in cs string", i - 1);
                }
                if op == b'+' {
                    ops.push(CsOp::Insertion(bases));
                } else {
                    ops.push(CsOp::Deletion(bases));
                }
            }
            other => bail!(
                "Unknown cs operator '{}' at offset {}",
                other as char,
                i - 1
            ),
        }
    }

    Ok(ops)
}

fn take_bases(bytes: &[u8], i: &mut usize) -> Vec<u8> {
    let start = *i;
    while *i < bytes.len() && bytes[*i].is_ascii_alphabetic() {
        *i += 1;
    }
    bytes[start..*i].to_ascii_uppercase()
}
