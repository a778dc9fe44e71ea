use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use noodles::bgzf;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Open a text input, picking a decoder from the file extension.
///
/// `.bgz` goes through the BGZF reader, `.gz` through a multi-member gzip
/// decoder (which also handles BGZF blocks), anything else is read as-is.
pub fn open_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

    match extension {
        "bgz" => Ok(Box::new(BufReader::new(bgzf::io::reader::Reader::new(file)))),
        "gz" => Ok(Box::new(BufReader::new(MultiGzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

/// File stem used as an assembly or reference label
/// "data/asm_v2.fasta.gz" -> "asm_v2"
pub fn label_from_path<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    let mut name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    for suffix in [".gz", ".bgz"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
        }
    }
    for suffix in [".fasta", ".fa", ".fna", ".fas", ".tsv", ".coords"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    name
}
