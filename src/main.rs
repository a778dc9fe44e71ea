use anyhow::{bail, Context, Result};
use asmqual::aligner::{Aligner, ExternalAligner, PrecomputedAligner};
use asmqual::io_utils::open_input;
use asmqual::orchestrator::{AnalysisConfig, Assembly, Orchestrator};
use asmqual::reference::ReferenceDescriptor;
use asmqual::report::{format_number, print_report};
use asmqual::variants::DEFAULT_MAX_INDEL_LENGTH;
use clap::Parser;
use log::info;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Parse a number that may have metric suffix (k/K=1000, m/M=1e6, g/G=1e9)
fn parse_metric_number(s: &str) -> Result<u32, String> {
    if s.is_empty() {
        return Err("Empty string".to_string());
    }

    let (num_part, suffix) = match s.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&s[..s.len() - c.len_utf8()], Some(c)),
        _ => (s, None),
    };

    let base: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid number: {e}"))?;

    let multiplier = match suffix {
        Some('k') | Some('K') => 1000.0,
        Some('m') | Some('M') => 1_000_000.0,
        Some('g') | Some('G') => 1_000_000_000.0,
        Some(c) => {
            return Err(format!(
                "Unknown suffix '{c}'. Use k/K (1000), m/M (1e6), or g/G (1e9)"
            ))
        }
        None => 1.0,
    };

    let result = base * multiplier;
    if result < 0.0 || result > u32::MAX as f64 {
        return Err(format!("Value {result} out of range"));
    }

    Ok(result.round() as u32)
}

/// Reference-based quality assessment of genome assemblies
#[derive(Parser, Debug)]
#[clap(name = "asmqual", version, about)]
struct Args {
    /// Assembly FASTA files (contigs), one per assembly
    #[clap(value_name = "CONTIGS", required = true)]
    contigs: Vec<PathBuf>,

    /// Reference FASTA; give more than once for a combined reference
    #[clap(short = 'r', long = "reference", required = true)]
    reference: Vec<PathBuf>,

    /// Output directory
    #[clap(short = 'o', long = "output-dir", default_value = "asmqual_results")]
    output_dir: PathBuf,

    /// Number of threads (default: all CPUs)
    #[clap(short = 't', long = "threads", value_parser = parse_metric_number)]
    threads: Option<u32>,

    /// Precomputed coordinate file per assembly, in the same order as CONTIGS
    #[clap(long = "coords", conflicts_with = "aligner")]
    coords: Vec<PathBuf>,

    /// Aligner command with {reference}, {contigs}, {output} and {threads} placeholders
    #[clap(long = "aligner")]
    aligner: Option<String>,

    /// Write per-assembly variant logs (<label>.used_snps.tsv)
    #[clap(long = "show-snps")]
    show_snps: bool,

    /// Longest indel written to the variant log
    #[clap(long = "max-indel-length", default_value_t = DEFAULT_MAX_INDEL_LENGTH, value_parser = parse_metric_number)]
    max_indel_length: u32,

    /// Analyze one assembly at a time using every thread
    #[clap(long = "memory-efficient")]
    memory_efficient: bool,

    /// Skip writing report and table files
    #[clap(long = "no-reports")]
    no_reports: bool,

    /// Verbose logging (repeat for more)
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (warnings and errors only, no stdout summary)
    #[clap(long = "quiet", conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Warn,
        (false, 0) => log::LevelFilter::Info,
        (false, 1) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

/// Concatenate several reference FASTAs into one file for the aligner
fn write_combined_reference(references: &[PathBuf], dir: &Path) -> Result<tempfile::NamedTempFile> {
    let combined = tempfile::Builder::new()
        .prefix("combined_reference.")
        .suffix(".fasta")
        .tempfile_in(dir)
        .context("Failed to create combined reference")?;

    {
        let mut writer = BufWriter::new(combined.as_file());
        for path in references {
            let mut reader = open_input(path)?;
            std::io::copy(&mut reader, &mut writer)
                .with_context(|| format!("Failed to copy {}", path.display()))?;
        }
        writer.flush()?;
    }

    Ok(combined)
}

fn build_aligner(args: &Args, assemblies: &[Assembly]) -> Result<Box<dyn Aligner>> {
    if !args.coords.is_empty() {
        if args.coords.len() != assemblies.len() {
            bail!(
                "Got {} --coords files for {} assemblies",
                args.coords.len(),
                assemblies.len()
            );
        }
        let aligner = assemblies
            .iter()
            .zip(&args.coords)
            .fold(PrecomputedAligner::new(), |aligner, (assembly, coords)| {
                aligner.with_coords(&assembly.label, coords)
            });
        return Ok(Box::new(aligner));
    }

    match &args.aligner {
        Some(command) => Ok(Box::new(ExternalAligner::from_template(command)?)),
        None => bail!("Either --coords or --aligner is required"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let started = chrono::Local::now();
    info!("Started: {}", started.format("%Y-%m-%d %H:%M:%S"));

    let config = AnalysisConfig::default()
        .with_max_threads(args.threads.map_or_else(num_cpus::get, |t| t as usize))
        .with_memory_efficient(args.memory_efficient)
        .with_show_variants(args.show_snps)
        .with_max_indel_length(args.max_indel_length)
        .with_output_dir(&args.output_dir)
        .with_write_reports(!args.no_reports);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let reference = ReferenceDescriptor::from_fasta_files(&args.reference)?;
    info!(
        "Reference: {} chromosomes, {} bp{}",
        reference.len(),
        format_number(reference.total_length()),
        if reference.is_combined() { " (combined)" } else { "" }
    );

    let combined_fasta = if args.reference.len() > 1 {
        Some(write_combined_reference(&args.reference, &args.output_dir)?)
    } else {
        None
    };
    let reference_fasta = match &combined_fasta {
        Some(file) => file.path().to_path_buf(),
        None => args.reference[0].clone(),
    };

    let assemblies = args
        .contigs
        .iter()
        .map(Assembly::from_fasta)
        .collect::<Result<Vec<_>>>()?;
    for assembly in &assemblies {
        info!(
            "  {}: {} contigs, {} bp",
            assembly.label,
            assembly.contig_lengths.len(),
            format_number(assembly.length)
        );
    }

    let aligner = build_aligner(&args, &assemblies)?;
    let orchestrator = Orchestrator::new(&reference, reference_fasta, aligner.as_ref(), config);
    let result = orchestrator.run_batch(&assemblies)?;

    for (label, outcome) in result.labels.iter().zip(&result.outcomes) {
        match outcome.report() {
            Some(report) if !args.quiet => print_report(report),
            Some(_) => {}
            None => info!("{label}: {}", outcome.status()),
        }
    }
    result.summary().log();

    let finished = chrono::Local::now();
    info!("Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    info!("Elapsed time: {:.1}s", (finished - started).num_milliseconds() as f64 / 1000.0);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metric_number() {
        assert_eq!(parse_metric_number("85"), Ok(85));
        assert_eq!(parse_metric_number("10k"), Ok(10_000));
        assert_eq!(parse_metric_number("1.5M"), Ok(1_500_000));
        assert_eq!(parse_metric_number("2g"), Ok(2_000_000_000));
        assert!(parse_metric_number("").is_err());
        assert!(parse_metric_number("5x").is_err());
        assert!(parse_metric_number("-3").is_err());
    }
}
