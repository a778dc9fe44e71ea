//! Per-assembly alignment and analysis jobs, run on a bounded pool.
//!
//! Each assembly ends in exactly one [`AssemblyOutcome`]. Jobs share only the
//! read-only reference; everything else (coverage arrays, indel totals, the
//! variant log) lives inside the job and the outcomes are folded after join.

use crate::aligner::{AlignRequest, Aligner, AlignerRun};
use crate::alignment::{group_by_reference, read_alignment_file, AlignmentRecord};
use crate::breakpoints::{merge_breakpoints, write_breakpoints_json, BreakpointClassifier};
use crate::coverage::CoverageTracker;
use crate::io_utils::label_from_path;
use crate::reference::{sequence_lengths, ReferenceDescriptor};
use crate::report::{write_report_tsv, AssemblyReport, ReportInputs};
use crate::unique::resolve_unique_contigs;
use crate::variants::{extract_variants, IndelsInfo, VariantLog, DEFAULT_MAX_INDEL_LENGTH};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// Analysis settings shared by every job in a batch
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub max_threads: usize,
    /// Run one assembly at a time with every thread
    pub memory_efficient: bool,
    pub show_variants: bool,
    pub max_indel_length: u32,
    pub output_dir: PathBuf,
    /// Write per-assembly JSON, combined-reference tables, report.tsv and
    /// the breakpoint file
    pub write_reports: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            max_threads: num_cpus::get(),
            memory_efficient: false,
            show_variants: false,
            max_indel_length: DEFAULT_MAX_INDEL_LENGTH,
            output_dir: PathBuf::from("."),
            write_reports: true,
        }
    }
}

impl AnalysisConfig {
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    pub fn with_memory_efficient(mut self, memory_efficient: bool) -> Self {
        self.memory_efficient = memory_efficient;
        self
    }

    pub fn with_show_variants(mut self, show_variants: bool) -> Self {
        self.show_variants = show_variants;
        self
    }

    pub fn with_max_indel_length(mut self, max_indel_length: u32) -> Self {
        self.max_indel_length = max_indel_length;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_write_reports(mut self, write_reports: bool) -> Self {
        self.write_reports = write_reports;
        self
    }
}

/// One assembly to evaluate
#[derive(Debug, Clone)]
pub struct Assembly {
    pub label: String,
    pub path: PathBuf,
    pub length: u64,
    /// Declared contig lengths; contigs missing here contribute 0
    pub contig_lengths: HashMap<String, u32>,
}

impl Assembly {
    pub fn new(label: &str, path: impl Into<PathBuf>, contig_lengths: HashMap<String, u32>) -> Self {
        let length = contig_lengths.values().map(|&l| l as u64).sum();
        Assembly {
            label: label.to_string(),
            path: path.into(),
            length,
            contig_lengths,
        }
    }

    /// Scan a contigs FASTA for its label, total length and contig lengths
    pub fn from_fasta<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let lengths = sequence_lengths(path)
            .with_context(|| format!("Failed to scan assembly {}", path.display()))?;
        Ok(Self::new(
            &label_from_path(path),
            path,
            lengths.into_iter().collect(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssemblyStatus {
    Ok,
    NotAligned,
    Failed,
    Error,
}

impl fmt::Display for AssemblyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyStatus::Ok => "OK",
            AssemblyStatus::NotAligned => "NOT_ALIGNED",
            AssemblyStatus::Failed => "FAILED",
            AssemblyStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Terminal state of one assembly; only `Ok` carries a result record
#[derive(Debug)]
pub enum AssemblyOutcome {
    Ok(Box<AssemblyReport>),
    NotAligned,
    /// Aligner output missing or unreadable
    Failed(String),
    /// Aligner exited with a non-zero status or the analysis pass broke
    Error(String),
}

impl AssemblyOutcome {
    pub fn status(&self) -> AssemblyStatus {
        match self {
            AssemblyOutcome::Ok(_) => AssemblyStatus::Ok,
            AssemblyOutcome::NotAligned => AssemblyStatus::NotAligned,
            AssemblyOutcome::Failed(_) => AssemblyStatus::Failed,
            AssemblyOutcome::Error(_) => AssemblyStatus::Error,
        }
    }

    pub fn report(&self) -> Option<&AssemblyReport> {
        match self {
            AssemblyOutcome::Ok(report) => Some(report.as_ref()),
            _ => None,
        }
    }
}

/// How many jobs run at once and how many threads each gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobPlan {
    pub jobs: usize,
    pub threads_per_job: usize,
}

impl JobPlan {
    /// `jobs * threads_per_job` never exceeds `max_threads` (floored to 1)
    pub fn new(assemblies: usize, max_threads: usize, memory_efficient: bool) -> Self {
        let max_threads = max_threads.max(1);
        let jobs = if memory_efficient {
            1
        } else {
            assemblies.min(max_threads).max(1)
        };
        JobPlan {
            jobs,
            threads_per_job: (max_threads / jobs).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    /// Every assembly is OK
    Complete,
    /// Some assemblies are OK
    Partial,
    /// No assembly is OK; only alignment-free statistics remain
    Failed,
}

/// Status tallies folded from the outcomes after join
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub ok: usize,
    pub not_aligned: usize,
    pub failed: usize,
    pub errors: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[AssemblyOutcome]) -> Self {
        outcomes.iter().fold(
            BatchSummary {
                total: outcomes.len(),
                ..Default::default()
            },
            |mut summary, outcome| {
                match outcome.status() {
                    AssemblyStatus::Ok => summary.ok += 1,
                    AssemblyStatus::NotAligned => summary.not_aligned += 1,
                    AssemblyStatus::Failed => summary.failed += 1,
                    AssemblyStatus::Error => summary.errors += 1,
                }
                summary
            },
        )
    }

    pub fn verdict(&self) -> BatchVerdict {
        if self.ok == self.total {
            BatchVerdict::Complete
        } else if self.ok > 0 {
            BatchVerdict::Partial
        } else {
            BatchVerdict::Failed
        }
    }

    pub fn log(&self) {
        match self.verdict() {
            BatchVerdict::Complete => info!("Done: all {} assemblies analyzed", self.total),
            BatchVerdict::Partial => warn!(
                "Done for {} out of {} assemblies ({} not aligned, {} failed, {} errors)",
                self.ok, self.total, self.not_aligned, self.failed, self.errors
            ),
            BatchVerdict::Failed => error!(
                "Failed aligning all {} assemblies; only alignment-free statistics are available",
                self.total
            ),
        }
    }
}

/// Outcomes in input order plus whether the aligner could be used at all
#[derive(Debug)]
pub struct BatchResult {
    pub labels: Vec<String>,
    pub outcomes: Vec<AssemblyOutcome>,
    pub aligner_ready: bool,
}

impl BatchResult {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_outcomes(&self.outcomes)
    }

    pub fn reports(&self) -> impl Iterator<Item = &AssemblyReport> {
        self.outcomes.iter().filter_map(|o| o.report())
    }
}

pub struct Orchestrator<'a> {
    reference: &'a ReferenceDescriptor,
    /// FASTA handed to the aligner (the concatenation in combined mode)
    reference_fasta: PathBuf,
    aligner: &'a dyn Aligner,
    classifier: Option<&'a dyn BreakpointClassifier>,
    config: AnalysisConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        reference: &'a ReferenceDescriptor,
        reference_fasta: impl Into<PathBuf>,
        aligner: &'a dyn Aligner,
        config: AnalysisConfig,
    ) -> Self {
        Orchestrator {
            reference,
            reference_fasta: reference_fasta.into(),
            aligner,
            classifier: None,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: &'a dyn BreakpointClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Align and analyze every assembly. Per-assembly problems become
    /// outcomes; only setup I/O (output directory, batch files) is an error.
    pub fn run_batch(&self, assemblies: &[Assembly]) -> Result<BatchResult> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.config.output_dir.display())
        })?;

        let labels: Vec<String> = assemblies.iter().map(|a| a.label.clone()).collect();

        if let Err(e) = self.aligner.prepare() {
            error!("Failed to prepare the aligner: {e:#}");
            error!("Skipping alignment for all assemblies; only alignment-free statistics are available");
            let outcomes = assemblies
                .iter()
                .map(|_| AssemblyOutcome::Failed("aligner unavailable".to_string()))
                .collect();
            return Ok(BatchResult {
                labels,
                outcomes,
                aligner_ready: false,
            });
        }

        let plan = JobPlan::new(assemblies.len(), self.config.max_threads, self.config.memory_efficient);
        info!(
            "Aligning {} assemblies: {} parallel jobs, {} threads each",
            assemblies.len(),
            plan.jobs,
            plan.threads_per_job
        );

        let outcomes = self.dispatch(assemblies, plan);

        let result = BatchResult {
            labels,
            outcomes,
            aligner_ready: true,
        };

        // Batch files only make sense once something was analyzed
        if self.config.write_reports && result.summary().ok > 0 {
            self.write_batch_outputs(&result)?;
        }

        Ok(result)
    }

    fn write_batch_outputs(&self, result: &BatchResult) -> Result<()> {
        let out = &self.config.output_dir;

        let merged = merge_breakpoints(result.reports().map(|r| &r.breakpoints));
        write_breakpoints_json(out.join("contig_breakpoints.json"), &merged)?;

        let reports: Vec<&AssemblyReport> = result.reports().collect();
        if !reports.is_empty() {
            write_report_tsv(out.join("report.tsv"), &reports)?;
        }
        Ok(())
    }

    /// Run the jobs on `plan.jobs` plain worker threads. Each worker pulls
    /// the next assembly index and runs it on its own rayon pool, so at most
    /// `plan.jobs` assemblies are in flight at once.
    fn dispatch(&self, assemblies: &[Assembly], plan: JobPlan) -> Vec<AssemblyOutcome> {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            for worker in 0..plan.jobs {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || {
                    let pool = match rayon::ThreadPoolBuilder::new()
                        .num_threads(plan.threads_per_job)
                        .build()
                    {
                        Ok(pool) => Some(pool),
                        Err(e) => {
                            warn!("Worker {}: no job pool ({e}), running jobs inline", worker + 1);
                            None
                        }
                    };
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(assembly) = assemblies.get(index) else {
                            break;
                        };
                        let run = || self.align_and_analyze(index, assembly, plan.threads_per_job);
                        let outcome = match &pool {
                            Some(pool) => pool.install(run),
                            None => run(),
                        };
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(tx);

        let mut finished: Vec<(usize, AssemblyOutcome)> = rx.into_iter().collect();
        finished.sort_unstable_by_key(|(index, _)| *index);
        finished.into_iter().map(|(_, outcome)| outcome).collect()
    }

    pub fn align_and_analyze(&self, index: usize, assembly: &Assembly, threads: usize) -> AssemblyOutcome {
        let prefix = format!("{:>3} {}", index + 1, assembly.label);
        info!("{prefix}: aligning contigs to reference");

        let request = AlignRequest {
            index,
            label: &assembly.label,
            contigs: &assembly.path,
            reference: &self.reference_fasta,
            output_dir: &self.config.output_dir,
            threads,
        };

        let coords = match self.aligner.align(&request) {
            Ok(AlignerRun::Finished(path)) => path,
            Ok(AlignerRun::Exited(code)) => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                error!("{prefix}: aligner exited with status {code}");
                return AssemblyOutcome::Error(format!("aligner exited with status {code}"));
            }
            Ok(AlignerRun::NoOutput) => {
                warn!("{prefix}: aligner produced no output");
                return AssemblyOutcome::Failed("no aligner output".to_string());
            }
            Err(e) => {
                error!("{prefix}: {e:#}");
                return AssemblyOutcome::Error(format!("{e:#}"));
            }
        };

        let records = match read_alignment_file(&coords) {
            Ok(records) => records,
            Err(e) => {
                warn!("{prefix}: failed to read alignments: {e:#}");
                return AssemblyOutcome::Failed(format!("{e:#}"));
            }
        };

        if records.is_empty() {
            info!("{prefix}: not aligned");
            return AssemblyOutcome::NotAligned;
        }

        match self.analyze(&prefix, assembly, records) {
            Ok(report) => {
                info!("{prefix}: analysis is finished");
                AssemblyOutcome::Ok(Box::new(report))
            }
            Err(e) => {
                error!("{prefix}: analysis failed: {e:#}");
                AssemblyOutcome::Error(format!("{e:#}"))
            }
        }
    }

    /// Fold one assembly's alignments into its result record
    pub fn analyze(&self, prefix: &str, assembly: &Assembly, records: Vec<AlignmentRecord>) -> Result<AssemblyReport> {
        let out = &self.config.output_dir;
        let label = assembly.label.as_str();

        let mut variant_log = if self.config.show_variants {
            Some(VariantLog::create(
                out.join(format!("{label}.used_snps.tsv")),
                self.config.max_indel_length,
            )?)
        } else {
            None
        };

        let mut indels = IndelsInfo::default();
        let mut coverage = CoverageTracker::new(self.reference);
        for record in &records {
            extract_variants(record, &mut indels, variant_log.as_mut())?;
            let contig_length = assembly.contig_lengths.get(&record.contig).copied().unwrap_or(0);
            coverage.add_alignment(record, contig_length);
        }

        if let Some(log) = variant_log {
            let written = log.finish()?;
            debug!("{prefix}: {written} variant lines written");
        }
        if coverage.skipped_positions() > 0 {
            warn!("{prefix}: {} out-of-bounds positions skipped", coverage.skipped_positions());
        }

        let aligned_lengths: Vec<u32> = records.iter().map(|r| r.len).collect();
        let breakpoints = self
            .classifier
            .map(|c| c.classify(&records))
            .unwrap_or_default();

        let combined = self.reference.is_combined();
        if combined {
            let ref_aligns = group_by_reference(records);
            let tables = resolve_unique_contigs(&ref_aligns, self.reference);
            if self.config.write_reports {
                tables.write_alignment_table(out.join(format!("alignments_{label}.tsv")))?;
                tables.write_unique_contigs(out.join(format!("{label}.unique_contigs.tsv")))?;
            }
            info!("{prefix}: {} contigs attributed to a single reference", tables.unique_contigs.len());
        }

        let summary = coverage.summarize();
        info!(
            "{prefix}: covered bases = {}, duplication ratio = {:.2}",
            summary.covered_bases, summary.duplication_ratio
        );

        let report = AssemblyReport::build(ReportInputs {
            label,
            assembly_length: assembly.length,
            aligned_lengths: &aligned_lengths,
            reference_length: (!combined).then(|| self.reference.total_length()),
            coverage: summary,
            indels: &indels,
            breakpoints,
        });
        info!(
            "{prefix}: {} mismatches, {} indels ({} short, {} long)",
            report.mismatches, report.indels, report.short_indels, report.long_indels
        );

        if self.config.write_reports {
            report.write_json(out.join(format!("{label}.report.json")))?;
        }

        Ok(report)
    }
}
