use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Everything an aligner needs to process one assembly
#[derive(Debug, Clone)]
pub struct AlignRequest<'a> {
    pub index: usize,
    pub label: &'a str,
    pub contigs: &'a Path,
    pub reference: &'a Path,
    pub output_dir: &'a Path,
    pub threads: usize,
}

impl AlignRequest<'_> {
    /// Where the coordinate file for this assembly is expected
    pub fn coords_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.coords.tsv", self.label))
    }
}

/// How an aligner invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignerRun {
    /// Ran to completion; coordinates are expected at this path
    Finished(PathBuf),
    /// Terminated with a non-zero status (None when killed by a signal)
    Exited(Option<i32>),
    /// Nothing was produced for this assembly
    NoOutput,
}

/// External alignment tool producing coordinate files
pub trait Aligner: Sync {
    /// Check the tool can run at all. Failure here degrades the whole batch.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn align(&self, request: &AlignRequest) -> Result<AlignerRun>;
}

/// Spawns a command per assembly.
///
/// The template is split on whitespace; `{reference}`, `{contigs}`,
/// `{output}` and `{threads}` are substituted in each argument. Stdout and
/// stderr go to `<label>.aligner.stdout` / `.stderr` in the output directory.
pub struct ExternalAligner {
    program: String,
    args: Vec<String>,
}

impl ExternalAligner {
    pub fn from_template(template: &str) -> Result<Self> {
        let mut parts = template.split_whitespace().map(|s| s.to_string());
        let Some(program) = parts.next() else {
            bail!("Empty aligner command");
        };
        Ok(ExternalAligner {
            program,
            args: parts.collect(),
        })
    }

    fn render_args(&self, request: &AlignRequest, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{reference}", &request.reference.to_string_lossy())
                    .replace("{contigs}", &request.contigs.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
                    .replace("{threads}", &request.threads.to_string())
            })
            .collect()
    }

    /// Resolve the program the way a shell would: a path if it has a slash,
    /// otherwise the first match on PATH
    fn locate_program(&self) -> Option<PathBuf> {
        let program = Path::new(&self.program);
        if self.program.contains('/') {
            return program.is_file().then(|| program.to_path_buf());
        }
        std::env::var_os("PATH").and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(&self.program))
                .find(|candidate| candidate.is_file())
        })
    }
}

impl Aligner for ExternalAligner {
    fn prepare(&self) -> Result<()> {
        match self.locate_program() {
            Some(path) => {
                debug!("Using aligner at {}", path.display());
                Ok(())
            }
            None => bail!("Aligner '{}' not found", self.program),
        }
    }

    fn align(&self, request: &AlignRequest) -> Result<AlignerRun> {
        let output = request.coords_path();
        let stdout_path = request
            .output_dir
            .join(format!("{}.aligner.stdout", request.label));
        let stderr_path = request
            .output_dir
            .join(format!("{}.aligner.stderr", request.label));

        let stdout = File::create(&stdout_path)
            .with_context(|| format!("Failed to create {}", stdout_path.display()))?;
        let stderr = File::create(&stderr_path)
            .with_context(|| format!("Failed to create {}", stderr_path.display()))?;

        let args = self.render_args(request, &output);
        debug!("Running {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .with_context(|| format!("Failed to spawn aligner '{}'", self.program))?;

        if status.success() {
            Ok(AlignerRun::Finished(output))
        } else {
            Ok(AlignerRun::Exited(status.code()))
        }
    }
}

/// Serves coordinate files that were produced ahead of time, keyed by
/// assembly label
#[derive(Debug, Default)]
pub struct PrecomputedAligner {
    coords: IndexMap<String, PathBuf>,
}

impl PrecomputedAligner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coords(mut self, label: &str, path: impl Into<PathBuf>) -> Self {
        self.coords.insert(label.to_string(), path.into());
        self
    }
}

impl Aligner for PrecomputedAligner {
    fn align(&self, request: &AlignRequest) -> Result<AlignerRun> {
        Ok(match self.coords.get(request.label) {
            Some(path) => AlignerRun::Finished(path.clone()),
            None => AlignerRun::NoOutput,
        })
    }
}
