//! Streaming input archives through the unit rewriter into one output
//! archive.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::Serialize;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::Error;
use crate::progress::ProgressSink;
use crate::resolver::SymbolResolver;
use crate::rewriter::rewrite;

const CLASS_SUFFIX: &str = ".class";
const DEFAULT_BATCH_SIZE: usize = 256;

/// A shared flag to abandon a run.
///
/// Cancellation is best effort: the pipeline checks the flag between
/// entries and stops with [`Error::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every run holding a clone of this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A compiled unit that could not be rewritten.
///
/// Its original bytes are written to the output instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    /// The archive entry name.
    pub entry: String,
    /// Why the unit was rejected.
    pub reason: String,
}

/// The outcome of a completed run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The written output archive.
    pub output: PathBuf,
    /// Compiled units that were rewritten.
    pub units: usize,
    /// Other entries copied verbatim.
    pub copied: usize,
    /// Entries dropped because a later entry has the same output name.
    pub shadowed: usize,
    /// Compiled units copied unchanged because they are malformed.
    pub failures: Vec<EntryFailure>,
}

impl RunReport {
    /// Whether every compiled unit was rewritten.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
struct Entry {
    /// Position of the input in the run's input list.
    input: usize,
    /// Position inside an archive input.
    index: usize,
    name: String,
    is_dir: bool,
}

#[derive(Debug)]
struct PlannedEntry {
    entry: Entry,
    output_name: String,
    is_unit: bool,
}

enum Outcome {
    Unit(Vec<u8>),
    Failed { bytes: Vec<u8>, reason: String },
    Copied(Vec<u8>),
    Directory,
}

enum Input {
    Archive {
        path: PathBuf,
        archive: ZipArchive<File>,
    },
    Directory(PathBuf),
}

impl Input {
    fn open(path: &Path) -> Result<Self, Error> {
        if path.is_dir() {
            return Ok(Self::Directory(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(Error::MissingInput {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(io_error(path))?;
        let archive = ZipArchive::new(file).map_err(zip_error(path))?;
        Ok(Self::Archive {
            path: path.to_path_buf(),
            archive,
        })
    }

    fn list(&mut self, input: usize, entries: &mut Vec<Entry>) -> Result<(), Error> {
        match self {
            Self::Archive { path, archive } => {
                for index in 0..archive.len() {
                    let file = archive.by_index_raw(index).map_err(zip_error(path))?;
                    entries.push(Entry {
                        input,
                        index,
                        name: file.name().to_owned(),
                        is_dir: file.is_dir(),
                    });
                }
            }
            Self::Directory(root) => {
                let mut names = Vec::new();
                let mut dirs = vec![root.clone()];
                while let Some(dir) = dirs.pop() {
                    for dir_entry in fs::read_dir(&dir).map_err(io_error(&dir))? {
                        let path = dir_entry.map_err(io_error(&dir))?.path();
                        if path.is_dir() {
                            dirs.push(path);
                        } else if let Ok(relative) = path.strip_prefix(&*root) {
                            names.push(relative.to_string_lossy().replace('\\', "/"));
                        }
                    }
                }
                names.sort();
                entries.extend(names.into_iter().map(|name| Entry {
                    input,
                    index: 0,
                    name,
                    is_dir: false,
                }));
            }
        }
        Ok(())
    }

    fn read(&mut self, entry: &Entry) -> Result<Vec<u8>, Error> {
        match self {
            Self::Archive { path, archive } => {
                let mut file = archive.by_index(entry.index).map_err(zip_error(path))?;
                let mut bytes = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut bytes).map_err(io_error(path))?;
                Ok(bytes)
            }
            Self::Directory(root) => {
                let path = root.join(&entry.name);
                fs::read(&path).map_err(io_error(&path))
            }
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Io { path, source }
}

fn zip_error(path: &Path) -> impl FnOnce(ZipError) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Zip { path, source }
}

/// Rewrites every compiled unit of a set of inputs into a single archive.
///
/// Inputs are jar or zip archives and class directories. Their entries are
/// written in input order; entries that are not compiled units are copied
/// verbatim. Units are rewritten in parallel batches, which does not affect
/// the order of the output.
#[derive(Debug)]
pub struct ArchivePipeline<'a> {
    resolver: SymbolResolver<'a>,
    cancel: CancelToken,
    batch_size: usize,
    pool: Option<ThreadPool>,
    label: String,
}

impl<'a> ArchivePipeline<'a> {
    /// Creates a pipeline renaming symbols with `resolver`.
    pub fn new(resolver: SymbolResolver<'a>) -> Self {
        Self {
            resolver,
            cancel: CancelToken::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            pool: None,
            label: "Remapping".to_owned(),
        }
    }

    /// Stops the run once `cancel` is cancelled.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets how many entries are held in memory and rewritten at once.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Rewrites units on a dedicated pool of `threads` workers instead of the
    /// global one.
    pub fn with_threads(mut self, threads: usize) -> Self {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => self.pool = Some(pool),
            Err(err) => tracing::warn!(threads, error = %err, "falling back to the global thread pool"),
        }
        self
    }

    /// Sets the label passed to [`ProgressSink::start`].
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Runs the pipeline over `inputs`, writing the result to `output`.
    ///
    /// Nothing is written if an input is missing or unreadable. If the run
    /// fails after the output was created, the output is removed again.
    /// Malformed compiled units do not fail the run, they are copied and
    /// listed in [`RunReport::failures`].
    pub fn run<P>(&self, inputs: &[P], output: &Path, sink: &dyn ProgressSink) -> Result<RunReport, Error>
    where
        P: AsRef<Path>,
    {
        let mut opened = Vec::with_capacity(inputs.len());
        for path in inputs {
            opened.push(Input::open(path.as_ref())?);
        }
        let mut entries = Vec::new();
        for (position, input) in opened.iter_mut().enumerate() {
            input.list(position, &mut entries)?;
        }

        let (planned, shadowed) = self.plan(entries);
        let units = planned.iter().filter(|planned| planned.is_unit).count();
        tracing::info!(entries = planned.len(), units, output = %output.display(), "remapping");
        sink.start(units, &self.label);

        let file = File::create(output).map_err(|err| Error::OutputWriteFailure {
            path: output.to_path_buf(),
            source: ZipError::Io(err),
        })?;
        let mut report = RunReport {
            output: output.to_path_buf(),
            shadowed,
            ..Default::default()
        };

        if let Err(err) = self.write(&mut opened, &planned, ZipWriter::new(file), sink, &mut report) {
            if let Err(remove) = fs::remove_file(output) {
                tracing::warn!(output = %output.display(), error = %remove, "failed to remove partial output");
            }
            return Err(err);
        }

        tracing::info!(
            units = report.units,
            copied = report.copied,
            shadowed = report.shadowed,
            failures = report.failures.len(),
            "remapping finished"
        );
        Ok(report)
    }

    /// The name of a compiled unit follows its class.
    fn output_name(&self, name: &str) -> String {
        name.strip_suffix(CLASS_SUFFIX)
            .and_then(|class| self.resolver.resolve_class(class))
            .map(|class| format!("{class}{CLASS_SUFFIX}"))
            .unwrap_or_else(|| name.to_owned())
    }

    /// Computes output names and drops all but the last entry per name.
    fn plan(&self, entries: Vec<Entry>) -> (Vec<PlannedEntry>, usize) {
        let planned: Vec<_> = entries
            .into_iter()
            .map(|entry| PlannedEntry {
                output_name: self.output_name(&entry.name),
                is_unit: !entry.is_dir && entry.name.ends_with(CLASS_SUFFIX),
                entry,
            })
            .collect();

        let last: HashMap<&str, usize> = planned
            .iter()
            .enumerate()
            .map(|(position, planned)| (planned.output_name.as_str(), position))
            .collect();
        let keep: Vec<bool> = planned
            .iter()
            .enumerate()
            .map(|(position, planned)| last[planned.output_name.as_str()] == position)
            .collect();

        let mut shadowed = 0;
        let mut kept = Vec::with_capacity(last.len());
        for (planned, keep) in planned.into_iter().zip(keep) {
            if keep {
                kept.push(planned);
            } else {
                tracing::debug!(entry = %planned.entry.name, output = %planned.output_name, "shadowed by a later entry");
                shadowed += 1;
            }
        }
        (kept, shadowed)
    }

    fn write(
        &self,
        inputs: &mut [Input],
        planned: &[PlannedEntry],
        mut writer: ZipWriter<File>,
        sink: &dyn ProgressSink,
        report: &mut RunReport,
    ) -> Result<(), Error> {
        let output = report.output.clone();
        let write_error = |source: ZipError| Error::OutputWriteFailure {
            path: output.clone(),
            source,
        };
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut processed = 0;

        for batch in planned.chunks(self.batch_size) {
            let mut contents = Vec::with_capacity(batch.len());
            for planned in batch {
                if self.cancel.is_cancelled() {
                    tracing::info!("run cancelled");
                    return Err(Error::Cancelled);
                }
                let bytes = if planned.entry.is_dir {
                    Vec::new()
                } else {
                    inputs[planned.entry.input].read(&planned.entry)?
                };
                contents.push(bytes);
            }

            let outcomes = self.process_batch(batch, contents);

            for (planned, outcome) in batch.iter().zip(outcomes) {
                let bytes = match outcome {
                    Outcome::Directory => {
                        writer
                            .add_directory(planned.output_name.as_str(), options)
                            .map_err(write_error)?;
                        continue;
                    }
                    Outcome::Unit(bytes) => {
                        report.units += 1;
                        bytes
                    }
                    Outcome::Copied(bytes) => {
                        report.copied += 1;
                        bytes
                    }
                    Outcome::Failed { bytes, reason } => {
                        report.failures.push(EntryFailure {
                            entry: planned.entry.name.clone(),
                            reason,
                        });
                        bytes
                    }
                };
                writer
                    .start_file(planned.output_name.as_str(), options)
                    .map_err(write_error)?;
                writer
                    .write_all(&bytes)
                    .map_err(|err| write_error(ZipError::Io(err)))?;
                if planned.is_unit {
                    processed += 1;
                    sink.set(processed);
                }
            }
        }

        writer.finish().map_err(write_error)?;
        Ok(())
    }

    fn process_batch(&self, batch: &[PlannedEntry], contents: Vec<Vec<u8>>) -> Vec<Outcome> {
        let work = || {
            batch
                .par_iter()
                .zip(contents)
                .map(|(planned, bytes)| self.process(planned, bytes))
                .collect()
        };
        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }

    fn process(&self, planned: &PlannedEntry, bytes: Vec<u8>) -> Outcome {
        if planned.entry.is_dir {
            return Outcome::Directory;
        }
        if !planned.is_unit {
            return Outcome::Copied(bytes);
        }

        match rewrite(&bytes, &self.resolver) {
            Ok(rewritten) => Outcome::Unit(rewritten),
            Err(err) => {
                tracing::warn!(entry = %planned.entry.name, error = %err, "malformed unit, copying it unchanged");
                Outcome::Failed {
                    bytes,
                    reason: err.to_string(),
                }
            }
        }
    }
}
