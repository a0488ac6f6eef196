//! Run requests and the worker executing them.

use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};

use crate::classpath::ClasspathIndex;
use crate::error::Error;
use crate::loader::{Direction, MappingLoader, Side};
use crate::mapping::MappingSyntax;
use crate::pipeline::{ArchivePipeline, CancelToken, RunReport};
use crate::progress::ProgressSink;
use crate::resolver::SymbolResolver;

/// Everything a remapping run needs.
///
/// # Examples
///
/// ```
/// let request: jarremap::RunRequest = serde_json::from_str(r#"{
///     "inputs": ["mods/example.jar"],
///     "output": "mods/example-deobf.jar",
///     "mapping_dir": "mcp",
///     "side": "universal"
/// }"#).unwrap();
/// assert_eq!(request.direction, jarremap::Direction::Deobfuscate);
/// assert!(request.classpath.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunRequest {
    /// Archives and class directories to remap, in order.
    pub inputs: Vec<PathBuf>,
    /// The archive to write.
    pub output: PathBuf,
    /// The MCP directory or its `conf` directory.
    pub mapping_dir: PathBuf,
    /// The build variant whose mappings are used.
    pub side: Side,
    /// Which way to apply the mappings.
    #[serde(default)]
    pub direction: Direction,
    /// Extra classpath entries for inheritance lookups, in order.
    ///
    /// When empty, the side's default classpath inside the MCP directory is
    /// used.
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
    /// The line grammar of the symbol file.
    #[serde(default)]
    pub syntax: MappingSyntax,
    /// Number of rewriting threads, all cores if unset.
    #[serde(default)]
    pub threads: Option<usize>,
}

impl RunRequest {
    /// Reads a request from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&contents).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The classpath consulted for inheritance, without the inputs.
    pub fn effective_classpath(&self) -> Vec<PathBuf> {
        if !self.classpath.is_empty() {
            return self.classpath.clone();
        }
        let mcp_dir = if self.mapping_dir.join("conf").is_dir() {
            self.mapping_dir.as_path()
        } else {
            self.mapping_dir.parent().unwrap_or(&self.mapping_dir)
        };
        self.side
            .default_classpath()
            .iter()
            .map(|entry| mcp_dir.join(entry))
            .collect()
    }
}

/// Executes a request on the calling thread.
///
/// The mappings are loaded and the inputs checked before the output is
/// created, so a failure at that stage leaves nothing behind.
pub fn run(request: &RunRequest, sink: &dyn ProgressSink) -> Result<RunReport, Error> {
    run_with_cancel(request, sink, CancelToken::new())
}

fn run_with_cancel(
    request: &RunRequest,
    sink: &dyn ProgressSink,
    cancel: CancelToken,
) -> Result<RunReport, Error> {
    let table = MappingLoader::new(&request.mapping_dir, request.side)
        .with_syntax(request.syntax)
        .with_direction(request.direction)
        .load()?;

    if let Some(missing) = request.inputs.iter().find(|input| !input.exists()) {
        return Err(Error::MissingInput {
            path: missing.clone(),
        });
    }

    // the inputs shadow the classpath, they are what the run renames
    let classpath = request.effective_classpath();
    let index = ClasspathIndex::open(request.inputs.iter().chain(&classpath));
    let resolver = SymbolResolver::new(&table, &index);

    let mut pipeline = ArchivePipeline::new(resolver).with_cancel_token(cancel);
    if let Some(threads) = request.threads {
        pipeline = pipeline.with_threads(threads);
    }
    pipeline.run(&request.inputs, &request.output, sink)
}

/// Executes a request on a dedicated worker thread.
///
/// ```no_run
/// # fn main() -> Result<(), jarremap::Error> {
/// let request = jarremap::RunRequest::from_json_file("remap.json")?;
/// let (sender, receiver) = crossbeam_channel::unbounded();
/// let handle = jarremap::spawn_run(request, sender);
/// for event in receiver {
///     println!("{event:?}");
/// }
/// let report = handle.join()?;
/// println!("{} failures", report.failures.len());
/// # Ok(())
/// # }
/// ```
pub fn spawn_run<S>(request: RunRequest, sink: S) -> RunHandle
where
    S: ProgressSink + Send + 'static,
{
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let thread = thread::spawn(move || run_with_cancel(&request, &sink, worker_cancel));
    RunHandle { cancel, thread }
}

/// A run executing on its worker thread.
#[derive(Debug)]
pub struct RunHandle {
    cancel: CancelToken,
    thread: JoinHandle<Result<RunReport, Error>>,
}

impl RunHandle {
    /// Asks the run to stop. Does not wait for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the worker has finished.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the run and returns its outcome.
    ///
    /// A panic on the worker is resumed on the calling thread.
    pub fn join(self) -> Result<RunReport, Error> {
        match self.thread.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
