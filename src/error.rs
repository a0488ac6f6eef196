use std::io;
use std::path::PathBuf;

use thiserror::Error;
use zip::result::ZipError;

use crate::loader::Side;

/// Fatal errors of a remapping run.
///
/// None of these leave usable output behind. Problems with single archive
/// entries are not errors of the run, they end up in the
/// [`RunReport`](crate::RunReport) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The symbol file required by the selected side does not exist.
    #[error("{} not found in conf directory (at {}).\n{hint}", .side.srg_name(), .path.display())]
    MissingMappingFile {
        /// Where the file was expected.
        path: PathBuf,
        /// The side that requires it.
        side: Side,
        /// Advice on picking the right side.
        hint: &'static str,
    },
    /// A mapping line could not be parsed.
    #[error("malformed mapping line {line_number} in {}: {reason} ({line:?})", .path.display())]
    MalformedMappingLine {
        /// The mapping file.
        path: PathBuf,
        /// The 1-based line number.
        line_number: usize,
        /// The offending line.
        line: String,
        /// Why the line was rejected.
        reason: String,
    },
    /// An input path does not exist.
    #[error("input not found (at {})", .path.display())]
    MissingInput {
        /// The missing input.
        path: PathBuf,
    },
    /// A run request file could not be read.
    #[error("invalid run request in {}: {source}", .path.display())]
    Config {
        /// The request file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// Reading an input or mapping file failed.
    #[error("IO error while reading {}: {source}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// An input archive is not a valid zip file.
    #[error("ZIP error while reading {}: {source}", .path.display())]
    Zip {
        /// The archive being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: ZipError,
    },
    /// Writing the output archive failed; its contents are undefined.
    #[error("failed to write output {}: {source}", .path.display())]
    OutputWriteFailure {
        /// The output archive.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: ZipError,
    },
    /// The run was abandoned by its caller.
    #[error("run cancelled")]
    Cancelled,
}
