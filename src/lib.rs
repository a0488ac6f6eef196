//! This crate renames classes, fields and methods inside compiled Java
//! archives according to MCP style mapping tables.
//!
//! A run loads the mapping table of one build variant ("side"), indexes the
//! classpath to resolve inherited members, and then streams every entry of
//! the input archives into a new archive, rewriting the symbol table of each
//! class file on the way.
//!
//! The building blocks can also be used on their own, for example to parse
//! a mapping file line by line or to remap descriptors.
//!
//! # Examples
//!
//! ```
//! use jarremap::{MappingSource, MappingSyntax, MappingTable};
//!
//! let mapping = b"CL: a net/minecraft/src/Block
//! FD: a/b net/minecraft/src/Block/field_1_a
//! MD: a/c (La;)V net/minecraft/src/Block/func_2_a (Lnet/minecraft/src/Block;)V";
//! let table = MappingTable::parse(&MappingSource::new(mapping, MappingSyntax::Srg)).unwrap();
//!
//! // re-mapping a class name
//! assert_eq!(table.map_class("a").as_deref(), Some("net/minecraft/src/Block"));
//!
//! // re-mapping a descriptor
//! assert_eq!(table.map_descriptor("(La;)V"), "(Lnet/minecraft/src/Block;)V");
//!
//! // and back again
//! let inverse = table.inverse();
//! assert_eq!(inverse.method("net/minecraft/src/Block", "func_2_a", "(Lnet/minecraft/src/Block;)V"), Some("c"));
//! ```

#![warn(missing_docs)]

mod classfile;
mod classpath;
mod descriptor;
mod error;
mod loader;
mod mapping;
mod pipeline;
mod progress;
mod request;
mod resolver;
mod rewriter;
mod table;

pub use classfile::{Attribute, ClassFile, ClassFileError, Constant, ConstantPool, Member};
pub use classpath::{ClasspathIndex, TypeDescriptor, UnresolvedClasspathEntry};
pub use descriptor::{is_valid_field_descriptor, parse_method_descriptor, remap_descriptor};
pub use error::Error;
pub use loader::{Direction, MappingLoader, Side};
pub use mapping::{
    MappingRecord, MappingRecordIter, MappingSource, MappingSummary, MappingSyntax, ParseError,
    ParseErrorKind,
};
pub use pipeline::{ArchivePipeline, CancelToken, EntryFailure, RunReport};
pub use progress::{ProgressEvent, ProgressSink};
pub use request::{run, spawn_run, RunHandle, RunRequest};
pub use resolver::SymbolResolver;
pub use rewriter::rewrite;
pub use table::{MappingTable, RenameRule, RuleKind};
