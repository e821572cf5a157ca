//! rain-rtti - reflection metadata for C++ sources.
//!
//! Classes that inherit (directly or transitively) from a marker class are
//! reflected: their public fields, public methods, and inheritance edges
//! are extracted one translation unit at a time, cached per file, merged,
//! linked, and emitted as a single registration unit for the runtime's
//! type registry.
//!
//! # Architecture
//!
//! - `ast`: declaration tree, `AstProvider` trait, tree-sitter front-end
//! - `extract`: reflectable selection and per-file extraction
//! - `meta`: records, per-file store, display names, path helpers
//! - `cache`: per-file JSON cache entries and stale markers
//! - `merge`: union into the global registry and inheritance linking
//! - `codegen`: deterministic registration source
//! - `pipeline`: the staleness/merge/link/generate run
//! - `report`: run summaries (pretty, JSON)

pub mod ast;
pub mod cache;
#[cfg(feature = "tree-sitter")]
pub mod cli;
pub mod codegen;
pub mod config;
pub mod error;
pub mod extract;
pub mod merge;
pub mod meta;
pub mod pipeline;
pub mod report;

pub use ast::{AstProvider, Decl, DeclKind, TranslationUnit};
#[cfg(feature = "tree-sitter")]
pub use ast::CppProvider;
pub use cache::CacheEntry;
pub use config::Config;
pub use error::{CacheError, ExtractError, MergeError, Result, RttiError};
pub use extract::{Extractor, Selector};
pub use merge::{GlobalRegistry, Linker, Merger};
pub use meta::FileStore;
pub use pipeline::{RunReport, Runner};
