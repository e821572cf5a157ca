//! Error types for extraction, caching, and merging.

use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Diagnostic;

/// Errors raised while turning one translation unit into a per-file store.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("front-end failed on {path}: {message}")]
    Frontend { path: PathBuf, message: String },
    #[error("fatal diagnostic in {path}: {diagnostic}")]
    Fatal { path: PathBuf, diagnostic: Diagnostic },
    #[error("invalid compilation database {path}: {message}")]
    CompileCommands { path: PathBuf, message: String },
}

/// Errors raised while reading or writing cache entries.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache file not found: {0}")]
    Missing(PathBuf),
    #[error("cache io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cache file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while unioning per-file stores.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("conflicting definitions of `{key}` in {first} and {second}")]
    Conflict {
        key: String,
        first: String,
        second: String,
    },
}

/// Top-level error for a generation run.
#[derive(Error, Debug)]
pub enum RttiError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RttiError>;
