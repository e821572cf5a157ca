//! `compile_commands.json` lookup for per-file include directories.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ExtractError;
use crate::meta::paths;

#[derive(Debug, Deserialize)]
struct RawCommand {
    #[serde(default)]
    directory: Option<PathBuf>,
    file: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// One compilation database entry.
#[derive(Debug, Clone)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
    pub args: Vec<String>,
}

impl CompileCommand {
    /// `-I` directories, made absolute against the entry's working directory.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let mut args = self.args.iter().map(|a| unquote(a));

        while let Some(arg) = args.next() {
            let dir = if arg == "-I" {
                match args.next() {
                    Some(next) => next,
                    None => break,
                }
            } else if let Some(rest) = arg.strip_prefix("-I") {
                rest.to_string()
            } else {
                continue;
            };
            dirs.push(paths::normalize(&self.directory.join(dir)));
        }

        dirs
    }
}

/// Strip one pair of surrounding quotes and unescape inner quotes.
fn unquote(arg: &str) -> String {
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        arg[1..arg.len() - 1].replace("\\\"", "\"")
    } else {
        arg.to_string()
    }
}

/// A loaded compilation database.
#[derive(Debug, Clone, Default)]
pub struct CompileCommands {
    entries: Vec<CompileCommand>,
}

impl CompileCommands {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base).map_err(|e| ExtractError::CompileCommands {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Parse a database; entries without a `directory` resolve against `base`.
    pub fn parse(json: &str, base: &Path) -> Result<Self, serde_json::Error> {
        let raw: Vec<RawCommand> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|cmd| {
                let directory = paths::absolute(&base.join(cmd.directory.unwrap_or_default()));
                let file = paths::absolute(&directory.join(&cmd.file));
                let args = match (cmd.arguments, cmd.command) {
                    (Some(arguments), _) => arguments,
                    (None, Some(command)) => {
                        command.split_whitespace().map(str::to_string).collect()
                    }
                    (None, None) => Vec::new(),
                };
                CompileCommand {
                    directory,
                    file,
                    args,
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// Find the entry compiling `file`.
    pub fn find(&self, file: &Path) -> Option<&CompileCommand> {
        let wanted = paths::absolute(file);
        self.entries.iter().find(|e| e.file == wanted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
