//! Generation run that orchestrates extraction, merging, linking, and codegen.
//!
//! ```text
//! caches ──load──▶ fresh stores ─────────────────┐
//!        └──────▶ stale markers ──re-extract──▶ ─┴─▶ merge ─▶ link ─▶ render
//! ```

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::ast::{AstProvider, Severity};
use crate::cache::{self, CacheEntry};
use crate::codegen::{self, CodegenOptions};
use crate::config::{Config, FailurePolicy, MissingCachePolicy};
use crate::error::{CacheError, ExtractError, MergeError, Result, RttiError};
use crate::extract::Extractor;
use crate::merge::{GlobalRegistry, Linker, Merger, UnresolvedBase};
use crate::meta::FileStore;

/// Translation unit extensions `scan` picks up.
pub const SOURCE_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx"];

/// A stale file whose re-extraction failed under the isolate policy.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub reason: String,
}

/// Summary of one generation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub output: PathBuf,
    pub classes: usize,
    pub enums: usize,
    pub includes: usize,
    /// Stale files that were re-extracted.
    pub reextracted: Vec<String>,
    /// Requested cache files that did not exist.
    pub missing: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
    pub unresolved: Vec<UnresolvedBase>,
    /// Whether the output file was rewritten.
    pub changed: bool,
}

impl RunReport {
    /// True when every input contributed and every base resolved.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.failed.is_empty() && self.unresolved.is_empty()
    }
}

/// Runs the staleness/merge/link/generate pipeline for one configuration.
pub struct Runner<P> {
    config: Config,
    provider: P,
    extractor: Extractor,
    show_progress: bool,
}

impl<P: AstProvider> Runner<P> {
    pub fn new(config: Config, provider: P) -> Self {
        let extractor = Extractor::from_config(&config);
        Self {
            config,
            provider,
            extractor,
            show_progress: false,
        }
    }

    /// Show a progress bar while re-extracting, when stderr is a terminal.
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse and extract one translation unit.
    pub fn extract_one(&self, source: &Path) -> std::result::Result<FileStore, ExtractError> {
        let unit = self.provider.parse(source)?;
        for diagnostic in unit.diagnostics() {
            match diagnostic.severity {
                Severity::Note => debug!("{}", diagnostic),
                _ => warn!("{}", diagnostic),
            }
        }
        let mut store = self.extractor.extract(&unit)?;
        store.filename = source.to_string_lossy().into_owned();
        Ok(store)
    }

    /// Extract `source` and write its cache entry.
    pub fn extract_to_cache(&self, source: &Path, cache_file: &Path) -> Result<FileStore> {
        let store = self.extract_one(source)?;
        let written = cache::store(cache_file, &CacheEntry::Fresh(store.clone()))?;
        info!(
            file = %source.display(),
            cache = %written.display(),
            classes = store.classes.len(),
            enums = store.enums.len(),
            "extracted"
        );
        Ok(store)
    }

    /// Merge fresh stores and link the result.
    pub fn build_registry(
        &self,
        stores: &[FileStore],
    ) -> std::result::Result<(GlobalRegistry, Vec<UnresolvedBase>), MergeError> {
        let mut registry = Merger::new(self.config.on_duplicate).merge(stores)?;
        let unresolved =
            Linker::new(self.config.base_lookup, &self.config.sentinel).link(&mut registry);
        Ok((registry, unresolved))
    }

    /// Full run: load `caches`, re-extract stale entries, merge, link, and
    /// write the registration unit to `output` if it changed.
    pub fn generate(&self, caches: &[PathBuf], output: &Path) -> Result<RunReport> {
        let mut report = RunReport {
            output: output.to_path_buf(),
            ..Default::default()
        };
        let mut fresh = Vec::new();
        let mut stale = Vec::new();

        for path in caches {
            match cache::load(path) {
                Ok(CacheEntry::Fresh(store)) => fresh.push(store),
                Ok(CacheEntry::Stale { filename }) => stale.push((filename, path.clone())),
                Err(CacheError::Missing(missing)) => match self.config.on_missing_cache {
                    MissingCachePolicy::Warn => {
                        warn!(cache = %missing.display(), "can't find cache file");
                        report.missing.push(missing);
                    }
                    MissingCachePolicy::Error => return Err(CacheError::Missing(missing).into()),
                },
                Err(e) => return Err(e.into()),
            }
        }

        if stale.is_empty() {
            info!("up to date");
        } else {
            info!(count = stale.len(), "re-extracting stale files");
            fresh.extend(self.reextract(&stale, &mut report)?);
        }

        let (registry, unresolved) = self.build_registry(&fresh)?;
        let text = codegen::render(&registry, &CodegenOptions::from_config(&self.config));
        report.changed = write_if_changed(output, &text)?;

        report.classes = registry.classes.len();
        report.enums = registry.enums.len();
        report.includes = registry.includes.len();
        report.unresolved = unresolved;
        info!(
            output = %output.display(),
            classes = report.classes,
            enums = report.enums,
            changed = report.changed,
            "generated"
        );
        Ok(report)
    }

    fn reextract(
        &self,
        stale: &[(String, PathBuf)],
        report: &mut RunReport,
    ) -> Result<Vec<FileStore>> {
        let progress = if self.show_progress && std::io::stderr().is_terminal() {
            let bar = ProgressBar::new(stale.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let results: Vec<_> = stale
            .par_iter()
            .map(|(file, cache_file)| {
                progress.set_message(file.clone());
                let result = self.extract_one(Path::new(file));
                progress.inc(1);
                (file, cache_file, result)
            })
            .collect();
        progress.finish_and_clear();

        let mut stores = Vec::new();
        let mut first_error = None;
        for (file, cache_file, result) in results {
            match result {
                Ok(store) => {
                    cache::store(cache_file, &CacheEntry::Fresh(store.clone()))?;
                    info!(file = %file, "re-extracted");
                    report.reextracted.push(file.clone());
                    stores.push(store);
                }
                Err(e) => match self.config.on_extract_failure {
                    FailurePolicy::Abort if first_error.is_none() => first_error = Some(e),
                    FailurePolicy::Abort => warn!(file = %file, error = %e, "extraction failed"),
                    FailurePolicy::Isolate => {
                        warn!(file = %file, error = %e, "extraction failed, leaving file stale");
                        report.failed.push(FailedFile {
                            file: file.clone(),
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(stores),
        }
    }

    /// Translation units under `root`, sorted, minus `excluded_paths`.
    pub fn collect_sources(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut sources = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| {
                let hidden =
                    e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.');
                e.depth() == 0 || !hidden
            })
        {
            let entry = entry.map_err(|e| CacheError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                source: e.into(),
            })?;
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if entry.file_type().is_file()
                && SOURCE_EXTENSIONS.contains(&ext)
                && !self.config.is_path_excluded(path)
            {
                sources.push(path.to_path_buf());
            }
        }
        sources.sort();
        Ok(sources)
    }

    /// Standalone mode: mark every source whose cache is missing or older
    /// than the source as stale, then generate.
    ///
    /// Header changes are not tracked; pass `force` to re-extract everything.
    pub fn scan(
        &self,
        root: &Path,
        cache_dir: &Path,
        output: &Path,
        force: bool,
    ) -> Result<RunReport> {
        let sources = self.collect_sources(root)?;
        let mut caches = Vec::with_capacity(sources.len());

        for source in sources {
            let relative = source.strip_prefix(root).unwrap_or(&source);
            let cache_file = cache_dir.join(relative);
            if force || needs_extraction(&source, &cache::cache_path_for(&cache_file)) {
                debug!(file = %source.display(), "marking stale");
                cache::mark_stale(&source, &cache_file)?;
            }
            caches.push(cache_file);
        }

        self.generate(&caches, output)
    }
}

fn needs_extraction(source: &Path, cache_file: &Path) -> bool {
    let modified = |p: &Path| fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(source), modified(cache_file)) {
        (Some(src), Some(cached)) => cached < src,
        _ => true,
    }
}

/// Write `content` to `path` unless it already holds exactly that.
pub fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    if fs::read_to_string(path).map(|old| old == content).unwrap_or(false) {
        return Ok(false);
    }
    let output_err = |source| RttiError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(output_err)?;
    }
    fs::write(path, content).map_err(output_err)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, DeclKind, SourceLocation, TranslationUnit};
    use tempfile::TempDir;

    /// Every file holds one reflectable struct named after the file stem.
    struct StemProvider;

    impl AstProvider for StemProvider {
        fn parse(&self, path: &Path) -> std::result::Result<TranslationUnit, ExtractError> {
            let stem = path.file_stem().unwrap().to_string_lossy().to_string();
            if stem == "broken" {
                return Err(ExtractError::Frontend {
                    path: path.to_path_buf(),
                    message: "boom".to_string(),
                });
            }
            let mut unit = TranslationUnit::new(path);
            let loc = SourceLocation::new(path, 1);
            let id = unit.add_root(Decl::new(DeclKind::Struct, stem, loc.clone()));
            unit.add_child(id, Decl::new(DeclKind::BaseSpecifier, "Reflect", loc));
            Ok(unit)
        }
    }

    fn runner(root: &Path) -> Runner<StemProvider> {
        let config = Config {
            source_root: root.to_path_buf(),
            ..Default::default()
        };
        Runner::new(config, StemProvider)
    }

    #[test]
    fn test_write_if_changed() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("gen/rtti.cpp");
        assert!(write_if_changed(&out, "a").unwrap());
        assert!(!write_if_changed(&out, "a").unwrap());
        assert!(write_if_changed(&out, "b").unwrap());
    }

    #[test]
    fn test_stale_entries_are_reextracted_and_written_back() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("alpha.cpp");
        fs::write(&source, "").unwrap();
        let cache_file = temp.path().join("cache/alpha.json");
        cache::mark_stale(&source, &cache_file).unwrap();

        let runner = runner(temp.path());
        let report = runner.generate(&[cache_file.clone()], &temp.path().join("rtti.cpp")).unwrap();

        assert_eq!(report.reextracted, vec![source.to_string_lossy().to_string()]);
        assert_eq!(report.classes, 1);
        assert!(report.changed);
        assert!(!cache::load(&cache_file).unwrap().is_stale());
    }

    #[test]
    fn test_isolate_keeps_failed_file_stale() {
        let temp = TempDir::new().unwrap();
        let good = temp.path().join("good.cpp");
        let broken = temp.path().join("broken.cpp");
        let good_cache = temp.path().join("good.json");
        let broken_cache = temp.path().join("broken.json");
        cache::mark_stale(&good, &good_cache).unwrap();
        cache::mark_stale(&broken, &broken_cache).unwrap();
        let caches = [good_cache, broken_cache.clone()];
        let output = temp.path().join("rtti.cpp");

        let err = runner(temp.path()).generate(&caches, &output).unwrap_err();
        assert!(matches!(err, RttiError::Extract(ExtractError::Frontend { .. })));

        let mut config = runner(temp.path()).config().clone();
        config.on_extract_failure = FailurePolicy::Isolate;
        let report = Runner::new(config, StemProvider).generate(&caches, &output).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.classes, 1);
        assert!(cache::load(&broken_cache).unwrap().is_stale());
    }

    #[test]
    fn test_scan_marks_only_outdated_sources() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("game")).unwrap();
        fs::create_dir_all(src.join("third_party")).unwrap();
        fs::write(src.join("game/player.cpp"), "").unwrap();
        fs::write(src.join("game/player.h"), "").unwrap();
        fs::write(src.join("third_party/lib.cc"), "").unwrap();

        let mut config = runner(&src).config().clone();
        config.excluded_paths = vec!["**/third_party/**".to_string()];
        let runner = Runner::new(config, StemProvider);
        assert_eq!(runner.collect_sources(&src).unwrap(), vec![src.join("game/player.cpp")]);

        let cache_dir = temp.path().join("cache");
        let output = temp.path().join("rtti.cpp");
        let first = runner.scan(&src, &cache_dir, &output, false).unwrap();
        assert_eq!(first.reextracted.len(), 1);
        assert!(cache_dir.join("game/player.json").exists());

        let second = runner.scan(&src, &cache_dir, &output, false).unwrap();
        assert!(second.reextracted.is_empty());
        assert!(!second.changed);

        let forced = runner.scan(&src, &cache_dir, &output, true).unwrap();
        assert_eq!(forced.reextracted.len(), 1);
        assert!(!forced.changed);
    }
}
