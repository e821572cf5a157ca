//! Per-file cache entries.
//!
//! One JSON file per translation unit holds either its extracted store or
//! a stale marker (`{"filename": "...", "stale": true}`) written by the
//! build system when one of the unit's dependencies changed.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::meta::FileStore;

/// Contents of one cache file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Fresh(FileStore),
    Stale { filename: String },
}

#[derive(Serialize)]
struct StaleMarker<'a> {
    filename: &'a str,
    stale: bool,
}

/// Read side: a store, optionally flagged stale.
#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    stale: bool,
    #[serde(flatten)]
    store: FileStore,
}

impl CacheEntry {
    /// The translation unit this entry belongs to.
    pub fn filename(&self) -> &str {
        match self {
            CacheEntry::Fresh(store) => &store.filename,
            CacheEntry::Stale { filename } => filename,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CacheEntry::Stale { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        match self {
            CacheEntry::Fresh(store) => store.serialize(&mut ser)?,
            CacheEntry::Stale { filename } => StaleMarker {
                filename,
                stale: true,
            }
            .serialize(&mut ser)?,
        }
        // serde_json only ever emits UTF-8.
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let payload: Payload = serde_json::from_str(content)?;
        if payload.stale {
            Ok(CacheEntry::Stale {
                filename: payload.store.filename,
            })
        } else {
            Ok(CacheEntry::Fresh(payload.store))
        }
    }
}

/// Cache file for `path`: the final extension is replaced with `.json`, so
/// `player.meta.cpp` maps to `player.meta.json`.
pub fn cache_path_for(path: &Path) -> PathBuf {
    path.with_extension("json")
}

/// Load the entry at `path` (mapped through [`cache_path_for`]).
pub fn load(path: &Path) -> Result<CacheEntry, CacheError> {
    let path = cache_path_for(path);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CacheError::Missing(path));
        }
        Err(source) => return Err(CacheError::Io { path, source }),
    };
    CacheEntry::from_json(&content).map_err(|source| CacheError::Json { path, source })
}

/// Write `entry` to the cache file for `path`, creating parent directories.
pub fn store(path: &Path, entry: &CacheEntry) -> Result<PathBuf, CacheError> {
    let path = cache_path_for(path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let json = entry.to_json().map_err(|source| CacheError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Replace the cache entry of `source` with a stale marker.
pub fn mark_stale(source: &Path, cache: &Path) -> Result<PathBuf, CacheError> {
    let entry = CacheEntry::Stale {
        filename: source.to_string_lossy().into_owned(),
    };
    store(cache, &entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EnumRecord, EnumValue, Location};
    use tempfile::TempDir;

    fn sample_store() -> FileStore {
        let mut store = FileStore::new("src/game/team.cpp");
        store.includes.insert("game/team.h".to_string());
        store.enums.insert(
            "game::Team".to_string(),
            EnumRecord {
                name: "Team".to_string(),
                display_name: "Team".to_string(),
                location: Location::new("game/team.h", 3),
                type_id: "TypeID<game::Team>".to_string(),
                size: "sizeof(game::Team)".to_string(),
                underlying_type: "TypeID<int>".to_string(),
                scoped: true,
                values: vec![
                    EnumValue { name: "Red".to_string(), value: 2 },
                    EnumValue { name: "Blue".to_string(), value: 1 },
                ],
            },
        );
        store
    }

    #[test]
    fn test_cache_path_replaces_last_extension() {
        assert_eq!(
            cache_path_for(Path::new("build/player.meta.cpp")),
            PathBuf::from("build/player.meta.json")
        );
        assert_eq!(cache_path_for(Path::new("a.json")), PathBuf::from("a.json"));
    }

    #[test]
    fn test_store_and_load_preserve_enum_order() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("meta/team.meta.cpp");

        store(&cache, &CacheEntry::Fresh(sample_store())).unwrap();
        let written = fs::read_to_string(temp.path().join("meta/team.meta.json")).unwrap();
        assert!(written.contains("\n\t\"filename\""));

        match load(&cache).unwrap() {
            CacheEntry::Fresh(store) => {
                let names: Vec<_> = store.enums["game::Team"]
                    .values
                    .iter()
                    .map(|v| v.name.as_str())
                    .collect();
                assert_eq!(names, vec!["Red", "Blue"]);
                assert_eq!(store, sample_store());
            }
            other => panic!("expected fresh entry, got {:?}", other),
        }
    }

    #[test]
    fn test_mark_stale_writes_marker() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("team.json");
        store(&cache, &CacheEntry::Fresh(sample_store())).unwrap();

        mark_stale(Path::new("src/game/team.cpp"), &cache).unwrap();
        let entry = load(&cache).unwrap();
        assert!(entry.is_stale());
        assert_eq!(entry.filename(), "src/game/team.cpp");
    }

    #[test]
    fn test_reads_external_stale_marker() {
        let entry = CacheEntry::from_json(r#"{"filename": "src/a.cpp", "stale": true}"#).unwrap();
        assert_eq!(
            entry,
            CacheEntry::Stale {
                filename: "src/a.cpp".to_string()
            }
        );
    }

    #[test]
    fn test_missing_and_malformed() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.json");
        assert!(matches!(load(&missing), Err(CacheError::Missing(_))));

        let bad = temp.path().join("bad.json");
        fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(load(&bad), Err(CacheError::Json { .. })));
    }
}
