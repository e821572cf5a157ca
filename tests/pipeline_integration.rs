//! Integration tests for the staleness/merge/link/generate run.
//!
//! Translation units are built in memory so these tests do not depend on a
//! C++ front-end; cache and output files live in scratch directories.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rain_rtti::ast::{Access, Decl, DeclId, DeclKind, SourceLocation};
use rain_rtti::cache::{self, CacheEntry};
use rain_rtti::config::{DuplicatePolicy, MissingCachePolicy};
use rain_rtti::{AstProvider, Config, ExtractError, MergeError, RttiError, Runner, TranslationUnit};
use tempfile::TempDir;

const ROOT: &str = "/proj/src";

/// Serves prebuilt units by path.
#[derive(Default)]
struct MemoryProvider {
    units: HashMap<PathBuf, TranslationUnit>,
}

impl MemoryProvider {
    fn with(mut self, unit: TranslationUnit) -> Self {
        self.units.insert(unit.path().to_path_buf(), unit);
        self
    }
}

impl AstProvider for MemoryProvider {
    fn parse(&self, path: &Path) -> Result<TranslationUnit, ExtractError> {
        self.units.get(path).cloned().ok_or_else(|| ExtractError::Frontend {
            path: path.to_path_buf(),
            message: "no such unit".to_string(),
        })
    }
}

fn at(file: &str, line: usize) -> SourceLocation {
    SourceLocation::new(format!("{}/{}", ROOT, file), line)
}

/// entity.cpp: namespace game { class Entity : rain::Reflect { int maxHealth; }; }
fn entity_unit() -> TranslationUnit {
    let mut tu = TranslationUnit::new(format!("{}/game/entity.cpp", ROOT));
    let decl = |kind, name: &str, line| Decl::new(kind, name, at("game/entity.h", line));
    let ns = tu.add_root(decl(DeclKind::Namespace, "game", 3));
    let entity = tu.add_child(ns, decl(DeclKind::Class, "Entity", 5));
    tu.add_child(entity, decl(DeclKind::BaseSpecifier, "rain::Reflect", 5));
    tu.add_child(entity, decl(DeclKind::Field, "maxHealth", 8).with_type("int"));
    tu
}

/// player.h: class Player : Entity, plus a Mode enum. Entity itself is only
/// forward declared, so that edge resolves after merging.
fn add_player_header(tu: &mut TranslationUnit) -> DeclId {
    let decl = |kind, name: &str, line| Decl::new(kind, name, at("game/player.h", line));
    let ns = tu.add_root(decl(DeclKind::Namespace, "game", 3));
    tu.add_child(ns, decl(DeclKind::Class, "Entity", 4).declaration_only());
    let player = tu.add_child(ns, decl(DeclKind::Class, "Player", 6));
    tu.add_child(player, decl(DeclKind::BaseSpecifier, "Entity", 6));
    tu.add_child(player, decl(DeclKind::BaseSpecifier, "Reflect", 6));
    tu.add_child(
        player,
        decl(DeclKind::Method, "respawn", 9)
            .with_type("void")
            .with_args(["int"]),
    );
    tu.add_child(
        player,
        decl(DeclKind::Field, "lives", 11)
            .with_type("int")
            .with_access(Access::Protected),
    );
    let mode = tu.add_child(ns, decl(DeclKind::Enum, "Mode", 14).scoped());
    tu.add_child(mode, decl(DeclKind::EnumConstant, "Solo", 14).with_value(0));
    tu.add_child(mode, decl(DeclKind::EnumConstant, "Coop", 14).with_value(1));
    player
}

fn player_unit() -> TranslationUnit {
    let mut tu = TranslationUnit::new(format!("{}/game/player.cpp", ROOT));
    add_player_header(&mut tu);
    tu
}

/// boss.cpp includes player.h and adds class Boss : Player, two levels
/// below Entity.
fn boss_unit() -> TranslationUnit {
    let mut tu = TranslationUnit::new(format!("{}/game/boss.cpp", ROOT));
    let player = add_player_header(&mut tu);
    let ns = tu.add_root(Decl::new(DeclKind::Namespace, "game", at("game/boss.h", 3)));
    let boss = tu.add_child(ns, Decl::new(DeclKind::Class, "Boss", at("game/boss.h", 5)));
    let base = tu.add_child(
        boss,
        Decl::new(DeclKind::BaseSpecifier, "game::Player", at("game/boss.h", 5)),
    );
    tu.decl_mut(base).referenced = Some(player);
    tu.add_child(boss, Decl::new(DeclKind::BaseSpecifier, "physics::Body", at("game/boss.h", 5)));
    tu
}

fn provider() -> MemoryProvider {
    MemoryProvider::default()
        .with(entity_unit())
        .with(player_unit())
        .with(boss_unit())
}

fn config() -> Config {
    Config {
        source_root: PathBuf::from(ROOT),
        ..Default::default()
    }
}

fn sources() -> Vec<PathBuf> {
    ["entity", "player", "boss"]
        .iter()
        .map(|name| PathBuf::from(format!("{}/game/{}.cpp", ROOT, name)))
        .collect()
}

/// Extract every source into `cache_dir` and return the cache paths.
fn extract_all(runner: &Runner<MemoryProvider>, cache_dir: &Path) -> Vec<PathBuf> {
    sources()
        .iter()
        .map(|source| {
            let cache_file = cache_dir.join(source.file_name().unwrap());
            runner.extract_to_cache(source, &cache_file).unwrap();
            cache_file
        })
        .collect()
}

#[test]
fn test_cross_file_inheritance_is_linked() {
    let temp = TempDir::new().unwrap();
    let runner = Runner::new(config(), provider());
    let caches = extract_all(&runner, temp.path());
    let output = temp.path().join("gen/rtti.cpp");

    let report = runner.generate(&caches, &output).unwrap();
    assert_eq!(report.classes, 3);
    assert_eq!(report.enums, 1);
    assert_eq!(report.includes, 3);
    assert!(report.changed);
    assert!(report.reextracted.is_empty());

    // physics::Body is unknown; the sentinel is never reported.
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].class, "class game::Boss");
    assert_eq!(report.unresolved[0].spelling, "physics::Body");

    let generated = fs::read_to_string(&output).unwrap();
    assert!(generated.contains(
        ".derived = { TypeHash<class game::Boss>, TypeHash<class game::Player> },"
    ));
    assert!(generated.contains(".bases = { TypeHash<class game::Entity>, TypeHash<Reflect> },"));
    assert!(generated.contains(
        ".bases = { TypeHash<class game::Player>, TypeHash<physics::Body> },"
    ));
    assert!(generated.contains(concat!(
        "Method { \"respawn\", \"Respawn\", MEMBER_FUNCTION(&game::Player::respawn), ",
        "TypeID<void>, {TypeID<int>} },",
    )));
    assert!(!generated.contains("lives"));
    assert!(generated.contains("{ \"Coop\", uintmax(game::Mode::Coop) },"));
}

#[test]
fn test_per_file_caches_hold_no_derived_links() {
    let temp = TempDir::new().unwrap();
    let runner = Runner::new(config(), provider());
    let caches = extract_all(&runner, temp.path());

    let CacheEntry::Fresh(store) = cache::load(&caches[0]).unwrap() else {
        panic!("expected a fresh entry");
    };
    assert!(store.classes["class game::Entity"].derived.is_empty());
}

#[test]
fn test_stale_run_matches_full_run() {
    let temp = TempDir::new().unwrap();
    let runner = Runner::new(config(), provider());
    let caches = extract_all(&runner, temp.path());
    let full = temp.path().join("full.cpp");
    let incremental = temp.path().join("incremental.cpp");
    runner.generate(&caches, &full).unwrap();

    cache::mark_stale(&sources()[1], &caches[1]).unwrap();
    let report = runner.generate(&caches, &incremental).unwrap();
    assert_eq!(report.reextracted, vec![sources()[1].to_string_lossy().to_string()]);
    assert_eq!(fs::read_to_string(&full).unwrap(), fs::read_to_string(&incremental).unwrap());
    assert!(!cache::load(&caches[1]).unwrap().is_stale());
}

#[test]
fn test_regenerating_leaves_output_untouched() {
    let temp = TempDir::new().unwrap();
    let runner = Runner::new(config(), provider());
    let caches = extract_all(&runner, temp.path());
    let output = temp.path().join("rtti.cpp");

    assert!(runner.generate(&caches, &output).unwrap().changed);
    let mut reversed = caches.clone();
    reversed.reverse();
    assert!(!runner.generate(&reversed, &output).unwrap().changed);
}

#[test]
fn test_missing_cache_policies() {
    let temp = TempDir::new().unwrap();
    let runner = Runner::new(config(), provider());
    let mut caches = extract_all(&runner, temp.path());
    caches.push(temp.path().join("ghost.json"));
    let output = temp.path().join("rtti.cpp");

    let report = runner.generate(&caches, &output).unwrap();
    assert_eq!(report.missing, vec![temp.path().join("ghost.json")]);
    assert!(!report.is_complete());

    let strict = Config {
        on_missing_cache: MissingCachePolicy::Error,
        ..config()
    };
    let err = Runner::new(strict, provider()).generate(&caches, &output).unwrap_err();
    assert!(matches!(err, RttiError::Cache(rain_rtti::CacheError::Missing(_))));
}

#[test]
fn test_divergent_duplicates_follow_policy() {
    let temp = TempDir::new().unwrap();

    // A second unit that defines game::Entity differently.
    let mut other = TranslationUnit::new(format!("{}/game/other.cpp", ROOT));
    let ns = other.add_root(Decl::new(DeclKind::Namespace, "game", at("game/other.h", 1)));
    let entity = other.add_child(ns, Decl::new(DeclKind::Class, "Entity", at("game/other.h", 2)));
    other.add_child(entity, Decl::new(DeclKind::BaseSpecifier, "Reflect", at("game/other.h", 2)));

    let runner = Runner::new(config(), provider().with(other));
    let mut caches = extract_all(&runner, temp.path());
    let other_cache = temp.path().join("other.json");
    runner
        .extract_to_cache(Path::new(&format!("{}/game/other.cpp", ROOT)), &other_cache)
        .unwrap();
    caches.push(other_cache);
    let output = temp.path().join("rtti.cpp");

    let err = runner.generate(&caches, &output).unwrap_err();
    let RttiError::Merge(MergeError::Conflict { key, first, second }) = err else {
        panic!("expected a merge conflict, got {:?}", err);
    };
    assert_eq!(key, "class game::Entity");
    assert!(first.ends_with("entity.cpp"));
    assert!(second.ends_with("other.cpp"));

    let lenient = Config {
        on_duplicate: DuplicatePolicy::PreferFirst,
        ..config()
    };
    let report = Runner::new(lenient, provider()).generate(&caches, &output).unwrap();
    assert_eq!(report.classes, 3);
    let generated = fs::read_to_string(&output).unwrap();
    assert!(generated.contains("// game/entity.h:5\n"));
    assert!(!generated.contains("// game/other.h"));
}
