//! Base resolution and derived-set propagation over the merged registry.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::GlobalRegistry;
use crate::config::BaseLookup;
use crate::extract::{strip_class_key, Selector};
use crate::meta::ClassRecord;

lazy_static! {
    /// Spellings that already carry a leading qualifier.
    static ref QUALIFIED: Regex = Regex::new(r"^((struct|class)\s+)?\w+::").unwrap();
}

/// Where a base specifier points after linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum BaseLink {
    /// Key of a registered class.
    Resolved(String),
    /// Not registered; kept as spelled.
    External(String),
}

impl BaseLink {
    /// The type the generated code should hash for this base.
    pub fn type_name(&self) -> &str {
        match self {
            BaseLink::Resolved(key) => key,
            BaseLink::External(spelling) => spelling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NotFound,
    /// Candidate keys that all matched.
    Ambiguous(Vec<String>),
}

/// A base specifier the linker could not tie to exactly one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedBase {
    pub class: String,
    pub spelling: String,
    pub reason: UnresolvedReason,
}

enum Lookup {
    Found(String),
    Ambiguous(Vec<String>),
    Missing,
}

/// Links bases and rebuilds every `derived` set.
#[derive(Debug, Clone)]
pub struct Linker {
    mode: BaseLookup,
    selector: Selector,
}

impl Linker {
    pub fn new(mode: BaseLookup, sentinel: &str) -> Self {
        Self {
            mode,
            selector: Selector::new(sentinel),
        }
    }

    /// Resolve every base reference and recompute the transitive derived
    /// sets from scratch. Running it twice gives the same registry.
    pub fn link(&self, registry: &mut GlobalRegistry) -> Vec<UnresolvedBase> {
        for record in registry.classes.values_mut() {
            record.derived.clear();
        }

        let mut unresolved = Vec::new();
        let mut links: BTreeMap<String, Vec<BaseLink>> = BTreeMap::new();
        for (key, record) in &registry.classes {
            let resolved = record
                .bases
                .iter()
                .map(|spelling| match self.resolve(&registry.classes, record, spelling) {
                    Ok(base) => BaseLink::Resolved(base),
                    Err(reason) => {
                        if !self.selector.is_sentinel(spelling) {
                            warn!(class = %key, base = %spelling, ?reason, "unresolved base class");
                            unresolved.push(UnresolvedBase {
                                class: key.clone(),
                                spelling: spelling.clone(),
                                reason,
                            });
                        }
                        BaseLink::External(spelling.clone())
                    }
                })
                .collect();
            links.insert(key.clone(), resolved);
        }

        for key in registry.classes.keys().cloned().collect::<Vec<_>>() {
            for ancestor in ancestors(&links, &key) {
                if let Some(base) = registry.classes.get_mut(&ancestor) {
                    base.derived.insert(key.clone());
                }
            }
        }

        debug!(
            classes = links.len(),
            unresolved = unresolved.len(),
            "linked inheritance graph"
        );
        registry.bases = links;
        unresolved
    }

    fn resolve(
        &self,
        classes: &BTreeMap<String, ClassRecord>,
        record: &ClassRecord,
        spelling: &str,
    ) -> Result<String, UnresolvedReason> {
        let lookup = match self.mode {
            BaseLookup::Heuristic => heuristic(classes, record, spelling),
            BaseLookup::Strict => strict(classes, record, spelling),
        };
        match lookup {
            Lookup::Found(key) => Ok(key),
            Lookup::Ambiguous(keys) => Err(UnresolvedReason::Ambiguous(keys)),
            Lookup::Missing => Err(UnresolvedReason::NotFound),
        }
    }
}

/// Every resolved ancestor of `key`, excluding `key` itself.
fn ancestors(links: &BTreeMap<String, Vec<BaseLink>>, key: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<&str> = vec![key];
    while let Some(current) = stack.pop() {
        for link in links.get(current).into_iter().flatten() {
            if let BaseLink::Resolved(base) = link {
                if base.as_str() != key && seen.insert(base.clone()) {
                    stack.push(base);
                }
            }
        }
    }
    seen
}

/// Prefix an unqualified spelling with the class's own scope, then fall
/// back to the spelling as written.
fn heuristic(
    classes: &BTreeMap<String, ClassRecord>,
    record: &ClassRecord,
    spelling: &str,
) -> Lookup {
    let name = strip_class_key(spelling).trim_start_matches("::");
    if !QUALIFIED.is_match(spelling) && !record.scope.is_empty() {
        match by_tag(classes, &format!("{}{}", record.scope, name)) {
            Lookup::Missing => {}
            hit => return hit,
        }
    }
    by_tag(classes, name)
}

/// Search every enclosing scope; more than one hit is ambiguous.
fn strict(classes: &BTreeMap<String, ClassRecord>, record: &ClassRecord, spelling: &str) -> Lookup {
    let written = strip_class_key(spelling);
    let global = written.starts_with("::");
    let name = written.trim_start_matches("::");

    let segments: Vec<&str> = record
        .scope
        .split("::")
        .filter(|s| !s.is_empty())
        .collect();
    let depths: Vec<usize> = if global {
        vec![0]
    } else {
        (0..=segments.len()).rev().collect()
    };

    let mut hits: Vec<String> = Vec::new();
    for depth in depths {
        let qualified = if depth == 0 {
            name.to_string()
        } else {
            format!("{}::{}", segments[..depth].join("::"), name)
        };
        for tag in ["class", "struct"] {
            let key = format!("{} {}", tag, qualified);
            if classes.contains_key(&key) && !hits.contains(&key) {
                hits.push(key);
            }
        }
    }

    match hits.len() {
        0 => Lookup::Missing,
        1 => Lookup::Found(hits.remove(0)),
        _ => Lookup::Ambiguous(hits),
    }
}

/// A key under either tag; both existing is ambiguous.
fn by_tag(classes: &BTreeMap<String, ClassRecord>, qualified: &str) -> Lookup {
    let hits: Vec<String> = ["class", "struct"]
        .iter()
        .map(|tag| format!("{} {}", tag, qualified))
        .filter(|key| classes.contains_key(key))
        .collect();
    match hits.len() {
        0 => Lookup::Missing,
        1 => Lookup::Found(hits.into_iter().next().unwrap_or_default()),
        _ => Lookup::Ambiguous(hits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Location;

    fn class(scope: &str, name: &str, bases: &[&str]) -> ClassRecord {
        let key = format!("class {}{}", scope, name);
        ClassRecord {
            name: name.to_string(),
            display_name: name.to_string(),
            location: Location::new("a.h", 1),
            scope: scope.to_string(),
            type_id: format!("TypeID<{}>", key),
            size: format!("sizeof({})", key),
            fields: vec![],
            methods: vec![],
            bases: bases.iter().map(|b| b.to_string()).collect(),
            derived: Default::default(),
        }
    }

    fn registry(classes: Vec<(&str, ClassRecord)>) -> GlobalRegistry {
        let mut registry = GlobalRegistry::default();
        for (key, record) in classes {
            registry.classes.insert(key.to_string(), record);
        }
        registry
    }

    fn derived(registry: &GlobalRegistry, key: &str) -> Vec<String> {
        registry.classes[key].derived.iter().cloned().collect()
    }

    #[test]
    fn test_transitive_closure() {
        let mut reg = registry(vec![
            ("class game::A", class("game::", "A", &["rain::Reflect"])),
            ("class game::B", class("game::", "B", &["game::A"])),
            ("class game::C", class("game::", "C", &["B"])),
        ]);

        let unresolved = Linker::new(BaseLookup::Heuristic, "Reflect").link(&mut reg);
        assert!(unresolved.is_empty());
        assert_eq!(derived(&reg, "class game::A"), vec!["class game::B", "class game::C"]);
        assert_eq!(derived(&reg, "class game::B"), vec!["class game::C"]);
        assert!(derived(&reg, "class game::C").is_empty());
        assert_eq!(
            reg.bases["class game::A"],
            vec![BaseLink::External("rain::Reflect".to_string())]
        );
        assert_eq!(
            reg.bases["class game::C"],
            vec![BaseLink::Resolved("class game::B".to_string())]
        );
    }

    #[test]
    fn test_relinking_is_idempotent() {
        let mut reg = registry(vec![
            ("class A", class("", "A", &[])),
            ("class B", class("", "B", &["A"])),
        ]);
        let linker = Linker::new(BaseLookup::Heuristic, "Reflect");
        linker.link(&mut reg);
        let first = reg.classes.clone();
        linker.link(&mut reg);
        assert_eq!(reg.classes, first);
        assert_eq!(derived(&reg, "class A"), vec!["class B"]);
    }

    #[test]
    fn test_diamond_deduplicates() {
        let mut reg = registry(vec![
            ("class Root", class("", "Root", &[])),
            ("class L", class("", "L", &["Root"])),
            ("class R", class("", "R", &["Root"])),
            ("class D", class("", "D", &["L", "R"])),
        ]);
        Linker::new(BaseLookup::Heuristic, "Reflect").link(&mut reg);
        assert_eq!(derived(&reg, "class Root"), vec!["class D", "class L", "class R"]);
    }

    #[test]
    fn test_unresolved_bases_reported() {
        let mut reg = registry(vec![(
            "class game::Player",
            class("game::", "Player", &["Reflect", "physics::Body"]),
        )]);
        let unresolved = Linker::new(BaseLookup::Heuristic, "Reflect").link(&mut reg);
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].spelling, "physics::Body");
        assert_eq!(unresolved[0].reason, UnresolvedReason::NotFound);
    }

    #[test]
    fn test_heuristic_falls_back_to_global_spelling() {
        let mut reg = registry(vec![
            ("struct Base", class("", "Base", &[])),
            ("class game::Player", class("game::", "Player", &["Base"])),
        ]);
        Linker::new(BaseLookup::Heuristic, "Reflect").link(&mut reg);
        assert_eq!(derived(&reg, "struct Base"), vec!["class game::Player"]);
    }

    #[test]
    fn test_strict_reports_ambiguity() {
        let mut reg = registry(vec![
            ("class Base", class("", "Base", &[])),
            ("class game::Base", class("game::", "Base", &[])),
            ("class game::Player", class("game::", "Player", &["Base"])),
        ]);

        let unresolved = Linker::new(BaseLookup::Strict, "Reflect").link(&mut reg);
        assert_eq!(unresolved.len(), 1);
        assert_eq!(
            unresolved[0].reason,
            UnresolvedReason::Ambiguous(vec![
                "class game::Base".to_string(),
                "class Base".to_string(),
            ])
        );

        // The heuristic guesses the innermost scope instead.
        let unresolved = Linker::new(BaseLookup::Heuristic, "Reflect").link(&mut reg);
        assert!(unresolved.is_empty());
        assert_eq!(derived(&reg, "class game::Base"), vec!["class game::Player"]);
        assert!(derived(&reg, "class Base").is_empty());
    }
}
