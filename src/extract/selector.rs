//! Decides which classes opt into reflection.

use crate::ast::{DeclId, DeclKind, TranslationUnit};

/// Matches classes that inherit, directly or not, from the marker class.
#[derive(Debug, Clone)]
pub struct Selector {
    sentinel: String,
}

impl Selector {
    pub fn new(sentinel: &str) -> Self {
        Self {
            sentinel: simple_name(sentinel).to_string(),
        }
    }

    /// Whether `spelling` names the marker class.
    ///
    /// Compares the last `::` segment with template arguments and any
    /// `class`/`struct` keyword removed, so `rain::Reflect` and `Reflect`
    /// both match.
    pub fn is_sentinel(&self, spelling: &str) -> bool {
        simple_name(spelling) == self.sentinel
    }

    /// Whether the class `id` is reflectable.
    ///
    /// The marker class itself never is.
    pub fn is_reflectable(&self, unit: &TranslationUnit, id: DeclId) -> bool {
        self.check(unit, id, &mut Vec::new())
    }

    fn check(&self, unit: &TranslationUnit, id: DeclId, visiting: &mut Vec<DeclId>) -> bool {
        let decl = unit.decl(id);
        if self.is_sentinel(&decl.name) || visiting.contains(&id) {
            return false;
        }

        visiting.push(id);
        let found = unit
            .children_of(id)
            .filter(|(_, child)| child.kind == DeclKind::BaseSpecifier)
            .any(|(_, base)| {
                self.is_sentinel(&base.name)
                    || base
                        .referenced
                        .map(|def| self.check(unit, def, visiting))
                        .unwrap_or(false)
            });
        visiting.pop();

        found
    }
}

/// Strip a leading class-key, template arguments, and qualifiers.
pub fn simple_name(spelling: &str) -> &str {
    let s = strip_class_key(spelling.trim());
    let s = match s.find('<') {
        Some(i) => &s[..i],
        None => s,
    };
    s.rsplit("::").next().unwrap_or(s).trim()
}

/// Remove a leading `class ` or `struct ` keyword.
pub fn strip_class_key(spelling: &str) -> &str {
    spelling
        .strip_prefix("class ")
        .or_else(|| spelling.strip_prefix("struct "))
        .map(str::trim_start)
        .unwrap_or(spelling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation::new("src/a.h", 1)
    }

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("rain::Reflect"), "Reflect");
        assert_eq!(simple_name("struct rain::Reflect"), "Reflect");
        assert_eq!(simple_name("Base<game::Player>"), "Base");
        assert_eq!(simple_name("Reflect"), "Reflect");
    }

    #[test]
    fn test_sentinel_match_is_whole_segment() {
        let selector = Selector::new("rain::Reflect");
        assert!(selector.is_sentinel("Reflect"));
        assert!(selector.is_sentinel("::rain::Reflect"));
        assert!(!selector.is_sentinel("NoReflect"));
    }

    #[test]
    fn test_transitive_reflectability() {
        let mut unit = TranslationUnit::new("src/a.h");
        let reflect = unit.add_root(Decl::new(DeclKind::Struct, "Reflect", loc()));
        let entity = unit.add_root(Decl::new(DeclKind::Class, "Entity", loc()));
        let base = unit.add_child(
            entity,
            Decl::new(DeclKind::BaseSpecifier, "rain::Reflect", loc()),
        );
        unit.decl_mut(base).referenced = Some(reflect);

        let player = unit.add_root(Decl::new(DeclKind::Class, "Player", loc()));
        let base = unit.add_child(
            player,
            Decl::new(DeclKind::BaseSpecifier, "game::Entity", loc()),
        );
        unit.decl_mut(base).referenced = Some(entity);

        let plain = unit.add_root(Decl::new(DeclKind::Class, "Plain", loc()));
        unit.add_child(plain, Decl::new(DeclKind::BaseSpecifier, "Unknown", loc()));

        let selector = Selector::new("Reflect");
        assert!(!selector.is_reflectable(&unit, reflect));
        assert!(selector.is_reflectable(&unit, entity));
        assert!(selector.is_reflectable(&unit, player));
        assert!(!selector.is_reflectable(&unit, plain));
    }

    #[test]
    fn test_cyclic_references_terminate() {
        let mut unit = TranslationUnit::new("src/a.h");
        let a = unit.add_root(Decl::new(DeclKind::Class, "A", loc()));
        let b = unit.add_root(Decl::new(DeclKind::Class, "B", loc()));
        let ab = unit.add_child(a, Decl::new(DeclKind::BaseSpecifier, "B", loc()));
        let ba = unit.add_child(b, Decl::new(DeclKind::BaseSpecifier, "A", loc()));
        unit.decl_mut(ab).referenced = Some(b);
        unit.decl_mut(ba).referenced = Some(a);

        assert!(!Selector::new("Reflect").is_reflectable(&unit, a));
    }
}
