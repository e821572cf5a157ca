//! Metadata extraction from one translation unit.
//!
//! Extraction is a pure function of the unit and the configuration: each
//! call owns its [`Context`], so any number of units can be extracted in
//! parallel. Base specifiers are recorded as spelled; resolving them
//! against other files is the linker's job.

mod selector;

pub use selector::{simple_name, strip_class_key, Selector};

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ast::{Access, Decl, DeclId, DeclKind, TranslationUnit};
use crate::config::Config;
use crate::error::ExtractError;
use crate::meta::{
    display_name, paths, ClassRecord, EnumRecord, EnumValue, FieldRecord, FileStore, Location,
    MethodRecord,
};

/// Turns translation units into per-file stores.
#[derive(Debug, Clone)]
pub struct Extractor {
    source_root: PathBuf,
    selector: Selector,
}

impl Extractor {
    pub fn new<P: AsRef<Path>>(source_root: P, sentinel: &str) -> Self {
        Self {
            source_root: paths::absolute(source_root.as_ref()),
            selector: Selector::new(sentinel),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.source_root, &config.sentinel)
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Extract every reflectable class and every enum of `unit` that lies
    /// under the source root.
    ///
    /// A fatal diagnostic on the unit fails the whole file.
    pub fn extract(&self, unit: &TranslationUnit) -> Result<FileStore, ExtractError> {
        if let Some(fatal) = unit.fatal() {
            return Err(ExtractError::Fatal {
                path: unit.path().to_path_buf(),
                diagnostic: fatal.clone(),
            });
        }

        let mut cx = Context {
            extractor: self,
            unit,
            store: FileStore::new(unit.path().to_string_lossy()),
        };

        for &id in unit.roots() {
            cx.visit(id, "");
        }

        debug!(
            file = %unit.path().display(),
            classes = cx.store.classes.len(),
            enums = cx.store.enums.len(),
            "extracted translation unit"
        );
        Ok(cx.store)
    }

    fn in_root(&self, decl: &Decl) -> bool {
        paths::is_under(&decl.location.file, &self.source_root)
    }
}

/// Per-unit extraction state, threaded through the recursive walk.
struct Context<'a> {
    extractor: &'a Extractor,
    unit: &'a TranslationUnit,
    store: FileStore,
}

impl Context<'_> {
    fn visit(&mut self, id: DeclId, prefix: &str) {
        let decl = self.unit.decl(id);
        if !self.extractor.in_root(decl) {
            return;
        }

        match decl.kind {
            // Nothing in an anonymous namespace can be named from the
            // generated unit.
            DeclKind::Namespace if decl.is_anonymous() => {
                debug!(location = %decl.location, "skipping anonymous namespace");
            }
            DeclKind::Namespace => {
                let prefix = format!("{}{}::", prefix, decl.name);
                for &child in decl.children() {
                    self.visit(child, &prefix);
                }
            }
            DeclKind::Class | DeclKind::Struct => self.visit_record(id, prefix),
            DeclKind::Enum => self.visit_enum(id, prefix),
            _ => {}
        }
    }

    fn visit_record(&mut self, id: DeclId, prefix: &str) {
        let unit = self.unit;
        let decl = unit.decl(id);
        if decl.is_anonymous() {
            debug!(location = %decl.location, "skipping anonymous record");
            return;
        }

        // Nested types first, whether or not this class is reflectable.
        let scope = format!("{}{}::", prefix, decl.name);
        for (child, nested) in unit.children_of(id) {
            if matches!(nested.kind, DeclKind::Class | DeclKind::Struct) {
                self.visit_record(child, &scope);
            }
        }
        for (child, nested) in unit.children_of(id) {
            if nested.kind == DeclKind::Enum {
                self.visit_enum(child, &scope);
            }
        }

        if !decl.is_definition || !self.extractor.selector.is_reflectable(unit, id) {
            return;
        }

        let tag = if decl.kind == DeclKind::Struct {
            "struct"
        } else {
            "class"
        };
        let qualified = format!("{}{}", prefix, decl.name);
        let key = format!("{} {}", tag, qualified);

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut bases = Vec::new();

        for (_, member) in unit.children_of(id) {
            match member.kind {
                DeclKind::BaseSpecifier => bases.push(member.name.clone()),
                DeclKind::Field if is_public_instance(member) => {
                    let ty = member.type_spelling.as_deref().unwrap_or("void");
                    fields.push(FieldRecord {
                        name: member.name.clone(),
                        display_name: display_name(&member.name),
                        type_id: format!("TypeID<{}>", ty),
                        offset: format!("offsetof({}, {})", key, member.name),
                    });
                }
                DeclKind::Method if is_public_instance(member) => {
                    methods.push(MethodRecord {
                        name: member.name.clone(),
                        display_name: display_name(&member.name),
                        pointer: format!("&{}::{}", qualified, member.name),
                        result: member.type_spelling.clone().unwrap_or_else(|| "void".to_string()),
                        args: member.arg_types.clone(),
                    });
                }
                _ => {}
            }
        }

        let location = self.location(decl);
        debug!(key = %key, location = %location, "reflecting class");

        let record = ClassRecord {
            name: decl.name.clone(),
            display_name: display_name(&decl.name),
            location,
            scope: prefix.to_string(),
            type_id: format!("TypeID<{}>", key),
            size: format!("sizeof({})", key),
            fields,
            methods,
            bases,
            derived: Default::default(),
        };
        self.store.classes.entry(key).or_insert(record);
    }

    fn visit_enum(&mut self, id: DeclId, prefix: &str) {
        let decl = self.unit.decl(id);
        if !decl.is_definition {
            return;
        }
        if decl.is_anonymous() {
            debug!(location = %decl.location, "skipping anonymous enum");
            return;
        }

        let key = format!("{}{}", prefix, decl.name);
        let values = self
            .unit
            .children_of(id)
            .filter(|(_, c)| c.kind == DeclKind::EnumConstant)
            .filter_map(|(_, c)| {
                c.enum_value.map(|value| EnumValue {
                    name: c.name.clone(),
                    value,
                })
            })
            .collect();
        let underlying = decl.type_spelling.as_deref().unwrap_or("int");

        let location = self.location(decl);
        debug!(key = %key, location = %location, "reflecting enum");

        let record = EnumRecord {
            name: decl.name.clone(),
            display_name: display_name(&decl.name),
            location,
            type_id: format!("TypeID<{}>", key),
            size: format!("sizeof({})", key),
            underlying_type: format!("TypeID<{}>", underlying),
            scoped: decl.is_scoped,
            values,
        };
        self.store.enums.entry(key).or_insert(record);
    }

    /// Root-relative location; also registers the file as an include.
    fn location(&mut self, decl: &Decl) -> Location {
        let file = paths::relative_to(&decl.location.file, &self.extractor.source_root);
        self.store.includes.insert(file.clone());
        Location::new(file, decl.location.line)
    }
}

fn is_public_instance(decl: &Decl) -> bool {
    decl.access == Access::Public && !decl.is_static
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;

    fn at(file: &str, line: usize) -> SourceLocation {
        SourceLocation::new(format!("/proj/src/{}", file), line)
    }

    /// A declaration in game/entity.h.
    fn entity_h(kind: DeclKind, name: &str, line: usize) -> Decl {
        Decl::new(kind, name, at("game/entity.h", line))
    }

    /// namespace game { struct Reflect; class Entity : Reflect { ... }; }
    fn game_unit() -> TranslationUnit {
        use DeclKind::*;

        let mut tu = TranslationUnit::new("/proj/src/game/entity.cpp");
        let ns = tu.add_root(entity_h(Namespace, "game", 1));

        let entity = tu.add_child(ns, entity_h(Class, "Entity", 3));
        tu.add_child(entity, entity_h(BaseSpecifier, "rain::Reflect", 3));
        tu.add_child(entity, entity_h(Field, "maxHealth", 5).with_type("int"));
        tu.add_child(
            entity,
            entity_h(Field, "secret", 6)
                .with_type("int")
                .with_access(Access::Private),
        );
        tu.add_child(entity, entity_h(Field, "count", 7).with_type("int").static_member());
        tu.add_child(
            entity,
            entity_h(Method, "takeDamage", 8)
                .with_type("void")
                .with_args(["float", "const char *"]),
        );
        tu.add_child(
            entity,
            entity_h(Method, "create", 9)
                .with_type("game::Entity *")
                .static_member(),
        );
        tu.add_child(entity, entity_h(Constructor, "Entity", 10));

        // Nested enum inside a reflectable class; nested struct inside it that is not.
        let state = tu.add_child(
            entity,
            entity_h(Enum, "State", 12).with_type("unsigned char").scoped(),
        );
        tu.add_child(state, entity_h(EnumConstant, "Idle", 12).with_value(0));
        tu.add_child(state, entity_h(EnumConstant, "Dead", 12).with_value(4));
        tu.add_child(entity, entity_h(Struct, "Cache", 13));

        // Plain class holding a reflectable nested struct.
        let holder = tu.add_child(ns, entity_h(Class, "Holder", 20));
        let inner = tu.add_child(holder, entity_h(Struct, "Inner", 21));
        tu.add_child(inner, entity_h(BaseSpecifier, "Reflect", 21));

        // Anonymous and forward-declared records.
        let anon = tu.add_child(ns, entity_h(Struct, "", 30));
        tu.add_child(anon, entity_h(BaseSpecifier, "Reflect", 30));
        let fwd = tu.add_child(ns, entity_h(Class, "Later", 31).declaration_only());
        tu.add_child(fwd, entity_h(BaseSpecifier, "Reflect", 31));
        tu.add_child(ns, entity_h(Enum, "", 32));

        // namespace { class Hidden : Reflect { int x; }; enum Local { One }; }
        let hidden_ns = tu.add_child(ns, entity_h(Namespace, "", 40));
        let hidden = tu.add_child(hidden_ns, entity_h(Class, "Hidden", 41));
        tu.add_child(hidden, entity_h(BaseSpecifier, "Reflect", 41));
        tu.add_child(hidden, entity_h(Field, "x", 42).with_type("int"));
        let local = tu.add_child(hidden_ns, entity_h(Enum, "Local", 44));
        tu.add_child(local, entity_h(EnumConstant, "One", 44).with_value(0));

        tu
    }

    #[test]
    fn test_extracts_reflectable_class() {
        let store = Extractor::new("/proj/src", "Reflect").extract(&game_unit()).unwrap();
        let entity = &store.classes["class game::Entity"];

        assert_eq!(entity.name, "Entity");
        assert_eq!(entity.location.to_string(), "game/entity.h:3");
        assert_eq!(entity.scope, "game::");
        assert_eq!(entity.type_id, "TypeID<class game::Entity>");
        assert_eq!(entity.size, "sizeof(class game::Entity)");
        assert_eq!(entity.bases, vec!["rain::Reflect".to_string()]);
        assert!(entity.derived.is_empty());

        assert_eq!(entity.fields.len(), 1);
        assert_eq!(entity.fields[0].name, "maxHealth");
        assert_eq!(entity.fields[0].display_name, "Max Health");
        assert_eq!(entity.fields[0].type_id, "TypeID<int>");
        assert_eq!(entity.fields[0].offset, "offsetof(class game::Entity, maxHealth)");

        assert_eq!(entity.methods.len(), 1);
        let method = &entity.methods[0];
        assert_eq!(method.pointer, "&game::Entity::takeDamage");
        assert_eq!(method.result, "void");
        assert_eq!(method.args, vec!["float".to_string(), "const char *".to_string()]);
    }

    #[test]
    fn test_nested_types_visited_regardless_of_enclosing_class() {
        let store = Extractor::new("/proj/src", "Reflect").extract(&game_unit()).unwrap();

        assert!(store.classes.contains_key("struct game::Holder::Inner"));
        assert!(!store.classes.contains_key("class game::Holder"));
        assert!(!store.classes.contains_key("struct game::Entity::Cache"));

        let state = &store.enums["game::Entity::State"];
        assert!(state.scoped);
        assert_eq!(state.underlying_type, "TypeID<unsigned char>");
        assert_eq!(state.values[0].name, "Idle");
        assert_eq!(state.values[1].value, 4);
    }

    #[test]
    fn test_anonymous_and_forward_declarations_skipped() {
        let store = Extractor::new("/proj/src", "Reflect").extract(&game_unit()).unwrap();

        assert!(!store.classes.contains_key("class game::Later"));
        assert!(store.classes.keys().all(|k| !k.ends_with("::")));
        assert!(store.enums.keys().all(|k| !k.ends_with("::")));
        assert_eq!(store.classes.len(), 2);
        assert_eq!(store.enums.len(), 1);
        assert_eq!(
            store.includes.iter().cloned().collect::<Vec<_>>(),
            vec!["game/entity.h".to_string()]
        );
    }

    #[test]
    fn test_anonymous_namespace_contents_skipped() {
        let store = Extractor::new("/proj/src", "Reflect").extract(&game_unit()).unwrap();

        assert!(store.classes.keys().all(|k| !k.contains("Hidden")));
        assert!(!store.enums.contains_key("game::Local"));
    }

    #[test]
    fn test_declarations_outside_root_ignored() {
        let mut tu = TranslationUnit::new("/proj/src/a.cpp");
        let ext = tu.add_root(Decl::new(
            DeclKind::Struct,
            "Vendor",
            SourceLocation::new("/usr/include/vendor.h", 4),
        ));
        tu.add_child(
            ext,
            Decl::new(
                DeclKind::BaseSpecifier,
                "Reflect",
                SourceLocation::new("/usr/include/vendor.h", 4),
            ),
        );

        let store = Extractor::new("/proj/src", "Reflect").extract(&tu).unwrap();
        assert!(store.is_empty());
        assert!(store.includes.is_empty());
    }

    #[test]
    fn test_fatal_diagnostic_fails_file() {
        use crate::ast::{Diagnostic, Severity};

        let mut tu = game_unit();
        tu.push_diagnostic(Diagnostic::new(Severity::Fatal, None, "'rain/rain.h' file not found"));
        let err = Extractor::new("/proj/src", "Reflect").extract(&tu).unwrap_err();
        assert!(matches!(err, ExtractError::Fatal { .. }));
    }
}
