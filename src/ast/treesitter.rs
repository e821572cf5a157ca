//! Tree-sitter C++ front-end.
//!
//! Parses a translation unit without preprocessing it: `#include`
//! directives are followed once per file in place, conditional blocks are
//! walked on every branch, and macros are left as written. Types are
//! spelled the way clang prints them (`const char *`, `int [4]`): names
//! declared earlier in the unit are fully qualified and `typedef`/`using`
//! aliases are replaced by what they stand for.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use super::{
    consteval, Access, AstProvider, CompileCommands, Decl, DeclId, DeclKind, Diagnostic,
    Severity, SourceLocation, TranslationUnit,
};
use crate::config::Config;
use crate::error::ExtractError;
use crate::extract::{simple_name, strip_class_key};
use crate::meta::paths;

static LANGUAGE: Lazy<Language> = Lazy::new(|| tree_sitter_cpp::LANGUAGE.into());

const ERROR_QUERY: &str = "(ERROR) @error";

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref AROUND_PUNCT: Regex = Regex::new(r"\s*(::|<|>)\s*").unwrap();
    static ref AROUND_COMMA: Regex = Regex::new(r"\s*,\s*").unwrap();
    static ref DELETED: Regex = Regex::new(r"=\s*delete\s*;?\s*$").unwrap();
}

/// C++ front-end backed by `tree-sitter-cpp`.
#[derive(Debug, Clone, Default)]
pub struct CppProvider {
    include_dirs: Vec<PathBuf>,
    compile_commands: Option<CompileCommands>,
    strict_parse: bool,
}

impl CppProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directories searched for `#include` targets after the including
    /// file's own directory.
    pub fn with_include_dirs<I: IntoIterator<Item = PathBuf>>(mut self, dirs: I) -> Self {
        self.include_dirs.extend(dirs);
        self
    }

    /// Per-file `-I` flags from a compilation database.
    pub fn with_compile_commands(mut self, commands: CompileCommands) -> Self {
        self.compile_commands = Some(commands);
        self
    }

    /// Report syntax errors as fatal diagnostics.
    pub fn strict_parse(mut self, strict: bool) -> Self {
        self.strict_parse = strict;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, ExtractError> {
        let mut provider = Self::new()
            .with_include_dirs(config.include_dirs.iter().map(|d| paths::absolute(d)))
            .strict_parse(config.strict_parse);
        if let Some(path) = &config.compile_commands {
            provider = provider.with_compile_commands(CompileCommands::load(path)?);
        }
        Ok(provider)
    }

    fn include_dirs_for(&self, main: &Path) -> Vec<PathBuf> {
        let mut dirs = self.include_dirs.clone();
        if let Some(entry) = self.compile_commands.as_ref().and_then(|c| c.find(main)) {
            dirs.extend(entry.include_dirs());
        }
        dirs
    }
}

impl AstProvider for CppProvider {
    fn parse(&self, path: &Path) -> Result<TranslationUnit, ExtractError> {
        let main = paths::absolute(path);
        let source = fs::read(&main).map_err(|source| ExtractError::Io {
            path: main.clone(),
            source,
        })?;

        let mut parser = Parser::new();
        parser
            .set_language(&LANGUAGE)
            .map_err(|e| ExtractError::Frontend {
                path: main.clone(),
                message: e.to_string(),
            })?;

        let mut builder = Builder {
            strict: self.strict_parse,
            parser,
            unit: TranslationUnit::new(&main),
            include_dirs: self.include_dirs_for(&main),
            visited: HashSet::from([main.clone()]),
            records: Vec::new(),
            types: TypeNames::default(),
            bases: Vec::new(),
            enumerators: HashMap::new(),
        };
        builder.parse_file(&main, &source, None, &[])?;
        builder.resolve_bases();

        debug!(
            file = %main.display(),
            decls = builder.unit.len(),
            files = builder.visited.len(),
            "parsed translation unit"
        );
        Ok(builder.unit)
    }
}

/// One file of the unit being walked.
struct SourceFile<'s> {
    path: PathBuf,
    text: &'s [u8],
}

impl SourceFile<'_> {
    fn text(&self, node: Node<'_>) -> &str {
        node.utf8_text(self.text).unwrap_or("")
    }

    fn location(&self, node: Node<'_>) -> SourceLocation {
        SourceLocation::new(&self.path, node.start_position().row + 1)
    }
}

/// How a record appears after `template <...>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Templated {
    No,
    /// Primary template or partial specialization.
    Primary,
    /// `template <>`.
    Explicit,
}

struct Builder {
    strict: bool,
    parser: Parser,
    unit: TranslationUnit,
    include_dirs: Vec<PathBuf>,
    visited: HashSet<PathBuf>,
    /// Qualified name of every named record definition, in parse order.
    records: Vec<(String, DeclId)>,
    types: TypeNames,
    /// Base specifiers with the scope their class was declared in.
    bases: Vec<(DeclId, Vec<String>)>,
    /// Enumerator values seen so far, by qualified name. Unscoped
    /// enumerators are also entered under their enclosing scope.
    enumerators: HashMap<String, i64>,
}

/// Type names declared so far in the unit.
#[derive(Debug, Default)]
struct TypeNames {
    /// Qualified names of records, class templates and enums.
    declared: HashSet<String>,
    /// Qualified alias name to the spelling of its target.
    aliases: HashMap<String, String>,
}

impl TypeNames {
    fn declare(&mut self, scope: &[String], name: &str) {
        self.declared.insert(qualified(scope, name));
    }

    fn alias(&mut self, scope: &[String], name: &str, target: String) {
        self.aliases.insert(qualified(scope, name), target);
    }

    /// Spell `written` as seen from `scope`: the innermost declared match
    /// wins and an alias becomes its target. Unknown names stay as written.
    fn resolve(&self, scope: &[String], written: &str) -> String {
        for candidate in candidates(scope, written) {
            if let Some(target) = self.aliases.get(&candidate) {
                return target.clone();
            }
            if self.declared.contains(&candidate) {
                return candidate;
            }
        }
        written.trim_start_matches("::").to_string()
    }
}

impl Builder {
    fn parse_file(
        &mut self,
        path: &Path,
        source: &[u8],
        parent: Option<DeclId>,
        scope: &[String],
    ) -> Result<(), ExtractError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::Frontend {
                path: path.to_path_buf(),
                message: "failed to parse source".to_string(),
            })?;
        let file = SourceFile {
            path: path.to_path_buf(),
            text: source,
        };

        self.report_syntax_errors(&file, tree.root_node())?;
        self.visit_items(&file, tree.root_node(), parent, scope)
    }

    fn report_syntax_errors(&mut self, file: &SourceFile, root: Node) -> Result<(), ExtractError> {
        if !root.has_error() {
            return Ok(());
        }
        let severity = if self.strict {
            Severity::Fatal
        } else {
            Severity::Error
        };

        let query = Query::new(&LANGUAGE, ERROR_QUERY).map_err(|e| ExtractError::Frontend {
            path: file.path.clone(),
            message: e.to_string(),
        })?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, root, file.text);

        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                if node.parent().map(|p| p.is_error()).unwrap_or(false) {
                    continue;
                }
                let line = file.text(node).lines().next().unwrap_or("");
                let snippet: String = line.chars().take(40).collect();
                let message = format!("syntax error near `{}`", snippet.trim());
                self.diagnose(severity, file.location(node), message);
            }
        }

        let mut missing = Vec::new();
        collect_missing(root, &mut missing);
        for node in missing {
            self.diagnose(severity, file.location(node), format!("expected `{}`", node.kind()));
        }
        Ok(())
    }

    fn diagnose(&mut self, severity: Severity, location: SourceLocation, message: String) {
        debug!(location = %location, severity = %severity, "{}", message);
        self.unit
            .push_diagnostic(Diagnostic::new(severity, Some(location), message));
    }

    fn visit_items(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
    ) -> Result<(), ExtractError> {
        for child in named_children(node) {
            self.visit_item(file, child, parent, scope)?;
        }
        Ok(())
    }

    fn visit_item(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
    ) -> Result<(), ExtractError> {
        match node.kind() {
            "preproc_include" => self.include(file, node, parent, scope)?,
            "namespace_definition" => self.namespace(file, node, parent, scope)?,
            "linkage_specification" => {
                if let Some(body) = node.child_by_field_name("body") {
                    if body.kind() == "declaration_list" {
                        self.visit_items(file, body, parent, scope)?;
                    } else {
                        self.visit_item(file, body, parent, scope)?;
                    }
                }
            }
            "declaration_list" => self.visit_items(file, node, parent, scope)?,
            kind if is_preproc_block(kind) => self.visit_items(file, node, parent, scope)?,
            "class_specifier" | "struct_specifier" | "enum_specifier" => {
                self.type_specifier(file, node, parent, scope, Access::Public, true, Templated::No);
            }
            "declaration" | "type_definition" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let bare = node.child_by_field_name("declarator").is_none();
                    let access = Access::Public;
                    self.type_specifier(file, ty, parent, scope, access, bare, Templated::No);
                }
                if node.kind() == "type_definition" {
                    self.alias(file, node, scope);
                }
            }
            "alias_declaration" => self.alias(file, node, scope),
            "template_declaration" => self.template(file, node, parent, scope, Access::Public),
            _ => {}
        }
        Ok(())
    }

    fn include(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
    ) -> Result<(), ExtractError> {
        let Some(path_node) = node.child_by_field_name("path") else {
            return Ok(());
        };
        let raw = file.text(path_node);
        let (target, quoted) = match path_node.kind() {
            "string_literal" => (raw.trim_matches('"'), true),
            "system_lib_string" => (raw.trim_start_matches('<').trim_end_matches('>'), false),
            _ => return Ok(()),
        };

        let Some(resolved) = self.resolve_include(&file.path, target, quoted) else {
            if quoted {
                self.diagnose(
                    Severity::Warning,
                    file.location(node),
                    format!("'{}' file not found", target),
                );
            } else {
                debug!(include = target, "skipping system include");
            }
            return Ok(());
        };

        if !self.visited.insert(resolved.clone()) {
            return Ok(());
        }
        match fs::read(&resolved) {
            Ok(source) => self.parse_file(&resolved, &source, parent, scope),
            Err(e) => {
                self.diagnose(
                    Severity::Warning,
                    file.location(node),
                    format!("cannot read '{}': {}", resolved.display(), e),
                );
                Ok(())
            }
        }
    }

    fn resolve_include(&self, from: &Path, target: &str, quoted: bool) -> Option<PathBuf> {
        let local = quoted
            .then(|| from.parent().map(|dir| dir.join(target)))
            .flatten();
        local
            .into_iter()
            .chain(self.include_dirs.iter().map(|dir| dir.join(target)))
            .map(|p| paths::normalize(&p))
            .find(|p| p.is_file())
    }

    fn namespace(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
    ) -> Result<(), ExtractError> {
        let name = node
            .child_by_field_name("name")
            .map(|n| file.text(n).to_string())
            .unwrap_or_default();

        // `namespace a::b {}` nests one namespace per segment.
        let mut parent = parent;
        let mut scope = scope.to_vec();
        let segments: Vec<&str> = if name.is_empty() {
            vec![""]
        } else {
            name.split("::").map(str::trim).collect()
        };
        for segment in segments {
            let segment = segment.trim_start_matches("inline ").trim();
            let decl = Decl::new(DeclKind::Namespace, segment, file.location(node));
            parent = Some(self.unit.add(decl, parent));
            if !segment.is_empty() {
                scope.push(segment.to_string());
            }
        }

        match node.child_by_field_name("body") {
            Some(body) => self.visit_items(file, body, parent, &scope),
            None => Ok(()),
        }
    }

    fn template(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
        access: Access,
    ) {
        let explicit = node
            .child_by_field_name("parameters")
            .map(|p| p.named_child_count() == 0)
            .unwrap_or(false);
        let templated = if explicit {
            Templated::Explicit
        } else {
            Templated::Primary
        };

        for child in named_children(node) {
            match child.kind() {
                "class_specifier" | "struct_specifier" => {
                    self.record(file, child, parent, scope, access, true, templated);
                }
                "declaration" | "field_declaration" => {
                    if let Some(ty) = child.child_by_field_name("type") {
                        if matches!(ty.kind(), "class_specifier" | "struct_specifier") {
                            let bare = child.child_by_field_name("declarator").is_none();
                            self.record(file, ty, parent, scope, access, bare, templated);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Declare the record or enum a type specifier defines.
    ///
    /// `bare` is set when the specifier stands alone (`class Foo;`), so a
    /// body-less specifier is a forward declaration rather than a use.
    #[allow(clippy::too_many_arguments)]
    fn type_specifier(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
        access: Access,
        bare: bool,
        templated: Templated,
    ) -> Option<DeclId> {
        match node.kind() {
            "class_specifier" | "struct_specifier" => {
                self.record(file, node, parent, scope, access, bare, templated)
            }
            "enum_specifier" => self.enumeration(file, node, parent, scope, access, bare),
            _ => None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
        access: Access,
        bare: bool,
        templated: Templated,
    ) -> Option<DeclId> {
        let name_node = node.child_by_field_name("name");
        let body = node.child_by_field_name("body");
        if body.is_none() && !bare {
            return None;
        }

        let written = match name_node {
            Some(n) if templated == Templated::Explicit => {
                Spelling::new(file, &self.types, scope).unresolved(n)
            }
            Some(n) => normalize_spelling(file.text(n)),
            None => String::new(),
        };
        let (kind, name) = match templated {
            Templated::Primary => (DeclKind::ClassTemplate, simple_name(&written).to_string()),
            _ => {
                let kind = if node.kind() == "struct_specifier" {
                    DeclKind::Struct
                } else {
                    DeclKind::Class
                };
                (kind, last_segment(&written).to_string())
            }
        };

        if !name.is_empty() {
            self.types.declare(scope, &name);
        }
        let location = file.location(name_node.unwrap_or(node));
        let mut decl = Decl::new(kind, name.clone(), location).with_access(access);
        if body.is_none() {
            decl = decl.declaration_only();
        }
        let id = self.unit.add(decl, parent);
        let Some(body) = body else {
            return Some(id);
        };

        let mut inner = scope.to_vec();
        if !name.is_empty() {
            inner.push(name.clone());
            self.records.push((inner.join("::"), id));
        }

        for clause in children(node).into_iter().filter(|c| c.kind() == "base_class_clause") {
            for base in named_children(clause) {
                if !matches!(
                    base.kind(),
                    "type_identifier"
                        | "qualified_identifier"
                        | "qualified_type_identifier"
                        | "template_type"
                ) {
                    continue;
                }
                // The name resolves later; template arguments resolve now.
                let spelling = Spelling::new(file, &self.types, scope).unresolved(base);
                let spec = self.unit.add_child(
                    id,
                    Decl::new(DeclKind::BaseSpecifier, spelling, file.location(base)),
                );
                self.bases.push((spec, scope.to_vec()));
            }
        }

        let default_access = if node.kind() == "class_specifier" {
            Access::Private
        } else {
            Access::Public
        };
        self.members(file, body, id, &name, &inner, default_access);
        Some(id)
    }

    fn members(
        &mut self,
        file: &SourceFile,
        body: Node,
        class: DeclId,
        class_name: &str,
        scope: &[String],
        default_access: Access,
    ) {
        let mut access = default_access;
        for member in named_children(body) {
            match member.kind() {
                "access_specifier" => {
                    if let Some(a) = Access::parse(file.text(member).trim_end_matches(':')) {
                        access = a;
                    }
                }
                "field_declaration" | "declaration" | "function_definition" => {
                    self.member_declaration(file, member, class, class_name, scope, access);
                }
                "template_declaration" => self.template(file, member, Some(class), scope, access),
                "type_definition" | "alias_declaration" => self.alias(file, member, scope),
                kind if is_preproc_block(kind) => {
                    self.members(file, member, class, class_name, scope, access);
                }
                _ => {}
            }
        }
    }

    fn member_declaration(
        &mut self,
        file: &SourceFile,
        node: Node,
        class: DeclId,
        class_name: &str,
        scope: &[String],
        access: Access,
    ) {
        let ty = node.child_by_field_name("type");
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();

        // Nested type definitions, with or without declarators.
        let mut anonymous_type = false;
        if let Some(ty) = ty.filter(|t| t.child_by_field_name("body").is_some()) {
            if let Some(nested) = self.type_specifier(
                file,
                ty,
                Some(class),
                scope,
                access,
                declarators.is_empty(),
                Templated::No,
            ) {
                anonymous_type = self.unit.decl(nested).is_anonymous();
            }
        }
        if anonymous_type || children(node).iter().any(|c| c.kind() == "bitfield_clause") {
            return;
        }

        let is_static = children(node).iter().any(|c| {
            c.kind() == "storage_class_specifier" && file.text(*c) == "static"
        });
        let spell = Spelling::new(file, &self.types, scope);
        let base = ty.map(|t| Ty::Named(spell.qualified_type(node, t)));

        for declarator in declarators {
            let declared = match &base {
                Some(base) => spell.declare(declarator, base.clone()),
                None => spell.declare(declarator, Ty::Named(String::new())),
            };
            let decl = match declared {
                Declared::Field { name, ty } if base.is_some() && !name.is_empty() => {
                    Decl::new(DeclKind::Field, name, file.location(declarator))
                        .with_type(ty.spelling())
                }
                Declared::Function {
                    name,
                    result,
                    params,
                    trailing,
                } => {
                    if DELETED.is_match(file.text(node)) {
                        debug!(method = %name, "skipping deleted member function");
                        continue;
                    }
                    let kind = if name.starts_with('~') {
                        DeclKind::Destructor
                    } else if base.is_none() {
                        if name != simple_name(class_name) {
                            continue;
                        }
                        DeclKind::Constructor
                    } else {
                        DeclKind::Method
                    };
                    let result = match trailing {
                        Some(t) if result.spelling() == "auto" => t,
                        _ => result.spelling(),
                    };
                    let mut decl =
                        Decl::new(kind, name, file.location(declarator)).with_args(params);
                    if kind == DeclKind::Method {
                        decl = decl.with_type(result);
                    }
                    decl
                }
                _ => continue,
            };

            let mut decl = decl.with_access(access);
            decl.is_static = is_static;
            self.unit.add_child(class, decl);
        }
    }

    /// Remember what a `typedef` or `using` alias stands for.
    fn alias(&mut self, file: &SourceFile, node: Node, scope: &[String]) {
        let spell = Spelling::new(file, &self.types, scope);
        let mut aliases = Vec::new();
        if node.kind() == "alias_declaration" {
            let name = node.child_by_field_name("name").map(|n| file.text(n).to_string());
            let target = node.child_by_field_name("type").map(|t| spell.type_descriptor(t));
            if let (Some(name), Some(target)) = (name, target) {
                aliases.push((name, target));
            }
        } else if let Some(ty) = node.child_by_field_name("type") {
            let base = Ty::Named(spell.qualified_type(node, ty));
            let mut cursor = node.walk();
            for declarator in node.children_by_field_name("declarator", &mut cursor) {
                if let Declared::Field { name, ty } = spell.declare(declarator, base.clone()) {
                    if !name.is_empty() {
                        aliases.push((name, ty.spelling()));
                    }
                }
            }
        }

        for (name, target) in aliases {
            // `typedef struct { ... } Point;` names the struct itself.
            if target.contains("(anonymous)") {
                self.types.declare(scope, &name);
            } else {
                self.types.alias(scope, &name, target);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn enumeration(
        &mut self,
        file: &SourceFile,
        node: Node,
        parent: Option<DeclId>,
        scope: &[String],
        access: Access,
        bare: bool,
    ) -> Option<DeclId> {
        let name_node = node.child_by_field_name("name");
        let name = name_node
            .map(|n| last_segment(file.text(n)).to_string())
            .unwrap_or_default();
        let location = file.location(name_node.unwrap_or(node));
        let scoped = children(node)
            .iter()
            .any(|c| matches!(c.kind(), "class" | "struct"));
        let fixed = node
            .child_by_field_name("base")
            .map(|b| Spelling::new(file, &self.types, scope).type_core(b));
        if !name.is_empty() {
            self.types.declare(scope, &name);
        }

        let Some(body) = node.child_by_field_name("body") else {
            if !bare {
                return None;
            }
            let mut decl = Decl::new(DeclKind::Enum, name, location)
                .with_access(access)
                .declaration_only();
            decl.is_scoped = scoped;
            return Some(self.unit.add(decl, parent));
        };

        let mut values: Vec<(String, SourceLocation, i64)> = Vec::new();
        let mut next = Some(0i64);
        for enumerator in named_children(body).into_iter().filter(|e| e.kind() == "enumerator") {
            let Some(ename) = enumerator
                .child_by_field_name("name")
                .map(|n| file.text(n).to_string())
            else {
                continue;
            };
            let value = match enumerator.child_by_field_name("value") {
                Some(expr) => {
                    let known = &self.enumerators;
                    let earlier = &values;
                    let enum_name = name.as_str();
                    let lookup = |ident: &str| {
                        // Inside the body, `X` and `Enum::X` both name an earlier sibling.
                        let own = ident
                            .strip_prefix(enum_name)
                            .and_then(|rest| rest.strip_prefix("::"))
                            .filter(|_| !enum_name.is_empty())
                            .unwrap_or(ident);
                        earlier
                            .iter()
                            .rev()
                            .find(|(n, _, _)| n == own)
                            .map(|(_, _, v)| *v)
                            .or_else(|| {
                                candidates(scope, ident)
                                    .iter()
                                    .find_map(|c| known.get(c).copied())
                            })
                    };
                    consteval::evaluate(file.text(expr), &lookup)
                }
                None => next,
            };

            match value {
                Some(v) => {
                    values.push((ename, file.location(enumerator), v));
                    next = v.checked_add(1);
                }
                None => {
                    warn!(
                        enumerator = %ename,
                        location = %file.location(enumerator),
                        "cannot evaluate enumerator value"
                    );
                    self.unit.push_diagnostic(Diagnostic::new(
                        Severity::Warning,
                        Some(file.location(enumerator)),
                        format!("cannot evaluate value of enumerator `{}`", ename),
                    ));
                    next = None;
                }
            }
        }

        let underlying = fixed.unwrap_or_else(|| {
            if !scoped && values.iter().all(|(_, _, v)| *v >= 0) {
                "unsigned int".to_string()
            } else {
                "int".to_string()
            }
        });
        let mut decl = Decl::new(DeclKind::Enum, name.clone(), location)
            .with_access(access)
            .with_type(underlying);
        decl.is_scoped = scoped;
        let id = self.unit.add(decl, parent);

        let mut inner = scope.to_vec();
        if !name.is_empty() {
            inner.push(name);
        }
        for (ename, loc, value) in values {
            self.enumerators.insert(qualified(&inner, &ename), value);
            if !scoped {
                self.enumerators.insert(qualified(scope, &ename), value);
            }
            self.unit
                .add_child(id, Decl::new(DeclKind::EnumConstant, ename, loc).with_value(value));
        }
        Some(id)
    }

    /// Point every base specifier at the definition it names and spell it
    /// fully qualified, searching the enclosing scopes innermost first.
    fn resolve_bases(&mut self) {
        let mut index: HashMap<&str, DeclId> = HashMap::new();
        for (name, id) in &self.records {
            index.entry(name.as_str()).or_insert(*id);
        }

        for (spec, scope) in &self.bases {
            let spelling = strip_class_key(&self.unit.decl(*spec).name).to_string();
            let (name, args) = match spelling.find('<') {
                Some(i) => spelling.split_at(i),
                None => (spelling.as_str(), ""),
            };
            let found = candidates(scope, name).into_iter().find_map(|qualified| {
                let specialized = format!("{}{}", qualified, args);
                if let Some(&id) = index.get(specialized.as_str()) {
                    return Some((id, specialized));
                }
                index.get(qualified.as_str()).map(|&id| {
                    let spelled = if self.unit.decl(id).kind == DeclKind::ClassTemplate {
                        specialized
                    } else {
                        qualified
                    };
                    (id, spelled)
                })
            });

            if let Some((def, qualified)) = found {
                let decl = self.unit.decl_mut(*spec);
                decl.referenced = Some(def);
                decl.name = qualified;
            }
        }
    }
}

/// A declared type, kept structured until it is spelled.
#[derive(Debug, Clone)]
enum Ty {
    Named(String),
    Pointer(Box<Ty>, String),
    Reference(Box<Ty>, bool),
    Array(Box<Ty>, String),
    Function(Box<Ty>, Vec<String>),
}

impl Ty {
    fn spelling(&self) -> String {
        self.render(String::new())
    }

    fn render(&self, inner: String) -> String {
        match self {
            Ty::Named(name) if inner.is_empty() => name.clone(),
            Ty::Named(name) => format!("{} {}", name, inner),
            Ty::Pointer(to, quals) => {
                let sep = if !quals.is_empty() && !inner.is_empty() { " " } else { "" };
                to.wrap(format!("*{}{}{}", quals, sep, inner))
            }
            Ty::Reference(to, rvalue) => {
                let amp = if *rvalue { "&&" } else { "&" };
                to.wrap(format!("{}{}", amp, inner))
            }
            Ty::Array(of, size) => of.render(format!("{}[{}]", inner, size)),
            Ty::Function(result, args) => result.render(format!("{}({})", inner, args.join(", "))),
        }
    }

    /// Pointers and references to arrays or functions need parentheses.
    fn wrap(&self, inner: String) -> String {
        match self {
            Ty::Array(..) | Ty::Function(..) => self.render(format!("({})", inner)),
            _ => self.render(inner),
        }
    }
}

enum Declared {
    Field {
        name: String,
        ty: Ty,
    },
    Function {
        name: String,
        result: Ty,
        params: Vec<String>,
        trailing: Option<String>,
    },
    Other,
}

/// Spells types written in one scope of one file.
struct Spelling<'a> {
    file: &'a SourceFile<'a>,
    names: &'a TypeNames,
    scope: &'a [String],
}

impl<'a> Spelling<'a> {
    fn new(file: &'a SourceFile<'a>, names: &'a TypeNames, scope: &'a [String]) -> Self {
        Self { file, names, scope }
    }

    /// Peel a declarator from the outside in, building the declared type.
    fn declare(&self, declarator: Node, base: Ty) -> Declared {
        let file = self.file;
        let mut ty = base;
        let mut node = Some(declarator);

        while let Some(current) = node {
            match current.kind() {
                "init_declarator"
                | "parenthesized_declarator"
                | "abstract_parenthesized_declarator" => {
                    node = current
                        .child_by_field_name("declarator")
                        .or_else(|| current.named_child(0));
                }
                "pointer_declarator" | "abstract_pointer_declarator" => {
                    ty = Ty::Pointer(Box::new(ty), qualifiers(file, current).join(" "));
                    node = current.child_by_field_name("declarator");
                }
                "reference_declarator" | "abstract_reference_declarator" => {
                    let rvalue = file.text(current).trim_start().starts_with("&&");
                    ty = Ty::Reference(Box::new(ty), rvalue);
                    node = current.named_child(0);
                }
                "array_declarator" | "abstract_array_declarator" => {
                    let size = current
                        .child_by_field_name("size")
                        .map(|s| normalize_spelling(file.text(s)))
                        .unwrap_or_default();
                    ty = Ty::Array(Box::new(ty), size);
                    node = current.child_by_field_name("declarator");
                }
                "function_declarator" | "abstract_function_declarator" => {
                    let params = current
                        .child_by_field_name("parameters")
                        .map(|p| self.parameters(p))
                        .unwrap_or_default();
                    let inner = current.child_by_field_name("declarator");
                    if let Some(name) = inner.filter(|n| is_function_name(n.kind())) {
                        let trailing = children(current)
                            .into_iter()
                            .find(|c| c.kind() == "trailing_return_type")
                            .and_then(|t| t.named_child(0))
                            .map(|d| self.type_descriptor(d));
                        return Declared::Function {
                            name: function_name(file.text(name)),
                            result: ty,
                            params,
                            trailing,
                        };
                    }
                    ty = Ty::Function(Box::new(ty), params);
                    node = inner;
                }
                // `type_identifier` names a typedef.
                "field_identifier" | "identifier" | "type_identifier" => {
                    return Declared::Field {
                        name: file.text(current).to_string(),
                        ty,
                    };
                }
                _ => return Declared::Other,
            }
        }

        Declared::Field {
            name: String::new(),
            ty,
        }
    }

    fn parameters(&self, list: Node) -> Vec<String> {
        let mut args = Vec::new();
        for param in named_children(list) {
            if !matches!(param.kind(), "parameter_declaration" | "optional_parameter_declaration") {
                continue;
            }
            let Some(ty) = param.child_by_field_name("type") else {
                continue;
            };
            let base = Ty::Named(self.qualified_type(param, ty));
            let spelled = match param.child_by_field_name("declarator") {
                Some(d) => match self.declare(d, base) {
                    Declared::Field { ty, .. } => ty.spelling(),
                    _ => continue,
                },
                None => base.spelling(),
            };
            // `f(void)` takes no arguments.
            if spelled == "void" {
                continue;
            }
            args.push(spelled);
        }
        args
    }

    fn type_descriptor(&self, node: Node) -> String {
        let Some(ty) = node.child_by_field_name("type") else {
            return normalize_spelling(self.file.text(node));
        };
        let base = Ty::Named(self.qualified_type(node, ty));
        match node.child_by_field_name("declarator") {
            Some(d) => match self.declare(d, base.clone()) {
                Declared::Field { ty, .. } => ty.spelling(),
                _ => base.spelling(),
            },
            None => base.spelling(),
        }
    }

    /// The type specifier of `decl`, with its cv-qualifiers in front.
    fn qualified_type(&self, decl: Node, ty: Node) -> String {
        let core = self.type_core(ty);
        let quals = qualifiers(self.file, decl);
        if quals.is_empty() {
            core
        } else {
            format!("{} {}", quals.join(" "), core)
        }
    }

    fn type_core(&self, ty: Node) -> String {
        let text = self.file.text(ty);
        match ty.kind() {
            "primitive_type" => text.to_string(),
            "sized_type_specifier" => canonical_sized(text),
            "type_identifier" | "qualified_identifier" | "template_type" => self.type_name(ty),
            "class_specifier" | "struct_specifier" | "union_specifier" | "enum_specifier" => ty
                .child_by_field_name("name")
                .map(|n| self.type_name(n))
                .unwrap_or_else(|| "(anonymous)".to_string()),
            _ => normalize_spelling(text),
        }
    }

    /// A type name resolved against the names declared so far, template
    /// arguments included.
    fn type_name(&self, node: Node) -> String {
        let (path, args) = split_type_name(self.file, node);
        let name = self.names.resolve(self.scope, &path);
        match args {
            Some(args) => format!("{}<{}>", name, self.template_arguments(args)),
            None => name,
        }
    }

    /// A name as written with only its template arguments resolved.
    fn unresolved(&self, node: Node) -> String {
        match split_type_name(self.file, node) {
            (path, Some(args)) => format!("{}<{}>", path, self.template_arguments(args)),
            (path, None) => path,
        }
    }

    fn template_arguments(&self, list: Node) -> String {
        named_children(list)
            .into_iter()
            .filter(|arg| arg.kind() != "comment")
            .map(|arg| match arg.kind() {
                "type_descriptor" => self.type_descriptor(arg),
                _ => normalize_spelling(self.file.text(arg)),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Split `a::b::Name<args>` into its path and argument list.
fn split_type_name<'t>(file: &SourceFile, node: Node<'t>) -> (String, Option<Node<'t>>) {
    match node.kind() {
        "qualified_identifier" => {
            let scope = node
                .child_by_field_name("scope")
                .map(|s| normalize_spelling(file.text(s)))
                .unwrap_or_default();
            let (rest, args) = node
                .child_by_field_name("name")
                .map(|n| split_type_name(file, n))
                .unwrap_or_default();
            (format!("{}::{}", scope, rest), args)
        }
        "template_type" => (
            node.child_by_field_name("name")
                .map(|n| file.text(n).to_string())
                .unwrap_or_default(),
            node.child_by_field_name("arguments"),
        ),
        _ => (normalize_spelling(file.text(node)), None),
    }
}

fn qualified(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope.join("::"), name)
    }
}

/// What `name` may refer to from `scope`, innermost scope first. A
/// leading `::` names the global scope only.
fn candidates(scope: &[String], name: &str) -> Vec<String> {
    if let Some(global) = name.strip_prefix("::") {
        return vec![global.to_string()];
    }
    (0..=scope.len())
        .rev()
        .map(|depth| qualified(&scope[..depth], name))
        .collect()
}

/// `const`/`volatile` directly under `node`, in clang's order.
fn qualifiers(file: &SourceFile, node: Node) -> Vec<&'static str> {
    let written: Vec<String> = children(node)
        .into_iter()
        .filter(|c| c.kind() == "type_qualifier")
        .map(|c| file.text(c).to_string())
        .collect();
    ["const", "volatile"]
        .into_iter()
        .filter(|q| written.iter().any(|w| w == q))
        .collect()
}

/// Spell a sized integer type the way clang does: `unsigned long`,
/// `long long`, `short`.
fn canonical_sized(text: &str) -> String {
    let mut unsigned = false;
    let mut signed = false;
    let mut shorts = 0;
    let mut longs = 0;
    let mut base = None;
    for word in text.split_whitespace() {
        match word {
            "unsigned" => unsigned = true,
            "signed" => signed = true,
            "short" => shorts += 1,
            "long" => longs += 1,
            other => base = Some(other),
        }
    }

    match base {
        Some("char") if unsigned => "unsigned char".to_string(),
        Some("char") if signed => "signed char".to_string(),
        Some("char") => "char".to_string(),
        Some("double") if longs > 0 => "long double".to_string(),
        Some(other) if other != "int" => normalize_spelling(text),
        _ => {
            let core = if shorts > 0 {
                "short"
            } else if longs >= 2 {
                "long long"
            } else if longs == 1 {
                "long"
            } else {
                "int"
            };
            if unsigned {
                format!("unsigned {}", core)
            } else {
                core.to_string()
            }
        }
    }
}

/// Collapse whitespace the way clang prints names: `std::map<int, float>`.
fn normalize_spelling(text: &str) -> String {
    let s = WHITESPACE.replace_all(text.trim(), " ");
    let s = AROUND_PUNCT.replace_all(&s, "$1");
    AROUND_COMMA.replace_all(&s, ", ").into_owned()
}

/// `operator ==` -> `operator==`, `operator  new` -> `operator new`.
fn function_name(text: &str) -> String {
    let text = normalize_spelling(text);
    match text.strip_prefix("operator") {
        Some(rest) if !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_') => {
            let rest = rest.trim();
            if rest.starts_with(|c: char| c.is_alphabetic()) {
                format!("operator {}", rest)
            } else {
                format!("operator{}", rest.replace(' ', ""))
            }
        }
        _ => text,
    }
}

fn last_segment(name: &str) -> &str {
    match name.find('<') {
        Some(i) => {
            let (head, _) = name.split_at(i);
            let start = head.rfind("::").map(|p| p + 2).unwrap_or(0);
            &name[start..]
        }
        None => name.rsplit("::").next().unwrap_or(name),
    }
}

fn is_function_name(kind: &str) -> bool {
    matches!(
        kind,
        "field_identifier" | "identifier" | "operator_name" | "destructor_name"
    )
}

fn is_preproc_block(kind: &str) -> bool {
    ["preproc_if", "preproc_else", "preproc_elif"]
        .iter()
        .any(|prefix| kind.starts_with(prefix))
}

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn collect_missing<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
    if node.is_missing() {
        out.push(node);
        return;
    }
    for child in children(node) {
        if child.has_error() {
            collect_missing(child, out);
        }
    }
}
