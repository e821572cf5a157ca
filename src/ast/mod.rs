//! Declaration tree handed to the metadata extractor.
//!
//! A front-end parses one translation unit and produces a [`TranslationUnit`]:
//! an arena of [`Decl`] nodes with kinds, locations, access, and canonical
//! type spellings. The extractor never looks at source text, so any
//! front-end that can fill this tree works:
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────┐     ┌───────────┐
//! │ Source files │────▶│ AstProvider     │────▶│ Extractor │
//! └──────────────┘     │ (tree-sitter)   │     └───────────┘
//!                      └─────────────────┘
//! ```

pub mod compdb;
pub mod consteval;

#[cfg(feature = "tree-sitter")]
pub mod treesitter;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ExtractError;

pub use compdb::{CompileCommand, CompileCommands};

#[cfg(feature = "tree-sitter")]
pub use treesitter::CppProvider;

/// Index of a declaration inside its translation unit.
pub type DeclId = usize;

/// Kind of a declaration node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Namespace,
    Class,
    Struct,
    /// A primary class template. Only consulted for reflectability.
    ClassTemplate,
    Enum,
    EnumConstant,
    Field,
    Method,
    Constructor,
    Destructor,
    BaseSpecifier,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Namespace => "namespace",
            DeclKind::Class => "class",
            DeclKind::Struct => "struct",
            DeclKind::ClassTemplate => "class template",
            DeclKind::Enum => "enum",
            DeclKind::EnumConstant => "enumerator",
            DeclKind::Field => "field",
            DeclKind::Method => "method",
            DeclKind::Constructor => "constructor",
            DeclKind::Destructor => "destructor",
            DeclKind::BaseSpecifier => "base specifier",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Member access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

impl Access {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "public" => Some(Access::Public),
            "protected" => Some(Access::Protected),
            "private" => Some(Access::Private),
            _ => None,
        }
    }
}

/// File and 1-based line of a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
}

impl SourceLocation {
    pub fn new<P: AsRef<Path>>(file: P, line: usize) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// A declaration node.
///
/// Which optional fields are meaningful depends on `kind`:
/// - `type_spelling`: field type, method result type, or enum underlying type
/// - `arg_types`: method parameter types
/// - `enum_value`: enumerator value
/// - `referenced`: definition a base specifier names, when the front-end found it
#[derive(Debug, Clone)]
pub struct Decl {
    pub kind: DeclKind,
    /// Simple name, or the full spelling for base specifiers. Empty when anonymous.
    pub name: String,
    pub location: SourceLocation,
    pub access: Access,
    pub is_definition: bool,
    pub is_static: bool,
    pub is_scoped: bool,
    pub type_spelling: Option<String>,
    pub arg_types: Vec<String>,
    pub enum_value: Option<i64>,
    pub referenced: Option<DeclId>,
    children: Vec<DeclId>,
}

impl Decl {
    pub fn new(kind: DeclKind, name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            name: name.into(),
            location,
            access: Access::Public,
            is_definition: true,
            is_static: false,
            is_scoped: false,
            type_spelling: None,
            arg_types: Vec::new(),
            enum_value: None,
            referenced: None,
            children: Vec::new(),
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn with_type(mut self, spelling: impl Into<String>) -> Self {
        self.type_spelling = Some(spelling.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arg_types = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.enum_value = Some(value);
        self
    }

    pub fn declaration_only(mut self) -> Self {
        self.is_definition = false;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn scoped(mut self) -> Self {
        self.is_scoped = true;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn children(&self) -> &[DeclId] {
        &self.children
    }
}

/// Severity of a front-end diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal error"),
        }
    }
}

/// A message from the front-end about one translation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<SourceLocation>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        location: Option<SourceLocation>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// One parsed translation unit.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    path: PathBuf,
    decls: Vec<Decl>,
    roots: Vec<DeclId>,
    diagnostics: Vec<Diagnostic>,
}

impl TranslationUnit {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            decls: Vec::new(),
            roots: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// The main source file of the unit.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a declaration under `parent`, or as a top-level declaration.
    pub fn add(&mut self, decl: Decl, parent: Option<DeclId>) -> DeclId {
        let id = self.decls.len();
        self.decls.push(decl);
        match parent {
            Some(parent) => self.decls[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn add_root(&mut self, decl: Decl) -> DeclId {
        self.add(decl, None)
    }

    pub fn add_child(&mut self, parent: DeclId, decl: Decl) -> DeclId {
        self.add(decl, Some(parent))
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id]
    }

    pub fn roots(&self) -> &[DeclId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Children of `id` paired with their nodes, in declaration order.
    pub fn children_of(&self, id: DeclId) -> impl Iterator<Item = (DeclId, &Decl)> + '_ {
        self.decls[id]
            .children
            .iter()
            .map(move |&child| (child, &self.decls[child]))
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The first fatal diagnostic, if any.
    pub fn fatal(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.severity == Severity::Fatal)
    }
}

/// A front-end that parses one translation unit into a declaration tree.
///
/// Implementations must be usable from several threads at once: stale
/// files are re-extracted in parallel.
pub trait AstProvider: Send + Sync {
    /// Parse the translation unit rooted at `path`.
    ///
    /// Returns an error only when the unit cannot be produced at all.
    /// Recoverable problems are reported as diagnostics on the unit.
    fn parse(&self, path: &Path) -> Result<TranslationUnit, ExtractError>;
}
