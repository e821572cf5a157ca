//! Reflection records produced by extraction and stored in cache files.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// `path:line` location of a record, relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Location {
    pub file: String,
    pub line: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

impl From<Location> for String {
    fn from(loc: Location) -> Self {
        loc.to_string()
    }
}

impl TryFrom<String> for Location {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let (file, line) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("location without line: {}", s))?;
        let line = line
            .parse()
            .map_err(|_| format!("invalid line number in location: {}", s))?;
        Ok(Location::new(file, line))
    }
}

/// A public, non-static data member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRecord {
    pub name: String,
    pub display_name: String,
    /// Type identifier expression, e.g. `TypeID<float>`.
    #[serde(rename = "type")]
    pub type_id: String,
    /// Byte offset expression, e.g. `offsetof(struct game::Transform, x)`.
    pub offset: String,
}

/// A public, non-static member function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRecord {
    pub name: String,
    pub display_name: String,
    /// Member pointer expression, e.g. `&game::Player::jump`.
    pub pointer: String,
    /// Canonical result type.
    pub result: String,
    /// Canonical argument types.
    #[serde(default)]
    pub args: Vec<String>,
}

impl MethodRecord {
    /// Operator overloads (`operator==`, `operator()`) are kept in the cache
    /// but never registered.
    pub fn is_operator(&self) -> bool {
        match self.name.strip_prefix("operator") {
            Some(rest) => !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'),
            None => false,
        }
    }
}

/// A reflectable class or struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub name: String,
    pub display_name: String,
    pub location: Location,
    /// Enclosing namespace/class prefix, e.g. `game::` or `game::Player::`.
    #[serde(default)]
    pub scope: String,
    #[serde(rename = "type")]
    pub type_id: String,
    pub size: String,
    #[serde(default)]
    pub fields: Vec<FieldRecord>,
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
    /// Base specifiers as spelled by the front-end, in declaration order.
    #[serde(default)]
    pub bases: Vec<String>,
    /// Keys of every class that inherits from this one, directly or not.
    /// Only the linker writes this.
    #[serde(default)]
    pub derived: BTreeSet<String>,
}

impl ClassRecord {
    /// Compare everything except the linker-owned `derived` set.
    pub fn same_shape(&self, other: &ClassRecord) -> bool {
        self.name == other.name
            && self.display_name == other.display_name
            && self.location == other.location
            && self.scope == other.scope
            && self.type_id == other.type_id
            && self.size == other.size
            && self.fields == other.fields
            && self.methods == other.methods
            && self.bases == other.bases
    }
}

/// One enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// A reflected enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumRecord {
    pub name: String,
    pub display_name: String,
    pub location: Location,
    #[serde(rename = "type")]
    pub type_id: String,
    pub size: String,
    pub underlying_type: String,
    pub scoped: bool,
    /// Enumerators in declaration order.
    #[serde(default)]
    pub values: Vec<EnumValue>,
}

impl EnumRecord {
    /// Integer -> enumerator index. Aliases resolve to the first declared name.
    pub fn reverse_index(&self) -> BTreeMap<i64, &str> {
        let mut index = BTreeMap::new();
        for v in &self.values {
            index.entry(v.value).or_insert(v.name.as_str());
        }
        index
    }
}

/// Everything extracted from one translation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStore {
    /// The translation unit's source path; also its cache key.
    pub filename: String,
    #[serde(default)]
    pub includes: BTreeSet<String>,
    #[serde(default)]
    pub classes: BTreeMap<String, ClassRecord>,
    #[serde(default)]
    pub enums: BTreeMap<String, EnumRecord>,
}

impl FileStore {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.enums.is_empty()
    }
}
