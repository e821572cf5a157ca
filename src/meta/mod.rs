//! Reflection metadata model.
//!
//! - `records`: class, field, method, and enum records plus the per-file store
//! - `display`: identifier to display-name conversion
//! - `paths`: slash-normalized, root-relative paths for locations and includes

pub mod display;
pub mod paths;
mod records;

pub use display::display_name;
pub use records::{
    ClassRecord, EnumRecord, EnumValue, FieldRecord, FileStore, Location, MethodRecord,
};
