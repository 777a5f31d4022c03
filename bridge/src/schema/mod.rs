//! Form schema model, traversal, expansion, and caching

mod cache;
mod component;
mod derived;
mod expander;
mod walker;

pub use cache::SchemaCache;
pub use component::{
    Component, ComponentCategory, ComponentField, ComponentType, LayoutCell, ReferenceAttribute,
    Schema,
};
pub use derived::DerivedCache;
pub use expander::{SchemaExpander, expand};
pub use walker::{find_by_key, join_path};
