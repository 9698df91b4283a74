//! Minimal XML support: a namespace-aware tree, exclusive canonicalization,
//! and the escaping rules shared by the builders and the canonicalizer.

mod c14n;
mod dom;
mod escape;

pub use c14n::canonicalize;
pub use dom::{Attribute, Document, Element, Node};
pub use escape::{escape_attr, escape_text};
