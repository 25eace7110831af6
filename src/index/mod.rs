//! Persistent search indices mirrored from the chunk store
//!
//! Both indices hold weak references into the store: the lexical index by
//! `"file_path:start_line"` locator, the vector index by numeric chunk id.

pub mod lexical;
pub mod vector;

pub use lexical::{LexicalHit, LexicalIndex};
pub use vector::{VectorHit, VectorIndex, VectorIndexParams};
