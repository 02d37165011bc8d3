//! Seed Engine: deterministic procedural text from phrase books.
//!
//! A phrase book is a set of named rules, each a weighted list of
//! alternatives whose text may reference other rules. Rendering a rule
//! against a short base-36 seed always produces the same text, and each
//! choice draws from its own sub-stream so editing one part of a book leaves
//! the rest of the output alone. Books may import other books and animate
//! numeric values over a playback timeline.

pub mod core;
pub mod schema;

pub use crate::core::engine::{parse, Engine, EngineBuilder, EngineConfig, EngineError};
pub use crate::core::expand::{generate, Bindings, ExpandError};
pub use crate::core::grammar::ParseError;
pub use crate::core::import::{DirectoryLoader, DocumentLoader, ImportError, MemoryLoader};
pub use crate::core::seed::{Seed, SeedError};
pub use crate::schema::document::Document;
pub use crate::schema::rule_table::RuleTable;
