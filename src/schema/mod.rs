//! Data model shared by the parser, the resolver and the interpreter.

pub mod document;
pub mod preamble;
pub mod rule_table;
