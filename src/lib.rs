//! `pyrite` library crate.
//!
//! Core of an interpreter for a small, indentation-sensitive, Python-like
//! language:
//! - frontend: `token` + `lexer` turn source text into a token stream with
//!   synthesized `Indent`/`Dedent`/`Newline` events
//! - `runtime`: the object model (numbers, strings, booleans, classes with
//!   single inheritance, class instances) behind shared-ownership handles
//! - `ast`: tree-walking evaluator executing statement nodes against a
//!   scope and a host context
//!
//! The parser sits between the two halves and is an external collaborator:
//! it consumes the token stream and produces `ast::Statement` trees.
pub mod ast;
pub mod lexer;
pub mod runtime;
pub mod token;
