// widen — kernel preparation and vectorizer orchestration
//
// Library root. Leaf modules first: IR and its text form, then the
// synthesizers, the inliner, and the two-phase pipeline on top.

pub mod builder;
pub mod builtins;
pub mod config;
pub mod dump;
pub mod error;
pub mod exports;
pub mod index_fn;
pub mod indexed;
pub mod inline;
pub mod ir;
pub mod lexer;
pub mod loader;
pub mod naming;
pub mod parser;
pub mod pass;
pub mod passes;
pub mod pipeline;
pub mod registry;
pub mod signature;
pub mod vectorizer;
pub mod wrapper;
