//! Bigen Core - Builtin Metadata Compiler
//!
//! This crate turns YAML descriptions of the engine's builtin objects and
//! strings into initializer data: a bit-packed RAM stream decoded at heap
//! creation, or read-only ROM initializers, plus the C source and header
//! that carry them.

pub mod bitpack;
pub mod builtins;
pub mod cgen;
pub mod config;
pub mod dump;
pub mod error;
pub mod filter;
pub mod hash;
pub mod index;
pub mod lightfunc;
pub mod magic;
pub mod merge;
pub mod metadata;
pub mod metajson;
pub mod normalize;
pub mod pipeline;
pub mod prune;
pub mod ram;
pub mod rom;
pub mod strings;
pub mod text;

pub use builtins::{Builtin, Builtins};
pub use config::{ActiveConfig, BuildInfo, BuildMode, CompileOptions, CompilerContext, UsedDefines};
pub use error::{BuiltinsError, BuiltinsResult};
pub use metadata::{Metadata, MetadataDocument};
pub use pipeline::{compile, prepare, Outputs};
