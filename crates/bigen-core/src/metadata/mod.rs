//! Builtin metadata: on-disk documents and the normalized model

pub mod model;
pub mod raw;

pub use model::{
    Attributes, Bytes, Lightfunc, Metadata, ObjectClass, ObjectEntry, OpaqueKind, PropValue,
    PropertyEntry, StringEntry, StringOrigin,
};
pub use raw::MetadataDocument;
