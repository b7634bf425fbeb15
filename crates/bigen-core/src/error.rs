//! Builtin compilation errors

use thiserror::Error;

pub type BuiltinsResult<T> = Result<T, BuiltinsError>;

#[derive(Debug, Error)]
pub enum BuiltinsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid codepoint U+{codepoint:04X} in {text:?} (only U+0000..U+00FF map to bytes)")]
    InvalidCodepoint { text: String, codepoint: u32 },

    #[error("\"{key}\" has been removed, use \"objects\" with \"{replacement}: true\"")]
    RemovedKey { key: String, replacement: String },

    #[error("Cannot add object {id} which already exists")]
    ObjectExists { id: String },

    #[error("Cannot {verb} object {id} which doesn't exist")]
    ObjectNotFound { id: String, verb: &'static str },

    #[error("Cannot add property {key} of {object}: property already exists")]
    PropertyExists { object: String, key: String },

    #[error("Cannot delete property {key} of {object}: property doesn't exist")]
    PropertyNotFound { object: String, key: String },

    #[error("Unknown object class {name:?} for {object}")]
    UnknownClass { object: String, name: String },

    #[error("Unsupported attributes {attributes:?} for {object}/{key}")]
    InvalidAttributes {
        object: String,
        key: String,
        attributes: String,
    },

    #[error("Invalid value for {object}/{key}: {message}")]
    InvalidValue {
        object: String,
        key: String,
        message: String,
    },

    #[error("Callable object {id} has neither nargs nor an integer length")]
    MissingNargs { id: String },

    #[error("Accessor {object}/{key} has different getter and setter magic")]
    AccessorMagicMismatch { object: String, key: String },

    #[error("Failed to merge string entry {string:?}: conflicting {field}")]
    ConflictingString { string: String, field: &'static str },

    #[error("Source code needs define {define} not provided by strings")]
    MissingDefine { define: String },

    #[error("Reserved word {string:?} is not among the strings with a stridx")]
    MissingReservedWord { string: String },

    #[error("8-bit string index not satisfied for {string:?} (index {index})")]
    EightBitIndex { string: String, index: usize },

    #[error("Invalid plain value for magic: {value}")]
    MagicOutOfRange { value: i64 },

    #[error("Unknown {kind} magic key {name:?}")]
    UnknownMagic { kind: &'static str, name: String },

    #[error("Missing {field:?} in {kind} magic")]
    MissingMagicField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("Magic refers to object {id} which has no bidx")]
    UnknownBidx { id: String },

    #[error("Object {object} refers to missing object {target}")]
    DanglingReference { object: String, target: String },

    #[error("Object {id} is referenced from init data but is not a top level object")]
    NotTopLevel { id: String },

    #[error("Cannot encode object {object}: {message}")]
    Encoding { object: String, message: String },

    #[error("Value {value} does not fit in {bits} bits")]
    BitOverflow { value: u64, bits: u32 },

    #[error("Value {value} is too large for a varuint")]
    VaruintOverflow { value: u64 },

    #[error("String of {len} bytes is too long to encode")]
    StringTooLong { len: usize },

    #[error("Too many compressed ROM pointers ({count}), range exhausted")]
    PointerOverflow { count: usize },
}
