//! Magic value resolution
//!
//! Native functions receive a 16-bit signed "magic" value which lets one C
//! function implement several builtins. Metadata writes magic either as a
//! plain integer or symbolically; this module turns it into the integer.
//!
//! IMPORTANT: the lookup tables below must match the runtime's own
//! numbering for Math, Array iteration, buffer field access and typed
//! array element types.

use crate::error::{BuiltinsError, BuiltinsResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Math (one argument)
// ============================================================================

const MATH_ONEARG: &[(&str, i16)] = &[
    ("fabs", 0),
    ("acos", 1),
    ("asin", 2),
    ("atan", 3),
    ("ceil", 4),
    ("cos", 5),
    ("exp", 6),
    ("floor", 7),
    ("log", 8),
    ("round", 9),
    ("sin", 10),
    ("sqrt", 11),
    ("tan", 12),
    ("cbrt", 13),
    ("log2", 14),
    ("log10", 15),
    ("trunc", 16),
];

// ============================================================================
// Math (two arguments)
// ============================================================================

const MATH_TWOARG: &[(&str, i16)] = &[("atan2", 0), ("pow", 1)];

// ============================================================================
// Array iteration
// ============================================================================

const ARRAY_ITER: &[(&str, i16)] = &[
    ("every", 0),
    ("some", 1),
    ("forEach", 2),
    ("map", 3),
    ("filter", 4),
];

// ============================================================================
// Buffer field access element types
// ============================================================================

const FIELD_ELEM: &[(&str, i16)] = &[
    ("8bit", 0),
    ("16bit", 1),
    ("32bit", 2),
    ("float", 3),
    ("double", 4),
    ("varint", 5),
];

// ============================================================================
// Typed array element types
// ============================================================================

const TYPEDARRAY_ELEM: &[(&str, i16)] = &[
    ("uint8", 0),
    ("uint8clamped", 1),
    ("int8", 2),
    ("uint16", 3),
    ("int16", 4),
    ("uint32", 5),
    ("int32", 6),
    ("float32", 7),
    ("float64", 8),
];

/// Magic as written in metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MagicSpec {
    Int(i64),
    Tagged(TaggedMagic),
}

/// Symbolic magic forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaggedMagic {
    Plain { value: i64 },
    Bidx { id: String },
    MathOnearg { funcname: String },
    MathTwoarg { funcname: String },
    ArrayIter { funcname: String },
    TypedarrayConstructor { elem: String, shift: i64 },
    BufferReadfield(FieldAccess),
    BufferWritefield(FieldAccess),
}

/// Buffer read/write field descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAccess {
    pub elem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bigendian: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typedarray: Option<bool>,
}

impl MagicSpec {
    /// Object id this magic refers to, if it is a bidx reference.
    pub fn bidx_target(&self) -> Option<&str> {
        match self {
            MagicSpec::Tagged(TaggedMagic::Bidx { id }) => Some(id),
            _ => None,
        }
    }
}

fn lookup(table: &[(&str, i16)], kind: &'static str, name: &str) -> BuiltinsResult<i16> {
    table
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
        .ok_or_else(|| BuiltinsError::UnknownMagic {
            kind,
            name: name.to_string(),
        })
}

fn to_i16(value: i64) -> BuiltinsResult<i16> {
    i16::try_from(value).map_err(|_| BuiltinsError::MagicOutOfRange { value })
}

fn required(flag: Option<bool>, kind: &'static str, field: &'static str) -> BuiltinsResult<i16> {
    flag.map(i16::from)
        .ok_or(BuiltinsError::MissingMagicField { kind, field })
}

fn field_magic(access: &FieldAccess, kind: &'static str) -> BuiltinsResult<i16> {
    let elem = lookup(FIELD_ELEM, kind, &access.elem)?;
    let signed = required(access.signed, kind, "signed")?;
    let bigendian = required(access.bigendian, kind, "bigendian")?;
    let typedarray = required(access.typedarray, kind, "typedarray")?;
    Ok(elem + (signed << 4) + (bigendian << 3) + (typedarray << 5))
}

/// Resolve a magic spec into its integer value.
///
/// A missing spec resolves to 0. `bidx` maps object ids to their builtin
/// index; an empty map makes every bidx reference fail.
pub fn resolve(spec: Option<&MagicSpec>, bidx: &FxHashMap<String, usize>) -> BuiltinsResult<i16> {
    let Some(spec) = spec else {
        return Ok(0);
    };
    match spec {
        MagicSpec::Int(v) => to_i16(*v),
        MagicSpec::Tagged(tagged) => match tagged {
            TaggedMagic::Plain { value } => to_i16(*value),
            TaggedMagic::Bidx { id } => bidx
                .get(id)
                .ok_or_else(|| BuiltinsError::UnknownBidx { id: id.clone() })
                .and_then(|&idx| to_i16(idx as i64)),
            TaggedMagic::MathOnearg { funcname } => lookup(MATH_ONEARG, "math_onearg", funcname),
            TaggedMagic::MathTwoarg { funcname } => lookup(MATH_TWOARG, "math_twoarg", funcname),
            TaggedMagic::ArrayIter { funcname } => lookup(ARRAY_ITER, "array_iter", funcname),
            TaggedMagic::TypedarrayConstructor { elem, shift } => {
                let elem = lookup(TYPEDARRAY_ELEM, "typedarray_constructor", elem)?;
                to_i16((i64::from(elem) << 2) + shift)
            }
            TaggedMagic::BufferReadfield(access) => field_magic(access, "buffer_readfield"),
            TaggedMagic::BufferWritefield(access) => field_magic(access, "buffer_writefield"),
        },
    }
}
