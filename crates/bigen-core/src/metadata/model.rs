//! Canonical metadata model
//!
//! Produced once by the normalizer. Strings are byte strings, attributes
//! are flags, shorthand is expanded, and object references are still ids
//! so that stages can add and remove objects freely.

use crate::magic::MagicSpec;
use std::fmt;

/// A builtin string: raw bytes, possibly with symbol marker bytes.
pub type Bytes = Vec<u8>;

// ============================================================================
// Object classes
// ============================================================================

/// Object class, numbered as in the runtime's object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Unused,
    Object,
    Array,
    Function,
    Arguments,
    Boolean,
    Date,
    Error,
    Json,
    Math,
    Number,
    RegExp,
    String,
    Global,
    Symbol,
    ObjEnv,
    DecEnv,
    Pointer,
    Thread,
}

const CLASS_NAMES: [(&str, ObjectClass); 19] = [
    ("Unused", ObjectClass::Unused),
    ("Object", ObjectClass::Object),
    ("Array", ObjectClass::Array),
    ("Function", ObjectClass::Function),
    ("Arguments", ObjectClass::Arguments),
    ("Boolean", ObjectClass::Boolean),
    ("Date", ObjectClass::Date),
    ("Error", ObjectClass::Error),
    ("JSON", ObjectClass::Json),
    ("Math", ObjectClass::Math),
    ("Number", ObjectClass::Number),
    ("RegExp", ObjectClass::RegExp),
    ("String", ObjectClass::String),
    ("global", ObjectClass::Global),
    ("Symbol", ObjectClass::Symbol),
    ("ObjEnv", ObjectClass::ObjEnv),
    ("DecEnv", ObjectClass::DecEnv),
    ("Pointer", ObjectClass::Pointer),
    ("Thread", ObjectClass::Thread),
];

impl ObjectClass {
    pub fn from_name(name: &str) -> Option<Self> {
        CLASS_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, class)| *class)
    }

    pub fn name(self) -> &'static str {
        CLASS_NAMES[self.number() as usize].0
    }

    /// Class number in the runtime object header.
    pub fn number(self) -> u32 {
        self as u32
    }
}

// ============================================================================
// Property attributes
// ============================================================================

/// Property attributes. Displayed in canonical order w, e, c, a.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
    pub accessor: bool,
}

pub const PROPDESC_FLAG_WRITABLE: u8 = 1 << 0;
pub const PROPDESC_FLAG_ENUMERABLE: u8 = 1 << 1;
pub const PROPDESC_FLAG_CONFIGURABLE: u8 = 1 << 2;
pub const PROPDESC_FLAG_ACCESSOR: u8 = 1 << 3;

impl Attributes {
    pub const NONE: Attributes = Attributes {
        writable: false,
        enumerable: false,
        configurable: false,
        accessor: false,
    };

    /// `wc`, the default for data properties.
    pub const DATA_DEFAULT: Attributes = Attributes {
        writable: true,
        enumerable: false,
        configurable: true,
        accessor: false,
    };

    /// `ca`, the default for accessor properties.
    pub const ACCESSOR_DEFAULT: Attributes = Attributes {
        writable: false,
        enumerable: false,
        configurable: true,
        accessor: true,
    };

    /// `c`, used for function `length` and `name`.
    pub const CONFIGURABLE: Attributes = Attributes {
        writable: false,
        enumerable: false,
        configurable: true,
        accessor: false,
    };

    /// `wec`, used for structured shorthand.
    pub const WEC: Attributes = Attributes {
        writable: true,
        enumerable: true,
        configurable: true,
        accessor: false,
    };

    /// Parse an attribute string in any order. Unknown or repeated
    /// letters are rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let mut attrs = Attributes::NONE;
        for c in text.chars() {
            let slot = match c {
                'w' => &mut attrs.writable,
                'e' => &mut attrs.enumerable,
                'c' => &mut attrs.configurable,
                'a' => &mut attrs.accessor,
                _ => return None,
            };
            if *slot {
                return None;
            }
            *slot = true;
        }
        Some(attrs)
    }

    /// Runtime property descriptor flags.
    pub fn flags(self) -> u8 {
        let mut flags = 0;
        if self.writable {
            flags |= PROPDESC_FLAG_WRITABLE;
        }
        if self.enumerable {
            flags |= PROPDESC_FLAG_ENUMERABLE;
        }
        if self.configurable {
            flags |= PROPDESC_FLAG_CONFIGURABLE;
        }
        if self.accessor {
            flags |= PROPDESC_FLAG_ACCESSOR;
        }
        flags
    }

    pub fn without_accessor(self) -> Self {
        Self {
            accessor: false,
            ..self
        }
    }

    pub fn without_configurable(self) -> Self {
        Self {
            configurable: false,
            ..self
        }
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, c) in [
            (self.writable, 'w'),
            (self.enumerable, 'e'),
            (self.configurable, 'c'),
            (self.accessor, 'a'),
        ] {
            if set {
                write!(f, "{}", c)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Property values
// ============================================================================

/// Buffer and pointer values, which the init formats can't express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpaqueKind {
    Buffer,
    Pointer,
}

impl OpaqueKind {
    pub fn name(self) -> &'static str {
        match self {
            OpaqueKind::Buffer => "buffer",
            OpaqueKind::Pointer => "pointer",
        }
    }
}

/// Lightweight function value: a native pointer plus packed flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lightfunc {
    pub native: String,
    /// 0..=15
    pub length: u8,
    /// 0..=14, `None` for varargs
    pub nargs: Option<u8>,
    pub magic: i8,
}

/// nargs value stored in lightfunc flags for varargs functions.
pub const LIGHTFUNC_VARARGS: u16 = 15;

impl Lightfunc {
    /// Packed flags: magic in the high byte, length and nargs nibbles below.
    pub fn flags(&self) -> u16 {
        let nargs = self.nargs.map(u16::from).unwrap_or(LIGHTFUNC_VARARGS);
        (u16::from(self.magic as u8) << 8) + (u16::from(self.length) << 4) + nargs
    }
}

/// A property value. `R` is the object reference type: an id while the
/// object list is still changing, an arena index once frozen.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue<R = String> {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Exact IEEE double bytes, big endian
    Double([u8; 8]),
    String(Bytes),
    Object(R),
    Accessor {
        getter: Option<R>,
        setter: Option<R>,
    },
    Lightfunc(Lightfunc),
    Opaque(OpaqueKind),
}

impl<R> PropValue<R> {
    /// Integer value of a numeric property, if it is integral.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropValue::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&R> {
        match self {
            PropValue::Object(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_accessor(&self) -> bool {
        matches!(self, PropValue::Accessor { .. })
    }

    /// Every object this value refers to.
    pub fn object_refs(&self) -> Vec<&R> {
        match self {
            PropValue::Object(target) => vec![target],
            PropValue::Accessor { getter, setter } => {
                getter.iter().chain(setter.iter()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Big endian IEEE bytes of a numeric value.
    pub fn double_bytes(&self) -> Option<[u8; 8]> {
        match self {
            PropValue::Number(n) => Some(n.to_be_bytes()),
            PropValue::Double(bytes) => Some(*bytes),
            _ => None,
        }
    }

    /// Rewrite object references with `f`.
    pub fn map_refs<S, E>(&self, mut f: impl FnMut(&R) -> Result<S, E>) -> Result<PropValue<S>, E> {
        Ok(match self {
            PropValue::Undefined => PropValue::Undefined,
            PropValue::Null => PropValue::Null,
            PropValue::Bool(b) => PropValue::Bool(*b),
            PropValue::Number(n) => PropValue::Number(*n),
            PropValue::Double(bytes) => PropValue::Double(*bytes),
            PropValue::String(s) => PropValue::String(s.clone()),
            PropValue::Object(target) => PropValue::Object(f(target)?),
            PropValue::Accessor { getter, setter } => PropValue::Accessor {
                getter: getter.as_ref().map(&mut f).transpose()?,
                setter: setter.as_ref().map(&mut f).transpose()?,
            },
            PropValue::Lightfunc(lf) => PropValue::Lightfunc(lf.clone()),
            PropValue::Opaque(kind) => PropValue::Opaque(*kind),
        })
    }
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    pub key: Bytes,
    pub value: PropValue,
    pub attributes: Attributes,
    /// `false` keeps this property out of automatic lightfunc conversion
    pub auto_lightfunc: bool,
}

impl PropertyEntry {
    pub fn new(key: &[u8], value: PropValue, attributes: Attributes) -> Self {
        Self {
            key: key.to_vec(),
            value,
            attributes,
            auto_lightfunc: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub id: String,
    pub class: ObjectClass,
    pub internal_prototype: Option<String>,
    pub native: Option<String>,
    pub callable: bool,
    pub constructable: bool,
    pub special_call: bool,
    pub nargs: Option<i64>,
    /// Unset means "not stated"; RAM treats that as fixed args, the
    /// lightfunc converter as varargs.
    pub varargs: Option<bool>,
    pub magic: Option<MagicSpec>,
    pub bidx: bool,
    pub objenv_target: Option<String>,
    pub objenv_has_this: bool,
    /// Created by shorthand expansion
    pub auto_generated: bool,
    pub properties: Vec<PropertyEntry>,
}

impl ObjectEntry {
    pub fn new(id: impl Into<String>, class: ObjectClass) -> Self {
        Self {
            id: id.into(),
            class,
            internal_prototype: None,
            native: None,
            callable: false,
            constructable: false,
            special_call: false,
            nargs: None,
            varargs: None,
            magic: None,
            bidx: false,
            objenv_target: None,
            objenv_has_this: false,
            auto_generated: false,
            properties: Vec::new(),
        }
    }

    pub fn property(&self, key: &[u8]) -> Option<&PropertyEntry> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Every object id this object refers to.
    pub fn object_refs(&self) -> Vec<&String> {
        let mut refs: Vec<&String> = self.internal_prototype.iter().collect();
        refs.extend(self.objenv_target.iter());
        for prop in &self.properties {
            refs.extend(prop.value.object_refs());
        }
        refs
    }
}

/// Where a string list entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOrigin {
    Listed,
    /// Added because a ROM object references it
    Referenced,
    /// Added through `add_forced_strings`
    Forced,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringEntry {
    pub bytes: Bytes,
    pub class_name: Option<bool>,
    pub reserved_word: Option<bool>,
    pub future_reserved_word_strict: Option<bool>,
    pub origin: StringOrigin,
}

impl StringEntry {
    pub fn new(bytes: Bytes, origin: StringOrigin) -> Self {
        Self {
            bytes,
            class_name: None,
            reserved_word: None,
            future_reserved_word_strict: None,
            origin,
        }
    }

    /// Needs an index below 256.
    pub fn needs_8bit_index(&self) -> bool {
        self.class_name.unwrap_or(false)
    }

    pub fn is_reserved_word(&self) -> bool {
        self.reserved_word.unwrap_or(false)
    }

    pub fn is_strict_reserved_word(&self) -> bool {
        self.future_reserved_word_strict.unwrap_or(false)
    }
}

/// The whole normalized document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub strings: Vec<StringEntry>,
    pub special_define_names: Vec<(Bytes, String)>,
    pub reserved_word_token_order: Vec<Bytes>,
    pub forced_strings: Vec<StringEntry>,
    pub objects: Vec<ObjectEntry>,
}

impl Metadata {
    pub fn object(&self, id: &str) -> Option<&ObjectEntry> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_mut(&mut self, id: &str) -> Option<&mut ObjectEntry> {
        self.objects.iter_mut().find(|o| o.id == id)
    }
}
