//! ROM initializers: compile-time constant strings and objects
//!
//! [`RomImage::build`] lays out every string record, object header and
//! property table for a frozen ROM build and assigns compressed pointers.
//! The `emit_*` methods turn the image into C initializers. Every value
//! that varies with the target (hash algorithm, byte order, tagged value
//! layout, object layout) is selected by preprocessor macros, so one image
//! serves all targets.

use crate::builtins::{Builtin, Builtins, ObjIdx};
use crate::cgen::{byte_literal, CWriter};
use crate::error::{BuiltinsError, BuiltinsResult};
use crate::hash::{StringHashes, FIXED_HASH_SEED};
use crate::index::bidx_define_suffix;
use crate::metadata::model::{Attributes, Bytes, ObjectClass, PropValue};
use crate::text::{bytes_to_text, char_length, escape_bytes, is_array_index};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

/// First compressed ROM pointer value; must match the runtime config.
pub const ROMPTR_FIRST: u32 = 0xf800;
/// Number of string lookup buckets.
pub const ROMSTR_LOOKUP_SIZE: usize = 256;

// ============================================================================
// Image model
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RomString {
    pub bytes: Bytes,
    pub flags: Vec<&'static str>,
    pub hashes: StringHashes,
    pub char_len: usize,
    /// Next string in the same lookup bucket
    pub next: Option<usize>,
}

impl RomString {
    pub fn symbol(index: usize) -> String {
        format!("duk_str_{}", index)
    }
}

/// Tagged value initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum RomValue {
    Undefined,
    Null,
    Boolean(bool),
    /// Big endian IEEE bytes
    Number([u8; 8]),
    String(usize),
    Object(ObjIdx),
    Accessor {
        getter: Option<ObjIdx>,
        setter: Option<ObjIdx>,
    },
    Lightfunc {
        native: String,
        flags: u16,
    },
}

impl RomValue {
    /// Struct type of the initializer.
    pub fn type_name(&self) -> &'static str {
        match self {
            RomValue::Undefined => "duk_rom_tval_undefined",
            RomValue::Null => "duk_rom_tval_null",
            RomValue::Boolean(_) => "duk_rom_tval_boolean",
            RomValue::Number(_) => "duk_rom_tval_number",
            RomValue::String(_) => "duk_rom_tval_string",
            RomValue::Object(_) => "duk_rom_tval_object",
            RomValue::Accessor { .. } => "duk_rom_tval_accessor",
            RomValue::Lightfunc { .. } => "duk_rom_tval_lightfunc",
        }
    }

    /// Initializer literal.
    pub fn literal(&self) -> String {
        let obj_ref = |o: &Option<ObjIdx>| match o {
            Some(idx) => format!("&{}", RomObject::symbol(*idx)),
            None => "NULL".to_string(),
        };
        match self {
            RomValue::Undefined => "DUK__TVAL_UNDEFINED()".to_string(),
            RomValue::Null => "DUK__TVAL_NULL()".to_string(),
            RomValue::Boolean(b) => format!("DUK__TVAL_BOOLEAN({})", u8::from(*b)),
            RomValue::Number(bytes) => {
                let parts: Vec<String> = bytes.iter().map(|&b| byte_literal(b)).collect();
                format!("DUK__TVAL_NUMBER(DUK__DBLBYTES({}))", parts.join(","))
            }
            RomValue::String(idx) => format!("DUK__TVAL_STRING(&{})", RomString::symbol(*idx)),
            RomValue::Object(idx) => format!("DUK__TVAL_OBJECT(&{})", RomObject::symbol(*idx)),
            RomValue::Accessor { getter, setter } => {
                format!("DUK__TVAL_ACCESSOR({}, {})", obj_ref(getter), obj_ref(setter))
            }
            RomValue::Lightfunc { native, flags } => {
                format!("DUK__TVAL_LIGHTFUNC({}, {}L)", native, flags)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RomProperty {
    /// String index of the key
    pub key: usize,
    pub value: RomValue,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RomObjectKind {
    Function {
        native: String,
        /// `None` for varargs
        nargs: Option<i64>,
        magic: i16,
    },
    Array,
    ObjEnv {
        target: ObjIdx,
        has_this: bool,
    },
    Plain,
}

impl RomObjectKind {
    fn struct_name(&self) -> &'static str {
        match self {
            RomObjectKind::Function { .. } => "duk_romfun",
            RomObjectKind::Array => "duk_romarr",
            RomObjectKind::ObjEnv { .. } => "duk_romobjenv",
            RomObjectKind::Plain => "duk_romobj",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RomObject {
    pub id: String,
    pub kind: RomObjectKind,
    pub flags: Vec<String>,
    pub internal_prototype: Option<ObjIdx>,
    pub properties: Vec<RomProperty>,
    pub bidx: bool,
}

impl RomObject {
    pub fn symbol(index: usize) -> String {
        format!("duk_obj_{}", index)
    }

    pub fn props_symbol(index: usize) -> String {
        format!("duk_prop_{}", index)
    }
}

/// Something a compressed ROM pointer may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RomPointer {
    String(usize),
    Object(ObjIdx),
    Props(ObjIdx),
}

impl RomPointer {
    fn c_expr(self) -> String {
        match self {
            RomPointer::String(i) => format!("&{}", RomString::symbol(i)),
            RomPointer::Object(i) => format!("&{}", RomObject::symbol(i)),
            RomPointer::Props(i) => format!("&{}", RomObject::props_symbol(i)),
        }
    }
}

/// Every ROM initializer for one build.
#[derive(Debug, Clone)]
pub struct RomImage {
    pub strings: Vec<RomString>,
    /// String indices per lookup bucket
    pub lookup: Vec<Vec<usize>>,
    /// String index for each stridx
    pub stridx: Vec<usize>,
    pub objects: Vec<RomObject>,
    /// Compressed pointer `ROMPTR_FIRST + i` refers to `pointers[i]`
    pub pointers: Vec<RomPointer>,
    compressed: FxHashMap<RomPointer, u32>,
    pub native_declarations: Vec<String>,
}

// ============================================================================
// Layout
// ============================================================================

/// Lookup bucket of a string: first byte plus length shifted, 8 bits.
pub fn lookup_bucket(bytes: &[u8]) -> usize {
    let first = bytes.first().copied().map_or(0, usize::from);
    (first + (bytes.len() << 4)) & 0xff
}

fn string_flags(bytes: &[u8], char_len: usize, reserved: bool, strict_reserved: bool) -> Vec<&'static str> {
    let mut flags = vec![
        "DUK_HTYPE_STRING",
        "DUK_HEAPHDR_FLAG_READONLY",
        "DUK_HEAPHDR_FLAG_REACHABLE",
        "DUK_HSTRING_FLAG_PINNED_LITERAL",
    ];
    if bytes.len() == char_len {
        flags.push("DUK_HSTRING_FLAG_ASCII");
    }
    if is_array_index(bytes) {
        flags.push("DUK_HSTRING_FLAG_ARRIDX");
    }
    if matches!(bytes.first(), Some(0x80 | 0x81 | 0x82 | 0xff)) {
        flags.push("DUK_HSTRING_FLAG_SYMBOL");
    }
    if matches!(bytes.first(), Some(0x82 | 0xff)) {
        flags.push("DUK_HSTRING_FLAG_HIDDEN");
    }
    if bytes == b"eval" || bytes == b"arguments" {
        flags.push("DUK_HSTRING_FLAG_EVAL_OR_ARGUMENTS");
    }
    if reserved {
        flags.push("DUK_HSTRING_FLAG_RESERVED_WORD");
    }
    if strict_reserved {
        flags.push("DUK_HSTRING_FLAG_STRICT_RESERVED_WORD");
    }
    flags
}

fn object_flags(obj: &Builtin) -> Vec<String> {
    let mut flags: Vec<String> = ["DUK_HTYPE_OBJECT", "DUK_HEAPHDR_FLAG_READONLY", "DUK_HEAPHDR_FLAG_REACHABLE"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if obj.callable {
        flags.push("DUK_HOBJECT_FLAG_NATFUNC".to_string());
        flags.push("DUK_HOBJECT_FLAG_STRICT".to_string());
        flags.push("DUK_HOBJECT_FLAG_NEWENV".to_string());
        flags.push("DUK_HOBJECT_FLAG_CALLABLE".to_string());
    }
    if obj.constructable {
        flags.push("DUK_HOBJECT_FLAG_CONSTRUCTABLE".to_string());
    }
    if obj.class == ObjectClass::Array {
        flags.push("DUK_HOBJECT_FLAG_EXOTIC_ARRAY".to_string());
    }
    if obj.special_call {
        flags.push("DUK_HOBJECT_FLAG_SPECIAL_CALL".to_string());
    }
    flags.push(format!("DUK_HOBJECT_CLASS_AS_FLAGS({})", obj.class.number()));
    flags
}

/// C expression for ROM property attributes. ROM properties are never
/// configurable.
pub fn attributes_initializer(attrs: Attributes) -> Option<String> {
    if attrs.configurable {
        return None;
    }
    let base = Attributes {
        accessor: false,
        ..attrs
    };
    let letters = base.to_string().to_ascii_uppercase();
    let mut expr = if letters.is_empty() {
        "DUK_PROPDESC_FLAGS_NONE".to_string()
    } else {
        format!("DUK_PROPDESC_FLAGS_{}", letters)
    };
    if attrs.accessor {
        expr.push_str("|DUK_PROPDESC_FLAG_ACCESSOR");
    }
    Some(expr)
}

impl RomImage {
    /// Lay out a frozen ROM build.
    pub fn build(builtins: &Builtins) -> BuiltinsResult<Self> {
        let all = &builtins.strings.strings;
        let string_index: FxHashMap<&[u8], usize> = all
            .iter()
            .enumerate()
            .map(|(i, s)| (s.bytes(), i))
            .collect();

        // Strings and lookup chains
        let mut lookup: Vec<Vec<usize>> = vec![Vec::new(); ROMSTR_LOOKUP_SIZE];
        for (i, s) in all.iter().enumerate() {
            lookup[lookup_bucket(s.bytes())].push(i);
        }
        let mut next: Vec<Option<usize>> = vec![None; all.len()];
        for bucket in &lookup {
            for pair in bucket.windows(2) {
                next[pair[0]] = Some(pair[1]);
            }
        }
        log_chain_lengths(&lookup);

        let mut strings = Vec::with_capacity(all.len());
        for (i, s) in all.iter().enumerate() {
            let bytes = s.bytes();
            let char_len = char_length(bytes);
            strings.push(RomString {
                bytes: bytes.to_vec(),
                flags: string_flags(
                    bytes,
                    char_len,
                    s.entry.is_reserved_word(),
                    s.entry.is_strict_reserved_word(),
                ),
                hashes: StringHashes::compute(bytes, FIXED_HASH_SEED),
                char_len,
                next: next[i],
            });
        }

        let stridx = builtins
            .strings
            .stridx
            .iter()
            .map(|s| {
                string_index
                    .get(s.bytes())
                    .copied()
                    .ok_or_else(|| BuiltinsError::Encoding {
                        object: String::new(),
                        message: format!("stridx string {} missing from ROM strings", escape_bytes(s.bytes())),
                    })
            })
            .collect::<BuiltinsResult<Vec<_>>>()?;

        // Objects
        let mut objects = Vec::with_capacity(builtins.objects.len());
        for obj in &builtins.objects {
            objects.push(rom_object(obj, &string_index)?);
        }

        let mut image = Self {
            strings,
            lookup,
            stridx,
            objects,
            pointers: Vec::new(),
            compressed: FxHashMap::default(),
            native_declarations: builtins.native_declarations(),
        };
        image.assign_compressed_pointers(builtins)?;

        info!(
            "ROM image: {} strings, {} objects, {} compressed pointers",
            image.strings.len(),
            image.objects.len(),
            image.pointers.len()
        );
        Ok(image)
    }

    /// Strings sorted by content, objects sorted by id, then property
    /// tables in object order.
    fn assign_compressed_pointers(&mut self, builtins: &Builtins) -> BuiltinsResult<()> {
        let mut by_content: Vec<usize> = (0..self.strings.len()).collect();
        by_content.sort_by(|&a, &b| self.strings[a].bytes.cmp(&self.strings[b].bytes));
        let mut by_id: Vec<ObjIdx> = (0..builtins.objects.len()).collect();
        by_id.sort_by(|&a, &b| builtins.objects[a].id.cmp(&builtins.objects[b].id));

        let pointers = by_content
            .into_iter()
            .map(RomPointer::String)
            .chain(by_id.into_iter().map(RomPointer::Object))
            .chain(
                self.objects
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| !o.properties.is_empty())
                    .map(|(i, _)| RomPointer::Props(i)),
            );
        for ptr in pointers {
            let value = ROMPTR_FIRST + self.pointers.len() as u32;
            if value > 0xffff {
                return Err(BuiltinsError::PointerOverflow {
                    count: self.pointers.len() + 1,
                });
            }
            self.compressed.insert(ptr, value);
            self.pointers.push(ptr);
        }

        let highest = ROMPTR_FIRST + self.pointers.len() as u32;
        debug!(
            "{} compressed rom pointers (used range is [0x{:04x},0x{:04x}], {} space left)",
            self.pointers.len(),
            ROMPTR_FIRST,
            highest.saturating_sub(1),
            0x1_0000u32.saturating_sub(highest)
        );
        Ok(())
    }

    /// Compressed value of a pointer, 0 for NULL.
    pub fn compress(&self, ptr: Option<RomPointer>) -> u32 {
        ptr.and_then(|p| self.compressed.get(&p).copied()).unwrap_or(0)
    }

    pub fn bidx_objects(&self) -> impl Iterator<Item = (usize, &RomObject)> {
        self.objects.iter().enumerate().filter(|(_, o)| o.bidx)
    }
}

fn log_chain_lengths(lookup: &[Vec<usize>]) {
    let mut counts: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();
    for bucket in lookup {
        *counts.entry(bucket.len()).or_default() += 1;
    }
    let summary: Vec<String> = counts.iter().map(|(len, n)| format!("{}: {}", len, n)).collect();
    info!("ROM string table chain lengths: {}", summary.join(", "));
}

fn rom_object(obj: &Builtin, string_index: &FxHashMap<&[u8], usize>) -> BuiltinsResult<RomObject> {
    let err = |message: String| BuiltinsError::Encoding {
        object: obj.id.clone(),
        message,
    };

    let kind = if obj.callable {
        let native = obj
            .native
            .clone()
            .ok_or_else(|| err("callable object has no native".to_string()))?;
        let nargs = if obj.varargs {
            None
        } else {
            Some(obj.nargs.ok_or_else(|| BuiltinsError::MissingNargs { id: obj.id.clone() })?)
        };
        RomObjectKind::Function {
            native,
            nargs,
            magic: obj.magic,
        }
    } else if obj.class == ObjectClass::Array {
        RomObjectKind::Array
    } else if obj.class == ObjectClass::ObjEnv {
        RomObjectKind::ObjEnv {
            target: obj
                .objenv_target
                .ok_or_else(|| err("ObjEnv without objenv_target".to_string()))?,
            has_this: obj.objenv_has_this,
        }
    } else {
        RomObjectKind::Plain
    };

    let mut properties = Vec::with_capacity(obj.properties.len());
    for prop in &obj.properties {
        let key = *string_index
            .get(prop.key.as_slice())
            .ok_or_else(|| err(format!("key {} missing from ROM strings", escape_bytes(&prop.key))))?;
        if prop.attributes.configurable {
            return Err(err(format!(
                "property {} is configurable",
                bytes_to_text(&prop.key)
            )));
        }
        let value = match &prop.value {
            PropValue::Undefined => RomValue::Undefined,
            PropValue::Null => RomValue::Null,
            PropValue::Bool(b) => RomValue::Boolean(*b),
            PropValue::Number(_) | PropValue::Double(_) => {
                RomValue::Number(prop.value.double_bytes().unwrap_or_default())
            }
            PropValue::String(s) => RomValue::String(
                *string_index
                    .get(s.as_slice())
                    .ok_or_else(|| err(format!("string {} missing from ROM strings", escape_bytes(s))))?,
            ),
            PropValue::Object(target) => RomValue::Object(*target),
            PropValue::Accessor { getter, setter } => RomValue::Accessor {
                getter: *getter,
                setter: *setter,
            },
            PropValue::Lightfunc(lf) => RomValue::Lightfunc {
                native: lf.native.clone(),
                flags: lf.flags(),
            },
            PropValue::Opaque(kind) => {
                warn!(
                    "ROM init data format doesn't support \"{}\" now, value replaced with \"undefined\": {}/{}",
                    kind.name(),
                    obj.id,
                    bytes_to_text(&prop.key)
                );
                RomValue::Undefined
            }
        };
        properties.push(RomProperty {
            key,
            value,
            attributes: prop.attributes,
        });
    }

    Ok(RomObject {
        id: obj.id.clone(),
        kind,
        flags: object_flags(obj),
        internal_prototype: obj.internal_prototype,
        properties,
        bidx: obj.bidx.is_some(),
    })
}

// ============================================================================
// C emission
// ============================================================================

const STRING_MACROS: &str = r#"/* When unaligned access possible, 32-bit values are fetched using host order.
 * When unaligned access not possible, always simulate little endian order.
 */
#if defined(DUK_USE_STRHASH_DENSE)
#if defined(DUK_USE_HASHBYTES_UNALIGNED_U32_ACCESS)
#if defined(DUK_USE_INTEGER_BE)
#define DUK__STRHASH16(hash16le,hash16be,hash16sparse) (hash16be)
#define DUK__STRHASH32(hash32le,hash32be,hash32sparse) (hash32be)
#else
#define DUK__STRHASH16(hash16le,hash16be,hash16sparse) (hash16le)
#define DUK__STRHASH32(hash32le,hash32be,hash32sparse) (hash32le)
#endif
#else
#define DUK__STRHASH16(hash16le,hash16be,hash16sparse) (hash16le)
#define DUK__STRHASH32(hash32le,hash32be,hash32sparse) (hash32le)
#endif
#else  /* DUK_USE_STRHASH_DENSE */
#define DUK__STRHASH16(hash16le,hash16be,hash16sparse) (hash16sparse)
#define DUK__STRHASH32(hash32le,hash32be,hash32sparse) (hash32sparse)
#endif  /* DUK_USE_STRHASH_DENSE */
#if defined(DUK_USE_HEAPPTR16)
#if !defined(DUK_USE_REFCOUNT16)
#error currently assumes DUK_USE_HEAPPTR16 and DUK_USE_REFCOUNT16 are both defined
#endif
#if defined(DUK_USE_HSTRING_CLEN)
#define DUK__STRINIT(heaphdr_flags,refcount,hash32,hash16,blen,clen,next) \
	{ { (heaphdr_flags) | ((hash16) << 16), DUK__REFCINIT((refcount)), (blen), (duk_hstring *) DUK_LOSE_CONST((next)) }, (clen) }
#else  /* DUK_USE_HSTRING_CLEN */
#define DUK__STRINIT(heaphdr_flags,refcount,hash32,hash16,blen,clen,next) \
	{ { (heaphdr_flags) | ((hash16) << 16), DUK__REFCINIT((refcount)), (blen), (duk_hstring *) DUK_LOSE_CONST((next)) } }
#endif  /* DUK_USE_HSTRING_CLEN */
#else  /* DUK_USE_HEAPPTR16 */
#define DUK__STRINIT(heaphdr_flags,refcount,hash32,hash16,blen,clen,next) \
	{ { (heaphdr_flags), DUK__REFCINIT((refcount)), (duk_hstring *) DUK_LOSE_CONST((next)) }, (hash32), (blen), (clen) }
#endif  /* DUK_USE_HEAPPTR16 */"#;

const OBJECT_MACROS: &str = r#"typedef struct duk_romobj duk_romobj; struct duk_romobj { duk_hobject hdr; };
typedef struct duk_romarr duk_romarr; struct duk_romarr { duk_harray hdr; };
typedef struct duk_romfun duk_romfun; struct duk_romfun { duk_hnatfunc hdr; };
typedef struct duk_romobjenv duk_romobjenv; struct duk_romobjenv { duk_hobjenv hdr; };
#if defined(DUK_USE_HEAPPTR16)
#if !defined(DUK_USE_REFCOUNT16) || defined(DUK_USE_HOBJECT_HASH_PART)
#error currently assumes DUK_USE_HEAPPTR16 and DUK_USE_REFCOUNT16 are both defined and DUK_USE_HOBJECT_HASH_PART is undefined
#endif
#define DUK__ROMOBJ_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize) \
	{ { { (heaphdr_flags), DUK__REFCINIT((refcount)), 0, 0, (props_enc16) }, (iproto_enc16), (esize), (enext), (asize) } }
#define DUK__ROMARR_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize,length) \
	{ { { { (heaphdr_flags), DUK__REFCINIT((refcount)), 0, 0, (props_enc16) }, (iproto_enc16), (esize), (enext), (asize) }, (length), 0 /*length_nonwritable*/ } }
#define DUK__ROMFUN_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize,nativefunc,nargs,magic) \
	{ { { { (heaphdr_flags), DUK__REFCINIT((refcount)), 0, 0, (props_enc16) }, (iproto_enc16), (esize), (enext), (asize) }, (nativefunc), (duk_int16_t) (nargs), (duk_int16_t) (magic) } }
#define DUK__ROMOBJENV_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize,target,has_this) \
	{ { { { (heaphdr_flags), DUK__REFCINIT((refcount)), 0, 0, (props_enc16) }, (iproto_enc16), (esize), (enext), (asize) }, (duk_hobject *) DUK_LOSE_CONST(target), (has_this) } }
#else  /* DUK_USE_HEAPPTR16 */
#define DUK__ROMOBJ_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize) \
	{ { { (heaphdr_flags), DUK__REFCINIT((refcount)), NULL, NULL }, (duk_uint8_t *) DUK_LOSE_CONST(props), (duk_hobject *) DUK_LOSE_CONST(iproto), (esize), (enext), (asize), (hsize) } }
#define DUK__ROMARR_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize,length) \
	{ { { { (heaphdr_flags), DUK__REFCINIT((refcount)), NULL, NULL }, (duk_uint8_t *) DUK_LOSE_CONST(props), (duk_hobject *) DUK_LOSE_CONST(iproto), (esize), (enext), (asize), (hsize) }, (length), 0 /*length_nonwritable*/ } }
#define DUK__ROMFUN_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize,nativefunc,nargs,magic) \
	{ { { { (heaphdr_flags), DUK__REFCINIT((refcount)), NULL, NULL }, (duk_uint8_t *) DUK_LOSE_CONST(props), (duk_hobject *) DUK_LOSE_CONST(iproto), (esize), (enext), (asize), (hsize) }, (nativefunc), (duk_int16_t) (nargs), (duk_int16_t) (magic) } }
#define DUK__ROMOBJENV_INIT(heaphdr_flags,refcount,props,props_enc16,iproto,iproto_enc16,esize,enext,asize,hsize,target,has_this) \
	{ { { { (heaphdr_flags), DUK__REFCINIT((refcount)), NULL, NULL }, (duk_uint8_t *) DUK_LOSE_CONST(props), (duk_hobject *) DUK_LOSE_CONST(iproto), (esize), (enext), (asize), (hsize) }, (duk_hobject *) DUK_LOSE_CONST(target), (has_this) } }
#endif  /* DUK_USE_HEAPPTR16 */
typedef void (*duk_rom_funcptr)(void);"#;

const TVAL_STRUCTS: &str = r#"#if defined(DUK_USE_PACKED_TVAL)
typedef struct duk_rom_tval_undefined duk_rom_tval_undefined;
typedef struct duk_rom_tval_null duk_rom_tval_null;
typedef struct duk_rom_tval_lightfunc duk_rom_tval_lightfunc;
typedef struct duk_rom_tval_boolean duk_rom_tval_boolean;
typedef struct duk_rom_tval_number duk_rom_tval_number;
typedef struct duk_rom_tval_object duk_rom_tval_object;
typedef struct duk_rom_tval_string duk_rom_tval_string;
typedef struct duk_rom_tval_accessor duk_rom_tval_accessor;
struct duk_rom_tval_number { duk_uint8_t bytes[8]; };
struct duk_rom_tval_accessor { const duk_hobject *get; const duk_hobject *set; };
#if defined(DUK_USE_DOUBLE_LE)
struct duk_rom_tval_object { const void *ptr; duk_uint32_t hiword; };
struct duk_rom_tval_string { const void *ptr; duk_uint32_t hiword; };
struct duk_rom_tval_undefined { const void *ptr; duk_uint32_t hiword; };
struct duk_rom_tval_null { const void *ptr; duk_uint32_t hiword; };
struct duk_rom_tval_lightfunc { duk_rom_funcptr ptr; duk_uint32_t hiword; };
struct duk_rom_tval_boolean { duk_uint32_t dummy; duk_uint32_t hiword; };
#elif defined(DUK_USE_DOUBLE_BE) || defined(DUK_USE_DOUBLE_ME)
struct duk_rom_tval_object { duk_uint32_t hiword; const void *ptr; };
struct duk_rom_tval_string { duk_uint32_t hiword; const void *ptr; };
struct duk_rom_tval_undefined { duk_uint32_t hiword; const void *ptr; };
struct duk_rom_tval_null { duk_uint32_t hiword; const void *ptr; };
struct duk_rom_tval_lightfunc { duk_uint32_t hiword; duk_rom_funcptr ptr; };
struct duk_rom_tval_boolean { duk_uint32_t hiword; duk_uint32_t dummy; };
#else
#error invalid endianness defines
#endif
#else  /* DUK_USE_PACKED_TVAL */
#if defined(DUK_UINTPTR_MAX)
#if (DUK_UINTPTR_MAX <= 0xffffffffUL)
#error ROM initializer with unpacked duk_tval does not currently work on 32-bit targets
#endif
#endif
typedef struct duk_rom_tval_undefined duk_rom_tval_undefined;
struct duk_rom_tval_undefined { duk_small_uint_t tag; duk_small_uint_t extra; duk_uint8_t bytes[8]; };
typedef struct duk_rom_tval_null duk_rom_tval_null;
struct duk_rom_tval_null { duk_small_uint_t tag; duk_small_uint_t extra; duk_uint8_t bytes[8]; };
typedef struct duk_rom_tval_boolean duk_rom_tval_boolean;
struct duk_rom_tval_boolean { duk_small_uint_t tag; duk_small_uint_t extra; duk_uint32_t val; duk_uint32_t unused; };
typedef struct duk_rom_tval_number duk_rom_tval_number;
struct duk_rom_tval_number { duk_small_uint_t tag; duk_small_uint_t extra; duk_uint8_t bytes[8]; };
typedef struct duk_rom_tval_object duk_rom_tval_object;
struct duk_rom_tval_object { duk_small_uint_t tag; duk_small_uint_t extra; const duk_heaphdr *val; };
typedef struct duk_rom_tval_string duk_rom_tval_string;
struct duk_rom_tval_string { duk_small_uint_t tag; duk_small_uint_t extra; const duk_heaphdr *val; };
typedef struct duk_rom_tval_lightfunc duk_rom_tval_lightfunc;
struct duk_rom_tval_lightfunc { duk_small_uint_t tag; duk_small_uint_t extra; duk_rom_funcptr ptr; };
typedef struct duk_rom_tval_accessor duk_rom_tval_accessor;
struct duk_rom_tval_accessor { const duk_hobject *get; const duk_hobject *set; };
#endif  /* DUK_USE_PACKED_TVAL */

#if defined(DUK_USE_DOUBLE_LE)
#define DUK__DBLBYTES(a,b,c,d,e,f,g,h) { (h), (g), (f), (e), (d), (c), (b), (a) }
#elif defined(DUK_USE_DOUBLE_BE)
#define DUK__DBLBYTES(a,b,c,d,e,f,g,h) { (a), (b), (c), (d), (e), (f), (g), (h) }
#elif defined(DUK_USE_DOUBLE_ME)
#define DUK__DBLBYTES(a,b,c,d,e,f,g,h) { (d), (c), (b), (a), (h), (g), (f), (e) }
#else
#error invalid endianness defines
#endif

#if defined(DUK_USE_PACKED_TVAL)
#define DUK__TVAL_NUMBER(hostbytes) { hostbytes }
#if defined(DUK_USE_DOUBLE_LE)
#define DUK__TVAL_UNDEFINED() { (const void *) NULL, (DUK_TAG_UNDEFINED << 16) }
#define DUK__TVAL_NULL() { (const void *) NULL, (DUK_TAG_NULL << 16) }
#define DUK__TVAL_LIGHTFUNC(func,flags) { (duk_rom_funcptr) (func), (DUK_TAG_LIGHTFUNC << 16) + (flags) }
#define DUK__TVAL_BOOLEAN(bval) { 0, (DUK_TAG_BOOLEAN << 16) + (bval) }
#define DUK__TVAL_OBJECT(ptr) { (const void *) (ptr), (DUK_TAG_OBJECT << 16) }
#define DUK__TVAL_STRING(ptr) { (const void *) (ptr), (DUK_TAG_STRING << 16) }
#elif defined(DUK_USE_DOUBLE_BE) || defined(DUK_USE_DOUBLE_ME)
#define DUK__TVAL_UNDEFINED() { (DUK_TAG_UNDEFINED << 16), (const void *) NULL }
#define DUK__TVAL_NULL() { (DUK_TAG_NULL << 16), (const void *) NULL }
#define DUK__TVAL_LIGHTFUNC(func,flags) { (DUK_TAG_LIGHTFUNC << 16) + (flags), (duk_rom_funcptr) (func) }
#define DUK__TVAL_BOOLEAN(bval) { (DUK_TAG_BOOLEAN << 16) + (bval), 0 }
#define DUK__TVAL_OBJECT(ptr) { (DUK_TAG_OBJECT << 16), (const void *) (ptr) }
#define DUK__TVAL_STRING(ptr) { (DUK_TAG_STRING << 16), (const void *) (ptr) }
#else
#error invalid endianness defines
#endif
#else  /* DUK_USE_PACKED_TVAL */
#define DUK__TVAL_NUMBER(hostbytes) { DUK_TAG_NUMBER, 0, hostbytes }
#define DUK__TVAL_UNDEFINED() { DUK_TAG_UNDEFINED, 0, {0,0,0,0,0,0,0,0} }
#define DUK__TVAL_NULL() { DUK_TAG_NULL, 0, {0,0,0,0,0,0,0,0} }
#define DUK__TVAL_BOOLEAN(bval) { DUK_TAG_BOOLEAN, 0, (bval), 0 }
#define DUK__TVAL_OBJECT(ptr) { DUK_TAG_OBJECT, 0, (const duk_heaphdr *) (ptr) }
#define DUK__TVAL_STRING(ptr) { DUK_TAG_STRING, 0, (const duk_heaphdr *) (ptr) }
#define DUK__TVAL_LIGHTFUNC(func,flags) { DUK_TAG_LIGHTFUNC, (flags), (duk_rom_funcptr) (func) }
#endif  /* DUK_USE_PACKED_TVAL */
#define DUK__TVAL_ACCESSOR(getter,setter) { (const duk_hobject *) (getter), (const duk_hobject *) (setter) }"#;

const UNDEF_HELPERS: [&str; 12] = [
    "DUK__STRHASH16",
    "DUK__STRHASH32",
    "DUK__DBLBYTES",
    "DUK__TVAL_NUMBER",
    "DUK__TVAL_UNDEFINED",
    "DUK__TVAL_NULL",
    "DUK__TVAL_BOOLEAN",
    "DUK__TVAL_OBJECT",
    "DUK__TVAL_STRING",
    "DUK__STRINIT",
    "DUK__ROMOBJ_INIT",
    "DUK__ROMFUN_INIT",
];

/// Memory layouts of an object property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropLayout {
    /// keys, values, flags
    KeysFirst,
    /// values, keys, flags
    ValuesFirst,
}

const LAYOUTS: [(&str, PropLayout); 3] = [
    ("DUK_USE_HOBJECT_LAYOUT_1", PropLayout::KeysFirst),
    ("DUK_USE_HOBJECT_LAYOUT_2", PropLayout::ValuesFirst),
    // Same as layout 2 without array or hash parts
    ("DUK_USE_HOBJECT_LAYOUT_3", PropLayout::ValuesFirst),
];

impl RomImage {
    /// String typedefs, record initializers and lookup tables.
    pub fn emit_strings_source(&self, w: &mut CWriter) {
        let mut lens: Vec<usize> = self.strings.iter().map(|s| s.bytes.len()).collect();
        lens.sort_unstable();
        lens.dedup();
        for len in lens {
            w.line(format!(
                "typedef struct duk_romstr_{len} duk_romstr_{len}; struct duk_romstr_{len} {{ duk_hstring hdr; duk_uint8_t data[{}]; }};",
                len + 1
            ));
        }
        w.line("");
        w.block(STRING_MACROS);

        // Reverse bucket order so every next link refers to an earlier record
        w.line("");
        for bucket in &self.lookup {
            for &i in bucket.iter().rev() {
                w.line(self.string_initializer(i));
            }
        }

        w.line("");
        w.line(format!(
            "DUK_INTERNAL const duk_hstring * const duk_rom_strings_lookup[{}] = {{",
            self.lookup.len()
        ));
        for bucket in &self.lookup {
            match bucket.first() {
                Some(&i) => w.line(format!("\t(const duk_hstring *) &{},", RomString::symbol(i))),
                None => w.line("\tNULL,"),
            }
        }
        w.line("};");

        w.line("");
        w.line(format!(
            "DUK_INTERNAL const duk_hstring * const duk_rom_strings_stridx[{}] = {{",
            self.stridx.len()
        ));
        for &i in &self.stridx {
            w.line(format!("\t(const duk_hstring *) &{},", RomString::symbol(i)));
        }
        w.line("};");
    }

    fn string_initializer(&self, i: usize) -> String {
        let s = &self.strings[i];
        let h16 = s.hashes.low16();
        let next = s
            .next
            .map_or_else(|| "NULL".to_string(), |n| format!("&{}", RomString::symbol(n)));
        let mut data: Vec<String> = s.bytes.iter().map(|&b| byte_literal(b)).collect();
        data.push("0".to_string());
        format!(
            "DUK_INTERNAL const duk_romstr_{} {} = {{DUK__STRINIT({},1,DUK__STRHASH32({}UL,{}UL,{}UL),DUK__STRHASH16({}U,{}U,{}U),{},{},{}),{{{}}}}};",
            s.bytes.len(),
            RomString::symbol(i),
            s.flags.join("|"),
            s.hashes.dense_le,
            s.hashes.dense_be,
            s.hashes.sparse,
            h16.dense_le,
            h16.dense_be,
            h16.sparse,
            s.bytes.len(),
            s.char_len,
            next,
            data.join(",")
        )
    }

    pub fn emit_strings_header(&self, w: &mut CWriter) {
        w.line("#if !defined(DUK_SINGLE_FILE)");
        w.line(format!(
            "DUK_INTERNAL_DECL const duk_hstring * const duk_rom_strings_lookup[{}];",
            ROMSTR_LOOKUP_SIZE
        ));
        w.line(format!(
            "DUK_INTERNAL_DECL const duk_hstring * const duk_rom_strings_stridx[{}];",
            self.stridx.len()
        ));
        w.line("#endif");
    }

    /// Object typedefs and macros, property tables, object initializers,
    /// the bidx table and the compressed pointer table.
    pub fn emit_objects_source(&self, w: &mut CWriter) -> BuiltinsResult<()> {
        w.block(OBJECT_MACROS);
        w.block(TVAL_STRUCTS);

        // Property table structs, one per object and layout
        for (n, (define, layout)) in LAYOUTS.iter().enumerate() {
            let directive = if n == 0 { "#if" } else { "#elif" };
            w.line(format!("{} defined({})", directive, define));
            for (i, obj) in self.objects.iter().enumerate() {
                if let Some(decl) = props_struct(i, obj, *layout) {
                    w.line(decl);
                }
            }
        }
        w.line("#else");
        w.line("#error invalid object layout");
        w.line("#endif");
        w.line("");

        // Forward declarations; external linkage since static const can't
        // be forward declared in C++ and the tables are cyclic
        for (i, obj) in self.objects.iter().enumerate() {
            if !obj.properties.is_empty() {
                w.line(format!(
                    "DUK_EXTERNAL_DECL const duk_romprops_{} {};",
                    i,
                    RomObject::props_symbol(i)
                ));
            }
        }
        w.line("");
        for (i, obj) in self.objects.iter().enumerate() {
            w.line(format!(
                "DUK_EXTERNAL_DECL const {} {};",
                obj.kind.struct_name(),
                RomObject::symbol(i)
            ));
        }
        w.line("");

        for (i, obj) in self.objects.iter().enumerate() {
            w.line(self.object_initializer(i, obj));
        }

        for (n, (define, layout)) in LAYOUTS.iter().enumerate() {
            let directive = if n == 0 { "#if" } else { "#elif" };
            w.line(format!("{} defined({})", directive, define));
            for (i, obj) in self.objects.iter().enumerate() {
                if let Some(init) = props_initializer(i, obj, *layout)? {
                    w.line(init);
                }
            }
        }
        w.line("#else");
        w.line("#error invalid object layout");
        w.line("#endif");
        w.line("");

        let bidx: Vec<usize> = self.bidx_objects().map(|(i, _)| i).collect();
        w.line(format!(
            "DUK_INTERNAL const duk_hobject * const duk_rom_builtins_bidx[{}] = {{",
            bidx.len()
        ));
        for i in bidx {
            w.line(format!("\t(const duk_hobject *) &{},", RomObject::symbol(i)));
        }
        w.line("};");

        w.line("");
        w.line("#if defined(DUK_USE_ROM_OBJECTS) && defined(DUK_USE_HEAPPTR16)");
        w.line(format!(
            "DUK_EXTERNAL const void * const duk_rom_compressed_pointers[{}] = {{",
            self.pointers.len() + 1
        ));
        for (n, ptr) in self.pointers.iter().enumerate() {
            w.line(format!(
                "\t(const void *) {},  /* 0x{:04x} */",
                ptr.c_expr(),
                ROMPTR_FIRST + n as u32
            ));
        }
        w.line("\tNULL");
        w.line("};");
        w.line("#endif");

        w.line("");
        for name in UNDEF_HELPERS {
            w.line(format!("#undef {}", name));
        }
        Ok(())
    }

    fn object_initializer(&self, i: usize, obj: &RomObject) -> String {
        let has_props = !obj.properties.is_empty();
        let props = if has_props {
            format!("&{}", RomObject::props_symbol(i))
        } else {
            "NULL".to_string()
        };
        let props_enc16 = self.compress(has_props.then_some(RomPointer::Props(i)));
        let iproto = obj
            .internal_prototype
            .map_or_else(|| "NULL".to_string(), |p| format!("&{}", RomObject::symbol(p)));
        let iproto_enc16 = self.compress(obj.internal_prototype.map(RomPointer::Object));
        let e_size = obj.properties.len();

        // refcount is always 1; no array or hash part
        let common = format!(
            "{},1,{},{},{},{},{},{},0,0",
            obj.flags.join("|"),
            props,
            props_enc16,
            iproto,
            iproto_enc16,
            e_size,
            e_size
        );
        let init = match &obj.kind {
            RomObjectKind::Function { native, nargs, magic } => {
                let nargs = nargs.map_or_else(|| "DUK_VARARGS".to_string(), |n| n.to_string());
                format!("DUK__ROMFUN_INIT({},{},{},{})", common, native, nargs, magic)
            }
            RomObjectKind::Array => format!("DUK__ROMARR_INIT({},0)", common),
            RomObjectKind::ObjEnv { target, has_this } => format!(
                "DUK__ROMOBJENV_INIT({},&{},{})",
                common,
                RomObject::symbol(*target),
                u8::from(*has_this)
            ),
            RomObjectKind::Plain => format!("DUK__ROMOBJ_INIT({})", common),
        };
        format!(
            "DUK_EXTERNAL const {} {} = {};",
            obj.kind.struct_name(),
            RomObject::symbol(i),
            init
        )
    }

    /// Stridx defines are shared with RAM; this adds the ROM object
    /// defines and declarations.
    pub fn emit_objects_header(&self, w: &mut CWriter, prefix: &str) {
        let mut count = 0;
        for (_, obj) in self.bidx_objects() {
            w.define(&format!("{}_{}", prefix, bidx_define_suffix(&obj.id)), count);
            count += 1;
        }
        w.define(&format!("{}_NUM_BUILTINS", prefix), count);
        w.define(&format!("{}_NUM_BIDX_BUILTINS", prefix), count);
        w.define(&format!("{}_NUM_ALL_BUILTINS", prefix), self.objects.len());
        w.line("");
        w.line("#if !defined(DUK_SINGLE_FILE)");
        w.line(format!(
            "DUK_INTERNAL_DECL const duk_hobject * const duk_rom_builtins_bidx[{}];",
            count
        ));
        w.line("#endif");
    }
}

fn props_struct(i: usize, obj: &RomObject, layout: PropLayout) -> Option<String> {
    if obj.properties.is_empty() {
        return None;
    }
    let keys: Vec<String> = (0..obj.properties.len())
        .map(|n| format!("const duk_hstring *key{}; ", n))
        .collect();
    let vals: Vec<String> = obj
        .properties
        .iter()
        .enumerate()
        .map(|(n, p)| format!("{} val{}; ", p.value.type_name(), n))
        .collect();
    let flags: Vec<String> = (0..obj.properties.len())
        .map(|n| format!("duk_uint8_t flags{}; ", n))
        .collect();
    let fields = match layout {
        PropLayout::KeysFirst => [keys, vals, flags].concat(),
        PropLayout::ValuesFirst => [vals, keys, flags].concat(),
    };
    Some(format!(
        "typedef struct duk_romprops_{i} duk_romprops_{i}; struct duk_romprops_{i} {{ {}}};",
        fields.concat()
    ))
}

fn props_initializer(i: usize, obj: &RomObject, layout: PropLayout) -> BuiltinsResult<Option<String>> {
    if obj.properties.is_empty() {
        return Ok(None);
    }
    let keys: Vec<String> = obj
        .properties
        .iter()
        .map(|p| format!("(const duk_hstring *)&{}", RomString::symbol(p.key)))
        .collect();
    let vals: Vec<String> = obj.properties.iter().map(|p| p.value.literal()).collect();
    let flags = obj
        .properties
        .iter()
        .map(|p| {
            attributes_initializer(p.attributes).ok_or_else(|| BuiltinsError::Encoding {
                object: obj.id.clone(),
                message: format!("unsupported ROM attributes {:?}", p.attributes.to_string()),
            })
        })
        .collect::<BuiltinsResult<Vec<_>>>()?;
    let init = match layout {
        PropLayout::KeysFirst => [keys, vals, flags].concat(),
        PropLayout::ValuesFirst => [vals, keys, flags].concat(),
    };
    Ok(Some(format!(
        "DUK_EXTERNAL const duk_romprops_{} {} = {{{}}};",
        i,
        RomObject::props_symbol(i),
        init.join(",")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActiveConfig, BuildMode, CompileOptions, CompilerContext, UsedDefines};
    use crate::metadata::model::{Lightfunc, Metadata, ObjectEntry, PropertyEntry};
    use crate::strings::StringTable;

    fn rom_ctx() -> CompilerContext {
        CompilerContext::new(BuildMode::Rom, &CompileOptions::default(), &ActiveConfig::default(), &UsedDefines::default())
    }

    fn sample() -> Builtins {
        let mut global = ObjectEntry::new("bi_global", ObjectClass::Global);
        global.bidx = true;
        global.internal_prototype = Some("bi_object_prototype".to_string());
        global.properties.push(PropertyEntry::new(b"NaN", PropValue::Number(f64::NAN), Attributes::NONE));
        global.properties.push(PropertyEntry::new(
            b"name",
            PropValue::String(b"eval".to_vec()),
            Attributes::parse("w").unwrap(),
        ));
        global.properties.push(PropertyEntry::new(
            b"abs",
            PropValue::Lightfunc(Lightfunc {
                native: "duk_bi_math_object_onearg_shared".to_string(),
                length: 1,
                nargs: Some(1),
                magic: 0,
            }),
            Attributes::parse("w").unwrap(),
        ));
        let mut proto = ObjectEntry::new("bi_object_prototype", ObjectClass::Object);
        proto.bidx = true;
        let mut arr = ObjectEntry::new("bi_array_prototype", ObjectClass::Array);
        arr.bidx = true;
        let md = Metadata {
            objects: vec![global, proto, arr],
            ..Default::default()
        };
        Builtins::freeze(&md, StringTable::default(), &rom_ctx()).unwrap()
    }

    #[test]
    fn test_lookup_bucket() {
        assert_eq!(lookup_bucket(b""), 0);
        assert_eq!(lookup_bucket(b"a"), (0x61 + 16) & 0xff);
        assert_eq!(lookup_bucket(b"length"), (b'l' as usize + (6 << 4)) & 0xff);
    }

    #[test]
    fn test_string_flags() {
        let flags = string_flags(b"123", 3, false, false);
        assert!(flags.contains(&"DUK_HSTRING_FLAG_ASCII"));
        assert!(flags.contains(&"DUK_HSTRING_FLAG_ARRIDX"));
        let flags = string_flags(b"\x82Target", 6, false, false);
        assert!(flags.contains(&"DUK_HSTRING_FLAG_SYMBOL"));
        assert!(flags.contains(&"DUK_HSTRING_FLAG_HIDDEN"));
        assert!(!flags.contains(&"DUK_HSTRING_FLAG_ASCII"));
        let flags = string_flags(b"arguments", 9, false, true);
        assert!(flags.contains(&"DUK_HSTRING_FLAG_EVAL_OR_ARGUMENTS"));
        assert!(flags.contains(&"DUK_HSTRING_FLAG_STRICT_RESERVED_WORD"));
    }

    #[test]
    fn test_attributes_initializer() {
        assert_eq!(attributes_initializer(Attributes::NONE).unwrap(), "DUK_PROPDESC_FLAGS_NONE");
        assert_eq!(
            attributes_initializer(Attributes::parse("we").unwrap()).unwrap(),
            "DUK_PROPDESC_FLAGS_WE"
        );
        assert_eq!(
            attributes_initializer(Attributes::parse("ea").unwrap()).unwrap(),
            "DUK_PROPDESC_FLAGS_E|DUK_PROPDESC_FLAG_ACCESSOR"
        );
        assert_eq!(
            attributes_initializer(Attributes::parse("a").unwrap()).unwrap(),
            "DUK_PROPDESC_FLAGS_NONE|DUK_PROPDESC_FLAG_ACCESSOR"
        );
        assert!(attributes_initializer(Attributes::DATA_DEFAULT).is_none());
    }

    #[test]
    fn test_image_layout() {
        let image = RomImage::build(&sample()).unwrap();
        // NaN, name, eval, abs
        assert_eq!(image.strings.len(), 4);
        assert_eq!(image.objects[2].kind, RomObjectKind::Array);
        assert_eq!(image.bidx_objects().count(), 3);

        // strings by content, objects by id, then the one property table
        assert_eq!(image.pointers.len(), 4 + 3 + 1);
        assert_eq!(image.pointers[0], RomPointer::String(0)); // "NaN"
        assert_eq!(image.pointers[4], RomPointer::Object(2)); // bi_array_prototype
        assert_eq!(image.pointers[7], RomPointer::Props(0));
        assert_eq!(image.compress(None), 0);
        assert_eq!(image.compress(Some(RomPointer::Props(0))), ROMPTR_FIRST + 7);
    }

    #[test]
    fn test_lookup_chains_link_same_bucket() {
        let mut obj = ObjectEntry::new("bi_x", ObjectClass::Object);
        obj.bidx = true;
        // same first byte and length
        obj.properties.push(PropertyEntry::new(b"ab", PropValue::Null, Attributes::NONE));
        obj.properties.push(PropertyEntry::new(b"ac", PropValue::Null, Attributes::NONE));
        let md = Metadata {
            objects: vec![obj],
            ..Default::default()
        };
        let b = Builtins::freeze(&md, StringTable::default(), &rom_ctx()).unwrap();
        let image = RomImage::build(&b).unwrap();
        assert_eq!(image.strings[0].next, Some(1));
        assert_eq!(image.strings[1].next, None);
        assert_eq!(image.lookup[lookup_bucket(b"ab")], vec![0, 1]);
    }

    #[test]
    fn test_emitted_source() {
        let image = RomImage::build(&sample()).unwrap();
        let mut w = CWriter::new();
        image.emit_strings_source(&mut w);
        image.emit_objects_source(&mut w).unwrap();
        let text = w.into_string();

        assert!(text.contains("typedef struct duk_romstr_3 duk_romstr_3;"));
        assert!(text.contains("DUK_HSTRING_FLAG_EVAL_OR_ARGUMENTS"));
        assert!(text.contains(
            "DUK_EXTERNAL const duk_romarr duk_obj_2 = DUK__ROMARR_INIT("
        ));
        assert!(text.contains("DUK__TVAL_LIGHTFUNC(duk_bi_math_object_onearg_shared, 17L)"));
        assert!(text.contains("DUK_INTERNAL const duk_hobject * const duk_rom_builtins_bidx[3] = {"));
        assert!(text.contains("DUK_EXTERNAL const void * const duk_rom_compressed_pointers[9] = {"));
        assert!(text.contains("#undef DUK__ROMFUN_INIT"));
        // NaN is stored as raw IEEE bytes
        assert!(text.contains("DUK__TVAL_NUMBER(DUK__DBLBYTES(127,248U,0,0,0,0,0,0))"));
    }

    #[test]
    fn test_objects_header() {
        let image = RomImage::build(&sample()).unwrap();
        let mut w = CWriter::new();
        image.emit_objects_header(&mut w, "DUK");
        let text = w.into_string();
        assert!(text.contains("#define DUK_BIDX_GLOBAL 0\n"));
        assert!(text.contains("#define DUK_BIDX_ARRAY_PROTOTYPE 2\n"));
        assert!(text.contains("#define DUK_NUM_ALL_BUILTINS 3\n"));
    }

    #[test]
    fn test_pointer_overflow() {
        let mut obj = ObjectEntry::new("bi_x", ObjectClass::Object);
        obj.bidx = true;
        for n in 0..0x800 {
            obj.properties.push(PropertyEntry::new(
                format!("k{}", n).as_bytes(),
                PropValue::Null,
                Attributes::NONE,
            ));
        }
        let md = Metadata {
            objects: vec![obj],
            ..Default::default()
        };
        let b = Builtins::freeze(&md, StringTable::default(), &rom_ctx()).unwrap();
        assert!(matches!(
            RomImage::build(&b),
            Err(BuiltinsError::PointerOverflow { .. })
        ));
    }
}
