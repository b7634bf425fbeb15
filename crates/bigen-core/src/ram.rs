//! RAM init data: bit-packed string and object streams
//!
//! The runtime decodes these streams once while creating a heap and a
//! thread. Layout of the object stream:
//!
//! 1. For every top level object: class, `length` and, for functions,
//!    native index, nargs, name, constructability and magic.
//! 2. For every top level object: internal prototype, `prototype`,
//!    `constructor`, then the remaining properties split into plain values
//!    and native function properties.
//!
//! Doubles are stored in target byte order, so the object stream exists in
//! three variants.

use crate::bitpack::{pack_string, BitEncoder, StringStats};
use crate::builtins::{Builtin, BuiltinProperty, Builtins, ObjIdx};
use crate::error::{BuiltinsError, BuiltinsResult};
use crate::metadata::model::{Attributes, Bytes, ObjectClass, PropValue};
use crate::text::bytes_to_text;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

// ===== Bit field sizes, must match the runtime decoder =====

pub const PROP_FLAGS_BITS: u32 = 3;
pub const LENGTH_PROP_BITS: u32 = 3;
pub const NARGS_BITS: u32 = 3;
pub const PROP_TYPE_BITS: u32 = 3;
pub const NARGS_VARARGS_MARKER: u32 = 0x07;

// ===== Property value types =====

pub const PROP_TYPE_DOUBLE: u32 = 0;
pub const PROP_TYPE_STRING: u32 = 1;
pub const PROP_TYPE_STRIDX: u32 = 2;
pub const PROP_TYPE_BUILTIN: u32 = 3;
pub const PROP_TYPE_UNDEFINED: u32 = 4;
pub const PROP_TYPE_BOOLEAN_TRUE: u32 = 5;
pub const PROP_TYPE_BOOLEAN_FALSE: u32 = 6;
pub const PROP_TYPE_ACCESSOR: u32 = 7;

const LENGTH_PROPERTY_ATTRIBUTES: Attributes = Attributes::CONFIGURABLE;
const DEFAULT_PROPERTY_ATTRIBUTES: Attributes = Attributes::DATA_DEFAULT;

/// IEEE double byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleByteOrder {
    Little,
    Big,
    /// Little endian words in big endian order, found on some ARM targets
    Mixed,
}

impl DoubleByteOrder {
    pub const ALL: [DoubleByteOrder; 3] = [
        DoubleByteOrder::Little,
        DoubleByteOrder::Big,
        DoubleByteOrder::Mixed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DoubleByteOrder::Little => "little",
            DoubleByteOrder::Big => "big",
            DoubleByteOrder::Mixed => "mixed",
        }
    }

    /// Config option selecting this layout, without the prefix.
    pub fn config_option(self) -> &'static str {
        match self {
            DoubleByteOrder::Little => "USE_DOUBLE_LE",
            DoubleByteOrder::Big => "USE_DOUBLE_BE",
            DoubleByteOrder::Mixed => "USE_DOUBLE_ME",
        }
    }

    /// Reorder big endian IEEE bytes into this layout.
    pub fn permute(self, be: [u8; 8]) -> [u8; 8] {
        let order: [usize; 8] = match self {
            DoubleByteOrder::Big => [0, 1, 2, 3, 4, 5, 6, 7],
            DoubleByteOrder::Little => [7, 6, 5, 4, 3, 2, 1, 0],
            DoubleByteOrder::Mixed => [3, 2, 1, 0, 7, 6, 5, 4],
        };
        order.map(|i| be[i])
    }
}

/// Everything the RAM variant of the generated sources needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RamInitData {
    pub strings_data: Vec<u8>,
    pub max_strlen: usize,
    /// Index 0 is NULL
    pub native_functions: Vec<Option<String>>,
    pub objects_little: Vec<u8>,
    pub objects_big: Vec<u8>,
    pub objects_mixed: Vec<u8>,
}

impl RamInitData {
    pub fn objects(&self, order: DoubleByteOrder) -> &[u8] {
        match order {
            DoubleByteOrder::Little => &self.objects_little,
            DoubleByteOrder::Big => &self.objects_big,
            DoubleByteOrder::Mixed => &self.objects_mixed,
        }
    }
}

/// Encode RAM init data for frozen builtins.
pub fn encode_ram(builtins: &Builtins) -> BuiltinsResult<RamInitData> {
    let (strings_data, max_strlen) = encode_strings(builtins)?;
    let native_functions = builtins.native_functions();
    let natidx: FxHashMap<String, usize> = native_functions
        .iter()
        .enumerate()
        .filter_map(|(i, n)| n.as_ref().map(|n| (n.clone(), i)))
        .collect();

    let mut streams = Vec::with_capacity(3);
    for order in DoubleByteOrder::ALL {
        let encoder = ObjectEncoder::new(builtins, &natidx, order);
        streams.push(encoder.encode()?);
    }
    let [objects_little, objects_big, objects_mixed]: [Vec<u8>; 3] = streams
        .try_into()
        .map_err(|_| BuiltinsError::Encoding {
            object: String::new(),
            message: "missing byte order variant".to_string(),
        })?;

    Ok(RamInitData {
        strings_data,
        max_strlen,
        native_functions,
        objects_little,
        objects_big,
        objects_mixed,
    })
}

/// Bit-pack the stridx strings in order. Returns the data and the longest
/// string length.
pub fn encode_strings(builtins: &Builtins) -> BuiltinsResult<(Vec<u8>, usize)> {
    let mut enc = BitEncoder::new();
    let mut stats = StringStats::default();
    let mut max_len = 0;
    for s in &builtins.strings.stridx {
        max_len = max_len.max(s.bytes().len());
        pack_string(&mut enc, s.bytes(), &mut stats)?;
    }
    let data = enc.into_bytes();
    info!(
        "{} ram strings, {} bytes of string init data, {} maximum string length",
        builtins.strings.stridx.len(),
        data.len(),
        max_len
    );
    debug!(
        "String encoding: optimal={}, lookup1={}, lookup2={}, switch1={}, switch={}, eightbit={}",
        stats.optimal, stats.lookup1, stats.lookup2, stats.switch1, stats.switch, stats.eightbit
    );
    Ok((data, max_len))
}

fn steal<'p>(
    props: &mut Vec<&'p BuiltinProperty>,
    key: &[u8],
    allow_accessor: bool,
) -> Option<&'p BuiltinProperty> {
    let idx = props
        .iter()
        .position(|p| p.key == key && (allow_accessor || !p.value.is_accessor()))?;
    Some(props.remove(idx))
}

struct ObjectEncoder<'a> {
    builtins: &'a Builtins,
    stridx: FxHashMap<Bytes, usize>,
    natidx: &'a FxHashMap<String, usize>,
    order: DoubleByteOrder,
    enc: BitEncoder,
    stats: StringStats,
}

impl<'a> ObjectEncoder<'a> {
    fn new(builtins: &'a Builtins, natidx: &'a FxHashMap<String, usize>, order: DoubleByteOrder) -> Self {
        Self {
            builtins,
            stridx: builtins.strings.stridx_map(),
            natidx,
            order,
            enc: BitEncoder::new(),
            stats: StringStats::default(),
        }
    }

    fn encode(mut self) -> BuiltinsResult<Vec<u8>> {
        let builtins = self.builtins;
        for &idx in &builtins.ram_toplevel {
            self.object_header(&builtins.objects[idx])?;
        }
        let mut normal = 0;
        let mut functions = 0;
        for &idx in &builtins.ram_toplevel {
            let (n, f) = self.object_properties(&builtins.objects[idx])?;
            normal += n;
            functions += f;
        }

        if let Some(efficiency) = self.enc.varuint_efficiency() {
            debug!("Varuint efficiency: {:.3} bits/value", efficiency);
        }
        let data = self.enc.into_bytes();
        info!(
            "{} ram builtins, {} normal properties, {} function properties, {} bytes of object init data ({} doubles)",
            builtins.ram_toplevel.len(),
            normal,
            functions,
            data.len(),
            self.order.name()
        );
        Ok(data)
    }

    fn error(obj: &Builtin, message: impl Into<String>) -> BuiltinsError {
        BuiltinsError::Encoding {
            object: obj.id.clone(),
            message: message.into(),
        }
    }

    fn stridx_or_string(&mut self, s: &[u8]) -> BuiltinsResult<()> {
        match self.stridx.get(s) {
            Some(&idx) => self.enc.varuint(idx as u32 + 1),
            None => {
                self.enc.varuint(0)?;
                pack_string(&mut self.enc, s, &mut self.stats)
            }
        }
    }

    fn natidx(&mut self, obj: &Builtin, native: Option<&str>) -> BuiltinsResult<()> {
        let idx = match native {
            None => 0,
            Some(name) => *self
                .natidx
                .get(name)
                .ok_or_else(|| Self::error(obj, format!("native function {} not in table", name)))?,
        };
        self.enc.varuint(idx as u32)
    }

    fn ramidx_or_none(&mut self, target: Option<ObjIdx>) -> BuiltinsResult<()> {
        match target {
            Some(idx) => {
                let ramidx = self.builtins.ramidx(idx)?;
                self.enc.varuint(ramidx as u32 + 1)
            }
            None => self.enc.varuint(0),
        }
    }

    fn attributes(&mut self, attrs: Attributes) -> BuiltinsResult<()> {
        let attrs = attrs.without_accessor();
        if attrs != DEFAULT_PROPERTY_ATTRIBUTES {
            self.enc.flag(true);
            self.enc.bits(u32::from(attrs.flags()), PROP_FLAGS_BITS)
        } else {
            self.enc.flag(false);
            Ok(())
        }
    }

    fn nargs(&mut self, func: &Builtin, length: i64) -> BuiltinsResult<()> {
        if func.varargs {
            self.enc.flag(true);
            self.enc.bits(NARGS_VARARGS_MARKER, NARGS_BITS)
        } else {
            match func.nargs {
                Some(nargs) if nargs != length => {
                    self.enc.flag(true);
                    self.enc.bits_i64(nargs, NARGS_BITS)
                }
                _ => {
                    self.enc.flag(false);
                    Ok(())
                }
            }
        }
    }

    fn object_header(&mut self, obj: &Builtin) -> BuiltinsResult<()> {
        self.enc.varuint(obj.class.number())?;

        let mut props: Vec<&BuiltinProperty> = obj.properties.iter().collect();
        steal(&mut props, b"prototype", true);
        steal(&mut props, b"constructor", true);
        let prop_name = steal(&mut props, b"name", false);
        let prop_length = steal(&mut props, b"length", false);

        // -1 never matches nargs, so functions without length always
        // spell out their nargs
        let mut length = -1;
        match prop_length {
            Some(prop) => {
                length = prop
                    .value
                    .as_integer()
                    .ok_or_else(|| Self::error(obj, "length is not an integer"))?;
                self.enc.flag(true);
                self.enc.bits_i64(length, LENGTH_PROP_BITS)?;
                // Array.prototype.length is writable
                if prop.attributes != LENGTH_PROPERTY_ATTRIBUTES && obj.class != ObjectClass::Array {
                    return Err(Self::error(obj, "non-default length attributes"));
                }
            }
            None => self.enc.flag(false),
        }

        if obj.class == ObjectClass::Function {
            if !obj.callable {
                return Err(Self::error(obj, "Function class object is not callable"));
            }
            let native = obj
                .native
                .as_deref()
                .ok_or_else(|| Self::error(obj, "Function class object has no native"))?;
            self.natidx(obj, Some(native))?;
            self.nargs(obj, length)?;

            let name = match prop_name.map(|p| &p.value) {
                Some(PropValue::String(s)) => s,
                _ => return Err(Self::error(obj, "function name must be a string")),
            };
            self.stridx_or_string(name)?;
            self.enc.flag(obj.constructable);
            self.enc.varuint(u32::from(obj.magic as u16))?;
        }
        Ok(())
    }

    fn object_properties(&mut self, obj: &Builtin) -> BuiltinsResult<(usize, usize)> {
        let builtins = self.builtins;
        let mut props: Vec<&BuiltinProperty> = obj.properties.iter().collect();

        self.ramidx_or_none(obj.internal_prototype)?;

        let proto = match steal(&mut props, b"prototype", true) {
            Some(prop) => {
                if prop.attributes != Attributes::NONE {
                    return Err(Self::error(obj, "prototype must have no attributes"));
                }
                Some(
                    *prop
                        .value
                        .as_object()
                        .ok_or_else(|| Self::error(obj, "prototype must be an object"))?,
                )
            }
            None => None,
        };
        self.ramidx_or_none(proto)?;

        let constructor = match steal(&mut props, b"constructor", true) {
            Some(prop) => {
                if prop.attributes != Attributes::DATA_DEFAULT {
                    return Err(Self::error(obj, "constructor must have attributes wc"));
                }
                Some(
                    *prop
                        .value
                        .as_object()
                        .ok_or_else(|| Self::error(obj, "constructor must be an object"))?,
                )
            }
            None => None,
        };
        self.ramidx_or_none(constructor)?;

        if obj.class == ObjectClass::Function {
            match steal(&mut props, b"name", false) {
                Some(prop) if matches!(prop.value, PropValue::String(_)) => {
                    if prop.attributes != Attributes::CONFIGURABLE {
                        return Err(Self::error(obj, "function name must have attributes c"));
                    }
                }
                _ => return Err(Self::error(obj, "function name must be a string")),
            }
        }
        steal(&mut props, b"length", false);

        // Date.prototype.toGMTString is set up by the runtime itself
        if obj.id == "bi_date_prototype" && steal(&mut props, b"toGMTString", true).is_none() {
            return Err(Self::error(obj, "missing toGMTString"));
        }

        let (functions, values): (Vec<&BuiltinProperty>, Vec<&BuiltinProperty>) =
            props.into_iter().partition(|p| match p.value {
                PropValue::Object(target) => {
                    let target = &builtins.objects[target];
                    target.native.is_some() && target.bidx.is_none()
                }
                _ => false,
            });

        self.enc.varuint(values.len() as u32)?;
        for prop in &values {
            self.value_property(obj, prop)?;
        }

        self.enc.varuint(functions.len() as u32)?;
        for prop in &functions {
            self.function_property(obj, prop)?;
        }
        Ok((values.len(), functions.len()))
    }

    fn value_property(&mut self, obj: &Builtin, prop: &BuiltinProperty) -> BuiltinsResult<()> {
        self.stridx_or_string(&prop.key)?;
        self.attributes(prop.attributes)?;

        let unsupported = |what: &str| {
            warn!(
                "RAM init data format doesn't support \"{}\" now, value replaced with \"undefined\": {}/{}",
                what,
                obj.id,
                bytes_to_text(&prop.key)
            );
        };

        match &prop.value {
            PropValue::Undefined => self.enc.bits(PROP_TYPE_UNDEFINED, PROP_TYPE_BITS),
            PropValue::Null => {
                unsupported("null");
                self.enc.bits(PROP_TYPE_UNDEFINED, PROP_TYPE_BITS)
            }
            PropValue::Lightfunc(_) => {
                unsupported("lightfunc");
                self.enc.bits(PROP_TYPE_UNDEFINED, PROP_TYPE_BITS)
            }
            PropValue::Opaque(kind) => {
                unsupported(kind.name());
                self.enc.bits(PROP_TYPE_UNDEFINED, PROP_TYPE_BITS)
            }
            PropValue::Bool(true) => self.enc.bits(PROP_TYPE_BOOLEAN_TRUE, PROP_TYPE_BITS),
            PropValue::Bool(false) => self.enc.bits(PROP_TYPE_BOOLEAN_FALSE, PROP_TYPE_BITS),
            PropValue::Number(_) | PropValue::Double(_) => {
                let be = prop
                    .value
                    .double_bytes()
                    .ok_or_else(|| Self::error(obj, "not a number"))?;
                self.enc.bits(PROP_TYPE_DOUBLE, PROP_TYPE_BITS)?;
                self.enc.bytes(&self.order.permute(be));
                Ok(())
            }
            PropValue::String(s) => match self.stridx.get(s.as_slice()) {
                Some(&idx) => {
                    self.enc.bits(PROP_TYPE_STRIDX, PROP_TYPE_BITS)?;
                    self.enc.varuint(idx as u32)
                }
                None => {
                    self.enc.bits(PROP_TYPE_STRING, PROP_TYPE_BITS)?;
                    pack_string(&mut self.enc, s, &mut self.stats)
                }
            },
            PropValue::Object(target) => {
                let ramidx = self.builtins.ramidx(*target)?;
                self.enc.bits(PROP_TYPE_BUILTIN, PROP_TYPE_BITS)?;
                self.enc.varuint(ramidx as u32)
            }
            PropValue::Accessor { getter, setter } => {
                self.enc.bits(PROP_TYPE_ACCESSOR, PROP_TYPE_BITS)?;
                self.accessor(obj, prop, *getter, *setter)
            }
        }
    }

    fn accessor(
        &mut self,
        obj: &Builtin,
        prop: &BuiltinProperty,
        getter: Option<ObjIdx>,
        setter: Option<ObjIdx>,
    ) -> BuiltinsResult<()> {
        let builtins = self.builtins;
        let getter = getter.map(|i| &builtins.objects[i]);
        let setter = setter.map(|i| &builtins.objects[i]);

        if let Some(g) = getter {
            if g.nargs != Some(0) {
                return Err(Self::error(obj, format!("getter {} must take 0 arguments", g.id)));
            }
        }
        if let Some(s) = setter {
            if s.nargs != Some(1) {
                return Err(Self::error(obj, format!("setter {} must take 1 argument", s.id)));
            }
        }
        if let (Some(g), Some(s)) = (getter, setter) {
            if g.magic != s.magic {
                return Err(BuiltinsError::AccessorMagicMismatch {
                    object: obj.id.clone(),
                    key: bytes_to_text(&prop.key),
                });
            }
        }

        let native_of = |f: Option<&'a Builtin>| -> BuiltinsResult<Option<&'a str>> {
            match f {
                Some(f) => f
                    .native
                    .as_deref()
                    .map(Some)
                    .ok_or_else(|| Self::error(obj, format!("accessor function {} has no native", f.id))),
                None => Ok(None),
            }
        };
        let getter_native = native_of(getter)?;
        let setter_native = native_of(setter)?;
        self.natidx(obj, getter_native)?;
        self.natidx(obj, setter_native)?;
        let magic = getter.map_or(0, |g| g.magic);
        self.enc.varuint(u32::from(magic as u16))
    }

    fn function_property(&mut self, obj: &Builtin, prop: &BuiltinProperty) -> BuiltinsResult<()> {
        let builtins = self.builtins;
        let func = prop
            .value
            .as_object()
            .map(|&i| &builtins.objects[i])
            .ok_or_else(|| Self::error(obj, "function property must be an object"))?;
        let length = func
            .length()
            .ok_or_else(|| Self::error(func, "function has no integer length"))?;

        self.stridx_or_string(&prop.key)?;
        self.natidx(func, func.native.as_deref())?;
        self.enc.bits_i64(length, LENGTH_PROP_BITS)?;
        self.nargs(func, length)?;
        self.enc.varuint(u32::from(func.magic as u16))?;
        self.attributes(prop.attributes)
    }
}
