//! Shorthand normalizer: raw documents to the canonical model
//!
//! Expands function, accessor and structured shorthand into synthetic
//! `subobj_N` objects, fills in attribute and `nargs` defaults and applies
//! the handful of per-object fixups the runtime expects.

use crate::config::CompilerContext;
use crate::error::{BuiltinsError, BuiltinsResult};
use crate::magic::MagicSpec;
use crate::metadata::model::{
    Attributes, Bytes, Lightfunc, Metadata, ObjectClass, ObjectEntry, OpaqueKind, PropValue,
    PropertyEntry, StringEntry, StringOrigin,
};
use crate::metadata::raw::{
    MetadataDocument, RawAccessor, RawFunction, RawLightfunc, RawObject, RawProperty, RawStr,
    RawString, RawValue, SymbolVariant, TaggedValue,
};
use crate::text::{bytes_to_text, text_to_bytes};
use tracing::{debug, info, warn};

const FUNCTION_PROTOTYPE: &str = "bi_function_prototype";
const OBJECT_PROTOTYPE: &str = "bi_object_prototype";
const DATE_PROTOTYPE: &str = "bi_date_prototype";
const DUKTAPE_OBJECT: &str = "bi_duktape";

/// Byte encoding of a symbol.
pub fn symbol_bytes(variant: SymbolVariant, name: &str) -> BuiltinsResult<Bytes> {
    let name = text_to_bytes(name)?;
    let mut out = Vec::with_capacity(name.len() + 2);
    match variant {
        SymbolVariant::Global => {
            out.push(0x80);
            out.extend_from_slice(&name);
        }
        SymbolVariant::Wellknown => {
            out.push(0x81);
            out.extend_from_slice(&name);
            out.push(0xff);
        }
        SymbolVariant::Userhidden => {
            out.push(0xff);
            out.extend_from_slice(&name);
        }
        SymbolVariant::Hidden => {
            out.push(0x82);
            out.extend_from_slice(&name);
        }
    }
    Ok(out)
}

/// Bytes of a string or symbol as written in a document.
pub fn raw_str_bytes(s: &RawStr) -> BuiltinsResult<Bytes> {
    match s {
        RawStr::Plain(text) => text_to_bytes(text),
        RawStr::Symbol(sym) => symbol_bytes(sym.variant, &sym.string),
    }
}

fn string_entry(raw: &RawString, origin: StringOrigin) -> BuiltinsResult<StringEntry> {
    Ok(StringEntry {
        bytes: raw_str_bytes(&raw.text)?,
        class_name: raw.class_name,
        reserved_word: raw.reserved_word,
        future_reserved_word_strict: raw.future_reserved_word_strict,
        origin,
    })
}

/// Normalize a merged document into the canonical model.
pub fn normalize(doc: &MetadataDocument, ctx: &CompilerContext) -> BuiltinsResult<Metadata> {
    let mut normalizer = Normalizer::new(ctx);
    let metadata = normalizer.run(doc)?;
    info!(
        "Normalized {} objects ({} synthetic) and {} strings",
        metadata.objects.len(),
        normalizer.next_subobj,
        metadata.strings.len()
    );
    Ok(metadata)
}

struct Normalizer<'a> {
    ctx: &'a CompilerContext,
    next_subobj: usize,
    subobjects: Vec<ObjectEntry>,
}

impl<'a> Normalizer<'a> {
    fn new(ctx: &'a CompilerContext) -> Self {
        Self {
            ctx,
            next_subobj: 0,
            subobjects: Vec::new(),
        }
    }

    fn run(&mut self, doc: &MetadataDocument) -> BuiltinsResult<Metadata> {
        let strings = doc
            .strings
            .iter()
            .map(|s| string_entry(s, StringOrigin::Listed))
            .collect::<BuiltinsResult<Vec<_>>>()?;
        let forced_strings = doc
            .add_forced_strings
            .iter()
            .map(|s| string_entry(s, StringOrigin::Forced))
            .collect::<BuiltinsResult<Vec<_>>>()?;
        let special_define_names = doc
            .special_define_names
            .iter()
            .map(|(text, name)| Ok((text_to_bytes(text)?, name.clone())))
            .collect::<BuiltinsResult<Vec<_>>>()?;
        let reserved_word_token_order = doc
            .reserved_word_token_order
            .iter()
            .map(|text| text_to_bytes(text))
            .collect::<BuiltinsResult<Vec<_>>>()?;

        let mut objects = Vec::with_capacity(doc.objects.len());
        for raw in &doc.objects {
            objects.push(self.object(raw)?);
        }
        objects.append(&mut self.subobjects);

        if self.ctx.is_rom() {
            for prop in objects.iter_mut().flat_map(|o| o.properties.iter_mut()) {
                prop.attributes = prop.attributes.without_configurable();
            }
        }

        Ok(Metadata {
            strings,
            special_define_names,
            reserved_word_token_order,
            forced_strings,
            objects,
        })
    }

    fn next_subobj_id(&mut self) -> String {
        let id = format!("subobj_{}", self.next_subobj);
        self.next_subobj += 1;
        id
    }

    fn object(&mut self, raw: &RawObject) -> BuiltinsResult<ObjectEntry> {
        let class_name = raw.class.as_deref().unwrap_or("");
        let class = ObjectClass::from_name(class_name).ok_or_else(|| BuiltinsError::UnknownClass {
            object: raw.id.clone(),
            name: class_name.to_string(),
        })?;

        let mut obj = ObjectEntry::new(raw.id.clone(), class);
        obj.internal_prototype = raw.internal_prototype.clone();
        obj.native = raw.native.clone();
        obj.callable = raw.callable.unwrap_or(false);
        obj.constructable = raw.constructable.unwrap_or(false);
        obj.special_call = raw.special_call.unwrap_or(false);
        obj.nargs = raw.nargs;
        obj.varargs = raw.varargs;
        obj.magic = raw.magic.clone();
        obj.bidx = raw.bidx.unwrap_or(false);
        obj.objenv_target = raw.objenv_target.clone();
        obj.objenv_has_this = raw.objenv_has_this.unwrap_or(false);

        let is_date_prototype = obj.id == DATE_PROTOTYPE;
        for prop in raw.properties.iter().flatten() {
            let entry = self.property(&obj.id, prop)?;
            if is_date_prototype && entry.key == b"toGMTString" {
                debug!("Ignoring toGMTString of {}, cloned from toUTCString", obj.id);
                continue;
            }
            if obj.property(&entry.key).is_some() {
                return Err(BuiltinsError::PropertyExists {
                    object: obj.id.clone(),
                    key: bytes_to_text(&entry.key),
                });
            }
            let gmt_clone = (is_date_prototype && entry.key == b"toUTCString").then(|| PropertyEntry {
                key: b"toGMTString".to_vec(),
                ..entry.clone()
            });
            obj.properties.push(entry);
            obj.properties.extend(gmt_clone);
        }

        if obj.callable && obj.nargs.is_none() {
            let length = obj.property(b"length").and_then(|p| p.value.as_integer());
            match length {
                Some(length) => obj.nargs = Some(length),
                None => return Err(BuiltinsError::MissingNargs { id: obj.id.clone() }),
            }
        }

        if !self.ctx.is_rom() && obj.callable && obj.property(b"name").is_none() {
            debug!("Adding empty name to {}", obj.id);
            obj.properties.push(PropertyEntry::new(
                b"name",
                PropValue::String(Vec::new()),
                Attributes::CONFIGURABLE,
            ));
        }

        if obj.id == DUKTAPE_OBJECT {
            obj.properties.insert(
                0,
                PropertyEntry::new(
                    b"version",
                    PropValue::Number(f64::from(self.ctx.version)),
                    Attributes::NONE,
                ),
            );
            if self.ctx.is_rom() {
                obj.properties.insert(
                    0,
                    PropertyEntry::new(b"env", PropValue::String(b"ROM".to_vec()), Attributes::NONE),
                );
            }
        }

        Ok(obj)
    }

    fn property(&mut self, object: &str, raw: &RawProperty) -> BuiltinsResult<PropertyEntry> {
        let key = raw_str_bytes(&raw.key)?;
        let key_text = || bytes_to_text(&key);
        let invalid = |message: String| BuiltinsError::InvalidValue {
            object: object.to_string(),
            key: bytes_to_text(&key),
            message,
        };

        let value = match &raw.value {
            RawValue::Missing => return Err(invalid("property has no value".to_string())),
            RawValue::Null => PropValue::Null,
            RawValue::Bool(b) => PropValue::Bool(*b),
            RawValue::Int(i) => PropValue::Number(*i as f64),
            RawValue::Float(f) => PropValue::Number(*f),
            RawValue::Str(s) => PropValue::String(text_to_bytes(s)?),
            RawValue::Tagged(tagged) => match tagged.as_ref() {
                TaggedValue::Double { bytes } => {
                    let decoded = hex::decode(bytes).map_err(|e| invalid(format!("bad double bytes: {}", e)))?;
                    let bytes: [u8; 8] = decoded
                        .try_into()
                        .map_err(|_| invalid("double needs exactly 8 bytes".to_string()))?;
                    PropValue::Double(bytes)
                }
                TaggedValue::Undefined => PropValue::Undefined,
                TaggedValue::Null => PropValue::Null,
                TaggedValue::Object { id } => PropValue::Object(id.clone()),
                TaggedValue::Accessor(acc) => self.accessor(acc)?,
                TaggedValue::Lightfunc(lf) => {
                    PropValue::Lightfunc(explicit_lightfunc(lf).map_err(invalid)?)
                }
                TaggedValue::Function(func) => {
                    let id = self.function_subobject(&key, func)?;
                    PropValue::Object(id)
                }
                TaggedValue::Structured { value } => match value {
                    serde_yaml::Value::Mapping(_) => {
                        PropValue::Object(self.structured_subobject(object, &key_text(), value)?)
                    }
                    other => self.structured_scalar(object, &key_text(), other)?,
                },
                TaggedValue::Symbol { variant, string } => {
                    PropValue::String(symbol_bytes(*variant, string)?)
                }
                TaggedValue::Buffer => PropValue::Opaque(OpaqueKind::Buffer),
                TaggedValue::Pointer => PropValue::Opaque(OpaqueKind::Pointer),
            },
        };

        let attributes = match &raw.attributes {
            Some(text) => Attributes::parse(text).ok_or_else(|| BuiltinsError::InvalidAttributes {
                object: object.to_string(),
                key: key_text(),
                attributes: text.clone(),
            })?,
            None if value.is_accessor() => Attributes::ACCESSOR_DEFAULT,
            None => Attributes::DATA_DEFAULT,
        };
        let attributes = Attributes {
            accessor: attributes.accessor || value.is_accessor(),
            ..attributes
        };

        Ok(PropertyEntry {
            key,
            value,
            attributes,
            auto_lightfunc: raw.auto_lightfunc.unwrap_or(true),
        })
    }

    fn function_subobject(&mut self, key: &[u8], func: &RawFunction) -> BuiltinsResult<String> {
        let id = self.next_subobj_id();
        let length = func.length.unwrap_or(0);
        let name = match &func.name {
            Some(name) => raw_str_bytes(name)?,
            None => key.to_vec(),
        };

        let mut obj = ObjectEntry::new(id.clone(), ObjectClass::Function);
        obj.internal_prototype = Some(FUNCTION_PROTOTYPE.to_string());
        obj.native = Some(func.native.clone());
        obj.callable = func.callable.unwrap_or(true);
        obj.constructable = func.constructable.unwrap_or(false);
        obj.special_call = func.special_call.unwrap_or(false);
        obj.nargs = Some(func.nargs.unwrap_or(length));
        obj.varargs = Some(func.varargs.unwrap_or(false));
        obj.magic = Some(func.magic.clone().unwrap_or(MagicSpec::Int(0)));
        obj.auto_generated = true;
        obj.properties = vec![
            PropertyEntry::new(b"length", PropValue::Number(length as f64), Attributes::CONFIGURABLE),
            PropertyEntry::new(b"name", PropValue::String(name), Attributes::CONFIGURABLE),
        ];
        debug!("Function shorthand {} -> {}", bytes_to_text(key), id);
        self.subobjects.push(obj);
        Ok(id)
    }

    fn accessor_subobject(&mut self, native: &str, nargs: i64, magic: Option<&MagicSpec>) -> String {
        let id = self.next_subobj_id();
        let mut obj = ObjectEntry::new(id.clone(), ObjectClass::Function);
        obj.internal_prototype = Some(FUNCTION_PROTOTYPE.to_string());
        obj.native = Some(native.to_string());
        obj.callable = true;
        obj.nargs = Some(nargs);
        obj.varargs = Some(false);
        obj.magic = Some(magic.cloned().unwrap_or(MagicSpec::Int(0)));
        obj.auto_generated = true;
        self.subobjects.push(obj);
        id
    }

    fn accessor(&mut self, acc: &RawAccessor) -> BuiltinsResult<PropValue> {
        if !acc.is_shorthand() {
            return Ok(PropValue::Accessor {
                getter: acc.getter_id.clone(),
                setter: acc.setter_id.clone(),
            });
        }
        let getter = acc.getter.as_deref().map(|native| {
            self.accessor_subobject(native, acc.getter_nargs.unwrap_or(0), acc.getter_magic.as_ref())
        });
        let setter = acc.setter.as_deref().map(|native| {
            self.accessor_subobject(native, acc.setter_nargs.unwrap_or(1), acc.setter_magic.as_ref())
        });
        Ok(PropValue::Accessor { getter, setter })
    }

    fn structured_scalar(
        &mut self,
        object: &str,
        key: &str,
        value: &serde_yaml::Value,
    ) -> BuiltinsResult<PropValue> {
        let invalid = |message: &str| BuiltinsError::InvalidValue {
            object: object.to_string(),
            key: key.to_string(),
            message: message.to_string(),
        };
        Ok(match value {
            serde_yaml::Value::Null => PropValue::Null,
            serde_yaml::Value::Bool(b) => PropValue::Bool(*b),
            serde_yaml::Value::Number(n) => {
                PropValue::Number(n.as_f64().ok_or_else(|| invalid("unrepresentable number"))?)
            }
            serde_yaml::Value::String(s) => PropValue::String(text_to_bytes(s)?),
            serde_yaml::Value::Mapping(_) => {
                PropValue::Object(self.structured_subobject(object, key, value)?)
            }
            serde_yaml::Value::Sequence(_) => return Err(invalid("structured arrays are not supported")),
            serde_yaml::Value::Tagged(_) => return Err(invalid("tagged structured values are not supported")),
        })
    }

    fn structured_subobject(
        &mut self,
        object: &str,
        key: &str,
        value: &serde_yaml::Value,
    ) -> BuiltinsResult<String> {
        let serde_yaml::Value::Mapping(map) = value else {
            return Err(BuiltinsError::InvalidValue {
                object: object.to_string(),
                key: key.to_string(),
                message: "expected a mapping".to_string(),
            });
        };

        let mut entries = Vec::with_capacity(map.len());
        for (k, v) in map {
            let Some(name) = k.as_str() else {
                return Err(BuiltinsError::InvalidValue {
                    object: object.to_string(),
                    key: key.to_string(),
                    message: "structured keys must be strings".to_string(),
                });
            };
            entries.push((name, v));
        }
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let id = self.next_subobj_id();
        let mut obj = ObjectEntry::new(id.clone(), ObjectClass::Object);
        obj.internal_prototype = Some(OBJECT_PROTOTYPE.to_string());
        obj.auto_generated = true;
        for (name, v) in entries {
            let value = self.structured_scalar(&id, name, v)?;
            obj.properties
                .push(PropertyEntry::new(&text_to_bytes(name)?, value, Attributes::WEC));
        }
        self.subobjects.push(obj);
        Ok(id)
    }
}

fn explicit_lightfunc(lf: &RawLightfunc) -> Result<Lightfunc, String> {
    let length = lf.length.unwrap_or(0);
    let length = u8::try_from(length)
        .ok()
        .filter(|l| *l <= 15)
        .ok_or_else(|| format!("lightfunc length {} out of range", length))?;
    let nargs = if lf.varargs.unwrap_or(false) {
        None
    } else {
        let nargs = lf.nargs.unwrap_or(i64::from(length));
        Some(
            u8::try_from(nargs)
                .ok()
                .filter(|n| *n <= 14)
                .ok_or_else(|| format!("lightfunc nargs {} out of range", nargs))?,
        )
    };
    let magic = lf.magic.unwrap_or(0);
    let magic = i8::try_from(magic).map_err(|_| format!("lightfunc magic {} out of range", magic))?;
    if nargs.is_none() && lf.nargs.is_some() {
        warn!("Lightfunc {} is varargs, ignoring nargs", lf.native);
    }
    Ok(Lightfunc {
        native: lf.native.clone(),
        length,
        nargs,
        magic,
    })
}
