//! Development dumps of final, frozen metadata

use crate::builtins::{Builtin, BuiltinProperty, Builtins};
use crate::error::BuiltinsResult;
use crate::metajson::to_ascii_json;
use crate::metadata::model::PropValue;
use crate::strings::NamedString;
use crate::text::bytes_to_text;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
struct DumpDocument {
    mode: &'static str,
    strings: Vec<DumpString>,
    strings_stridx: Vec<String>,
    objects: Vec<DumpObject>,
}

#[derive(Debug, Serialize)]
struct DumpString {
    #[serde(rename = "str")]
    text: String,
    define: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reserved_word: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    future_reserved_word_strict: Option<bool>,
}

#[derive(Debug, Serialize)]
struct DumpObject {
    id: String,
    class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bidx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    internal_prototype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    native: Option<String>,
    callable: bool,
    constructable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    nargs: Option<i64>,
    varargs: bool,
    magic: i16,
    properties: Vec<DumpProperty>,
}

#[derive(Debug, Serialize)]
struct DumpProperty {
    key: String,
    value: Value,
    attributes: String,
}

fn dump_string(s: &NamedString) -> DumpString {
    DumpString {
        text: bytes_to_text(s.bytes()),
        define: s.define.clone(),
        class_name: s.entry.class_name,
        reserved_word: s.entry.reserved_word,
        future_reserved_word_strict: s.entry.future_reserved_word_strict,
    }
}

fn dump_value(builtins: &Builtins, value: &PropValue<usize>) -> Value {
    let id = |idx: &usize| builtins.objects[*idx].id.clone();
    match value {
        PropValue::Undefined => json!({ "type": "undefined" }),
        PropValue::Null => Value::Null,
        PropValue::Bool(b) => Value::Bool(*b),
        // NaN and infinities have no JSON number form
        PropValue::Number(n) if n.is_finite() => json!(n),
        PropValue::Number(_) | PropValue::Double(_) => json!({
            "type": "double",
            "bytes": hex::encode(value.double_bytes().unwrap_or_default()),
        }),
        PropValue::String(s) => Value::String(bytes_to_text(s)),
        PropValue::Object(target) => json!({ "type": "object", "id": id(target) }),
        PropValue::Accessor { getter, setter } => {
            let mut acc = json!({ "type": "accessor" });
            if let Some(g) = getter {
                acc["getter_id"] = Value::String(id(g));
            }
            if let Some(s) = setter {
                acc["setter_id"] = Value::String(id(s));
            }
            acc
        }
        PropValue::Lightfunc(lf) => {
            let mut v = json!({
                "type": "lightfunc",
                "native": lf.native,
                "length": lf.length,
                "magic": lf.magic,
                "varargs": lf.nargs.is_none(),
            });
            if let Some(nargs) = lf.nargs {
                v["nargs"] = json!(nargs);
            }
            v
        }
        PropValue::Opaque(kind) => json!({ "type": kind.name() }),
    }
}

fn dump_property(builtins: &Builtins, prop: &BuiltinProperty) -> DumpProperty {
    DumpProperty {
        key: bytes_to_text(&prop.key),
        value: dump_value(builtins, &prop.value),
        attributes: prop.attributes.to_string(),
    }
}

fn dump_object(builtins: &Builtins, obj: &Builtin) -> DumpObject {
    DumpObject {
        id: obj.id.clone(),
        class: obj.class.name(),
        bidx: obj.bidx,
        internal_prototype: obj.internal_prototype.map(|i| builtins.objects[i].id.clone()),
        native: obj.native.clone(),
        callable: obj.callable,
        constructable: obj.constructable,
        nargs: obj.nargs,
        varargs: obj.varargs,
        magic: obj.magic,
        properties: obj
            .properties
            .iter()
            .map(|p| dump_property(builtins, p))
            .collect(),
    }
}

/// Final metadata of one build mode as JSON.
pub fn dump_builtins(builtins: &Builtins) -> BuiltinsResult<String> {
    let doc = DumpDocument {
        mode: builtins.mode.name(),
        strings: builtins.strings.strings.iter().map(dump_string).collect(),
        strings_stridx: builtins
            .strings
            .stridx
            .iter()
            .map(|s| bytes_to_text(s.bytes()))
            .collect(),
        objects: builtins
            .objects
            .iter()
            .map(|o| dump_object(builtins, o))
            .collect(),
    };
    to_ascii_json(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActiveConfig, BuildMode, CompileOptions, CompilerContext, UsedDefines};
    use crate::metadata::model::{Attributes, Metadata, ObjectClass, ObjectEntry, PropertyEntry};
    use crate::strings::StringTable;

    #[test]
    fn test_dump_values() {
        let mut global = ObjectEntry::new("bi_global", ObjectClass::Global);
        global.bidx = true;
        global
            .properties
            .push(PropertyEntry::new(b"NaN", PropValue::Number(f64::NAN), Attributes::NONE));
        global
            .properties
            .push(PropertyEntry::new(b"one", PropValue::Number(1.0), Attributes::DATA_DEFAULT));
        global.properties.push(PropertyEntry::new(
            b"self",
            PropValue::Object("bi_global".to_string()),
            Attributes::DATA_DEFAULT,
        ));
        let md = Metadata {
            objects: vec![global],
            ..Default::default()
        };
        let ctx = CompilerContext::new(BuildMode::Ram, &CompileOptions::default(), &ActiveConfig::default(), &UsedDefines::default());
        let builtins = Builtins::freeze(&md, StringTable::default(), &ctx).unwrap();

        let text = dump_builtins(&builtins).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["mode"], "RAM");
        let props = &parsed["objects"][0]["properties"];
        assert_eq!(props[0]["value"]["type"], "double");
        assert_eq!(props[0]["value"]["bytes"], "7ff8000000000000");
        assert_eq!(props[1]["value"], 1.0);
        assert_eq!(props[1]["attributes"], "wc");
        assert_eq!(props[2]["value"]["id"], "bi_global");
        assert_eq!(parsed["objects"][0]["class"], "global");
    }
}
