//! Metadata documents as written in YAML
//!
//! These types mirror the on-disk format closely and keep every field
//! optional so that override documents can say "only change this". The
//! normalizer turns them into the canonical model in [`super::model`].

use crate::error::{BuiltinsError, BuiltinsResult};
use crate::magic::MagicSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One metadata document: base strings, base objects, or an override file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strings: Vec<RawString>,

    /// Plain string -> define suffix overrides.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub special_define_names: BTreeMap<String, String>,

    /// Reserved words in lexer token order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved_word_token_order: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<RawObject>,

    /// Strings forced into ROM data even when nothing references them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_forced_strings: Vec<RawString>,

    // Removed keys, kept only to produce a helpful error.
    #[serde(default, skip_serializing)]
    pub add_objects: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing)]
    pub replace_objects: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing)]
    pub modify_objects: Option<serde_yaml::Value>,
}

impl MetadataDocument {
    /// Parse a document from YAML text
    pub fn from_yaml_str(text: &str) -> BuiltinsResult<Self> {
        let doc: Self = serde_yaml::from_str(text)?;
        doc.check_removed_keys()?;
        Ok(doc)
    }

    /// Read and parse a YAML document
    pub fn from_path(path: &Path) -> BuiltinsResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Combine a strings document and an objects document into one base
    /// document. Top level keys from the strings document win.
    pub fn combine(objects: Self, strings: Self) -> Self {
        fn prefer<T: Default + PartialEq>(primary: T, fallback: T) -> T {
            if primary == T::default() {
                fallback
            } else {
                primary
            }
        }

        Self {
            strings: prefer(strings.strings, objects.strings),
            special_define_names: prefer(strings.special_define_names, objects.special_define_names),
            reserved_word_token_order: prefer(
                strings.reserved_word_token_order,
                objects.reserved_word_token_order,
            ),
            objects: prefer(strings.objects, objects.objects),
            add_forced_strings: prefer(strings.add_forced_strings, objects.add_forced_strings),
            add_objects: None,
            replace_objects: None,
            modify_objects: None,
        }
    }

    fn check_removed_keys(&self) -> BuiltinsResult<()> {
        let removed = [
            (&self.add_objects, "add_objects", "add"),
            (&self.replace_objects, "replace_objects", "replace"),
            (&self.modify_objects, "modify_objects", "modify"),
        ];
        for (value, key, replacement) in removed {
            if value.is_some() {
                return Err(BuiltinsError::RemovedKey {
                    key: key.to_string(),
                    replacement: replacement.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A string list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawString {
    #[serde(rename = "str")]
    pub text: RawStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_word: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub future_reserved_word_strict: Option<bool>,
}

/// A string or a symbol description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStr {
    Plain(String),
    Symbol(SymbolSpec),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolTag {
    Symbol,
}

/// `{type: symbol, variant: ..., string: ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    #[serde(rename = "type")]
    pub tag: SymbolTag,
    pub variant: SymbolVariant,
    pub string: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolVariant {
    Global,
    Wellknown,
    Userhidden,
    Hidden,
}

/// `present_if` accepts one option name or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresentIf {
    One(String),
    Many(Vec<String>),
}

impl PresentIf {
    pub fn names(&self) -> Vec<String> {
        match self {
            PresentIf::One(name) => vec![name.clone()],
            PresentIf::Many(names) => names.clone(),
        }
    }
}

/// An object entry. Every field is optional so that `modify` can copy only
/// what the override actually sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawObject {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_prototype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_call: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nargs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub varargs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magic: Option<MagicSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidx: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub present_if: Option<PresentIf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objenv_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objenv_has_this: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<RawProperty>>,

    // Merge verbs, only meaningful in override documents.
    #[serde(skip_serializing_if = "is_false")]
    pub add: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub replace: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub modify: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub delete: bool,
}

impl RawObject {
    pub fn is_disabled(&self) -> bool {
        self.disable.unwrap_or(false)
    }

    /// Copy every field the override sets, except properties.
    pub fn apply_fields(&mut self, other: &RawObject) {
        macro_rules! copy_set {
            ($($field:ident),*) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field.clone();
                    }
                )*
            };
        }
        copy_set!(
            class,
            internal_prototype,
            native,
            callable,
            constructable,
            special_call,
            nargs,
            varargs,
            magic,
            bidx,
            present_if,
            disable,
            objenv_target,
            objenv_has_this
        );
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A property entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProperty {
    pub key: RawStr,
    #[serde(default, skip_serializing_if = "RawValue::is_missing")]
    pub value: RawValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present_if: Option<PresentIf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_lightfunc: Option<bool>,

    // Merge verbs for `modify`; replace is the default.
    #[serde(default, skip_serializing_if = "is_false")]
    pub add: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub replace: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub delete: bool,
}

impl RawProperty {
    pub fn is_disabled(&self) -> bool {
        self.disable.unwrap_or(false)
    }
}

/// A property value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tagged(Box<TaggedValue>),
    /// No value given; only valid on deleted properties.
    #[default]
    #[serde(skip)]
    Missing,
}

impl RawValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }
}

/// Values written as `{type: ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaggedValue {
    /// Exact IEEE double, big endian hex
    Double { bytes: String },
    Undefined,
    Null,
    Object { id: String },
    Accessor(RawAccessor),
    Lightfunc(RawLightfunc),
    Function(RawFunction),
    Structured { value: serde_yaml::Value },
    Symbol { variant: SymbolVariant, string: String },
    Buffer,
    Pointer,
}

/// Accessor longhand (`getter_id`/`setter_id`) or shorthand
/// (`getter`/`setter` native names).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAccessor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub getter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub getter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub getter_nargs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter_nargs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub getter_magic: Option<MagicSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setter_magic: Option<MagicSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constructable: Option<bool>,
}

impl RawAccessor {
    pub fn is_shorthand(&self) -> bool {
        self.getter.is_some() || self.setter.is_some()
    }
}

/// Function shorthand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFunction {
    pub native: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub varargs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<MagicSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<RawStr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_call: Option<bool>,
}

/// Explicit lightfunc value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLightfunc {
    pub native: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nargs: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub varargs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strings_document() {
        let doc = MetadataDocument::from_yaml_str(
            r#"
strings:
  - str: "Undefined"
    class_name: true
  - str: { type: symbol, variant: wellknown, string: "Symbol.iterator" }
special_define_names:
  "\x82Value": INT_VALUE
reserved_word_token_order: [ "break" ]
"#,
        )
        .unwrap();
        assert_eq!(doc.strings.len(), 2);
        assert_eq!(doc.strings[0].class_name, Some(true));
        assert!(matches!(
            &doc.strings[1].text,
            RawStr::Symbol(SymbolSpec { variant: SymbolVariant::Wellknown, .. })
        ));
        assert_eq!(doc.special_define_names.len(), 1);
        assert_eq!(doc.reserved_word_token_order, vec!["break".to_string()]);
    }

    #[test]
    fn test_parse_property_values() {
        let doc = MetadataDocument::from_yaml_str(
            r#"
objects:
  - id: bi_test
    class: Object
    properties:
      - { key: a, value: 1 }
      - { key: b, value: 1.5 }
      - { key: c, value: "text" }
      - { key: d, value: true }
      - { key: e, value: null }
      - { key: f, value: { type: undefined } }
      - { key: g, value: { type: double, bytes: "7ff8000000000000" } }
      - { key: h, value: { type: function, native: duk_bi_h, length: 2 } }
      - { key: i, value: { type: accessor, getter: duk_bi_get, getter_nargs: 0 } }
      - { key: j, value: { type: structured, value: { x: 1 } } }
      - { key: k, delete: true }
"#,
        )
        .unwrap();
        let props = doc.objects[0].properties.as_ref().unwrap();
        assert_eq!(props[0].value, RawValue::Int(1));
        assert_eq!(props[1].value, RawValue::Float(1.5));
        assert_eq!(props[2].value, RawValue::Str("text".to_string()));
        assert_eq!(props[3].value, RawValue::Bool(true));
        assert_eq!(props[4].value, RawValue::Null);
        assert!(matches!(&props[5].value, RawValue::Tagged(t) if **t == TaggedValue::Undefined));
        assert!(matches!(&props[6].value, RawValue::Tagged(t) if matches!(**t, TaggedValue::Double { .. })));
        assert!(matches!(&props[7].value, RawValue::Tagged(t) if matches!(**t, TaggedValue::Function(_))));
        assert!(
            matches!(&props[8].value, RawValue::Tagged(t) if matches!(&**t, TaggedValue::Accessor(a) if a.is_shorthand()))
        );
        assert!(matches!(&props[9].value, RawValue::Tagged(t) if matches!(**t, TaggedValue::Structured { .. })));
        assert!(props[10].value.is_missing());
        assert!(props[10].delete);
    }

    #[test]
    fn test_removed_keys_rejected() {
        let err = MetadataDocument::from_yaml_str("add_objects: []").unwrap_err();
        assert!(matches!(err, BuiltinsError::RemovedKey { .. }));
    }

    #[test]
    fn test_apply_fields_copies_only_set_fields() {
        let mut base = RawObject {
            id: "bi_x".to_string(),
            class: Some("Object".to_string()),
            native: Some("duk_bi_x".to_string()),
            ..Default::default()
        };
        let patch = RawObject {
            id: "bi_x".to_string(),
            native: Some("duk_bi_y".to_string()),
            modify: true,
            ..Default::default()
        };
        base.apply_fields(&patch);
        assert_eq!(base.class.as_deref(), Some("Object"));
        assert_eq!(base.native.as_deref(), Some("duk_bi_y"));
    }

    #[test]
    fn test_combine_prefers_strings_document() {
        let objects = MetadataDocument::from_yaml_str("objects: [ { id: bi_a } ]").unwrap();
        let strings = MetadataDocument::from_yaml_str("strings: [ { str: a } ]").unwrap();
        let doc = MetadataDocument::combine(objects, strings);
        assert_eq!(doc.objects.len(), 1);
        assert_eq!(doc.strings.len(), 1);
    }
}
