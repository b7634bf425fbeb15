//! Integration tests for the full compilation pipeline
//!
//! Drives merge, normalization, filtering, pruning, encoding and rendering
//! from small inline YAML documents.

use bigen_core::{
    compile, ActiveConfig, BuildInfo, BuiltinsError, CompileOptions, MetadataDocument, Outputs,
    UsedDefines,
};
use serde_json::Value;

const STRINGS: &str = r#"
strings:
  - str: "Object"
    class_name: true
  - str: "Function"
    class_name: true
  - str: "length"
  - str: "name"
  - str: "prototype"
  - str: "constructor"
  - str: "toString"
  - str: "break"
    reserved_word: true
  - str: "implements"
    reserved_word: true
    future_reserved_word_strict: true
special_define_names:
  "Object": UC_OBJECT
reserved_word_token_order: [ "break", "implements" ]
"#;

const OBJECTS: &str = r#"
objects:
  - id: bi_global
    class: global
    internal_prototype: bi_object_prototype
    bidx: true
    properties:
      - { key: Object, value: { type: object, id: bi_object_constructor } }
      - { key: NaN, value: { type: double, bytes: "7ff8000000000000" }, attributes: "" }
      - { key: debugOnly, value: true, present_if: DUK_USE_DEBUG_HOOKS }

  - id: bi_object_constructor
    class: Function
    internal_prototype: bi_function_prototype
    native: duk_bi_object_constructor
    callable: true
    constructable: true
    bidx: true
    properties:
      - { key: length, value: 1, attributes: "c" }
      - { key: name, value: "Object", attributes: "c" }
      - { key: prototype, value: { type: object, id: bi_object_prototype }, attributes: "" }

  - id: bi_object_prototype
    class: Object
    bidx: true
    properties:
      - { key: constructor, value: { type: object, id: bi_object_constructor } }
      - { key: toString, value: { type: function, native: duk_bi_object_prototype_to_string, length: 0 } }

  - id: bi_function_prototype
    class: Function
    internal_prototype: bi_object_prototype
    native: duk_bi_function_prototype
    callable: true
    bidx: true
    properties:
      - { key: length, value: 0, attributes: "c" }
      - { key: name, value: "", attributes: "c" }

  - id: bi_unused
    class: Object
    properties: []
"#;

fn base() -> MetadataDocument {
    let strings = MetadataDocument::from_yaml_str(STRINGS).unwrap();
    let objects = MetadataDocument::from_yaml_str(OBJECTS).unwrap();
    MetadataDocument::combine(objects, strings)
}

fn used(prefix: &str) -> UsedDefines {
    UsedDefines {
        used_stridx_defines: ["UC_OBJECT", "LENGTH", "NAME", "PROTOTYPE"]
            .iter()
            .map(|n| format!("{}_STRIDX_{}", prefix, n))
            .collect(),
    }
}

fn options() -> CompileOptions {
    CompileOptions {
        build_info: BuildInfo {
            version: 20700,
            git_commit: Some("0123abc".to_string()),
            git_branch: Some("master".to_string()),
            git_describe: Some("v2.7.0".to_string()),
        },
        ..Default::default()
    }
}

fn run(overrides: &[MetadataDocument], active: &ActiveConfig, options: &CompileOptions) -> Outputs {
    compile(&base(), overrides, active, &used(&options.define_prefix), options).unwrap()
}

fn object<'a>(dump: &'a Value, id: &str) -> Option<&'a Value> {
    dump["objects"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["id"] == id)
}

fn property<'a>(obj: &'a Value, key: &str) -> Option<&'a Value> {
    obj["properties"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["key"] == key)
}

#[test]
fn test_ram_header_defines() {
    let out = run(&[], &ActiveConfig::default(), &options());

    assert!(out.header.contains("#define DUK_STRIDX_UC_OBJECT 0"));
    assert!(out.header.contains("#define DUK_STRIDX_LENGTH 1"));
    assert!(out.header.contains("#define DUK_STRIDX_BREAK 4"));
    assert!(out.header.contains("#define DUK_HEAP_NUM_STRINGS 6"));
    assert!(out.header.contains("#define DUK_STRIDX_START_RESERVED 4"));
    assert!(out.header.contains("#define DUK_STRIDX_START_STRICT_RESERVED 5"));
    assert!(out.header.contains("#define DUK_STRIDX_END_RESERVED 6"));

    assert!(out.header.contains("#define DUK_BIDX_GLOBAL 0"));
    assert!(out.header.contains("#define DUK_BIDX_OBJECT_CONSTRUCTOR 1"));
    assert!(out.header.contains("#define DUK_BIDX_FUNCTION_PROTOTYPE 3"));
    assert!(out.header.contains("#define DUK_NUM_BUILTINS 4"));
    assert!(out.header.contains("#define DUK_NUM_ALL_BUILTINS 4"));
    assert!(out
        .header
        .contains("DUK_INTERNAL_DECL duk_ret_t duk_bi_object_prototype_to_string(duk_context *ctx);"));
    assert!(out.header.starts_with("/*"));
    assert!(out.header.contains("#if !defined(DUK_BUILTINS_H_INCLUDED)"));
}

#[test]
fn test_ram_source_tables() {
    let out = run(&[], &ActiveConfig::default(), &options());

    assert!(out.source.contains("#include \"duk_internal.h\""));
    assert!(out
        .source
        .contains("DUK_INTERNAL const duk_c_function duk_bi_native_functions[4] = {"));
    let natives = out.source.find("\tNULL,").unwrap();
    let function_proto = out.source.find("\tduk_bi_function_prototype,").unwrap();
    let constructor = out.source.find("\tduk_bi_object_constructor,").unwrap();
    assert!(natives < function_proto && function_proto < constructor);

    assert!(out.source.contains("duk_strings_data["));
    assert!(out.source.contains("#if defined(DUK_USE_DOUBLE_LE)"));
    assert!(out.source.contains("#elif defined(DUK_USE_DOUBLE_BE)"));
    assert!(out.source.contains("#elif defined(DUK_USE_DOUBLE_ME)"));
    assert!(out
        .source
        .contains("#error ROM support not enabled, rerun configure.py with --rom-support"));
}

#[test]
fn test_metadata_json() {
    let out = run(&[], &ActiveConfig::default(), &options());
    let meta: Value = serde_json::from_str(&out.metadata_json).unwrap();

    assert_eq!(meta["duk_version"], 20700);
    assert_eq!(meta["duk_version_string"], "2.7.0");
    assert_eq!(meta["git_commit"], "0123abc");
    assert_eq!(meta["git_describe"], "v2.7.0");
    let strings: Vec<&str> = meta["builtin_strings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert_eq!(strings, vec!["Object", "length", "name", "prototype", "break", "implements"]);
    assert_eq!(meta["builtin_strings_base64"][0], "T2JqZWN0");
    assert_eq!(meta["builtin_strings_info"][0]["define"], "DUK_STRIDX_UC_OBJECT");
}

#[test]
fn test_unreachable_objects_pruned() {
    let out = run(&[], &ActiveConfig::default(), &options());
    let ram: Value = serde_json::from_str(&out.ram_dump).unwrap();

    assert!(object(&ram, "bi_unused").is_none());
    let to_string = object(&ram, "subobj_0").unwrap();
    assert_eq!(to_string["native"], "duk_bi_object_prototype_to_string");
    assert_eq!(to_string["nargs"], 0);

    let names: Vec<&Value> = ram["objects"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|o| property(o, "name"))
        .collect();
    assert_eq!(names.len(), 3);
}

#[test]
fn test_present_if_filter() {
    let out = run(&[], &ActiveConfig::default(), &options());
    let ram: Value = serde_json::from_str(&out.ram_dump).unwrap();
    let global = object(&ram, "bi_global").unwrap();
    assert_eq!(property(global, "debugOnly").unwrap()["value"], true);

    let mut active = ActiveConfig::default();
    active.set("DUK_USE_DEBUG_HOOKS", false);
    let out = run(&[], &active, &options());
    let ram: Value = serde_json::from_str(&out.ram_dump).unwrap();
    let global = object(&ram, "bi_global").unwrap();
    assert!(property(global, "debugOnly").is_none());
}

#[test]
fn test_excluded_entries_skip_normalization() {
    let user = MetadataDocument::from_yaml_str(
        r#"
objects:
  - id: bi_global
    modify: true
    properties:
      - { key: debugFn, value: { type: object, id: bi_debug_fn }, present_if: DUK_USE_DEBUG_HOOKS }
      - key: debugHook
        value: { type: function, native: duk_bi_debug_hook, length: 0 }
        present_if: DUK_USE_DEBUG_HOOKS
  - id: bi_debug_fn
    class: Function
    native: duk_bi_debug_fn
    callable: true
    present_if: DUK_USE_DEBUG_HOOKS
    properties: []
"#,
    )
    .unwrap();
    let mut active = ActiveConfig::default();
    active.set("DUK_USE_DEBUG_HOOKS", false);

    let out = run(&[user.clone()], &active, &options());
    let ram: Value = serde_json::from_str(&out.ram_dump).unwrap();
    assert!(object(&ram, "bi_debug_fn").is_none());
    let global = object(&ram, "bi_global").unwrap();
    assert!(property(global, "debugFn").is_none());
    assert!(property(global, "debugHook").is_none());
    // Dropped shorthand consumes no synthetic id
    assert_eq!(object(&ram, "subobj_0").unwrap()["native"], "duk_bi_object_prototype_to_string");

    // Without the option known to be false the callable has no nargs
    let err = compile(&base(), &[user], &ActiveConfig::default(), &used("DUK"), &options()).unwrap_err();
    assert!(matches!(err, BuiltinsError::MissingNargs { ref id } if id == "bi_debug_fn"));
}

#[test]
fn test_accessor_magic_equal_after_resolution() {
    let accessor = |setter_magic: &str| {
        MetadataDocument::from_yaml_str(&format!(
            r#"
objects:
  - id: bi_global
    modify: true
    properties:
      - key: acc
        value: {{ type: accessor, getter: duk_bi_acc_get, setter: duk_bi_acc_set, getter_magic: 1, setter_magic: {} }}
"#,
            setter_magic
        ))
        .unwrap()
    };

    let out = run(&[accessor("{ type: plain, value: 1 }")], &ActiveConfig::default(), &options());
    assert!(out.source.contains("\tduk_bi_acc_get,"));

    let err = compile(
        &base(),
        &[accessor("2")],
        &ActiveConfig::default(),
        &used("DUK"),
        &options(),
    )
    .unwrap_err();
    assert!(matches!(err, BuiltinsError::AccessorMagicMismatch { ref key, .. } if key == "acc"));
}

#[test]
fn test_overrides_applied() {
    let user = MetadataDocument::from_yaml_str(
        r#"
objects:
  - id: bi_global
    modify: true
    properties:
      - { key: answer, value: 42, add: true }
      - { key: extra, value: { type: object, id: bi_extra } }
      - { key: NaN, delete: true }
  - id: bi_extra
    class: Object
    internal_prototype: bi_object_prototype
    properties:
      - { key: greeting, value: "hello" }
add_forced_strings:
  - str: "forcedString"
"#,
    )
    .unwrap();
    let out = run(&[user], &ActiveConfig::default(), &options());
    let ram: Value = serde_json::from_str(&out.ram_dump).unwrap();
    let global = object(&ram, "bi_global").unwrap();

    assert_eq!(property(global, "answer").unwrap()["value"], 42.0);
    assert_eq!(property(global, "extra").unwrap()["value"]["id"], "bi_extra");
    assert!(property(global, "NaN").is_none());
    assert!(object(&ram, "bi_extra").is_some());

    // Non-bidx objects without a native are top level in RAM
    assert!(out.header.contains("#define DUK_NUM_ALL_BUILTINS 5"));

    let rom: Value = serde_json::from_str(&out.rom_dump).unwrap();
    let rom_strings: Vec<&Value> = rom["strings"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["str"] == "forcedString" || s["str"] == "greeting")
        .collect();
    assert_eq!(rom_strings.len(), 2);
}

#[test]
fn test_override_errors() {
    let add_existing = MetadataDocument::from_yaml_str("objects: [ { id: bi_global, class: Object } ]").unwrap();
    let err = compile(
        &base(),
        &[add_existing],
        &ActiveConfig::default(),
        &used("DUK"),
        &options(),
    )
    .unwrap_err();
    assert!(matches!(err, BuiltinsError::ObjectExists { .. }));

    let delete_missing =
        MetadataDocument::from_yaml_str("objects: [ { id: bi_nothing, delete: true } ]").unwrap();
    let err = compile(
        &base(),
        &[delete_missing],
        &ActiveConfig::default(),
        &used("DUK"),
        &options(),
    )
    .unwrap_err();
    assert!(matches!(err, BuiltinsError::ObjectNotFound { .. }));

    let err = MetadataDocument::from_yaml_str("add_objects: []").unwrap_err();
    assert!(matches!(err, BuiltinsError::RemovedKey { .. }));
}

#[test]
fn test_missing_define_aborts() {
    let mut used = used("DUK");
    used.used_stridx_defines.push("DUK_STRIDX_NOT_THERE".to_string());
    let err = compile(&base(), &[], &ActiveConfig::default(), &used, &options()).unwrap_err();
    assert!(matches!(err, BuiltinsError::MissingDefine { define } if define == "DUK_STRIDX_NOT_THERE"));
}

#[test]
fn test_rom_build_with_lightfuncs() {
    let options = CompileOptions {
        rom_support: true,
        rom_auto_lightfunc: true,
        ..options()
    };
    let out = run(&[], &ActiveConfig::default(), &options);
    let rom: Value = serde_json::from_str(&out.rom_dump).unwrap();

    assert_eq!(rom["mode"], "ROM");
    assert!(object(&rom, "subobj_0").is_none());
    let proto = object(&rom, "bi_object_prototype").unwrap();
    let to_string = &property(proto, "toString").unwrap()["value"];
    assert_eq!(to_string["type"], "lightfunc");
    assert_eq!(to_string["native"], "duk_bi_object_prototype_to_string");
    assert_eq!(to_string["nargs"], 0);

    // ROM properties are never configurable
    assert_eq!(property(proto, "constructor").unwrap()["attributes"], "w");

    assert!(out.source.contains("duk_rom_strings_lookup[256]"));
    assert!(out.source.contains("duk_rom_strings_stridx[6]"));
    assert!(out.header.contains("duk_rom_builtins_bidx[4]"));
    assert!(out.header.contains("#if (DUK_USE_ROM_PTRCOMP_FIRST != 63488L)"));

    // RAM output is still produced alongside
    assert!(out.source.contains("duk_bi_native_functions[4]"));
}

#[test]
fn test_rom_only_build() {
    let options = CompileOptions {
        ram_support: false,
        rom_support: true,
        ..options()
    };
    let out = run(&[], &ActiveConfig::default(), &options);
    assert!(out
        .source
        .contains("#error RAM support not enabled, rerun configure.py with --ram-support"));
    assert!(!out.source.contains("duk_bi_native_functions"));
    assert!(!out.source.contains("duk_strings_data"));
}

#[test]
fn test_define_prefix() {
    let options = CompileOptions {
        define_prefix: "XYZ".to_string(),
        ..options()
    };
    let out = run(&[], &ActiveConfig::default(), &options);
    assert!(out.header.contains("#if !defined(XYZ_BUILTINS_H_INCLUDED)"));
    assert!(out.header.contains("#define XYZ_STRIDX_LENGTH 1"));
    assert!(out.header.contains("#define XYZ_BIDX_GLOBAL 0"));
    assert!(!out.header.contains("DUK_STRIDX_LENGTH"));
    // Runtime configuration names are not prefixed
    assert!(out.header.contains("#if defined(DUK_USE_ROM_STRINGS)"));
}

#[test]
fn test_output_is_deterministic() {
    let options = CompileOptions {
        rom_support: true,
        ..options()
    };
    let first = run(&[], &ActiveConfig::default(), &options);
    let second = run(&[], &ActiveConfig::default(), &options);
    assert_eq!(first, second);
}
