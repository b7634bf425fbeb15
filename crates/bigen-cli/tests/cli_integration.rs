//! Integration tests for the bigen binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const STRINGS: &str = r#"
strings:
  - str: "length"
  - str: "name"
  - str: "break"
    reserved_word: true
reserved_word_token_order: [ "break" ]
"#;

const OBJECTS: &str = r#"
objects:
  - id: bi_global
    class: global
    bidx: true
    properties:
      - { key: isNaN, value: { type: function, native: duk_bi_global_object_is_nan, length: 1 } }
      - { key: undefined, value: { type: undefined }, attributes: "" }
"#;

const OVERRIDE: &str = r#"
objects:
  - id: bi_global
    modify: true
    properties:
      - { key: myValue, value: 3 }
"#;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new(used_defines: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("strings.yaml"), STRINGS).unwrap();
        fs::write(dir.path().join("objects.yaml"), OBJECTS).unwrap();
        fs::write(dir.path().join("user.yaml"), OVERRIDE).unwrap();
        fs::write(dir.path().join("used.json"), used_defines).unwrap();
        fs::write(dir.path().join("active.json"), r#"{"DUK_USE_ROM_STRINGS": false}"#).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, extra: &[&str]) -> Output {
        let p = |name: &str| self.path(name).display().to_string();
        let args = [
            ("--strings-metadata", p("strings.yaml")),
            ("--objects-metadata", p("objects.yaml")),
            ("--builtin-file", p("user.yaml")),
            ("--used-stridx-metadata", p("used.json")),
            ("--active-options", p("active.json")),
            ("--duk-version", "20700".to_string()),
            ("--git-commit", "feedbeef".to_string()),
            ("--out-header", p("duk_builtins.h")),
            ("--out-source", p("duk_builtins.c")),
            ("--out-metadata-json", p("duk_build_meta.json")),
        ];
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bigen"));
        for (flag, value) in &args {
            cmd.arg(flag).arg(value);
        }
        cmd.args(extra).output().unwrap()
    }
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap()
}

#[test]
fn test_generates_all_outputs() {
    let ws = Workspace::new(r#"{"used_stridx_defines": ["DUK_STRIDX_LENGTH"]}"#);
    let ram_dump = ws.path("ram.json").display().to_string();
    let out = ws.run(&["--ram-support", "--quiet", "--dev-dump-final-ram-metadata", &ram_dump]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let header = fs::read_to_string(ws.path("duk_builtins.h")).unwrap();
    assert!(header.contains("#define DUK_STRIDX_LENGTH 0"));
    assert!(header.contains(" *  Git commit: feedbeef"));

    let source = fs::read_to_string(ws.path("duk_builtins.c")).unwrap();
    assert!(source.contains("\tduk_bi_global_object_is_nan,"));

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(ws.path("duk_build_meta.json")).unwrap()).unwrap();
    assert_eq!(meta["duk_version_string"], "2.7.0");
    assert_eq!(meta["git_commit"], "feedbeef");

    let dump = fs::read_to_string(ws.path("ram.json")).unwrap();
    assert!(dump.contains("myValue"));
    assert!(!exists(&ws.path("rom.json")));
}

#[test]
fn test_failure_writes_nothing() {
    let ws = Workspace::new(r#"{"used_stridx_defines": ["DUK_STRIDX_NO_SUCH_STRING"]}"#);
    let out = ws.run(&["--ram-support"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("DUK_STRIDX_NO_SUCH_STRING"), "stderr: {}", stderr);

    assert!(!exists(&ws.path("duk_builtins.h")));
    assert!(!exists(&ws.path("duk_builtins.c")));
    assert!(!exists(&ws.path("duk_build_meta.json")));
}

#[test]
fn test_missing_input_file() {
    let ws = Workspace::new(r#"{"used_stridx_defines": []}"#);
    fs::remove_file(ws.path("objects.yaml")).unwrap();
    let out = ws.run(&["--ram-support"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("objects.yaml"), "stderr: {}", stderr);
}
