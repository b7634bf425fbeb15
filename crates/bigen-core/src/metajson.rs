//! Build metadata JSON: version info and the builtin string list

use crate::config::BuildInfo;
use crate::error::BuiltinsResult;
use crate::strings::StringTable;
use crate::text::bytes_to_text;
use base64::Engine;
use serde::Serialize;

/// Fields are declared in alphabetical order so the output has sorted keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildMetadata {
    pub builtin_strings: Vec<String>,
    pub builtin_strings_base64: Vec<String>,
    pub builtin_strings_info: Vec<StringInfo>,
    pub comment: String,
    pub duk_version: u32,
    pub duk_version_string: String,
    pub git_branch: Option<String>,
    pub git_commit: Option<String>,
    pub git_describe: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringInfo {
    pub base64: String,
    pub define: String,
    pub plain: String,
}

impl BuildMetadata {
    /// Collect metadata for the stridx strings of a build.
    pub fn new(info: &BuildInfo, strings: &StringTable) -> Self {
        let engine = base64::engine::general_purpose::STANDARD;
        let info_list: Vec<StringInfo> = strings
            .stridx
            .iter()
            .map(|s| StringInfo {
                base64: engine.encode(s.bytes()),
                define: s.define.clone(),
                plain: bytes_to_text(s.bytes()),
            })
            .collect();

        Self {
            builtin_strings: info_list.iter().map(|s| s.plain.clone()).collect(),
            builtin_strings_base64: info_list.iter().map(|s| s.base64.clone()).collect(),
            builtin_strings_info: info_list,
            comment: "Metadata for Duktape sources".to_string(),
            duk_version: info.version,
            duk_version_string: info.version_string(),
            git_branch: info.git_branch.clone(),
            git_commit: info.git_commit.clone(),
            git_describe: info.git_describe.clone(),
        }
    }

    /// Pretty JSON, 4 space indent, ASCII only.
    pub fn to_json(&self) -> BuiltinsResult<String> {
        to_ascii_json(self)
    }
}

/// Serialize with 4 space indentation and `\uXXXX` escapes for every
/// non-ASCII character.
pub fn to_ascii_json<T: Serialize>(value: &T) -> BuiltinsResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    let text = String::from_utf8_lossy(&buf);

    // Outside string literals JSON is pure ASCII, so escaping every
    // non-ASCII char only touches string contents
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    Ok(out)
}
