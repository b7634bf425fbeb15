//! Builtin string table: duplicate merging, define names and stridx order

use crate::config::CompilerContext;
use crate::error::{BuiltinsError, BuiltinsResult};
use crate::metadata::model::{Bytes, StringEntry};
use crate::text::bytes_to_text;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid camel case pattern"));

/// Defines the runtime gets for free, never backed by a string.
const AUTOMATIC_DEFINES: [&str; 4] = [
    "STRIDX_START_RESERVED",
    "STRIDX_START_STRICT_RESERVED",
    "STRIDX_END_RESERVED",
    "STRIDX_TO_TOK",
];

/// A string with its C define name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedString {
    pub entry: StringEntry,
    pub define: String,
    /// Referenced by runtime sources, or a reserved word
    pub stridx_used: bool,
}

impl NamedString {
    pub fn bytes(&self) -> &[u8] {
        &self.entry.bytes
    }
}

/// Ordered string lists for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringTable {
    /// Every merged string, in document order
    pub strings: Vec<NamedString>,
    /// Strings with a stridx; position is the stridx
    pub stridx: Vec<NamedString>,
}

impl StringTable {
    /// Build the table from the normalized string list.
    pub fn build(
        strings: &[StringEntry],
        special_define_names: &[(Bytes, String)],
        reserved_word_token_order: &[Bytes],
        ctx: &CompilerContext,
    ) -> BuiltinsResult<Self> {
        let merged = merge_string_entries(strings)?;
        let mut named: Vec<NamedString> = merged
            .into_iter()
            .map(|entry| {
                let define = define_name(&entry.bytes, special_define_names, &ctx.define_prefix);
                debug!("stridx define: {}", define);
                NamedString {
                    entry,
                    define,
                    stridx_used: false,
                }
            })
            .collect();
        mark_used(&mut named, &ctx.used_defines.used_stridx_defines, &ctx.define_prefix)?;
        let stridx = order_stridx(&named, reserved_word_token_order)?;
        info!("{} strings, {} with stridx", named.len(), stridx.len());
        Ok(Self {
            strings: named,
            stridx,
        })
    }

    /// bytes -> stridx
    pub fn stridx_map(&self) -> FxHashMap<Bytes, usize> {
        self.stridx
            .iter()
            .enumerate()
            .map(|(i, s)| (s.entry.bytes.clone(), i))
            .collect()
    }

    /// First reserved word, or the end of the list if there are none.
    pub fn start_reserved(&self) -> usize {
        self.stridx
            .iter()
            .position(|s| s.entry.is_reserved_word())
            .unwrap_or(self.stridx.len())
    }

    /// First strict mode reserved word, or the end of the list.
    pub fn start_strict_reserved(&self) -> usize {
        self.stridx
            .iter()
            .position(|s| s.entry.is_strict_reserved_word())
            .unwrap_or(self.stridx.len())
    }

    /// Exclusive end of the reserved word range.
    pub fn end_reserved(&self) -> usize {
        self.stridx.len()
    }
}

/// Merge duplicates. The last entry wins its position; a field set to two
/// different values is an error.
pub fn merge_string_entries(strings: &[StringEntry]) -> BuiltinsResult<Vec<StringEntry>> {
    fn merge_field(
        prev: &mut Option<bool>,
        next: Option<bool>,
        s: &[u8],
        field: &'static str,
    ) -> BuiltinsResult<()> {
        match (*prev, next) {
            (Some(a), Some(b)) if a != b => Err(BuiltinsError::ConflictingString {
                string: bytes_to_text(s),
                field,
            }),
            (_, Some(b)) => {
                *prev = Some(b);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    let mut out: Vec<StringEntry> = Vec::with_capacity(strings.len());
    let mut seen: FxHashMap<Bytes, usize> = FxHashMap::default();
    for s in strings.iter().rev() {
        match seen.get(&s.bytes) {
            Some(&idx) => {
                let prev = &mut out[idx];
                merge_field(&mut prev.class_name, s.class_name, &s.bytes, "class_name")?;
                merge_field(&mut prev.reserved_word, s.reserved_word, &s.bytes, "reserved_word")?;
                merge_field(
                    &mut prev.future_reserved_word_strict,
                    s.future_reserved_word_strict,
                    &s.bytes,
                    "future_reserved_word_strict",
                )?;
            }
            None => {
                seen.insert(s.bytes.clone(), out.len());
                out.push(s.clone());
            }
        }
    }
    out.reverse();
    Ok(out)
}

/// C define name of a string, e.g. `DUK_STRIDX_TO_STRING` for `toString`.
pub fn define_name(bytes: &[u8], special: &[(Bytes, String)], prefix: &str) -> String {
    if let Some((_, name)) = special.iter().find(|(s, _)| s == bytes) {
        return format!("{}_STRIDX_{}", prefix, name);
    }

    let (kind, body) = match bytes {
        [0x82, rest @ ..] => ("STRIDX_INT_", rest),
        [0x81, rest @ .., 0xff] => ("STRIDX_WELLKNOWN_", rest),
        _ => ("STRIDX_", bytes),
    };
    let text = bytes_to_text(body);
    let snake = CAMEL_BOUNDARY.replace_all(&text, "${1}_${2}");
    format!("{}_{}{}", prefix, kind, snake.replace('.', "_").to_ascii_uppercase())
}

fn mark_used(strings: &mut [NamedString], used_defines: &[String], prefix: &str) -> BuiltinsResult<()> {
    let needed: FxHashSet<&str> = used_defines.iter().map(String::as_str).collect();
    let mut found: FxHashSet<String> = AUTOMATIC_DEFINES
        .iter()
        .map(|d| format!("{}_{}", prefix, d))
        .collect();

    for s in strings.iter_mut() {
        if needed.contains(s.define.as_str()) {
            s.stridx_used = true;
            found.insert(s.define.clone());
        }
        if s.entry.is_reserved_word() {
            s.stridx_used = true;
        }
    }

    let mut missing: Vec<&str> = needed
        .iter()
        .copied()
        .filter(|d| !found.contains(*d))
        .collect();
    missing.sort_unstable();
    match missing.first() {
        Some(define) => Err(BuiltinsError::MissingDefine {
            define: define.to_string(),
        }),
        None => Ok(()),
    }
}

fn category(s: &StringEntry) -> u8 {
    if s.is_reserved_word() {
        if s.is_strict_reserved_word() {
            4
        } else {
            3
        }
    } else if s.needs_8bit_index() {
        1
    } else {
        2
    }
}

/// Order used strings: 8-bit index strings, other strings, then reserved
/// words in exact lexer token order.
pub fn order_stridx(strings: &[NamedString], token_order: &[Bytes]) -> BuiltinsResult<Vec<NamedString>> {
    let used: Vec<&NamedString> = strings.iter().filter(|s| s.stridx_used).collect();

    let mut keywords = Vec::with_capacity(token_order.len());
    for token in token_order {
        let s = used
            .iter()
            .find(|s| s.bytes() == token.as_slice())
            .ok_or_else(|| BuiltinsError::MissingReservedWord {
                string: bytes_to_text(token),
            })?;
        keywords.push((*s).clone());
    }

    let mut rest: Vec<NamedString> = used
        .into_iter()
        .filter(|s| !token_order.iter().any(|t| t.as_slice() == s.bytes()))
        .cloned()
        .collect();
    // Vec::sort_by_key is stable
    rest.sort_by_key(|s| category(&s.entry));

    for (index, s) in rest.iter().enumerate() {
        if s.entry.needs_8bit_index() && index >= 256 {
            return Err(BuiltinsError::EightBitIndex {
                string: bytes_to_text(s.bytes()),
                index,
            });
        }
    }

    rest.extend(keywords);
    Ok(rest)
}
