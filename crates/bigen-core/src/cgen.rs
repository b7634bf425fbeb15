//! C source text generation
//!
//! [`CWriter`] is a plain line writer. [`render_source`] and
//! [`render_header`] assemble the two generated files; RAM and ROM parts are
//! selected by the runtime's `DUK_USE_ROM_STRINGS` / `DUK_USE_ROM_OBJECTS`
//! options and a disabled variant becomes an `#error` branch.

use crate::builtins::Builtins;
use crate::config::BuildInfo;
use crate::error::BuiltinsResult;
use crate::index::bidx_define_suffix;
use crate::ram::{DoubleByteOrder, RamInitData};
use crate::rom::{RomImage, ROMPTR_FIRST};
use crate::strings::StringTable;
use crate::text::escape_bytes;
use std::fmt::{Display, Write};

/// Name stamped into generated file banners.
pub const GENERATOR_NAME: &str = "bigen";

/// Values per line in byte array initializers.
const ARRAY_VALUES_PER_LINE: usize = 20;

/// Line oriented writer for generated C code.
#[derive(Debug, Default)]
pub struct CWriter {
    out: String,
}

impl CWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Autogenerated banner with version and git info.
    pub fn emit_header(&mut self, generator: &str, info: &BuildInfo) {
        self.line("/*");
        self.line(format!(" *  Automatically generated by {}, do not edit!", generator));
        self.line(" *");
        self.line(format!(" *  Version: {}", info.version_string()));
        if let Some(describe) = &info.git_describe {
            self.line(format!(" *  Git describe: {}", describe));
        }
        if let Some(commit) = &info.git_commit {
            self.line(format!(" *  Git commit: {}", commit));
        }
        if let Some(branch) = &info.git_branch {
            self.line(format!(" *  Git branch: {}", branch));
        }
        self.line(" */");
        self.line("");
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    /// Emit a multi-line block verbatim.
    pub fn block(&mut self, text: &str) {
        for line in text.lines() {
            self.line(line);
        }
    }

    pub fn define(&mut self, name: &str, value: impl Display) {
        let _ = writeln!(self.out, "#define {} {}", name, value);
    }

    pub fn define_with_comment(&mut self, name: &str, value: impl Display, comment: &str) {
        let _ = writeln!(self.out, "#define {} {}  /* {} */", name, value, comment);
    }

    /// `<visibility> const <typename> <name>[N] = { ... };`
    pub fn byte_array(&mut self, visibility: &str, typename: &str, name: &str, data: &[u8]) {
        let _ = writeln!(
            self.out,
            "{} const {} {}[{}] = {{",
            visibility,
            typename,
            name,
            data.len()
        );
        for chunk in data.chunks(ARRAY_VALUES_PER_LINE) {
            let values: Vec<String> = chunk.iter().map(|b| b.to_string()).collect();
            let _ = writeln!(self.out, "{},", values.join(","));
        }
        self.line("};");
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

/// C integer literal for a byte: values above 127 get a `U` suffix.
pub fn byte_literal(b: u8) -> String {
    if b >= 128 {
        format!("{}U", b)
    } else {
        b.to_string()
    }
}

/// Everything the generated files are rendered from.
pub struct RenderInput<'a> {
    pub info: &'a BuildInfo,
    /// Prefix of the defines this generator produces
    pub prefix: &'a str,
    pub ram: Option<(&'a Builtins, &'a RamInitData)>,
    pub rom: Option<(&'a Builtins, &'a RomImage)>,
}

const RAM_DISABLED: &str = "#error RAM support not enabled, rerun configure.py with --ram-support";
const ROM_DISABLED: &str = "#error ROM support not enabled, rerun configure.py with --rom-support";

/// Render the builtins C source file.
pub fn render_source(input: &RenderInput<'_>) -> BuiltinsResult<String> {
    let mut w = CWriter::new();
    w.emit_header(GENERATOR_NAME, input.info);
    w.line("#include \"duk_internal.h\"");
    w.line("");
    w.line("#if defined(DUK_USE_ASSERTIONS)");
    w.line("#define DUK__REFCINIT(refc) 0 /*h_assert_refcount*/, (refc) /*actual*/");
    w.line("#else");
    w.line("#define DUK__REFCINIT(refc) (refc) /*actual*/");
    w.line("#endif");
    w.line("");

    w.line("#if defined(DUK_USE_ROM_STRINGS)");
    match input.rom {
        Some((_, image)) => {
            image.emit_strings_source(&mut w);
            image.emit_objects_source(&mut w)?;
        }
        None => w.line(ROM_DISABLED),
    }
    w.line("#else  /* DUK_USE_ROM_STRINGS */");
    match input.ram {
        Some((_, data)) => w.byte_array("DUK_INTERNAL", "duk_uint8_t", "duk_strings_data", &data.strings_data),
        None => w.line(RAM_DISABLED),
    }
    w.line("#endif  /* DUK_USE_ROM_STRINGS */");
    w.line("");

    w.line("#if defined(DUK_USE_ROM_OBJECTS)");
    if input.rom.is_some() {
        w.line("#if !defined(DUK_USE_ROM_STRINGS)");
        w.line("#error DUK_USE_ROM_OBJECTS requires DUK_USE_ROM_STRINGS");
        w.line("#endif");
        w.line("#if defined(DUK_USE_HSTRING_ARRIDX)");
        w.line("#error DUK_USE_HSTRING_ARRIDX is currently incompatible with ROM built-ins");
        w.line("#endif");
    } else {
        w.line(ROM_DISABLED);
    }
    w.line("#else  /* DUK_USE_ROM_OBJECTS */");
    match input.ram {
        Some((_, data)) => {
            w.line(format!("/* native functions: {} */", data.native_functions.len()));
            w.line(format!(
                "DUK_INTERNAL const duk_c_function duk_bi_native_functions[{}] = {{",
                data.native_functions.len()
            ));
            for native in &data.native_functions {
                match native {
                    Some(name) => w.line(format!("\t{},", name)),
                    None => w.line("\tNULL,"),
                }
            }
            w.line("};");
            per_byte_order(&mut w, |w, order| {
                w.byte_array("DUK_INTERNAL", "duk_uint8_t", "duk_builtins_data", data.objects(order));
            });
        }
        None => w.line(RAM_DISABLED),
    }
    w.line("#endif  /* DUK_USE_ROM_OBJECTS */");
    Ok(w.into_string())
}

/// Render the builtins C header file.
pub fn render_header(input: &RenderInput<'_>) -> String {
    let prefix = input.prefix;
    let guard = format!("{}_BUILTINS_H_INCLUDED", prefix);
    let mut w = CWriter::new();
    w.emit_header(GENERATOR_NAME, input.info);
    w.line(format!("#if !defined({})", guard));
    w.line(format!("#define {}", guard));
    w.line("");

    w.line("#if defined(DUK_USE_ROM_STRINGS)");
    match input.rom {
        Some((builtins, image)) => {
            emit_stridx_defines(&mut w, &builtins.strings, prefix);
            image.emit_strings_header(&mut w);
        }
        None => w.line(ROM_DISABLED),
    }
    w.line("#else  /* DUK_USE_ROM_STRINGS */");
    match input.ram {
        Some((builtins, data)) => {
            emit_stridx_defines(&mut w, &builtins.strings, prefix);
            w.line("#if !defined(DUK_SINGLE_FILE)");
            w.line(format!(
                "DUK_INTERNAL_DECL const duk_uint8_t duk_strings_data[{}];",
                data.strings_data.len()
            ));
            w.line("#endif  /* !DUK_SINGLE_FILE */");
            w.define(&format!("{}_STRDATA_MAX_STRLEN", prefix), data.max_strlen);
            w.define(&format!("{}_STRDATA_DATA_LENGTH", prefix), data.strings_data.len());
        }
        None => w.line(RAM_DISABLED),
    }
    w.line("#endif  /* DUK_USE_ROM_STRINGS */");
    w.line("");

    w.line("#if defined(DUK_USE_ROM_OBJECTS)");
    match input.rom {
        Some((_, image)) => {
            w.line("#if !defined(DUK_USE_ROM_PTRCOMP_FIRST)");
            w.line("#error missing DUK_USE_ROM_PTRCOMP_FIRST define");
            w.line("#endif");
            w.line(format!("#if (DUK_USE_ROM_PTRCOMP_FIRST != {}L)", ROMPTR_FIRST));
            w.line(format!(
                "#error DUK_USE_ROM_PTRCOMP_FIRST must match the generator ROM pointer base ({})",
                ROMPTR_FIRST
            ));
            w.line("#endif");
            emit_native_declarations(&mut w, &image.native_declarations);
            image.emit_objects_header(&mut w, prefix);
        }
        None => w.line(ROM_DISABLED),
    }
    w.line("#else  /* DUK_USE_ROM_OBJECTS */");
    match input.ram {
        Some((builtins, data)) => {
            emit_native_declarations(&mut w, &builtins.native_declarations());
            w.line("#if !defined(DUK_SINGLE_FILE)");
            w.line(format!(
                "DUK_INTERNAL_DECL const duk_c_function duk_bi_native_functions[{}];",
                data.native_functions.len()
            ));
            w.line("#endif  /* !DUK_SINGLE_FILE */");
            for (i, obj) in builtins.bidx_objects().iter().enumerate() {
                w.define(&format!("{}_{}", prefix, bidx_define_suffix(&obj.id)), i);
            }
            w.define(&format!("{}_NUM_BUILTINS", prefix), builtins.num_bidx);
            w.define(&format!("{}_NUM_BIDX_BUILTINS", prefix), builtins.num_bidx);
            w.define(&format!("{}_NUM_ALL_BUILTINS", prefix), builtins.ram_toplevel.len());
            per_byte_order(&mut w, |w, order| {
                let objects = data.objects(order);
                w.line("#if !defined(DUK_SINGLE_FILE)");
                w.line(format!(
                    "DUK_INTERNAL_DECL const duk_uint8_t duk_builtins_data[{}];",
                    objects.len()
                ));
                w.line("#endif  /* !DUK_SINGLE_FILE */");
                w.define(&format!("{}_BUILTINS_DATA_LENGTH", prefix), objects.len());
            });
        }
        None => w.line(RAM_DISABLED),
    }
    w.line("#endif  /* DUK_USE_ROM_OBJECTS */");
    w.line(format!("#endif  /* {} */", guard));
    w.into_string()
}

/// One `#if` branch per double byte order.
fn per_byte_order(w: &mut CWriter, mut emit: impl FnMut(&mut CWriter, DoubleByteOrder)) {
    for (n, order) in DoubleByteOrder::ALL.into_iter().enumerate() {
        let directive = if n == 0 { "#if" } else { "#elif" };
        w.line(format!("{} defined(DUK_{})", directive, order.config_option()));
        emit(w, order);
    }
    w.line("#else");
    w.line("#error invalid endianness defines");
    w.line("#endif");
}

/// Stridx defines, string accessor macros and reserved word ranges.
pub fn emit_stridx_defines(w: &mut CWriter, strings: &StringTable, prefix: &str) {
    for (i, s) in strings.stridx.iter().enumerate() {
        w.define_with_comment(&s.define, i, &escape_bytes(s.bytes()));
        let heap = s.define.replacen("_STRIDX", "_HEAP_STRING", 1);
        w.define(
            &format!("{}(heap)", heap),
            format!("DUK_HEAP_GET_STRING((heap),{})", s.define),
        );
        let thr = s.define.replacen("_STRIDX", "_HTHREAD_STRING", 1);
        w.define(
            &format!("{}(thr)", thr),
            format!("DUK_HTHREAD_GET_STRING((thr),{})", s.define),
        );
    }
    w.line("");
    w.define(&format!("{}_HEAP_NUM_STRINGS", prefix), strings.stridx.len());
    w.define(&format!("{}_STRIDX_START_RESERVED", prefix), strings.start_reserved());
    w.define(
        &format!("{}_STRIDX_START_STRICT_RESERVED", prefix),
        strings.start_strict_reserved(),
    );
    w.define_with_comment(
        &format!("{}_STRIDX_END_RESERVED", prefix),
        strings.end_reserved(),
        "exclusive endpoint",
    );
    w.line("");
    w.line("/* To convert a heap stridx to a token number, subtract");
    w.line(format!(
        " * {}_STRIDX_START_RESERVED and add DUK_TOK_START_RESERVED.",
        prefix
    ));
    w.line(" */");
}

/// Prototypes for every native function; runtime internals are `duk_`
/// prefixed, anything else is user code.
pub fn emit_native_declarations(w: &mut CWriter, names: &[String]) {
    for name in names {
        if name.starts_with("duk_") {
            w.line(format!("DUK_INTERNAL_DECL duk_ret_t {}(duk_context *ctx);", name));
        } else {
            w.line(format!("extern duk_ret_t {}(duk_context *ctx);", name));
        }
    }
}
