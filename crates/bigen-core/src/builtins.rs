//! Frozen builtin table
//!
//! After pruning and indexing the object list stops changing. Freezing
//! resolves every object reference into an arena index, resolves magic
//! with the final bidx map and, for ROM builds, adds every string the
//! objects use to the string list. Encoders only ever see this form.

use crate::config::{BuildMode, CompilerContext};
use crate::error::{BuiltinsError, BuiltinsResult};
use crate::index::bidx_map;
use crate::magic;
use crate::metadata::model::{
    Attributes, Bytes, Metadata, ObjectClass, PropValue, StringEntry, StringOrigin,
};
use crate::strings::{define_name, NamedString, StringTable};
use crate::text::bytes_to_text;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

/// Index into [`Builtins::objects`].
pub type ObjIdx = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinProperty {
    pub key: Bytes,
    pub value: PropValue<ObjIdx>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Builtin {
    pub id: String,
    pub class: ObjectClass,
    pub internal_prototype: Option<ObjIdx>,
    pub native: Option<String>,
    pub callable: bool,
    pub constructable: bool,
    pub special_call: bool,
    pub nargs: Option<i64>,
    pub varargs: bool,
    pub magic: i16,
    pub bidx: Option<usize>,
    pub objenv_target: Option<ObjIdx>,
    pub objenv_has_this: bool,
    pub properties: Vec<BuiltinProperty>,
}

impl Builtin {
    pub fn property(&self, key: &[u8]) -> Option<&BuiltinProperty> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Integer `length` property, if any.
    pub fn length(&self) -> Option<i64> {
        self.property(b"length").and_then(|p| p.value.as_integer())
    }
}

/// The final, index-linked builtin table for one build mode.
#[derive(Debug, Clone)]
pub struct Builtins {
    pub mode: BuildMode,
    pub objects: Vec<Builtin>,
    pub num_bidx: usize,
    pub strings: StringTable,
    /// RAM only: objects needing a value stack slot during init
    pub ram_toplevel: Vec<ObjIdx>,
    ramidx: Vec<Option<usize>>,
}

impl Builtins {
    /// Freeze pruned, indexed metadata.
    pub fn freeze(metadata: &Metadata, mut strings: StringTable, ctx: &CompilerContext) -> BuiltinsResult<Self> {
        let positions: FxHashMap<&str, ObjIdx> = metadata
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.id.as_str(), i))
            .collect();
        let bidx = bidx_map(metadata);

        let mut objects = Vec::with_capacity(metadata.objects.len());
        for obj in &metadata.objects {
            let resolve = |target: &String| -> BuiltinsResult<ObjIdx> {
                positions
                    .get(target.as_str())
                    .copied()
                    .ok_or_else(|| BuiltinsError::DanglingReference {
                        object: obj.id.clone(),
                        target: target.clone(),
                    })
            };

            let properties = obj
                .properties
                .iter()
                .map(|p| {
                    Ok(BuiltinProperty {
                        key: p.key.clone(),
                        value: p.value.map_refs(resolve)?,
                        attributes: p.attributes,
                    })
                })
                .collect::<BuiltinsResult<Vec<_>>>()?;

            objects.push(Builtin {
                id: obj.id.clone(),
                class: obj.class,
                internal_prototype: obj.internal_prototype.as_ref().map(resolve).transpose()?,
                native: obj.native.clone(),
                callable: obj.callable,
                constructable: obj.constructable,
                special_call: obj.special_call,
                nargs: obj.nargs,
                varargs: obj.varargs.unwrap_or(false),
                magic: magic::resolve(obj.magic.as_ref(), &bidx)?,
                bidx: bidx.get(&obj.id).copied(),
                objenv_target: obj.objenv_target.as_ref().map(resolve).transpose()?,
                objenv_has_this: obj.objenv_has_this,
                properties,
            });
        }

        if ctx.mode == BuildMode::Rom {
            add_missing_strings(&mut strings, metadata, ctx);
        }

        let mut builtins = Self {
            mode: ctx.mode,
            objects,
            num_bidx: bidx.len(),
            strings,
            ram_toplevel: Vec::new(),
            ramidx: Vec::new(),
        };
        if ctx.mode == BuildMode::Ram {
            builtins.prepare_ram_toplevel();
        }

        info!(
            "Prepared {} metadata: {} objects, {} objects with bidx, {} strings, {} strings with stridx",
            ctx.mode.name(),
            builtins.objects.len(),
            builtins.num_bidx,
            builtins.strings.strings.len(),
            builtins.strings.stridx.len()
        );
        Ok(builtins)
    }

    /// Objects with a bidx, plus objects not covered inline by a native
    /// function property.
    fn prepare_ram_toplevel(&mut self) {
        self.ramidx = vec![None; self.objects.len()];
        for (i, obj) in self.objects.iter().enumerate() {
            if obj.bidx.is_some() || obj.native.is_none() {
                self.ramidx[i] = Some(self.ram_toplevel.len());
                self.ram_toplevel.push(i);
            }
        }
        debug!(
            "Filtered RAM object list: {} objects with bidx, {} total top level objects",
            self.num_bidx,
            self.ram_toplevel.len()
        );
    }

    /// Position in the RAM top level list.
    pub fn ramidx(&self, idx: ObjIdx) -> BuiltinsResult<usize> {
        self.ramidx
            .get(idx)
            .copied()
            .flatten()
            .ok_or_else(|| BuiltinsError::NotTopLevel {
                id: self.objects[idx].id.clone(),
            })
    }

    pub fn object_index(&self, id: &str) -> Option<ObjIdx> {
        self.objects.iter().position(|o| o.id == id)
    }

    /// Objects with a bidx, in bidx order.
    pub fn bidx_objects(&self) -> &[Builtin] {
        &self.objects[..self.num_bidx]
    }

    /// Native function table: index 0 is reserved for NULL, the rest are
    /// sorted by name.
    pub fn native_functions(&self) -> Vec<Option<String>> {
        let mut found: FxHashSet<&str> = FxHashSet::default();
        for obj in &self.objects {
            found.extend(obj.native.as_deref());
            for prop in &obj.properties {
                for target in prop.value.object_refs() {
                    found.extend(self.objects[*target].native.as_deref());
                }
            }
        }
        let mut names: Vec<&str> = found.into_iter().collect();
        names.sort_unstable();

        let mut table = Vec::with_capacity(names.len() + 1);
        table.push(None);
        table.extend(names.into_iter().map(|n| Some(n.to_string())));
        table
    }

    /// Native names needing a C declaration: object natives and lightfunc
    /// natives, first use order, no duplicates.
    pub fn native_declarations(&self) -> Vec<String> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut out = Vec::new();
        for obj in &self.objects {
            let lightfuncs = obj.properties.iter().filter_map(|p| match &p.value {
                PropValue::Lightfunc(lf) => Some(lf.native.as_str()),
                _ => None,
            });
            for name in obj.native.as_deref().into_iter().chain(lightfuncs) {
                if seen.insert(name) {
                    out.push(name.to_string());
                }
            }
        }
        out
    }
}

fn add_missing_strings(strings: &mut StringTable, metadata: &Metadata, ctx: &CompilerContext) {
    let mut have: FxHashSet<Bytes> = strings
        .strings
        .iter()
        .map(|s| s.entry.bytes.clone())
        .collect();
    let mut push = |strings: &mut StringTable, entry: StringEntry| {
        if have.insert(entry.bytes.clone()) {
            debug!("Add missing string: {}", bytes_to_text(&entry.bytes));
            let define = define_name(&entry.bytes, &metadata.special_define_names, &ctx.define_prefix);
            strings.strings.push(NamedString {
                entry,
                define,
                stridx_used: false,
            });
        }
    };

    let mut added_refs = 0;
    for prop in metadata.objects.iter().flat_map(|o| o.properties.iter()) {
        let before = strings.strings.len();
        push(strings, StringEntry::new(prop.key.clone(), StringOrigin::Referenced));
        if let PropValue::String(s) = &prop.value {
            push(strings, StringEntry::new(s.clone(), StringOrigin::Referenced));
        }
        added_refs += strings.strings.len() - before;
    }

    let before = strings.strings.len();
    for forced in &metadata.forced_strings {
        push(strings, forced.clone());
    }
    let added_forced = strings.strings.len() - before;
    info!(
        "{} strings added ({} property key references, {} user strings)",
        added_refs + added_forced,
        added_refs,
        added_forced
    );
}
