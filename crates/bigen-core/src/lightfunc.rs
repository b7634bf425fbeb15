//! Automatic lightfunc conversion for ROM builds
//!
//! A property pointing at a plain native function object can be replaced
//! by an inline lightfunc value when the function fits the packed flags
//! format. Conversion never fails: ineligible properties are left alone
//! and counted.

use crate::magic;
use crate::metadata::model::{Lightfunc, Metadata, ObjectEntry, PropValue, PropertyEntry};
use crate::text::bytes_to_text;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightfuncStats {
    pub converted: usize,
    pub skipped: usize,
}

/// Reasons a property was not converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotCallable,
    NoNative,
    ExtraProperty,
    NoAutoLightfunc,
    MagicUnresolved,
    LengthBounds,
    MagicBounds,
    NargsBounds,
}

/// Convert eligible function properties in place.
pub fn convert_lightfuncs(metadata: &mut Metadata) -> LightfuncStats {
    let mut stats = LightfuncStats::default();
    let mut conversions = Vec::new();

    for (oi, obj) in metadata.objects.iter().enumerate() {
        for (pi, prop) in obj.properties.iter().enumerate() {
            let Some(target_id) = prop.value.as_object() else {
                continue;
            };
            let Some(target) = metadata.object(target_id) else {
                continue;
            };
            match eligible(prop, target) {
                Ok(lf) => {
                    debug!(
                        "Convert to lightfunc: {} {} ({}) -> {:?}",
                        obj.id,
                        bytes_to_text(&prop.key),
                        target_id,
                        lf
                    );
                    conversions.push((oi, pi, lf));
                }
                Err(reasons) => {
                    debug!(
                        "Don't convert to lightfunc: {} {} ({}): {:?}",
                        obj.id,
                        bytes_to_text(&prop.key),
                        target_id,
                        reasons
                    );
                    stats.skipped += 1;
                }
            }
        }
    }

    for (oi, pi, lf) in conversions {
        metadata.objects[oi].properties[pi].value = PropValue::Lightfunc(lf);
        stats.converted += 1;
    }

    info!(
        "Converted {} built-in function properties to lightfuncs, {} skipped as non-eligible",
        stats.converted, stats.skipped
    );
    stats
}

/// Check one property; on rejection every failing reason is reported.
pub fn eligible(prop: &PropertyEntry, target: &ObjectEntry) -> Result<Lightfunc, Vec<Rejection>> {
    let mut reasons = Vec::new();

    if !target.callable {
        reasons.push(Rejection::NotCallable);
    }
    if target.native.is_none() {
        reasons.push(Rejection::NoNative);
    }

    let mut length = 0;
    for p in &target.properties {
        match p.key.as_slice() {
            b"length" => {
                if let Some(v) = p.value.as_integer() {
                    length = v;
                }
            }
            b"name" => {}
            _ => reasons.push(Rejection::ExtraProperty),
        }
    }

    if !prop.auto_lightfunc {
        reasons.push(Rejection::NoAutoLightfunc);
    }

    // bidx indices aren't final yet, so bidx magic never converts
    let magic = match magic::resolve(target.magic.as_ref(), &FxHashMap::default()) {
        Ok(m) => Some(m),
        Err(_) => {
            reasons.push(Rejection::MagicUnresolved);
            None
        }
    };

    let nargs = if target.varargs.unwrap_or(true) {
        None
    } else {
        Some(target.nargs)
    };

    let length = u8::try_from(length).ok().filter(|l| *l <= 15);
    if length.is_none() {
        reasons.push(Rejection::LengthBounds);
    }
    let magic = magic.and_then(|m| i8::try_from(m).ok());
    if magic.is_none() && !reasons.contains(&Rejection::MagicUnresolved) {
        reasons.push(Rejection::MagicBounds);
    }
    let nargs = match nargs {
        None => Some(None),
        Some(n) => match n.and_then(|n| u8::try_from(n).ok()).filter(|n| *n <= 14) {
            Some(n) => Some(Some(n)),
            None => {
                reasons.push(Rejection::NargsBounds);
                None
            }
        },
    };

    match (reasons.is_empty(), &target.native, length, magic, nargs) {
        (true, Some(native), Some(length), Some(magic), Some(nargs)) => Ok(Lightfunc {
            native: native.clone(),
            length,
            nargs,
            magic,
        }),
        _ => Err(reasons),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::magic::{MagicSpec, TaggedMagic};
    use crate::metadata::model::{Attributes, ObjectClass};

    fn func(id: &str, length: i64, nargs: i64) -> ObjectEntry {
        let mut o = ObjectEntry::new(id, ObjectClass::Function);
        o.callable = true;
        o.native = Some(format!("duk_bi_{}", id));
        o.nargs = Some(nargs);
        o.varargs = Some(false);
        o.properties.push(PropertyEntry::new(
            b"length",
            PropValue::Number(length as f64),
            Attributes::NONE,
        ));
        o.properties.push(PropertyEntry::new(
            b"name",
            PropValue::String(id.as_bytes().to_vec()),
            Attributes::NONE,
        ));
        o
    }

    fn link(key: &str, target: &str) -> PropertyEntry {
        PropertyEntry::new(key.as_bytes(), PropValue::Object(target.to_string()), Attributes::NONE)
    }

    #[test]
    fn test_convert_eligible_function() {
        let mut holder = ObjectEntry::new("bi_math", ObjectClass::Math);
        holder.bidx = true;
        holder.properties.push(link("abs", "abs"));
        let mut md = Metadata {
            objects: vec![holder, func("abs", 1, 1)],
            ..Default::default()
        };
        let stats = convert_lightfuncs(&mut md);
        assert_eq!(stats, LightfuncStats { converted: 1, skipped: 0 });
        assert_eq!(
            md.objects[0].properties[0].value,
            PropValue::Lightfunc(Lightfunc {
                native: "duk_bi_abs".to_string(),
                length: 1,
                nargs: Some(1),
                magic: 0,
            })
        );
    }

    #[test]
    fn test_varargs_default() {
        let mut target = func("f", 2, 0);
        target.varargs = None;
        let lf = eligible(&link("f", "f"), &target).unwrap();
        assert_eq!(lf.nargs, None);
        assert_eq!(lf.length, 2);
    }

    #[test]
    fn test_rejections() {
        let mut target = func("f", 16, 15);
        target.properties.push(PropertyEntry::new(b"prototype", PropValue::Null, Attributes::NONE));
        target.magic = Some(MagicSpec::Tagged(TaggedMagic::Bidx {
            id: "bi_x".to_string(),
        }));
        let mut prop = link("f", "f");
        prop.auto_lightfunc = false;
        let reasons = eligible(&prop, &target).unwrap_err();
        assert_eq!(
            reasons,
            vec![
                Rejection::ExtraProperty,
                Rejection::NoAutoLightfunc,
                Rejection::MagicUnresolved,
                Rejection::LengthBounds,
                Rejection::NargsBounds,
            ]
        );
    }

    #[test]
    fn test_extra_property_blocks_conversion() {
        let mut target = func("f", 1, 1);
        target.properties.push(PropertyEntry::new(b"foo", PropValue::Null, Attributes::NONE));
        assert_eq!(eligible(&link("f", "f"), &target).unwrap_err(), vec![Rejection::ExtraProperty]);

        let mut holder = ObjectEntry::new("bi_x", ObjectClass::Object);
        holder.properties.push(link("f", "f"));
        let mut md = Metadata {
            objects: vec![holder, target],
            ..Default::default()
        };
        let stats = convert_lightfuncs(&mut md);
        assert_eq!(stats, LightfuncStats { converted: 0, skipped: 1 });
        assert_eq!(md.objects[0].properties[0].value, PropValue::Object("f".to_string()));
    }

    #[test]
    fn test_magic_bounds() {
        let mut target = func("f", 0, 0);
        target.magic = Some(MagicSpec::Int(200));
        assert_eq!(eligible(&link("f", "f"), &target).unwrap_err(), vec![Rejection::MagicBounds]);
        target.magic = Some(MagicSpec::Int(-128));
        assert_eq!(eligible(&link("f", "f"), &target).unwrap().magic, -128);
    }

    #[test]
    fn test_not_callable_skipped() {
        let mut holder = ObjectEntry::new("bi_x", ObjectClass::Object);
        holder.properties.push(link("o", "o"));
        let mut md = Metadata {
            objects: vec![holder, ObjectEntry::new("o", ObjectClass::Object)],
            ..Default::default()
        };
        let stats = convert_lightfuncs(&mut md);
        assert_eq!(stats, LightfuncStats { converted: 0, skipped: 1 });
        assert!(md.objects[0].properties[0].value.as_object().is_some());
    }
}
