//! Loader/merger: applies override documents over the base metadata

use crate::error::{BuiltinsError, BuiltinsResult};
use crate::metadata::raw::{MetadataDocument, RawObject, RawStr, RawValue, TaggedValue};
use tracing::{debug, warn};

fn key_name(key: &RawStr) -> String {
    match key {
        RawStr::Plain(s) => s.clone(),
        RawStr::Symbol(sym) => format!("{:?}:{}", sym.variant, sym.string),
    }
}

/// Merge override documents, in order, over the base document.
///
/// Object verbs: `add` (the default) requires a new id, `replace` swaps the
/// whole object (appending if missing), `modify` copies the fields that are
/// set and applies property verbs, `delete` removes the object together
/// with every property pointing at it. Entries with `disable: true` are
/// skipped. Merging no overrides returns the base unchanged.
pub fn merge(base: &MetadataDocument, overrides: &[MetadataDocument]) -> BuiltinsResult<MetadataDocument> {
    let mut doc = base.clone();
    for user in overrides {
        merge_document(&mut doc, user)?;
    }
    Ok(doc)
}

fn merge_document(doc: &mut MetadataDocument, user: &MetadataDocument) -> BuiltinsResult<()> {
    for obj in &user.objects {
        if obj.is_disabled() {
            debug!("Skip disabled object: {}", obj.id);
            continue;
        }
        let target = doc.objects.iter().position(|o| o.id == obj.id);

        if obj.delete {
            let Some(idx) = target else {
                return Err(BuiltinsError::ObjectNotFound {
                    id: obj.id.clone(),
                    verb: "delete",
                });
            };
            debug!("Delete object: {}", obj.id);
            doc.objects.remove(idx);
            delete_dangling_references(doc, &obj.id);
            continue;
        }

        if obj.replace {
            debug!("Replace object {}", obj.id);
            match target {
                Some(idx) => doc.objects[idx] = clean_verbs(obj),
                None => {
                    warn!("Object to be replaced doesn't exist, append new object: {}", obj.id);
                    doc.objects.push(clean_verbs(obj));
                }
            }
            continue;
        }

        if obj.add || !obj.modify {
            debug!("Add object {}", obj.id);
            if target.is_some() {
                return Err(BuiltinsError::ObjectExists { id: obj.id.clone() });
            }
            doc.objects.push(clean_verbs(obj));
            continue;
        }

        let Some(idx) = target else {
            return Err(BuiltinsError::ObjectNotFound {
                id: obj.id.clone(),
                verb: "modify",
            });
        };
        modify_object(&mut doc.objects[idx], obj)?;
    }

    doc.add_forced_strings
        .extend(user.add_forced_strings.iter().cloned());
    Ok(())
}

fn clean_verbs(obj: &RawObject) -> RawObject {
    RawObject {
        add: false,
        replace: false,
        modify: false,
        delete: false,
        ..obj.clone()
    }
}

fn modify_object(target: &mut RawObject, patch: &RawObject) -> BuiltinsResult<()> {
    target.apply_fields(patch);
    let Some(patch_props) = &patch.properties else {
        return Ok(());
    };
    let props = target.properties.get_or_insert_with(Vec::new);

    for prop in patch_props {
        let name = key_name(&prop.key);
        if prop.is_disabled() {
            debug!("Skip disabled property: {}", name);
            continue;
        }
        let existing = props.iter().position(|p| p.key == prop.key);
        match (existing, prop.delete) {
            (Some(idx), true) => {
                debug!("Delete property {} of {}", name, target.id);
                props.remove(idx);
            }
            (None, true) => {
                return Err(BuiltinsError::PropertyNotFound {
                    object: target.id.clone(),
                    key: name,
                });
            }
            (Some(_), false) if prop.add => {
                return Err(BuiltinsError::PropertyExists {
                    object: target.id.clone(),
                    key: name,
                });
            }
            (Some(idx), false) => {
                debug!("Replace property {} of {}", name, target.id);
                props[idx] = prop.clone();
            }
            (None, false) => {
                debug!("Add property {} of {}", name, target.id);
                props.push(prop.clone());
            }
        }
    }
    Ok(())
}

/// Remove properties pointing at a deleted object and clear accessor
/// halves that did. An accessor losing both functions stays in place.
pub fn delete_dangling_references(doc: &mut MetadataDocument, id: &str) {
    for obj in &mut doc.objects {
        let Some(props) = obj.properties.as_mut() else {
            continue;
        };
        props.retain_mut(|prop| {
            let RawValue::Tagged(tagged) = &mut prop.value else {
                return true;
            };
            match tagged.as_mut() {
                TaggedValue::Object { id: target } if target == id => {
                    debug!(
                        "Deleted property {} of object {}, points to deleted object {}",
                        key_name(&prop.key),
                        obj.id,
                        id
                    );
                    false
                }
                TaggedValue::Accessor(acc) => {
                    if acc.getter_id.as_deref() == Some(id) {
                        acc.getter_id = None;
                    }
                    if acc.setter_id.as_deref() == Some(id) {
                        acc.setter_id = None;
                    }
                    true
                }
                _ => true,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> MetadataDocument {
        MetadataDocument::from_yaml_str(yaml).unwrap()
    }

    fn base() -> MetadataDocument {
        doc(r#"
objects:
  - id: bi_a
    class: Object
    properties:
      - { key: x, value: 1 }
      - { key: toB, value: { type: object, id: bi_b } }
      - { key: acc, value: { type: accessor, getter_id: bi_b, setter_id: bi_c } }
  - id: bi_b
    class: Function
  - id: bi_c
    class: Function
"#)
    }

    #[test]
    fn test_merge_no_overrides_is_identity() {
        let b = base();
        assert_eq!(merge(&b, &[]).unwrap(), b);
    }

    #[test]
    fn test_add_existing_fails() {
        let err = merge(&base(), &[doc("objects: [ { id: bi_a } ]")]).unwrap_err();
        assert!(matches!(err, BuiltinsError::ObjectExists { .. }));
    }

    #[test]
    fn test_add_new_object_appends() {
        let merged = merge(&base(), &[doc("objects: [ { id: bi_new, add: true } ]")]).unwrap();
        assert_eq!(merged.objects.last().unwrap().id, "bi_new");
        assert!(!merged.objects.last().unwrap().add);
    }

    #[test]
    fn test_replace_missing_appends() {
        let merged = merge(
            &base(),
            &[doc("objects: [ { id: bi_z, replace: true, class: Array } ]")],
        )
        .unwrap();
        assert_eq!(merged.objects.len(), 4);
        assert_eq!(merged.objects[3].class.as_deref(), Some("Array"));
    }

    #[test]
    fn test_modify_missing_fails() {
        let err = merge(&base(), &[doc("objects: [ { id: bi_q, modify: true } ]")]).unwrap_err();
        assert!(matches!(err, BuiltinsError::ObjectNotFound { verb: "modify", .. }));
    }

    #[test]
    fn test_modify_property_verbs() {
        let merged = merge(
            &base(),
            &[doc(r#"
objects:
  - id: bi_a
    modify: true
    native: duk_bi_a
    properties:
      - { key: x, value: 2 }
      - { key: y, value: 3 }
      - { key: toB, delete: true }
      - { key: ignored, value: 4, disable: true }
"#)],
        )
        .unwrap();
        let a = &merged.objects[0];
        assert_eq!(a.native.as_deref(), Some("duk_bi_a"));
        assert_eq!(a.class.as_deref(), Some("Object"));
        let props = a.properties.as_ref().unwrap();
        let keys: Vec<_> = props.iter().map(|p| key_name(&p.key)).collect();
        assert_eq!(keys, vec!["x", "acc", "y"]);
        assert_eq!(props[0].value, RawValue::Int(2));
    }

    #[test]
    fn test_modify_property_errors() {
        let err = merge(
            &base(),
            &[doc("objects: [ { id: bi_a, modify: true, properties: [ { key: nope, delete: true } ] } ]")],
        )
        .unwrap_err();
        assert!(matches!(err, BuiltinsError::PropertyNotFound { .. }));

        let err = merge(
            &base(),
            &[doc("objects: [ { id: bi_a, modify: true, properties: [ { key: x, value: 1, add: true } ] } ]")],
        )
        .unwrap_err();
        assert!(matches!(err, BuiltinsError::PropertyExists { .. }));
    }

    #[test]
    fn test_delete_strips_dangling_references() {
        let merged = merge(&base(), &[doc("objects: [ { id: bi_b, delete: true } ]")]).unwrap();
        assert!(merged.objects.iter().all(|o| o.id != "bi_b"));
        let props = merged.objects[0].properties.as_ref().unwrap();
        assert_eq!(props.len(), 2);
        match &props[1].value {
            RawValue::Tagged(t) => match t.as_ref() {
                TaggedValue::Accessor(acc) => {
                    assert_eq!(acc.getter_id, None);
                    assert_eq!(acc.setter_id.as_deref(), Some("bi_c"));
                }
                other => panic!("unexpected value {:?}", other),
            },
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_delete_missing_fails() {
        let err = merge(&base(), &[doc("objects: [ { id: bi_q, delete: true } ]")]).unwrap_err();
        assert!(matches!(err, BuiltinsError::ObjectNotFound { verb: "delete", .. }));
    }

    #[test]
    fn test_disabled_override_skipped() {
        let merged = merge(&base(), &[doc("objects: [ { id: bi_a, disable: true } ]")]).unwrap();
        assert_eq!(merged, base());
    }

    #[test]
    fn test_forced_strings_collected() {
        let merged = merge(&base(), &[doc("add_forced_strings: [ { str: extra } ]")]).unwrap();
        assert_eq!(merged.add_forced_strings.len(), 1);
    }
}
