//! Reachability pruning
//!
//! Marks objects reachable from the bidx roots and removes the rest.

use crate::metadata::model::{Metadata, PropValue};
use crate::text::bytes_to_text;
use rustc_hash::FxHashSet;
use tracing::{debug, info};

/// Mark-and-sweep pruner over the object list
pub struct Pruner;

impl Pruner {
    /// Create a new pruner
    pub fn new() -> Self {
        Self
    }

    /// Remove unreachable objects and every edge left pointing at a missing
    /// id. Returns the number of objects removed.
    pub fn prune(&self, metadata: &mut Metadata) -> usize {
        let reachable = self.mark(metadata);
        let before = metadata.objects.len();
        metadata.objects.retain(|obj| {
            let keep = reachable.contains(obj.id.as_str());
            if !keep {
                debug!("Removing unreachable object: {}", obj.id);
            }
            keep
        });
        let removed = before - metadata.objects.len();
        info!("Deleted {} unreachable objects", removed);

        self.strip_dangling(metadata);
        removed
    }

    /// Ids reachable from bidx objects, iterated to a fixed point.
    fn mark(&self, metadata: &Metadata) -> FxHashSet<String> {
        let mut reachable: FxHashSet<String> = metadata
            .objects
            .iter()
            .filter(|o| o.bidx)
            .map(|o| o.id.clone())
            .collect();

        loop {
            let mut changed = false;
            for obj in &metadata.objects {
                if !reachable.contains(obj.id.as_str()) {
                    continue;
                }
                for target in obj.object_refs() {
                    if reachable.insert(target.clone()) {
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        reachable
    }

    fn strip_dangling(&self, metadata: &mut Metadata) {
        let live: FxHashSet<String> = metadata.objects.iter().map(|o| o.id.clone()).collect();
        let is_live = |id: &Option<String>| id.as_ref().map_or(true, |id| live.contains(id));

        for obj in &mut metadata.objects {
            if !is_live(&obj.internal_prototype) {
                debug!("Clearing dangling internal prototype of {}", obj.id);
                obj.internal_prototype = None;
            }
            if !is_live(&obj.objenv_target) {
                debug!("Clearing dangling objenv target of {}", obj.id);
                obj.objenv_target = None;
            }
            let id = obj.id.as_str();
            obj.properties.retain_mut(|prop| match &mut prop.value {
                PropValue::Object(target) if !live.contains(target.as_str()) => {
                    debug!(
                        "Deleted property {} of object {}, points to deleted object {}",
                        bytes_to_text(&prop.key),
                        id,
                        target
                    );
                    false
                }
                PropValue::Accessor { getter, setter } => {
                    for half in [getter, setter] {
                        if half.as_deref().is_some_and(|t| !live.contains(t)) {
                            *half = None;
                        }
                    }
                    true
                }
                _ => true,
            });
        }
    }
}

impl Default for Pruner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::model::{Attributes, ObjectClass, ObjectEntry, PropertyEntry};

    fn obj(id: &str, bidx: bool, refs: &[&str]) -> ObjectEntry {
        let mut o = ObjectEntry::new(id, ObjectClass::Object);
        o.bidx = bidx;
        for (i, r) in refs.iter().enumerate() {
            o.properties.push(PropertyEntry::new(
                format!("p{}", i).as_bytes(),
                PropValue::Object(r.to_string()),
                Attributes::DATA_DEFAULT,
            ));
        }
        o
    }

    #[test]
    fn test_prune_transitive() {
        let mut md = Metadata {
            objects: vec![
                obj("root", true, &["a"]),
                obj("a", false, &["b"]),
                obj("b", false, &[]),
                obj("orphan", false, &["b"]),
            ],
            ..Default::default()
        };
        let removed = Pruner::new().prune(&mut md);
        assert_eq!(removed, 1);
        let ids: Vec<_> = md.objects.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "b"]);
    }

    #[test]
    fn test_prune_through_prototype_and_accessor() {
        let mut root = obj("root", true, &[]);
        root.internal_prototype = Some("proto".to_string());
        let mut proto = obj("proto", false, &[]);
        proto.properties.push(PropertyEntry::new(
            b"acc",
            PropValue::Accessor {
                getter: Some("getter".to_string()),
                setter: Some("missing".to_string()),
            },
            Attributes::ACCESSOR_DEFAULT,
        ));
        let mut md = Metadata {
            objects: vec![root, proto, obj("getter", false, &[])],
            ..Default::default()
        };
        assert_eq!(Pruner::new().prune(&mut md), 0);
        assert_eq!(
            md.objects[1].properties[0].value,
            PropValue::Accessor {
                getter: Some("getter".to_string()),
                setter: None
            }
        );
    }

    #[test]
    fn test_dangling_edges_stripped() {
        let mut root = obj("root", true, &["gone", "kept"]);
        root.internal_prototype = Some("gone".to_string());
        let mut md = Metadata {
            objects: vec![root, obj("kept", false, &[])],
            ..Default::default()
        };
        Pruner::new().prune(&mut md);
        assert_eq!(md.objects[0].internal_prototype, None);
        assert_eq!(md.objects[0].properties.len(), 1);
        assert_eq!(md.objects[0].properties[0].key, b"p1");
    }
}
