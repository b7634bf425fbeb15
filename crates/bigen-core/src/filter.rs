//! Configuration filter
//!
//! Runs on the merged document, before normalization, so that a dropped
//! entry is never expanded or validated.

use crate::config::ActiveConfig;
use crate::metadata::raw::{MetadataDocument, PresentIf};
use tracing::{debug, info};

/// Counts of what the filter dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub objects_disabled: usize,
    pub objects_not_present: usize,
    pub properties_disabled: usize,
    pub properties_not_present: usize,
}

fn excluded_by(active: &ActiveConfig, present_if: Option<&PresentIf>) -> Option<String> {
    present_if?
        .names()
        .into_iter()
        .find(|name| active.is_known_false(name))
}

/// Drop disabled entries and entries whose `present_if` names an option
/// that is known to be false.
pub fn filter(doc: &mut MetadataDocument, active: &ActiveConfig) -> FilterStats {
    let mut stats = FilterStats::default();

    doc.objects.retain(|obj| {
        if obj.is_disabled() {
            debug!("Remove disabled object: {}", obj.id);
            stats.objects_disabled += 1;
            return false;
        }
        if let Some(option) = excluded_by(active, obj.present_if.as_ref()) {
            debug!("Removed object not needed in active configuration: {} ({})", obj.id, option);
            stats.objects_not_present += 1;
            return false;
        }
        true
    });

    for obj in &mut doc.objects {
        let id = obj.id.as_str();
        for props in obj.properties.iter_mut() {
            props.retain(|prop| {
                if prop.is_disabled() {
                    debug!("Remove disabled property: {}/{:?}", id, prop.key);
                    stats.properties_disabled += 1;
                    return false;
                }
                if let Some(option) = excluded_by(active, prop.present_if.as_ref()) {
                    debug!("Removed property not needed in active configuration: {}/{:?} ({})", id, prop.key, option);
                    stats.properties_not_present += 1;
                    return false;
                }
                true
            });
        }
    }

    info!(
        "Removed {} disabled objects, {} objects not needed by active config",
        stats.objects_disabled, stats.objects_not_present
    );
    info!(
        "Removed {} disabled properties, {} properties not needed by active config",
        stats.properties_disabled, stats.properties_not_present
    );
    stats
}
