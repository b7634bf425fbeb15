//! Builtin object index (bidx) assignment

use crate::metadata::model::Metadata;
use rustc_hash::FxHashMap;
use tracing::info;

/// Move bidx objects to the front of the object list, keeping document
/// order within both groups. Returns the number of bidx objects.
pub fn order_bidx(metadata: &mut Metadata) -> usize {
    let (mut ordered, rest): (Vec<_>, Vec<_>) =
        std::mem::take(&mut metadata.objects).into_iter().partition(|o| o.bidx);
    let num_bidx = ordered.len();
    ordered.extend(rest);
    metadata.objects = ordered;
    info!("{} objects, {} with bidx", metadata.objects.len(), num_bidx);
    num_bidx
}

/// Object id -> bidx for objects at the front of an ordered list.
pub fn bidx_map(metadata: &Metadata) -> FxHashMap<String, usize> {
    metadata
        .objects
        .iter()
        .take_while(|o| o.bidx)
        .enumerate()
        .map(|(i, o)| (o.id.clone(), i))
        .collect()
}

/// `bi_foo_bar` -> `BIDX_FOO_BAR`; the first `_` separated part is dropped.
pub fn bidx_define_suffix(id: &str) -> String {
    let name = id.split_once('_').map_or("", |(_, rest)| rest);
    format!("BIDX_{}", name.to_ascii_uppercase())
}
