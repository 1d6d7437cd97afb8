//! Identifier remapping
//!
//! Normalized trees carry document-scoped ids that may collide with each
//! other or with entities already in the workspace. [`remap`] gives every
//! node a fresh UUID and rewrites parent links; [`remap_plugins`] then points
//! plugins at the new ids.

use std::collections::HashMap;

use uuid::Uuid;

use crate::types::{CollectionItem, Plugin};

/// Old id → new id for every node that had an id before remapping
pub type IdMapping = HashMap<String, String>;

/// Assign fresh ids to every node in the forest, in place
///
/// Children are relinked to their parent's new id. A root's `parentId` is
/// either null or an external parent and stays as-is.
pub fn remap(tree: &mut [CollectionItem]) -> IdMapping {
    let mut mapping = IdMapping::new();

    for root in tree.iter_mut() {
        assign(root, None, &mut mapping);
    }

    mapping
}

fn assign(node: &mut CollectionItem, parent: Option<&str>, mapping: &mut IdMapping) {
    let new_id = Uuid::new_v4().to_string();
    if let Some(old_id) = node.id.take() {
        mapping.insert(old_id, new_id.clone());
    }
    node.id = Some(new_id.clone());

    if let Some(parent) = parent {
        node.parent_id = Some(parent.to_string());
    }

    for child in &mut node.children {
        assign(child, Some(&new_id), mapping);
    }
}

/// Rewrite plugin targets through the mapping
///
/// Plugins whose target is not in the mapping are left untouched.
pub fn remap_plugins(plugins: &mut [Plugin], mapping: &IdMapping) {
    for plugin in plugins {
        if let Some(new_id) = plugin.collection_id.as_ref().and_then(|id| mapping.get(id)) {
            plugin.collection_id = Some(new_id.clone());
        }
    }
}
