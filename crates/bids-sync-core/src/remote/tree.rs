use tracing::debug;

use super::RemoteStore;
use crate::error::Result;
use crate::inventory::{Inventory, InventoryEntry};

/// Inventory of every item below `root_id`, keyed by folder names joined with `/`.
///
/// The item size reported by the store (the total of its files) is the
/// comparable size. Traversal uses an explicit stack.
pub fn read_remote_tree<S: RemoteStore>(store: &S, root_id: &str) -> Result<Inventory> {
    let mut inventory = Inventory::new();
    let mut stack: Vec<(String, String)> = vec![(root_id.to_string(), String::new())];
    let mut folders_visited = 0usize;

    while let Some((folder_id, base_path)) = stack.pop() {
        folders_visited += 1;

        for item in store.list_items(&folder_id)? {
            let path = join_path(&base_path, &item.name);
            inventory.insert(InventoryEntry::remote(path, item.size, item.id));
        }

        for folder in store.list_folders(&folder_id, None)? {
            let path = join_path(&base_path, &folder.name);
            stack.push((folder.id, path));
        }
    }

    debug!(
        "Read remote tree under {}: {} items in {} folders",
        root_id,
        inventory.len(),
        folders_visited
    );
    Ok(inventory)
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", base, name)
    }
}
