use tracing::{debug, info};

use crate::error::Result;
use crate::remote::{EntityRef, RemoteStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionStats {
    pub items_deleted: usize,
    pub folders_deleted: usize,
    /// Targets that disappeared before we got to them.
    pub already_gone: usize,
}

enum Frame {
    /// Delete the folder's items and schedule its subfolders.
    Clear(String),
    /// Delete the folder itself; its contents are gone by now.
    Remove(String),
}

/// Empty `root_id`: every item, then every folder, children before parents.
///
/// The root folder itself is kept. Anything already gone counts as deleted;
/// any other failure aborts and leaves the tree partially cleared.
pub fn reset_folder<S: RemoteStore>(store: &S, root_id: &str) -> Result<DeletionStats> {
    let mut stats = DeletionStats::default();
    let mut stack = vec![Frame::Clear(root_id.to_string())];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Clear(folder_id) => {
                let items = match store.list_items(&folder_id) {
                    Ok(items) => items,
                    Err(err) if err.is_not_found() => {
                        debug!("Folder {} vanished before clearing", folder_id);
                        stats.already_gone += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                for item in items {
                    if delete_tolerant(store, &EntityRef::item(item.id), &mut stats)? {
                        stats.items_deleted += 1;
                    }
                }

                let folders = match store.list_folders(&folder_id, None) {
                    Ok(folders) => folders,
                    Err(err) if err.is_not_found() => {
                        debug!("Folder {} vanished while clearing", folder_id);
                        stats.already_gone += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                };
                for folder in folders {
                    stack.push(Frame::Remove(folder.id.clone()));
                    stack.push(Frame::Clear(folder.id));
                }
            }
            Frame::Remove(folder_id) => {
                if delete_tolerant(store, &EntityRef::folder(folder_id), &mut stats)? {
                    stats.folders_deleted += 1;
                }
            }
        }
    }

    info!(
        "Deleted {} items and {} folders ({} already gone)",
        stats.items_deleted, stats.folders_deleted, stats.already_gone
    );
    Ok(stats)
}

/// `Ok(true)` when we deleted it, `Ok(false)` when it was already gone.
fn delete_tolerant<S: RemoteStore>(store: &S, entity: &EntityRef, stats: &mut DeletionStats) -> Result<bool> {
    match store.delete(entity) {
        Ok(()) => {
            debug!("Deleted {} {}", entity.kind, entity.id);
            Ok(true)
        }
        Err(err) if err.is_not_found() => {
            debug!("{} {} already gone", entity.kind, entity.id);
            stats.already_gone += 1;
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
