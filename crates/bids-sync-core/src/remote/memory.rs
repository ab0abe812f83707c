use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::{EntityKind, EntityRef, RemoteFile, RemoteFolder, RemoteItem, RemoteStore};
use crate::error::{Error, Result};

#[derive(Debug)]
struct FolderRecord {
    name: String,
    parent_id: Option<String>,
    metadata: Map<String, Value>,
}

#[derive(Debug)]
struct ItemRecord {
    name: String,
    folder_id: String,
    metadata: Map<String, Value>,
}

#[derive(Debug)]
struct FileRecord {
    name: String,
    item_id: String,
    content: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    folders: BTreeMap<String, FolderRecord>,
    items: BTreeMap<String, ItemRecord>,
    files: BTreeMap<String, FileRecord>,
    uploads: usize,
}

impl State {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:024x}", self.next_id)
    }

    fn folder(&self, id: &str) -> Result<&FolderRecord> {
        self.folders
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Invalid folder id ({})", id)))
    }

    fn item(&self, id: &str) -> Result<&ItemRecord> {
        self.items
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("Invalid item id ({})", id)))
    }

    fn item_size(&self, item_id: &str) -> u64 {
        self.files
            .values()
            .filter(|f| f.item_id == item_id)
            .map(|f| f.content.len() as u64)
            .sum()
    }

    fn remote_folder(&self, id: &str, record: &FolderRecord) -> RemoteFolder {
        RemoteFolder {
            id: id.to_string(),
            name: record.name.clone(),
            parent_id: record.parent_id.clone(),
        }
    }

    fn remote_item(&self, id: &str, record: &ItemRecord) -> RemoteItem {
        RemoteItem {
            id: id.to_string(),
            name: record.name.clone(),
            folder_id: record.folder_id.clone(),
            size: self.item_size(id),
        }
    }

    fn insert_file(&mut self, item_id: &str, name: &str, content: Vec<u8>) -> RemoteFile {
        let id = self.allocate_id();
        let size = content.len() as u64;
        self.files.insert(
            id.clone(),
            FileRecord {
                name: name.to_string(),
                item_id: item_id.to_string(),
                content,
            },
        );
        RemoteFile {
            id,
            name: name.to_string(),
            size,
        }
    }

    fn remove_item(&mut self, id: &str) {
        self.items.remove(id);
        self.files.retain(|_, f| f.item_id != id);
    }

    fn remove_folder(&mut self, id: &str) {
        let mut stack = vec![id.to_string()];
        while let Some(folder_id) = stack.pop() {
            let children: Vec<String> = self
                .folders
                .iter()
                .filter(|(_, f)| f.parent_id.as_deref() == Some(folder_id.as_str()))
                .map(|(id, _)| id.clone())
                .collect();
            stack.extend(children);

            let items: Vec<String> = self
                .items
                .iter()
                .filter(|(_, i)| i.folder_id == folder_id)
                .map(|(id, _)| id.clone())
                .collect();
            for item_id in items {
                self.remove_item(&item_id);
            }
            self.folders.remove(&folder_id);
        }
    }
}

/// In-process `RemoteStore` with the same reuse-by-name and listing-order
/// behaviour as the Girder client (children sorted by lower-cased name).
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a parentless folder to act as an import target.
    pub fn create_root(&self, name: &str) -> String {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.folders.insert(
            id.clone(),
            FolderRecord {
                name: name.to_string(),
                parent_id: None,
                metadata: Map::new(),
            },
        );
        id
    }

    /// Create an item holding a single file with `content`, bypassing the filesystem.
    pub fn put_item(&self, folder_id: &str, name: &str, content: &[u8]) -> RemoteItem {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.items.insert(
            id.clone(),
            ItemRecord {
                name: name.to_string(),
                folder_id: folder_id.to_string(),
                metadata: Map::new(),
            },
        );
        state.insert_file(&id, name, content.to_vec());
        let record = &state.items[&id];
        state.remote_item(&id, record)
    }

    pub fn metadata(&self, entity: &EntityRef) -> Option<Map<String, Value>> {
        let state = self.state.borrow();
        match entity.kind {
            EntityKind::Folder => state.folders.get(&entity.id).map(|f| f.metadata.clone()),
            EntityKind::Item => state.items.get(&entity.id).map(|i| i.metadata.clone()),
        }
    }

    /// Folders and items strictly below `folder_id`.
    pub fn count_descendants(&self, folder_id: &str) -> usize {
        let state = self.state.borrow();
        let mut count = 0;
        let mut stack = vec![folder_id.to_string()];
        while let Some(id) = stack.pop() {
            count += state.items.values().filter(|i| i.folder_id == id).count();
            for (child_id, folder) in &state.folders {
                if folder.parent_id.as_deref() == Some(id.as_str()) {
                    count += 1;
                    stack.push(child_id.clone());
                }
            }
        }
        count
    }

    /// Number of `upload_file` calls served so far.
    pub fn upload_count(&self) -> usize {
        self.state.borrow().uploads
    }
}

impl RemoteStore for MemoryStore {
    fn get_folder(&self, id: &str) -> Result<RemoteFolder> {
        let state = self.state.borrow();
        let record = state.folder(id)?;
        Ok(state.remote_folder(id, record))
    }

    fn list_folders(&self, parent: &str, name: Option<&str>) -> Result<Vec<RemoteFolder>> {
        let state = self.state.borrow();
        state.folder(parent)?;
        let mut folders: Vec<RemoteFolder> = state
            .folders
            .iter()
            .filter(|(_, f)| f.parent_id.as_deref() == Some(parent))
            .filter(|(_, f)| name.map_or(true, |n| f.name == n))
            .map(|(id, f)| state.remote_folder(id, f))
            .collect();
        folders.sort_by_key(|f| f.name.to_lowercase());
        Ok(folders)
    }

    fn create_folder(&self, parent: &str, name: &str, reuse_existing: bool) -> Result<RemoteFolder> {
        if let Some(existing) = self.list_folders(parent, Some(name))?.into_iter().next() {
            if reuse_existing {
                return Ok(existing);
            }
            return Err(Error::Remote {
                status: 400,
                message: "A folder with that name already exists here.".to_string(),
            });
        }

        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.folders.insert(
            id.clone(),
            FolderRecord {
                name: name.to_string(),
                parent_id: Some(parent.to_string()),
                metadata: Map::new(),
            },
        );
        let record = &state.folders[&id];
        Ok(state.remote_folder(&id, record))
    }

    fn list_items(&self, folder: &str) -> Result<Vec<RemoteItem>> {
        let state = self.state.borrow();
        state.folder(folder)?;
        let mut items: Vec<RemoteItem> = state
            .items
            .iter()
            .filter(|(_, i)| i.folder_id == folder)
            .map(|(id, i)| state.remote_item(id, i))
            .collect();
        items.sort_by_key(|i| i.name.to_lowercase());
        Ok(items)
    }

    fn create_item(&self, folder: &str, name: &str, reuse_existing: bool) -> Result<RemoteItem> {
        let siblings = self.list_items(folder)?;
        if reuse_existing {
            if let Some(existing) = siblings.iter().find(|i| i.name == name) {
                return Ok(existing.clone());
            }
        }

        let mut unique_name = name.to_string();
        let mut n = 0;
        while siblings.iter().any(|i| i.name == unique_name) {
            n += 1;
            unique_name = format!("{} ({})", name, n);
        }

        let mut state = self.state.borrow_mut();
        let id = state.allocate_id();
        state.items.insert(
            id.clone(),
            ItemRecord {
                name: unique_name,
                folder_id: folder.to_string(),
                metadata: Map::new(),
            },
        );
        let record = &state.items[&id];
        Ok(state.remote_item(&id, record))
    }

    fn list_files(&self, item: &str) -> Result<Vec<RemoteFile>> {
        let state = self.state.borrow();
        state.item(item)?;
        Ok(state
            .files
            .iter()
            .filter(|(_, f)| f.item_id == item)
            .map(|(id, f)| RemoteFile {
                id: id.clone(),
                name: f.name.clone(),
                size: f.content.len() as u64,
            })
            .collect())
    }

    fn download_file(&self, id: &str) -> Result<Vec<u8>> {
        let state = self.state.borrow();
        state
            .files
            .get(id)
            .map(|f| f.content.clone())
            .ok_or_else(|| Error::NotFound(format!("Invalid file id ({})", id)))
    }

    fn upload_file(&self, item: &str, local_path: &Path, name: &str) -> Result<RemoteFile> {
        let content = fs::read(local_path)?;
        let mut state = self.state.borrow_mut();
        state.item(item)?;
        state.uploads += 1;
        Ok(state.insert_file(item, name, content))
    }

    fn delete_file(&self, id: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Invalid file id ({})", id)))
    }

    fn add_metadata(&self, entity: &EntityRef, metadata: &Map<String, Value>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let target = match entity.kind {
            EntityKind::Folder => state
                .folders
                .get_mut(&entity.id)
                .map(|f| &mut f.metadata),
            EntityKind::Item => state.items.get_mut(&entity.id).map(|i| &mut i.metadata),
        };
        let target = target.ok_or_else(|| {
            Error::NotFound(format!("Invalid {} id ({})", entity.kind, entity.id))
        })?;
        for (key, value) in metadata {
            target.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, entity: &EntityRef) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match entity.kind {
            EntityKind::Folder => {
                state.folder(&entity.id)?;
                state.remove_folder(&entity.id);
            }
            EntityKind::Item => {
                state.item(&entity.id)?;
                state.remove_item(&entity.id);
            }
        }
        Ok(())
    }
}
