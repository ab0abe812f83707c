//! Remote hierarchical storage: folders hold folders and items, items hold files.
//!
//! `RemoteStore` is the only way the rest of the crate talks to the service.
//! `GirderClient` speaks the Girder REST API; `MemoryStore` keeps everything
//! in process and backs the test suite.

pub mod girder;
pub mod memory;
pub mod tree;

pub use girder::GirderClient;
pub use memory::MemoryStore;
pub use tree::read_remote_tree;

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Folder,
    Item,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Folder => write!(f, "folder"),
            EntityKind::Item => write!(f, "item"),
        }
    }
}

/// Target of a metadata or deletion call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: String,
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn folder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntityKind::Folder,
        }
    }

    pub fn item(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntityKind::Item,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFolder {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "parentId", default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "folderId")]
    pub folder_id: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

/// Blocking client surface of the storage service.
///
/// Listing calls return entities in the service's listing order, which the
/// sidecar association rule depends on. Calls against an entity that no
/// longer exists fail with `Error::NotFound`.
pub trait RemoteStore {
    fn get_folder(&self, id: &str) -> Result<RemoteFolder>;

    /// Child folders of `parent`, optionally restricted to an exact name.
    fn list_folders(&self, parent: &str, name: Option<&str>) -> Result<Vec<RemoteFolder>>;

    /// With `reuse_existing`, a same-named child folder is returned instead of a new one.
    fn create_folder(&self, parent: &str, name: &str, reuse_existing: bool) -> Result<RemoteFolder>;

    fn list_items(&self, folder: &str) -> Result<Vec<RemoteItem>>;

    /// With `reuse_existing`, a same-named item in the folder is returned instead of a new one.
    fn create_item(&self, folder: &str, name: &str, reuse_existing: bool) -> Result<RemoteItem>;

    fn list_files(&self, item: &str) -> Result<Vec<RemoteFile>>;

    fn download_file(&self, id: &str) -> Result<Vec<u8>>;

    fn upload_file(&self, item: &str, local_path: &Path, name: &str) -> Result<RemoteFile>;

    fn delete_file(&self, id: &str) -> Result<()>;

    /// Merge `metadata` into the entity's metadata; existing keys not present are kept.
    fn add_metadata(&self, entity: &EntityRef, metadata: &Map<String, Value>) -> Result<()>;

    fn delete(&self, entity: &EntityRef) -> Result<()>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for &S {
    fn get_folder(&self, id: &str) -> Result<RemoteFolder> {
        (**self).get_folder(id)
    }

    fn list_folders(&self, parent: &str, name: Option<&str>) -> Result<Vec<RemoteFolder>> {
        (**self).list_folders(parent, name)
    }

    fn create_folder(&self, parent: &str, name: &str, reuse_existing: bool) -> Result<RemoteFolder> {
        (**self).create_folder(parent, name, reuse_existing)
    }

    fn list_items(&self, folder: &str) -> Result<Vec<RemoteItem>> {
        (**self).list_items(folder)
    }

    fn create_item(&self, folder: &str, name: &str, reuse_existing: bool) -> Result<RemoteItem> {
        (**self).create_item(folder, name, reuse_existing)
    }

    fn list_files(&self, item: &str) -> Result<Vec<RemoteFile>> {
        (**self).list_files(item)
    }

    fn download_file(&self, id: &str) -> Result<Vec<u8>> {
        (**self).download_file(id)
    }

    fn upload_file(&self, item: &str, local_path: &Path, name: &str) -> Result<RemoteFile> {
        (**self).upload_file(item, local_path, name)
    }

    fn delete_file(&self, id: &str) -> Result<()> {
        (**self).delete_file(id)
    }

    fn add_metadata(&self, entity: &EntityRef, metadata: &Map<String, Value>) -> Result<()> {
        (**self).add_metadata(entity, metadata)
    }

    fn delete(&self, entity: &EntityRef) -> Result<()> {
        (**self).delete(entity)
    }
}
