use std::collections::BTreeMap;

/// One file in a dataset snapshot, keyed by its `/`-separated path below the dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub relative_path: String,
    pub size_bytes: u64,
    /// Item id when the entry was read from the remote store.
    pub remote_id: Option<String>,
}

impl InventoryEntry {
    pub fn local(relative_path: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes,
            remote_id: None,
        }
    }

    pub fn remote(relative_path: impl Into<String>, size_bytes: u64, remote_id: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes,
            remote_id: Some(remote_id.into()),
        }
    }

    /// Directory part of the relative path; empty for entries at the root.
    pub fn directory(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.relative_path)
    }
}

/// Snapshot of a tree, sorted by relative path. Recomputed on every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    entries: BTreeMap<String, InventoryEntry>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: InventoryEntry) {
        self.entries.insert(entry.relative_path.clone(), entry);
    }

    pub fn get(&self, relative_path: &str) -> Option<&InventoryEntry> {
        self.entries.get(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InventoryEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }

    /// Entries grouped by containing directory (root is `""`).
    pub fn by_directory(&self) -> BTreeMap<&str, Vec<&InventoryEntry>> {
        let mut grouped: BTreeMap<&str, Vec<&InventoryEntry>> = BTreeMap::new();
        for entry in self.entries.values() {
            grouped.entry(entry.directory()).or_default().push(entry);
        }
        grouped
    }
}

impl FromIterator<InventoryEntry> for Inventory {
    fn from_iter<T: IntoIterator<Item = InventoryEntry>>(iter: T) -> Self {
        let mut inventory = Inventory::new();
        for entry in iter {
            inventory.insert(entry);
        }
        inventory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_and_file_name() {
        let root = InventoryEntry::local("dataset_description.json", 10);
        assert_eq!(root.directory(), "");
        assert_eq!(root.file_name(), "dataset_description.json");

        let nested = InventoryEntry::local("sub-01/anat/sub-01_T1w.nii.gz", 10);
        assert_eq!(nested.directory(), "sub-01/anat");
        assert_eq!(nested.file_name(), "sub-01_T1w.nii.gz");
    }

    #[test]
    fn test_by_directory_groups_entries() {
        let inventory: Inventory = vec![
            InventoryEntry::local("README", 1),
            InventoryEntry::local("sub-01/anat/a.nii.gz", 2),
            InventoryEntry::local("sub-01/anat/a.json", 3),
        ]
        .into_iter()
        .collect();

        let grouped = inventory.by_directory();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[""].len(), 1);
        assert_eq!(grouped["sub-01/anat"].len(), 2);
        assert_eq!(inventory.total_bytes(), 6);
    }
}
