use crate::inventory::{Inventory, InventoryEntry};

/// A path present on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedEntry {
    pub relative_path: String,
    pub local_size: u64,
    pub remote_size: u64,
    pub remote_id: Option<String>,
}

/// Local inventory split by remote presence. `new`, `identical` and
/// `modified` partition the local side; `remote_only` lists what exists
/// remotely with no local counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comparison {
    pub new: Vec<InventoryEntry>,
    pub identical: Vec<MatchedEntry>,
    pub modified: Vec<MatchedEntry>,
    pub remote_only: Vec<InventoryEntry>,
}

impl Comparison {
    pub fn local_total(&self) -> usize {
        self.new.len() + self.identical.len() + self.modified.len()
    }

    pub fn upload_count(&self, upload_modified: bool) -> usize {
        if upload_modified {
            self.new.len() + self.modified.len()
        } else {
            self.new.len()
        }
    }

    pub fn is_in_sync(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty()
    }
}

/// Compare by relative path, then by size. Content is never hashed.
pub fn diff(local: &Inventory, remote: &Inventory) -> Comparison {
    let mut comparison = Comparison::default();

    for entry in local.iter() {
        match remote.get(&entry.relative_path) {
            None => comparison.new.push(entry.clone()),
            Some(remote_entry) => {
                let matched = MatchedEntry {
                    relative_path: entry.relative_path.clone(),
                    local_size: entry.size_bytes,
                    remote_size: remote_entry.size_bytes,
                    remote_id: remote_entry.remote_id.clone(),
                };
                if entry.size_bytes == remote_entry.size_bytes {
                    comparison.identical.push(matched);
                } else {
                    comparison.modified.push(matched);
                }
            }
        }
    }

    comparison.remote_only = remote
        .iter()
        .filter(|entry| !local.contains(&entry.relative_path))
        .cloned()
        .collect();

    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn inventory(entries: &[(&str, u64)]) -> Inventory {
        entries
            .iter()
            .map(|(path, size)| InventoryEntry::local(*path, *size))
            .collect()
    }

    #[test]
    fn test_diff_classifies_entries() {
        let local = inventory(&[("A.json", 100), ("B.nii.gz", 500), ("sub-01/C.tsv", 7)]);
        let remote: Inventory = vec![
            InventoryEntry::remote("B.nii.gz", 500, "item-b"),
            InventoryEntry::remote("sub-01/C.tsv", 9, "item-c"),
            InventoryEntry::remote("stale.txt", 1, "item-s"),
        ]
        .into_iter()
        .collect();

        let comparison = diff(&local, &remote);

        assert_eq!(comparison.new, vec![InventoryEntry::local("A.json", 100)]);
        assert_eq!(comparison.identical.len(), 1);
        assert_eq!(comparison.identical[0].relative_path, "B.nii.gz");
        assert_eq!(comparison.identical[0].remote_id.as_deref(), Some("item-b"));
        assert_eq!(comparison.modified.len(), 1);
        assert_eq!(comparison.modified[0].local_size, 7);
        assert_eq!(comparison.modified[0].remote_size, 9);
        assert_eq!(comparison.remote_only.len(), 1);
        assert_eq!(comparison.remote_only[0].relative_path, "stale.txt");
        assert_eq!(comparison.upload_count(true), 2);
        assert_eq!(comparison.upload_count(false), 1);
        assert!(!comparison.is_in_sync());
    }

    #[test]
    fn test_diff_partitions_local_inventory() {
        let local = inventory(&[
            ("a", 1),
            ("b", 2),
            ("c", 3),
            ("d/e", 4),
            ("d/f", 5),
            ("g", 0),
        ]);
        let remote = inventory(&[("b", 2), ("c", 30), ("d/f", 5), ("g", 1), ("x", 1)]);

        let comparison = diff(&local, &remote);

        let mut seen: HashSet<String> = HashSet::new();
        let all_paths = comparison
            .new
            .iter()
            .map(|e| e.relative_path.clone())
            .chain(comparison.identical.iter().map(|m| m.relative_path.clone()))
            .chain(comparison.modified.iter().map(|m| m.relative_path.clone()));
        for path in all_paths {
            assert!(seen.insert(path.clone()), "{} classified twice", path);
        }
        let local_paths: HashSet<String> = local.paths().map(str::to_string).collect();
        assert_eq!(seen, local_paths);
        assert_eq!(comparison.local_total(), local.len());
    }

    #[test]
    fn test_diff_identical_trees_are_in_sync() {
        let local = inventory(&[("a", 1), ("b/c", 2)]);
        let comparison = diff(&local, &local.clone());
        assert!(comparison.is_in_sync());
        assert!(comparison.remote_only.is_empty());
        assert_eq!(comparison.identical.len(), 2);
    }

    #[test]
    fn test_diff_empty_remote() {
        let local = inventory(&[("a", 1), ("b", 2)]);
        let comparison = diff(&local, &Inventory::new());
        assert_eq!(comparison.new.len(), 2);
        assert!(comparison.identical.is_empty());
    }
}
