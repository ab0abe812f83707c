use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::progress::ProgressReporter;
use crate::reconcile::UploadPlan;
use crate::remote::{RemoteItem, RemoteStore};
use crate::scanner::{LocalTree, UploadUnit};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub folders: usize,
    pub items_uploaded: usize,
    /// Reused items that already held exactly the local files.
    pub items_unchanged: usize,
    /// Units left out by the upload plan.
    pub items_skipped: usize,
    pub bytes_uploaded: u64,
}

/// Mirrors a scanned local tree under a remote folder.
pub struct Uploader<'a, S: RemoteStore> {
    store: &'a S,
    reuse_existing: bool,
    pair_sidecars: bool,
}

impl<'a, S: RemoteStore> Uploader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            reuse_existing: true,
            pair_sidecars: false,
        }
    }

    pub fn with_reuse_existing(mut self, reuse_existing: bool) -> Self {
        self.reuse_existing = reuse_existing;
        self
    }

    pub fn with_pair_sidecars(mut self, pair_sidecars: bool) -> Self {
        self.pair_sidecars = pair_sidecars;
        self
    }

    /// Create one folder per local directory and one item per upload unit.
    ///
    /// Directories are visited depth-first from an explicit stack, each
    /// directory's items before its subdirectories. Any store failure aborts.
    pub fn upload_tree(
        &self,
        tree: &LocalTree,
        root_id: &str,
        plan: &UploadPlan,
        reporter: &dyn ProgressReporter,
    ) -> Result<UploadStats> {
        let units = tree.upload_units(self.pair_sidecars);
        let total_units: usize = units.values().map(Vec::len).sum();
        let children = child_directories(&tree.directories);

        let mut stats = UploadStats::default();
        let mut units_done = 0usize;
        let mut stack: Vec<(&str, String)> = vec![("", root_id.to_string())];

        reporter.on_upload_start(total_units);

        while let Some((dir, folder_id)) = stack.pop() {
            for unit in units.get(dir).map(Vec::as_slice).unwrap_or_default() {
                units_done += 1;
                reporter.on_upload_progress(units_done, total_units, unit.item_name());

                if unit.paths().iter().all(|p| plan.should_skip(p)) {
                    debug!("Skipping {}", unit.item_name());
                    stats.items_skipped += 1;
                    continue;
                }
                self.upload_unit(tree, &folder_id, unit, &mut stats)?;
            }

            if let Some(subdirs) = children.get(dir) {
                for &subdir in subdirs.iter().rev() {
                    let name = subdir.rsplit_once('/').map(|(_, n)| n).unwrap_or(subdir);
                    let folder = self
                        .store
                        .create_folder(&folder_id, name, self.reuse_existing)?;
                    debug!("Folder {} -> {}", subdir, folder.id);
                    stats.folders += 1;
                    stack.push((subdir, folder.id));
                }
            }
        }

        info!(
            "Uploaded {} items ({} bytes), {} unchanged, {} skipped, {} folders",
            stats.items_uploaded,
            stats.bytes_uploaded,
            stats.items_unchanged,
            stats.items_skipped,
            stats.folders
        );
        Ok(stats)
    }

    fn upload_unit(
        &self,
        tree: &LocalTree,
        folder_id: &str,
        unit: &UploadUnit,
        stats: &mut UploadStats,
    ) -> Result<()> {
        let desired: Vec<(&str, &str, u64)> = unit
            .paths()
            .into_iter()
            .map(|path| {
                let name = path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path);
                let size = tree.files.get(path).map_or(0, |e| e.size_bytes);
                (path, name, size)
            })
            .collect();

        let item = self
            .store
            .create_item(folder_id, unit.item_name(), self.reuse_existing)?;

        if self.reuse_existing && self.holds_exactly(&item, &desired)? {
            debug!("Item {} already up to date", item.name);
            stats.items_unchanged += 1;
            return Ok(());
        }

        for existing in self.store.list_files(&item.id)? {
            self.store.delete_file(&existing.id)?;
        }
        for (path, name, size) in &desired {
            self.store
                .upload_file(&item.id, &tree.absolute_path(path), name)?;
            stats.bytes_uploaded += size;
        }
        debug!("Uploaded {} file(s) into item {}", desired.len(), item.name);
        stats.items_uploaded += 1;
        Ok(())
    }

    fn holds_exactly(&self, item: &RemoteItem, desired: &[(&str, &str, u64)]) -> Result<bool> {
        let mut existing: Vec<(String, u64)> = self
            .store
            .list_files(&item.id)?
            .into_iter()
            .map(|f| (f.name, f.size))
            .collect();
        let mut wanted: Vec<(String, u64)> = desired
            .iter()
            .map(|(_, name, size)| (name.to_string(), *size))
            .collect();
        existing.sort();
        wanted.sort();
        Ok(existing == wanted)
    }
}

/// Directories grouped under their parent ("" for the root), in input order.
fn child_directories(directories: &[String]) -> HashMap<&str, Vec<&str>> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for dir in directories {
        let parent = dir.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        children.entry(parent).or_default().push(dir.as_str());
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use crate::remote::{read_remote_tree, MemoryStore};
    use crate::scanner::scan_local_tree;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn dataset() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "dataset_description.json", br#"{"Name": "demo"}"#);
        write(dir.path(), "participants.tsv", b"participant_id\nsub-01\n");
        write(dir.path(), "sub-01/anat/sub-01_T1w.nii.gz", &[1u8; 128]);
        write(dir.path(), "sub-01/anat/sub-01_T1w.json", br#"{"EchoTime": 0.03}"#);
        fs::create_dir_all(dir.path().join("sub-01/dwi")).unwrap();
        dir
    }

    fn local_view(tree: &LocalTree) -> Vec<(String, u64)> {
        tree.files
            .iter()
            .map(|e| (e.relative_path.clone(), e.size_bytes))
            .collect()
    }

    fn remote_view(store: &MemoryStore, root: &str) -> Vec<(String, u64)> {
        read_remote_tree(store, root)
            .unwrap()
            .iter()
            .map(|e| (e.relative_path.clone(), e.size_bytes))
            .collect()
    }

    #[test]
    fn test_upload_mirrors_tree() {
        let dir = dataset();
        let tree = scan_local_tree(dir.path(), &[]).unwrap();
        let store = MemoryStore::new();
        let root = store.create_root("target");

        let stats = Uploader::new(&store)
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();

        assert_eq!(remote_view(&store, &root), local_view(&tree));
        assert_eq!(stats.items_uploaded, 4);
        assert_eq!(stats.folders, 3);
        assert_eq!(stats.bytes_uploaded, tree.files.total_bytes());

        let sub = store.list_folders(&root, Some("sub-01")).unwrap();
        let dwi = store.list_folders(&sub[0].id, Some("dwi")).unwrap();
        assert_eq!(dwi.len(), 1);
    }

    #[test]
    fn test_second_upload_is_idempotent() {
        let dir = dataset();
        let tree = scan_local_tree(dir.path(), &[]).unwrap();
        let store = MemoryStore::new();
        let root = store.create_root("target");
        let uploader = Uploader::new(&store);

        uploader
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();
        let first = remote_view(&store, &root);
        let uploads = store.upload_count();

        let stats = uploader
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();

        assert_eq!(remote_view(&store, &root), first);
        assert_eq!(store.upload_count(), uploads);
        assert_eq!(stats.items_unchanged, 4);
        assert_eq!(stats.items_uploaded, 0);
    }

    #[test]
    fn test_without_reuse_creates_fresh_items() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README", b"demo");
        write(dir.path(), "participants.tsv", b"participant_id\n");
        let tree = scan_local_tree(dir.path(), &[]).unwrap();
        let store = MemoryStore::new();
        let root = store.create_root("target");

        Uploader::new(&store)
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();
        let stats = Uploader::new(&store)
            .with_reuse_existing(false)
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();

        assert_eq!(stats.items_uploaded, 2);
        assert_eq!(stats.items_unchanged, 0);
        let names: Vec<String> = store
            .list_items(&root)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(
            names,
            ["participants.tsv", "participants.tsv (1)", "README", "README (1)"]
        );
    }

    #[test]
    fn test_changed_file_replaces_item_content() {
        let dir = dataset();
        let store = MemoryStore::new();
        let root = store.create_root("target");
        let uploader = Uploader::new(&store);

        let tree = scan_local_tree(dir.path(), &[]).unwrap();
        uploader
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();

        write(dir.path(), "participants.tsv", b"participant_id\nsub-01\nsub-02\n");
        let tree = scan_local_tree(dir.path(), &[]).unwrap();
        let stats = uploader
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();

        assert_eq!(stats.items_uploaded, 1);
        assert_eq!(remote_view(&store, &root), local_view(&tree));
        let item = &store.list_items(&root).unwrap()[1];
        assert_eq!(item.name, "participants.tsv");
        assert_eq!(store.list_files(&item.id).unwrap().len(), 1);
    }

    #[test]
    fn test_paired_upload_holds_both_files() {
        let dir = dataset();
        let tree = scan_local_tree(dir.path(), &[]).unwrap();
        let store = MemoryStore::new();
        let root = store.create_root("target");

        let stats = Uploader::new(&store)
            .with_pair_sidecars(true)
            .upload_tree(&tree, &root, &UploadPlan::upload_all(), &SilentReporter)
            .unwrap();

        assert_eq!(stats.items_uploaded, 3);
        let sub = &store.list_folders(&root, Some("sub-01")).unwrap()[0];
        let anat = &store.list_folders(&sub.id, Some("anat")).unwrap()[0];
        let items = store.list_items(&anat.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "sub-01_T1w.nii.gz");
        let mut names: Vec<String> = store
            .list_files(&items[0].id)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["sub-01_T1w.json", "sub-01_T1w.nii.gz"]);
    }

    #[test]
    fn test_child_directories_groups_by_parent() {
        let dirs = vec![
            "a".to_string(),
            "a/b".to_string(),
            "a/c".to_string(),
            "d".to_string(),
        ];
        let children = child_directories(&dirs);
        assert_eq!(children[""], vec!["a", "d"]);
        assert_eq!(children["a"], vec!["a/b", "a/c"]);
        assert!(!children.contains_key("d"));
    }
}
