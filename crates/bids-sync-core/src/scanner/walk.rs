use glob::Pattern;
use std::io;
use std::path::Path;
use tracing::{debug, error, warn};
use walkdir::{DirEntry, WalkDir};

use super::LocalTree;
use crate::error::{Error, Result};
use crate::inventory::{Inventory, InventoryEntry};

/// Walk a dataset directory and build its inventory.
///
/// Symlinks are followed, so annexed content is sized by its target. Ignore
/// globs are matched against both the `/`-separated relative path and the
/// bare file name; an ignored directory prunes its whole subtree. Entries
/// that vanish or cannot be read are logged and skipped.
pub fn scan_local_tree(root: &Path, ignore_globs: &[String]) -> Result<LocalTree> {
    if !root.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let ignore_patterns = ignore_globs
        .iter()
        .map(|glob| Pattern::new(glob))
        .collect::<Result<Vec<_>, _>>()?;

    let mut files = Inventory::new();
    let mut directories = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored(root, entry, &ignore_patterns));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let kind = err.io_error().map(io::Error::kind);
                match kind {
                    Some(io::ErrorKind::PermissionDenied) => {
                        error!("Access denied: {}", err);
                        continue;
                    }
                    Some(io::ErrorKind::NotFound) => {
                        warn!("Skipping unreadable entry: {}", err);
                        continue;
                    }
                    _ => return Err(err.into()),
                }
            }
        };

        let Some(relative_path) = relative_path(root, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            directories.push(relative_path);
        } else if entry.file_type().is_file() {
            let size = entry.metadata()?.len();
            files.insert(InventoryEntry::local(relative_path, size));
        }
    }

    debug!(
        "Scanned {}: {} files, {} directories",
        root.display(),
        files.len(),
        directories.len()
    );

    Ok(LocalTree {
        root: root.to_path_buf(),
        files,
        directories,
    })
}

fn is_ignored(root: &Path, entry: &DirEntry, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let Some(relative) = relative_path(root, entry.path()) else {
        return false;
    };
    let name = entry.file_name().to_string_lossy();
    patterns
        .iter()
        .any(|pattern| pattern.matches(&relative) || pattern.matches(&name))
}

/// `/`-separated path of `path` below `root`, regardless of platform.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn create_dataset(root: &Path) {
        fs::create_dir_all(root.join("sub-01/anat")).unwrap();
        fs::create_dir_all(root.join("sub-01/func")).unwrap();
        fs::create_dir_all(root.join("derivatives")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();

        fs::write(root.join("dataset_description.json"), r#"{"Name": "x"}"#).unwrap();
        fs::write(root.join("README"), "").unwrap();
        fs::write(root.join("sub-01/anat/sub-01_T1w.nii.gz"), vec![0u8; 256]).unwrap();
        fs::write(root.join("sub-01/func/sub-01_task-rest_bold.json"), "{}").unwrap();
        fs::write(root.join(".git/objects/abc"), "blob").unwrap();
    }

    #[test]
    fn test_scan_collects_files_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        create_dataset(tmp.path());

        let tree = scan_local_tree(tmp.path(), &[]).unwrap();

        assert_eq!(tree.files.len(), 5);
        assert_eq!(
            tree.files.get("sub-01/anat/sub-01_T1w.nii.gz").unwrap().size_bytes,
            256
        );
        assert_eq!(tree.files.get("README").unwrap().size_bytes, 0);
        assert!(tree.directories.contains(&"derivatives".to_string()));
        assert!(tree.directories.contains(&"sub-01/func".to_string()));

        let sub = tree.directories.iter().position(|d| d == "sub-01").unwrap();
        let anat = tree.directories.iter().position(|d| d == "sub-01/anat").unwrap();
        assert!(sub < anat, "parents must precede children");
    }

    #[test]
    fn test_scan_prunes_ignored_directories() {
        let tmp = tempfile::tempdir().unwrap();
        create_dataset(tmp.path());

        let tree = scan_local_tree(tmp.path(), &[".git".to_string()]).unwrap();

        assert_eq!(tree.files.len(), 4);
        assert!(!tree.files.contains(".git/objects/abc"));
        assert!(!tree.directories.iter().any(|d| d.starts_with(".git")));
    }

    #[test]
    fn test_scan_ignores_by_file_name_glob() {
        let tmp = tempfile::tempdir().unwrap();
        create_dataset(tmp.path());

        let tree = scan_local_tree(tmp.path(), &["*.json".to_string()]).unwrap();
        assert!(!tree.files.contains("dataset_description.json"));
        assert!(!tree.files.contains("sub-01/func/sub-01_task-rest_bold.json"));
    }

    #[test]
    fn test_scan_rejects_invalid_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        let result = scan_local_tree(tmp.path(), &["[".to_string()]);
        assert!(matches!(result, Err(Error::Pattern(_))));
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = scan_local_tree(&tmp.path().join("nope"), &[]);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_broken_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        create_dataset(tmp.path());
        std::os::unix::fs::symlink(
            tmp.path().join("missing-annex-object"),
            tmp.path().join("sub-01/anat/sub-01_T2w.nii.gz"),
        )
        .unwrap();

        let tree = scan_local_tree(tmp.path(), &[]).unwrap();
        assert!(!tree.files.contains("sub-01/anat/sub-01_T2w.nii.gz"));
        assert_eq!(tree.files.len(), 5);
    }
}
