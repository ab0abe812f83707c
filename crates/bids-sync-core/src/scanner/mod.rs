pub mod walk;

pub use walk::scan_local_tree;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::inventory::{Inventory, InventoryEntry};

const NIFTI_GZ_EXT: &str = ".nii.gz";
const NIFTI_EXT: &str = ".nii";
const SIDECAR_EXT: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Nifti,
    Sidecar,
    Other,
}

impl FileKind {
    pub fn classify(name: &str) -> Self {
        if name.ends_with(NIFTI_GZ_EXT) || name.ends_with(NIFTI_EXT) {
            FileKind::Nifti
        } else if name.ends_with(SIDECAR_EXT) {
            FileKind::Sidecar
        } else {
            FileKind::Other
        }
    }
}

/// File name with its BIDS data extension removed.
///
/// `.nii.gz`, `.nii` and `.json` are stripped as a whole; any other name loses
/// its last extension. Dotfiles keep their name.
pub fn bids_stem(name: &str) -> &str {
    for ext in [NIFTI_GZ_EXT, NIFTI_EXT, SIDECAR_EXT] {
        if let Some(stem) = name.strip_suffix(ext) {
            if !stem.is_empty() {
                return stem;
            }
        }
    }
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Unit of upload: one remote item holding one file, or a NIfTI file with its sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadUnit {
    Single { path: String },
    Pair { data: String, sidecar: String },
}

impl UploadUnit {
    /// Remote item name; a pair is named after its data file.
    pub fn item_name(&self) -> &str {
        let path = match self {
            UploadUnit::Single { path } => path,
            UploadUnit::Pair { data, .. } => data,
        };
        path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
    }

    pub fn paths(&self) -> Vec<&str> {
        match self {
            UploadUnit::Single { path } => vec![path.as_str()],
            UploadUnit::Pair { data, sidecar } => vec![data.as_str(), sidecar.as_str()],
        }
    }
}

/// Result of scanning a local dataset directory.
#[derive(Debug, Clone)]
pub struct LocalTree {
    pub root: PathBuf,
    pub files: Inventory,
    /// Relative paths of every directory below the root, parents first.
    pub directories: Vec<String>,
}

impl LocalTree {
    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Upload units per directory, in file-name order.
    ///
    /// With `pair_sidecars`, a NIfTI file and a `.json` sharing its stem in
    /// the same directory become one `UploadUnit::Pair`.
    pub fn upload_units(&self, pair_sidecars: bool) -> BTreeMap<String, Vec<UploadUnit>> {
        let mut units: BTreeMap<String, Vec<UploadUnit>> = BTreeMap::new();

        for (dir, entries) in self.files.by_directory() {
            let dir_units = if pair_sidecars {
                pair_directory(&entries)
            } else {
                entries
                    .iter()
                    .map(|e| UploadUnit::Single {
                        path: e.relative_path.clone(),
                    })
                    .collect()
            };
            units.insert(dir.to_string(), dir_units);
        }

        units
    }
}

fn pair_directory(entries: &[&InventoryEntry]) -> Vec<UploadUnit> {
    let mut sidecars: BTreeMap<&str, &InventoryEntry> = BTreeMap::new();
    for entry in entries {
        if FileKind::classify(entry.file_name()) == FileKind::Sidecar {
            sidecars.entry(bids_stem(entry.file_name())).or_insert(*entry);
        }
    }

    let mut paired: HashSet<&str> = HashSet::new();
    let mut units = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = entry.file_name();
        if FileKind::classify(name) != FileKind::Nifti {
            continue;
        }
        if let Some(sidecar) = sidecars.get(bids_stem(name)) {
            if paired.insert(sidecar.relative_path.as_str()) {
                paired.insert(entry.relative_path.as_str());
                units.push(UploadUnit::Pair {
                    data: entry.relative_path.clone(),
                    sidecar: sidecar.relative_path.clone(),
                });
            }
        }
    }

    for entry in entries {
        if !paired.contains(entry.relative_path.as_str()) {
            units.push(UploadUnit::Single {
                path: entry.relative_path.clone(),
            });
        }
    }

    units.sort_by(|a, b| a.item_name().cmp(b.item_name()));
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(FileKind::classify("sub-01_T1w.nii.gz"), FileKind::Nifti);
        assert_eq!(FileKind::classify("sub-01_T1w.nii"), FileKind::Nifti);
        assert_eq!(FileKind::classify("sub-01_T1w.json"), FileKind::Sidecar);
        assert_eq!(FileKind::classify("participants.tsv"), FileKind::Other);
    }

    #[test]
    fn test_bids_stem() {
        assert_eq!(bids_stem("sub-01_task-rest_bold.nii.gz"), "sub-01_task-rest_bold");
        assert_eq!(bids_stem("sub-01_task-rest_bold.nii"), "sub-01_task-rest_bold");
        assert_eq!(bids_stem("sub-01_task-rest_bold.json"), "sub-01_task-rest_bold");
        assert_eq!(bids_stem("participants.tsv"), "participants");
        assert_eq!(bids_stem("README"), "README");
        assert_eq!(bids_stem(".bidsignore"), ".bidsignore");
    }

    fn tree(paths: &[(&str, u64)]) -> LocalTree {
        LocalTree {
            root: PathBuf::from("/data/bids"),
            files: paths
                .iter()
                .map(|(p, s)| InventoryEntry::local(*p, *s))
                .collect(),
            directories: Vec::new(),
        }
    }

    #[test]
    fn test_upload_units_without_pairing() {
        let tree = tree(&[
            ("sub-01/func/sub-01_bold.json", 10),
            ("sub-01/func/sub-01_bold.nii.gz", 100),
        ]);
        let units = tree.upload_units(false);
        assert_eq!(units["sub-01/func"].len(), 2);
        assert!(units["sub-01/func"]
            .iter()
            .all(|u| matches!(u, UploadUnit::Single { .. })));
    }

    #[test]
    fn test_upload_units_pairs_same_stem() {
        let tree = tree(&[
            ("dataset_description.json", 5),
            ("sub-01/func/sub-01_bold.json", 10),
            ("sub-01/func/sub-01_bold.nii.gz", 100),
            ("sub-01/func/sub-01_events.tsv", 7),
        ]);
        let units = tree.upload_units(true);

        assert_eq!(
            units[""],
            vec![UploadUnit::Single {
                path: "dataset_description.json".to_string()
            }]
        );
        let func = &units["sub-01/func"];
        assert_eq!(func.len(), 2);
        assert_eq!(
            func[0],
            UploadUnit::Pair {
                data: "sub-01/func/sub-01_bold.nii.gz".to_string(),
                sidecar: "sub-01/func/sub-01_bold.json".to_string(),
            }
        );
        assert_eq!(func[0].item_name(), "sub-01_bold.nii.gz");
        assert_eq!(func[1].item_name(), "sub-01_events.tsv");
    }

    #[test]
    fn test_absolute_path_joins_components() {
        let tree = tree(&[]);
        assert_eq!(
            tree.absolute_path("sub-01/anat/x.nii.gz"),
            PathBuf::from("/data/bids/sub-01/anat/x.nii.gz")
        );
    }
}
