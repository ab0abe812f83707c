//! Sidecar metadata propagation.
//!
//! After an upload, every `.json` item in a remote folder is downloaded and
//! its object merged into the metadata of the entity it describes: the
//! folder for `dataset_description.json`, otherwise a sibling item chosen by
//! [`AssociationRule`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::remote::{EntityRef, RemoteItem, RemoteStore};
use crate::scanner::{bids_stem, FileKind};

pub const DATASET_DESCRIPTION: &str = "dataset_description.json";

/// How a `<stem>.json` sidecar picks the sibling item it describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssociationRule {
    /// First sibling, in listing order, whose name starts with the stem.
    #[default]
    Prefix,
    /// First sibling whose BIDS stem equals the stem.
    ExactStem,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataStats {
    pub folders_visited: usize,
    pub sidecars_applied: usize,
    /// Sidecars attached to the same item as their data file.
    pub paired_applied: usize,
    pub unmatched: usize,
}

impl MetadataStats {
    pub fn entities_updated(&self) -> usize {
        self.sidecars_applied + self.paired_applied
    }
}

/// The entity `sidecar` describes, or `None` when no sibling matches.
///
/// `siblings` must be in listing order; the sidecar itself is never a candidate.
pub fn resolve_association(
    sidecar: &RemoteItem,
    siblings: &[RemoteItem],
    folder_id: &str,
    rule: AssociationRule,
) -> Option<EntityRef> {
    if sidecar.name == DATASET_DESCRIPTION {
        return Some(EntityRef::folder(folder_id));
    }

    let stem = sidecar.name.strip_suffix(".json")?;
    siblings
        .iter()
        .filter(|item| item.id != sidecar.id)
        .find(|item| match rule {
            AssociationRule::Prefix => item.name.starts_with(stem),
            AssociationRule::ExactStem => bids_stem(&item.name) == stem,
        })
        .map(|item| EntityRef::item(item.id.clone()))
}

/// Parse sidecar bytes; anything but a JSON object is malformed.
pub fn parse_sidecar(name: &str, content: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(content).map_err(|err| Error::MalformedSidecar {
        name: name.to_string(),
        reason: err.to_string(),
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::MalformedSidecar {
            name: name.to_string(),
            reason: format!("top level is {}, expected an object", json_type(&other)),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn read_sidecar<S: RemoteStore>(store: &S, item: &RemoteItem) -> Result<Map<String, Value>> {
    let files = store.list_files(&item.id)?;
    let Some(file) = files.first() else {
        return Err(Error::MalformedSidecar {
            name: item.name.clone(),
            reason: "item has no file attached".to_string(),
        });
    };
    let content = store.download_file(&file.id)?;
    parse_sidecar(&item.name, &content)
}

/// Merge the attached `.json` file of a paired NIfTI item into its own metadata.
fn apply_paired_sidecar<S: RemoteStore>(store: &S, item: &RemoteItem) -> Result<bool> {
    let files = store.list_files(&item.id)?;
    let Some(file) = files
        .iter()
        .find(|f| FileKind::classify(&f.name) == FileKind::Sidecar)
    else {
        return Ok(false);
    };

    let content = store.download_file(&file.id)?;
    let metadata = parse_sidecar(&file.name, &content)?;
    store.add_metadata(&EntityRef::item(item.id.clone()), &metadata)?;
    debug!("Applied attached {} to item {}", file.name, item.name);
    Ok(true)
}

/// Attach sidecar content under `folder_id`, descending into subfolders when `recursive`.
///
/// A folder's items are all handled before its subfolders are visited.
/// Attached `.json` files on NIfTI items are only looked up when `pair_sidecars`
/// is set. The first malformed sidecar aborts the pass.
pub fn propagate_metadata<S: RemoteStore>(
    store: &S,
    folder_id: &str,
    recursive: bool,
    rule: AssociationRule,
    pair_sidecars: bool,
) -> Result<MetadataStats> {
    let mut stats = MetadataStats::default();
    let mut stack = vec![folder_id.to_string()];

    while let Some(current) = stack.pop() {
        stats.folders_visited += 1;
        let items = store.list_items(&current)?;

        for item in &items {
            match FileKind::classify(&item.name) {
                FileKind::Sidecar => {
                    let Some(target) = resolve_association(item, &items, &current, rule) else {
                        debug!("No entity matches sidecar {}, skipping", item.name);
                        stats.unmatched += 1;
                        continue;
                    };
                    let metadata = read_sidecar(store, item)?;
                    store.add_metadata(&target, &metadata)?;
                    debug!("Applied {} to {} {}", item.name, target.kind, target.id);
                    stats.sidecars_applied += 1;
                }
                FileKind::Nifti if pair_sidecars => {
                    if apply_paired_sidecar(store, item)? {
                        stats.paired_applied += 1;
                    }
                }
                FileKind::Nifti | FileKind::Other => {}
            }
        }

        if recursive {
            let folders = store.list_folders(&current, None)?;
            stack.extend(folders.into_iter().rev().map(|f| f.id));
        }
    }

    info!(
        "Metadata applied from {} sidecars ({} paired) across {} folders, {} unmatched",
        stats.sidecars_applied, stats.paired_applied, stats.folders_visited, stats.unmatched
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use serde_json::json;
    use std::io::Write;

    fn item(id: &str, name: &str) -> RemoteItem {
        RemoteItem {
            id: id.to_string(),
            name: name.to_string(),
            folder_id: "f".to_string(),
            size: 0,
        }
    }

    #[test]
    fn test_resolve_dataset_description_targets_folder() {
        let sidecar = item("1", DATASET_DESCRIPTION);
        let target = resolve_association(&sidecar, &[sidecar.clone()], "f", AssociationRule::Prefix);
        assert_eq!(target, Some(EntityRef::folder("f")));
    }

    #[test]
    fn test_resolve_prefix_skips_self() {
        let siblings = vec![
            item("1", "sub-01_bold.json"),
            item("2", "sub-01_bold.nii.gz"),
        ];
        let target = resolve_association(&siblings[0], &siblings, "f", AssociationRule::Prefix);
        assert_eq!(target, Some(EntityRef::item("2")));
    }

    #[test]
    fn test_resolve_prefix_vs_exact_stem() {
        let siblings = vec![
            item("1", "sub-01_run-1.json"),
            item("2", "sub-01_run-10.nii.gz"),
            item("3", "sub-01_run-1.nii.gz"),
        ];
        let prefix = resolve_association(&siblings[0], &siblings, "f", AssociationRule::Prefix);
        assert_eq!(prefix, Some(EntityRef::item("2")));

        let exact = resolve_association(&siblings[0], &siblings, "f", AssociationRule::ExactStem);
        assert_eq!(exact, Some(EntityRef::item("3")));
    }

    #[test]
    fn test_resolve_no_match() {
        let siblings = vec![item("1", "task-rest_bold.json"), item("2", "participants.tsv")];
        assert_eq!(
            resolve_association(&siblings[0], &siblings, "f", AssociationRule::Prefix),
            None
        );
    }

    #[test]
    fn test_parse_sidecar_rejects_truncated_and_non_objects() {
        let err = parse_sidecar("x.json", br#"{"key": "#).unwrap_err();
        assert!(matches!(err, Error::MalformedSidecar { ref name, .. } if name == "x.json"));

        let err = parse_sidecar("y.json", b"[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"));

        let map = parse_sidecar("z.json", br#"{"RepetitionTime": 2.0}"#).unwrap();
        assert_eq!(map["RepetitionTime"], json!(2.0));
    }

    #[test]
    fn test_propagate_sidecar_and_dataset_description() {
        let store = MemoryStore::new();
        let root = store.create_root("ds");
        store.put_item(&root, DATASET_DESCRIPTION, br#"{"Name": "demo", "BIDSVersion": "1.8.0"}"#);
        let func = store.create_folder(&root, "func", false).unwrap();
        let bold = store.put_item(&func.id, "sub-01_task-rest_bold.nii.gz", b"nifti");
        store.put_item(&func.id, "sub-01_task-rest_bold.json", br#"{"RepetitionTime": 2.0}"#);

        let stats = propagate_metadata(&store, &root, true, AssociationRule::Prefix, false).unwrap();

        let folder_meta = store.metadata(&EntityRef::folder(root.clone())).unwrap();
        assert_eq!(folder_meta["Name"], "demo");
        let item_meta = store.metadata(&EntityRef::item(bold.id)).unwrap();
        assert_eq!(item_meta["RepetitionTime"], json!(2.0));
        assert_eq!(stats.sidecars_applied, 2);
        assert_eq!(stats.folders_visited, 2);
    }

    #[test]
    fn test_propagate_non_recursive_stays_in_folder() {
        let store = MemoryStore::new();
        let root = store.create_root("ds");
        let func = store.create_folder(&root, "func", false).unwrap();
        let bold = store.put_item(&func.id, "a_bold.nii.gz", b"nifti");
        store.put_item(&func.id, "a_bold.json", br#"{"k": 1}"#);

        let stats = propagate_metadata(&store, &root, false, AssociationRule::Prefix, false).unwrap();

        assert_eq!(stats.folders_visited, 1);
        assert!(store.metadata(&EntityRef::item(bold.id)).unwrap().is_empty());
    }

    #[test]
    fn test_propagate_malformed_sidecar_aborts() {
        let store = MemoryStore::new();
        let root = store.create_root("ds");
        store.put_item(&root, "a_bold.nii.gz", b"nifti");
        store.put_item(&root, "a_bold.json", br#"{"key": "#);

        let err = propagate_metadata(&store, &root, true, AssociationRule::Prefix, false).unwrap_err();
        assert!(matches!(err, Error::MalformedSidecar { .. }));
    }

    #[test]
    fn test_propagate_unmatched_sidecar_is_skipped() {
        let store = MemoryStore::new();
        let root = store.create_root("ds");
        store.put_item(&root, "task-rest_bold.json", b"not even json");

        let stats = propagate_metadata(&store, &root, true, AssociationRule::Prefix, false).unwrap();
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.entities_updated(), 0);
    }

    #[test]
    fn test_propagate_paired_item() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar_path = dir.path().join("a_T1w.json");
        let mut file = std::fs::File::create(&sidecar_path).unwrap();
        file.write_all(br#"{"EchoTime": 0.03}"#).unwrap();

        let store = MemoryStore::new();
        let root = store.create_root("ds");
        let item = store.put_item(&root, "a_T1w.nii.gz", b"nifti");
        store.upload_file(&item.id, &sidecar_path, "a_T1w.json").unwrap();

        let stats = propagate_metadata(&store, &root, true, AssociationRule::Prefix, true).unwrap();

        assert_eq!(stats.paired_applied, 1);
        let meta = store.metadata(&EntityRef::item(item.id)).unwrap();
        assert_eq!(meta["EchoTime"], json!(0.03));
    }

    #[test]
    fn test_attached_json_ignored_without_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar_path = dir.path().join("a_T1w.json");
        std::fs::write(&sidecar_path, br#"{"EchoTime": 0.03}"#).unwrap();

        let store = MemoryStore::new();
        let root = store.create_root("ds");
        let item = store.put_item(&root, "a_T1w.nii.gz", b"nifti");
        store.upload_file(&item.id, &sidecar_path, "a_T1w.json").unwrap();

        let stats =
            propagate_metadata(&store, &root, true, AssociationRule::Prefix, false).unwrap();

        assert_eq!(stats.paired_applied, 0);
        assert!(store.metadata(&EntityRef::item(item.id)).unwrap().is_empty());
    }
}
