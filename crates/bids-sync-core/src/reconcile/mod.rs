//! Local-vs-remote reconciliation: what to upload, and how to treat what is already there.

pub mod diff;
pub mod reset;

pub use diff::{diff, Comparison, MatchedEntry};
pub use reset::{reset_folder, DeletionStats};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Policy for content already present under the target folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Delete everything under the target, then upload everything.
    Reset,
    /// Upload everything, reusing same-named folders and items.
    #[default]
    OverwriteOnSameName,
    /// Upload only entries the remote inventory lacks (or holds at another size).
    SkipExisting,
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Reset => write!(f, "reset"),
            ImportMode::OverwriteOnSameName => write!(f, "overwrite"),
            ImportMode::SkipExisting => write!(f, "skip-existing"),
        }
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "reset" | "reset-database" => Ok(ImportMode::Reset),
            "overwrite" | "overwrite-on-same-name" => Ok(ImportMode::OverwriteOnSameName),
            "skip-existing" => Ok(ImportMode::SkipExisting),
            other => Err(format!("unknown import mode '{}'", other)),
        }
    }
}

impl Serialize for ImportMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Accepts the same spellings as `FromStr`, including the legacy upper-case names.
impl<'de> Deserialize<'de> for ImportMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Relative paths the uploader must leave alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    skip: HashSet<String>,
}

impl UploadPlan {
    pub fn upload_all() -> Self {
        Self::default()
    }

    /// Only `SkipExisting` skips anything: identical entries always, modified
    /// entries unless `upload_modified` is set.
    pub fn for_mode(mode: ImportMode, comparison: Option<&Comparison>, upload_modified: bool) -> Self {
        let (ImportMode::SkipExisting, Some(comparison)) = (mode, comparison) else {
            return Self::upload_all();
        };

        let mut skip: HashSet<String> = comparison
            .identical
            .iter()
            .map(|m| m.relative_path.clone())
            .collect();
        if !upload_modified {
            skip.extend(comparison.modified.iter().map(|m| m.relative_path.clone()));
        }
        Self { skip }
    }

    pub fn should_skip(&self, relative_path: &str) -> bool {
        self.skip.contains(relative_path)
    }

    pub fn skipped(&self) -> usize {
        self.skip.len()
    }
}
