//! Persistence of generated configuration.
//!
//! Incremental style writes one numbered JSON file per operation into a
//! directory; declarative style writes a single metadata document. Either
//! way the store is fully cleared and rewritten on every generation run,
//! and `read_all` returns the operations in replay order.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::emit::{MetadataCommand, Operation};

pub const DEFAULT_CONFIG_DIR: &str = "hasura_config";
pub const DEFAULT_METADATA_PATH: &str = "hasura_metadata.json";
pub const DEFAULT_BASE_METADATA_PATH: &str = "hasura_metadata_base.json";

/// Endpoint path fragment embedded in incremental file names, with `/`
/// percent-encoded so it survives as a single path segment.
const ENDPOINT_FRAGMENT: &str = "v1%2Fmetadata";
/// Positions are zero-padded to this width so lexicographic and numeric
/// order coincide.
const POSITION_WIDTH: usize = 5;

// ---------- errors ----------

#[derive(Debug)]
pub enum StoreError {
    Io(PathBuf, io::Error),
    Malformed(PathBuf, String),
    /// The requested write does not match the store's mode.
    ModeMismatch(&'static str),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(path, e) => write!(f, "{}: {e}", path.display()),
            StoreError::Malformed(path, msg) => write!(f, "{}: {msg}", path.display()),
            StoreError::ModeMismatch(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------- store ----------

pub enum ConfigStore {
    /// Directory of individually numbered operation files.
    Directory(PathBuf),
    /// Single declarative metadata document.
    Document(PathBuf),
}

impl ConfigStore {
    pub fn path(&self) -> &Path {
        match self {
            ConfigStore::Directory(p) | ConfigStore::Document(p) => p,
        }
    }

    /// Whether previously generated output is present.
    pub fn has_output(&self) -> bool {
        match self {
            ConfigStore::Directory(dir) => fs::read_dir(dir)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
            ConfigStore::Document(path) => path.exists(),
        }
    }

    /// Delete all previously generated artifacts for this target.
    pub fn clear(&self) -> Result<(), StoreError> {
        match self {
            ConfigStore::Directory(dir) => {
                if dir.exists() {
                    fs::remove_dir_all(dir).map_err(|e| StoreError::Io(dir.clone(), e))?;
                }
                fs::create_dir_all(dir).map_err(|e| StoreError::Io(dir.clone(), e))
            }
            ConfigStore::Document(path) => match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::Io(path.clone(), e)),
            },
        }
    }

    /// Write one operation file (incremental style).
    pub fn write_operation(&self, op: &Operation) -> Result<(), StoreError> {
        let ConfigStore::Directory(dir) = self else {
            return Err(StoreError::ModeMismatch(
                "write_operation is only valid for a directory store",
            ));
        };
        let path = dir.join(file_name(op.position, &op.label));
        let content = serde_json::to_string_pretty(&op.command)
            .map_err(|e| StoreError::Malformed(path.clone(), e.to_string()))?;
        fs::write(&path, content).map_err(|e| StoreError::Io(path, e))
    }

    /// Write the declarative metadata document, via a temp-file rename so a
    /// failed write never leaves a truncated document behind.
    pub fn write_document(&self, doc: &Value) -> Result<(), StoreError> {
        let ConfigStore::Document(path) = self else {
            return Err(StoreError::ModeMismatch(
                "write_document is only valid for a document store",
            ));
        };
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| StoreError::Malformed(path.clone(), e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| StoreError::Io(tmp.clone(), e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::Io(path.clone(), e))
    }

    /// Read back all persisted operations, ordered by position. A document
    /// store yields a single replace-metadata operation.
    pub fn read_all(&self) -> Result<Vec<Operation>, StoreError> {
        match self {
            ConfigStore::Directory(dir) => {
                let entries = fs::read_dir(dir).map_err(|e| StoreError::Io(dir.clone(), e))?;
                let mut ops = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(|e| StoreError::Io(dir.clone(), e))?;
                    let path = entry.path();
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let (position, label) = parse_file_name(&name).ok_or_else(|| {
                        StoreError::Malformed(path.clone(), "unrecognized file name".to_string())
                    })?;
                    let raw =
                        fs::read_to_string(&path).map_err(|e| StoreError::Io(path.clone(), e))?;
                    let command: MetadataCommand = serde_json::from_str(&raw)
                        .map_err(|e| StoreError::Malformed(path.clone(), e.to_string()))?;
                    ops.push(Operation {
                        position,
                        label,
                        command,
                    });
                }
                ops.sort_by_key(|op| op.position);
                Ok(ops)
            }
            ConfigStore::Document(path) => {
                let raw = fs::read_to_string(path).map_err(|e| StoreError::Io(path.clone(), e))?;
                let doc: Value = serde_json::from_str(&raw)
                    .map_err(|e| StoreError::Malformed(path.clone(), e.to_string()))?;
                let metadata = doc.get("metadata").cloned().ok_or_else(|| {
                    StoreError::Malformed(path.clone(), "document has no metadata key".to_string())
                })?;
                Ok(vec![Operation {
                    position: 0,
                    label: "replace-metadata".to_string(),
                    command: MetadataCommand::ReplaceMetadata(metadata),
                }])
            }
        }
    }
}

fn file_name(position: u32, label: &str) -> String {
    format!(
        "{position:0width$}-{ENDPOINT_FRAGMENT}-{label}.json",
        width = POSITION_WIDTH
    )
}

fn parse_file_name(name: &str) -> Option<(u32, String)> {
    let stem = name.strip_suffix(".json")?;
    let mut parts = stem.splitn(3, '-');
    let position: u32 = parts.next()?.parse().ok()?;
    let fragment = parts.next()?;
    if fragment != ENDPOINT_FRAGMENT {
        return None;
    }
    let label = parts.next()?;
    Some((position, label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{TrackTableArgs, POSITION_STEP};
    use serde_json::json;

    fn track(position: u32, table: &str) -> Operation {
        Operation {
            position,
            label: table.to_string(),
            command: MetadataCommand::PgTrackTable(TrackTableArgs {
                source: "default".to_string(),
                table: table.to_string(),
                configuration: json!({}),
            }),
        }
    }

    #[test]
    fn file_names_keep_lexicographic_and_numeric_order_aligned() {
        assert_eq!(file_name(10, "user"), "00010-v1%2Fmetadata-user.json");
        assert_eq!(
            file_name(120, "post-author_id-user-fwd"),
            "00120-v1%2Fmetadata-post-author_id-user-fwd.json"
        );
        let a = file_name(90, "a");
        let b = file_name(100, "b");
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn file_names_round_trip() {
        let (position, label) = parse_file_name(&file_name(30, "post-author_id-user-bwd")).unwrap();
        assert_eq!(position, 30);
        assert_eq!(label, "post-author_id-user-bwd");
        assert!(parse_file_name("notes.txt").is_none());
        assert!(parse_file_name("00010-v2%2Fquery-user.json").is_none());
    }

    #[test]
    fn directory_round_trip_preserves_order_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::Directory(dir.path().join("hasura_config"));

        let ops: Vec<Operation> = (1..=12)
            .map(|i| track(i * POSITION_STEP, &format!("table_{i}")))
            .collect();

        store.clear().unwrap();
        for op in &ops {
            store.write_operation(op).unwrap();
        }

        let read = store.read_all().unwrap();
        assert_eq!(read, ops);
    }

    #[test]
    fn clear_then_rewrite_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::Directory(dir.path().join("hasura_config"));
        let ops = vec![track(10, "user"), track(20, "post")];

        let snapshot = |store: &ConfigStore| -> Vec<(String, String)> {
            let mut files: Vec<(String, String)> = fs::read_dir(store.path())
                .unwrap()
                .map(|e| {
                    let e = e.unwrap();
                    (
                        e.file_name().to_string_lossy().into_owned(),
                        fs::read_to_string(e.path()).unwrap(),
                    )
                })
                .collect();
            files.sort();
            files
        };

        store.clear().unwrap();
        for op in &ops {
            store.write_operation(op).unwrap();
        }
        let first = snapshot(&store);

        store.clear().unwrap();
        for op in &ops {
            store.write_operation(op).unwrap();
        }
        assert_eq!(snapshot(&store), first);
    }

    #[test]
    fn clear_removes_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::Directory(dir.path().join("hasura_config"));
        store.clear().unwrap();
        store.write_operation(&track(10, "user")).unwrap();
        assert!(store.has_output());

        store.clear().unwrap();
        assert!(!store.has_output());
        assert!(store.read_all().unwrap().is_empty());
    }

    #[test]
    fn document_round_trip_yields_replace_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::Document(dir.path().join("hasura_metadata.json"));
        let doc = json!({
            "metadata": {
                "version": 3,
                "sources": [ { "name": "default", "tables": [] } ]
            }
        });

        store.clear().unwrap();
        store.write_document(&doc).unwrap();
        assert!(store.has_output());

        let ops = store.read_all().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].label, "replace-metadata");
        assert_eq!(
            ops[0].command,
            MetadataCommand::ReplaceMetadata(doc["metadata"].clone())
        );
    }

    #[test]
    fn mode_mismatch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let doc_store = ConfigStore::Document(dir.path().join("hasura_metadata.json"));
        assert!(matches!(
            doc_store.write_operation(&track(10, "user")),
            Err(StoreError::ModeMismatch(_))
        ));

        let dir_store = ConfigStore::Directory(dir.path().join("hasura_config"));
        assert!(matches!(
            dir_store.write_document(&json!({})),
            Err(StoreError::ModeMismatch(_))
        ));
    }
}
