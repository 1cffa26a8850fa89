//! On-disk JSON manifest of machine records.
//!
//! The manifest is `{"vms": [...]}`. Records are only ever appended; the one
//! in-place edit is stamping `provisioned_at` (see [`mark_provisioned`]).
//! Rewrites go through the untyped `serde_json::Value` form so keys this
//! crate does not know about survive a read-modify-write cycle.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProvisionError;
use crate::util;

const VMS_KEY: &str = "vms";

/// One validated machine specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioned_at: Option<String>,
}

/// Typed view of the whole manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub vms: Vec<MachineRecord>,
}

/// A manifest entry that is well-formed enough to hand to a provisioner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub provisioned_at: Option<String>,
}

impl ManifestEntry {
    pub fn is_provisioned(&self) -> bool {
        self.provisioned_at.is_some()
    }
}

/// What [`append`] does when the existing file cannot be merged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CorruptPolicy {
    /// Replace the file with the new records, discarding the old content.
    Overwrite,
    /// Copy the old bytes to a `.bak-<timestamp>` sibling, then overwrite.
    #[default]
    Backup,
    /// Leave the file alone and fail.
    Abort,
}

/// Result of a successful [`append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Nothing to write; the file was not touched.
    Skipped,
    /// The manifest did not exist and was created.
    Created { added: usize },
    /// New records were appended to the existing list.
    Merged { added: usize, total: usize },
    /// The old file was corrupt and has been replaced.
    Reset {
        added: usize,
        backup: Option<PathBuf>,
    },
}

// ── reading ──────────────────────────────────────────────

/// Load the manifest as typed records. A missing file is an empty manifest.
///
/// Entries that do not form a complete record are skipped with a warning.
pub fn load(path: &Path) -> Result<Manifest, ProvisionError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Manifest::default()),
        Err(e) => return Err(io_error(path, e)),
    };

    let document: Value =
        serde_json::from_slice(&bytes).map_err(|e| ProvisionError::ManifestCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let Some(root) = document.as_object() else {
        return Err(ProvisionError::ManifestShape {
            path: path.display().to_string(),
            message: "top-level value is not an object".into(),
        });
    };
    let list = match root.get(VMS_KEY) {
        None => return Ok(Manifest::default()),
        Some(Value::Array(list)) => list,
        Some(_) => {
            return Err(ProvisionError::ManifestShape {
                path: path.display().to_string(),
                message: "'vms' is not a list".into(),
            });
        }
    };

    let mut vms = Vec::with_capacity(list.len());
    for (index, entry) in list.iter().enumerate() {
        match MachineRecord::deserialize(entry) {
            Ok(record) => vms.push(record),
            Err(e) => tracing::warn!(index, entry = %entry, "invalid VM entry, skipping: {e}"),
        }
    }

    Ok(Manifest { vms })
}

/// Read the manifest for replay.
///
/// A missing file is bootstrapped as `{"vms": []}`. Entries that are not
/// objects with a non-empty string `name` are skipped with a warning.
pub fn configure_vms_from_file(path: &Path) -> Result<Vec<ManifestEntry>, ProvisionError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "manifest not found, creating an empty one");
            ensure_parent(path)?;
            write_document(path, &empty_document())?;
            return Ok(Vec::new());
        }
        Err(e) => {
            tracing::error!(path = %path.display(), "error reading manifest: {e}");
            return Err(io_error(path, e));
        }
    };

    let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::error!(path = %path.display(), "invalid JSON in manifest: {e}");
        ProvisionError::ManifestCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;

    let Some(list) = document.get(VMS_KEY).and_then(Value::as_array) else {
        tracing::error!(path = %path.display(), "'vms' key not found or is not a list");
        return Err(ProvisionError::ManifestShape {
            path: path.display().to_string(),
            message: "'vms' key not found or is not a list".into(),
        });
    };

    let mut entries = Vec::with_capacity(list.len());
    for (index, entry) in list.iter().enumerate() {
        match entry.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => entries.push(ManifestEntry {
                name: name.to_string(),
                provisioned_at: entry
                    .get("provisioned_at")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            _ => tracing::warn!(index, entry = %entry, "invalid VM entry, skipping"),
        }
    }

    Ok(entries)
}

// ── writing ──────────────────────────────────────────────

/// Append `new_records` to the manifest at `path`, creating it if needed.
///
/// An empty batch never touches the filesystem. A file that is not valid
/// JSON, whose root is not an object, or whose `vms` is not an array is
/// handled according to `on_corrupt`.
pub fn append(
    path: &Path,
    new_records: &[MachineRecord],
    on_corrupt: CorruptPolicy,
) -> Result<AppendOutcome, ProvisionError> {
    if new_records.is_empty() {
        return Ok(AppendOutcome::Skipped);
    }

    ensure_parent(path)?;

    let added = new_records.len();
    let new_values = new_records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| encode_error(path, e))?;

    let existing = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            write_document(path, &records_document(new_values))?;
            tracing::info!(path = %path.display(), added, "created manifest");
            return Ok(AppendOutcome::Created { added });
        }
        Err(e) => return Err(io_error(path, e)),
    };

    match merge(&existing, new_values.clone()) {
        Ok((document, total)) => {
            write_document(path, &document)?;
            tracing::info!(path = %path.display(), added, total, "appended records to manifest");
            Ok(AppendOutcome::Merged { added, total })
        }
        Err(reason) => reset(path, &existing, new_values, on_corrupt, reason),
    }
}

/// Stamp `provisioned_at` on the first unstamped entry for each name.
/// Returns how many entries were stamped.
pub fn mark_provisioned(
    path: &Path,
    names: &[String],
    timestamp: &str,
) -> Result<usize, ProvisionError> {
    if names.is_empty() {
        return Ok(0);
    }

    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    let mut document: Value =
        serde_json::from_slice(&bytes).map_err(|e| ProvisionError::ManifestCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let Some(list) = document.get_mut(VMS_KEY).and_then(Value::as_array_mut) else {
        return Err(ProvisionError::ManifestShape {
            path: path.display().to_string(),
            message: "'vms' key not found or is not a list".into(),
        });
    };

    let mut stamped = 0;
    for name in names {
        let target = list.iter_mut().filter_map(Value::as_object_mut).find(|entry| {
            entry.get("name").and_then(Value::as_str) == Some(name.as_str())
                && !entry.contains_key("provisioned_at")
        });
        if let Some(entry) = target {
            entry.insert("provisioned_at".into(), Value::String(timestamp.to_string()));
            stamped += 1;
        }
    }

    if stamped > 0 {
        write_document(path, &document)?;
    }
    Ok(stamped)
}

// ── internals ────────────────────────────────────────────

/// Merge new entries into an existing document, returning it with the new
/// total. `Err` carries the reason the existing bytes are unusable.
fn merge(existing: &[u8], new_values: Vec<Value>) -> Result<(Value, usize), String> {
    let mut document: Value =
        serde_json::from_slice(existing).map_err(|e| format!("invalid JSON: {e}"))?;

    let Some(root) = document.as_object_mut() else {
        return Err("top-level value is not an object".into());
    };

    let vms = root
        .entry(VMS_KEY)
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(list) = vms.as_array_mut() else {
        return Err("'vms' is not a list".into());
    };

    list.extend(new_values);
    let total = list.len();
    Ok((document, total))
}

fn reset(
    path: &Path,
    existing: &[u8],
    new_values: Vec<Value>,
    on_corrupt: CorruptPolicy,
    reason: String,
) -> Result<AppendOutcome, ProvisionError> {
    let added = new_values.len();

    let backup = match on_corrupt {
        CorruptPolicy::Abort => {
            tracing::error!(path = %path.display(), %reason, "manifest is corrupt, leaving it untouched");
            return Err(ProvisionError::ManifestCorrupt {
                path: path.display().to_string(),
                message: reason,
            });
        }
        CorruptPolicy::Backup => {
            let backup = backup_path(path);
            fs::write(&backup, existing).map_err(|e| io_error(&backup, e))?;
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                %reason,
                "manifest is corrupt, saved a backup before resetting it"
            );
            Some(backup)
        }
        CorruptPolicy::Overwrite => {
            tracing::warn!(path = %path.display(), %reason, "manifest is corrupt, discarding its content");
            None
        }
    };

    write_document(path, &records_document(new_values))?;
    Ok(AppendOutcome::Reset { added, backup })
}

fn records_document(values: Vec<Value>) -> Value {
    let mut root = Map::new();
    root.insert(VMS_KEY.into(), Value::Array(values));
    Value::Object(root)
}

fn empty_document() -> Value {
    records_document(Vec::new())
}

/// `instances.json` → `instances.json.bak-2026-10-19T08-30-00`, with a numeric
/// suffix if that name is taken.
fn backup_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest".into());
    let base = format!("{file_name}.bak-{}", util::file_timestamp());

    let mut candidate = path.with_file_name(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{base}-{n}"));
        n += 1;
    }
    candidate
}

fn ensure_parent(path: &Path) -> Result<(), ProvisionError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))
        }
        _ => Ok(()),
    }
}

/// Write `document` to a sibling temp file, then rename it over `path`.
fn write_document(path: &Path, document: &Value) -> Result<(), ProvisionError> {
    let bytes = serde_json::to_vec_pretty(document).map_err(|e| encode_error(path, e))?;

    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest".into());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let written = File::create(&tmp_path).and_then(|mut f| {
        f.write_all(&bytes)?;
        f.write_all(b"\n")?;
        f.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_error(path, e));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_error(path, e)
    })
}

fn encode_error(path: &Path, e: serde_json::Error) -> ProvisionError {
    ProvisionError::ManifestEncode {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ProvisionError {
    ProvisionError::ManifestIo {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str) -> MachineRecord {
        MachineRecord {
            name: name.into(),
            cpu: 2.0,
            memory: 4096.0,
            disk: 50.0,
            provisioned_at: None,
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
    }

    fn backups_in(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".bak-"))
            .collect()
    }

    #[test]
    fn append_empty_batch_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("instances.json");

        let outcome = append(&path, &[], CorruptPolicy::Overwrite).unwrap();

        assert_eq!(outcome, AppendOutcome::Skipped);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());
    }

    #[test]
    fn append_empty_batch_leaves_corrupt_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, "{not json").unwrap();

        append(&path, &[], CorruptPolicy::Overwrite).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn append_creates_missing_file_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("configs").join("instances.json");

        let outcome = append(&path, &[record("a"), record("b")], CorruptPolicy::Backup).unwrap();

        assert_eq!(outcome, AppendOutcome::Created { added: 2 });
        let names: Vec<_> = load(&path).unwrap().vms.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn append_preserves_existing_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        append(&path, &[record("a")], CorruptPolicy::Backup).unwrap();

        let outcome = append(&path, &[record("b")], CorruptPolicy::Backup).unwrap();

        assert_eq!(outcome, AppendOutcome::Merged { added: 1, total: 2 });
        assert_eq!(
            read_json(&path),
            json!({"vms": [
                {"name": "a", "cpu": 2.0, "memory": 4096.0, "disk": 50.0},
                {"name": "b", "cpu": 2.0, "memory": 4096.0, "disk": 50.0},
            ]})
        );
    }

    #[test]
    fn append_missing_vms_key_starts_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, r#"{"owner": "ops"}"#).unwrap();

        append(&path, &[record("a")], CorruptPolicy::Abort).unwrap();

        let doc = read_json(&path);
        assert_eq!(doc["owner"], "ops");
        assert_eq!(doc["vms"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn append_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(
            &path,
            r#"{"version": 1, "vms": [{"name": "old", "cpu": 1, "memory": 1, "disk": 1, "zone": "eu"}]}"#,
        )
        .unwrap();

        append(&path, &[record("new")], CorruptPolicy::Abort).unwrap();

        let doc = read_json(&path);
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["vms"][0]["zone"], "eu");
        assert_eq!(doc["vms"][1]["name"], "new");
    }

    #[test]
    fn append_overwrite_discards_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, "{\"vms\": [ {\"name\": ").unwrap();

        let outcome = append(&path, &[record("b")], CorruptPolicy::Overwrite).unwrap();

        assert_eq!(outcome, AppendOutcome::Reset { added: 1, backup: None });
        assert_eq!(
            read_json(&path),
            json!({"vms": [{"name": "b", "cpu": 2.0, "memory": 4096.0, "disk": 50.0}]})
        );
        assert!(backups_in(dir.path()).is_empty());
    }

    #[test]
    fn append_overwrite_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");

        for _ in 0..2 {
            fs::write(&path, "garbage").unwrap();
            append(&path, &[record("b")], CorruptPolicy::Overwrite).unwrap();
            assert_eq!(load(&path).unwrap().vms, vec![record("b")]);
        }
    }

    #[test]
    fn append_backup_keeps_old_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, "garbage").unwrap();

        let outcome = append(&path, &[record("b")], CorruptPolicy::Backup).unwrap();

        let AppendOutcome::Reset { backup: Some(backup), .. } = &outcome else {
            panic!("expected a reset with backup, got {outcome:?}");
        };
        assert_eq!(fs::read_to_string(backup).unwrap(), "garbage");
        assert_eq!(load(&path).unwrap().vms, vec![record("b")]);
    }

    #[test]
    fn append_abort_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, "garbage").unwrap();

        let err = append(&path, &[record("b")], CorruptPolicy::Abort).unwrap_err();

        assert!(matches!(err, ProvisionError::ManifestCorrupt { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "garbage");
    }

    #[test]
    fn append_treats_wrong_shapes_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");

        for content in [r#"[1, 2]"#, r#"{"vms": "nope"}"#] {
            fs::write(&path, content).unwrap();
            let err = append(&path, &[record("b")], CorruptPolicy::Abort).unwrap_err();
            assert!(matches!(err, ProvisionError::ManifestCorrupt { .. }), "{content}");
        }
    }

    #[test]
    fn append_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        append(&path, &[record("a")], CorruptPolicy::Backup).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn replay_bootstraps_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configs").join("instances.json");

        let entries = configure_vms_from_file(&path).unwrap();

        assert!(entries.is_empty());
        assert_eq!(read_json(&path), json!({"vms": []}));
    }

    #[test]
    fn replay_skips_malformed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(
            &path,
            r#"{"vms": [
                {"name": "web-1", "cpu": 2, "memory": 4096, "disk": 50},
                {"cpu": 1, "memory": 512, "disk": 10},
                "db-1",
                {"name": ""},
                {"name": "web-2", "cpu": 2, "memory": 4096, "disk": 50}
            ]}"#,
        )
        .unwrap();

        let names: Vec<_> = configure_vms_from_file(&path)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();

        assert_eq!(names, vec!["web-1", "web-2"]);
    }

    #[test]
    fn replay_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, "{").unwrap();

        let err = configure_vms_from_file(&path).unwrap_err();
        assert!(matches!(err, ProvisionError::ManifestCorrupt { .. }));
    }

    #[test]
    fn replay_reports_missing_vms_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, r#"{"vms": {"name": "web-1"}}"#).unwrap();

        let err = configure_vms_from_file(&path).unwrap_err();
        assert!(matches!(err, ProvisionError::ManifestShape { .. }));
    }

    #[test]
    fn mark_provisioned_stamps_first_unstamped_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        append(&path, &[record("a"), record("a"), record("b")], CorruptPolicy::Abort).unwrap();

        let stamped = mark_provisioned(&path, &["a".into()], "2026-10-19T08:30:00Z").unwrap();
        assert_eq!(stamped, 1);

        let entries = configure_vms_from_file(&path).unwrap();
        assert_eq!(entries[0].provisioned_at.as_deref(), Some("2026-10-19T08:30:00Z"));
        assert!(!entries[1].is_provisioned());
        assert!(!entries[2].is_provisioned());

        mark_provisioned(&path, &["a".into()], "2026-10-19T09:00:00Z").unwrap();
        let entries = configure_vms_from_file(&path).unwrap();
        assert_eq!(entries[0].provisioned_at.as_deref(), Some("2026-10-19T08:30:00Z"));
        assert_eq!(entries[1].provisioned_at.as_deref(), Some("2026-10-19T09:00:00Z"));
    }

    #[test]
    fn mark_provisioned_unknown_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        append(&path, &[record("a")], CorruptPolicy::Abort).unwrap();
        let before = fs::read(&path).unwrap();

        assert_eq!(mark_provisioned(&path, &["zzz".into()], "t").unwrap(), 0);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&dir.path().join("none.json")).unwrap(), Manifest::default());
    }

    #[test]
    fn load_reads_provisioned_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(
            &path,
            r#"{"vms": [{"name": "a", "cpu": 1, "memory": 2, "disk": 3, "provisioned_at": "t"}]}"#,
        )
        .unwrap();

        let manifest = load(&path).unwrap();
        assert_eq!(manifest.vms[0].provisioned_at.as_deref(), Some("t"));
        assert_eq!(manifest.vms[0].memory, 2.0);
    }

    #[test]
    fn load_skips_incomplete_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(
            &path,
            r#"{"vms": [{"name": "a", "cpu": 1, "memory": 2, "disk": 3}, {"cpu": 2}, "junk"]}"#,
        )
        .unwrap();

        let manifest = load(&path).unwrap();
        let names: Vec<_> = manifest.vms.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn load_rejects_non_list_vms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, r#"{"vms": {"name": "a"}}"#).unwrap();

        assert!(matches!(
            load(&path),
            Err(ProvisionError::ManifestShape { .. })
        ));
    }

    #[test]
    fn load_without_vms_key_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instances.json");
        fs::write(&path, r#"{"owner": "ops"}"#).unwrap();

        assert_eq!(load(&path).unwrap(), Manifest::default());
    }
}
