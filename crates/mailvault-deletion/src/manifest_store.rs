//! Manifest persistence
//!
//! Manifests live as one JSON file per manifest under a directory per
//! persistent status (§4.9, §6): `<root>/pending/<id>.json`,
//! `<root>/in_progress/<id>.json`, and so on. `ManifestStatus::directory_name`
//! (a table, not string coercion — §9 Design Notes) is the only place a
//! status maps to a path component.
//!
//! Grounded on `lnxdrive-telemetry/src/crash_report.rs`'s
//! `serde_json::to_string_pretty` + `std::fs::write` idiom, extended with
//! 0600 file permissions per §6's explicit mode requirement and a directory
//! per lifecycle state rather than one flat directory.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use mailvault_core::domain::{DeletionManifest, ManifestId, ManifestStatus};

use crate::error::ManifestError;

/// Transitions the execution loop is allowed to drive a manifest through.
/// `Cancelled` is not in this table because it is not a persisted directory
/// (§4.9: removing the file from `pending`/`in_progress` *is* cancellation).
const ALLOWED_TRANSITIONS: &[(ManifestStatus, ManifestStatus)] = &[
    (ManifestStatus::Pending, ManifestStatus::InProgress),
    (ManifestStatus::InProgress, ManifestStatus::Completed),
    (ManifestStatus::InProgress, ManifestStatus::Failed),
];

/// Root directory holding the four status subdirectories.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    /// Opens a manifest store rooted at `root`, creating the per-status
    /// subdirectories if they don't already exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let root = root.into();
        for status in ManifestStatus::ALL {
            std::fs::create_dir_all(root.join(status.directory_name()))?;
        }
        Ok(Self { root })
    }

    fn path_for(&self, status: ManifestStatus, id: &ManifestId) -> PathBuf {
        self.root.join(status.directory_name()).join(format!("{}.json", id.as_str()))
    }

    /// Writes `manifest` to the subdirectory matching its *current* status,
    /// mode 0600 (§6). Does not move it off a previous status's directory —
    /// callers that just transitioned status call [`Self::move_status`] first.
    pub fn save(&self, manifest: &DeletionManifest) -> Result<(), ManifestError> {
        let path = self.path_for(manifest.status(), manifest.id());
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&path, json)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        Ok(())
    }

    /// Creates a brand-new pending manifest and persists it.
    pub fn create(&self, manifest: DeletionManifest) -> Result<DeletionManifest, ManifestError> {
        self.save(&manifest)?;
        Ok(manifest)
    }

    /// Renames a manifest's file from one status directory to another. A
    /// single `rename` (§4.9), rejecting transitions not in the allowed table.
    pub fn move_status(&self, id: &ManifestId, from: ManifestStatus, to: ManifestStatus) -> Result<(), ManifestError> {
        if from == to {
            return Ok(());
        }
        if !ALLOWED_TRANSITIONS.contains(&(from, to)) {
            return Err(ManifestError::InvalidTransition { id: id.clone(), from, to });
        }
        let from_path = self.path_for(from, id);
        let to_path = self.path_for(to, id);
        std::fs::rename(&from_path, &to_path)?;
        Ok(())
    }

    /// Loads a manifest by id, searching every status directory (the caller
    /// does not need to know which state it's in).
    pub fn load(&self, id: &ManifestId) -> Result<DeletionManifest, ManifestError> {
        for status in ManifestStatus::ALL {
            let path = self.path_for(status, id);
            if path.exists() {
                return self.read(&path);
            }
        }
        Err(ManifestError::NotFound(id.clone()))
    }

    fn read(&self, path: &Path) -> Result<DeletionManifest, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Lists every manifest under one status directory, sorted by id
    /// (ids are `YYYYMMDD-HHMMSS-<slug>`, so this is creation order).
    pub fn list(&self, status: ManifestStatus) -> Result<Vec<DeletionManifest>, ManifestError> {
        let dir = self.root.join(status.directory_name());
        let mut manifests = Vec::new();
        let mut entries = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            manifests.push(self.read(&entry.path())?);
        }
        Ok(manifests)
    }

    /// Lists every manifest across all four status directories.
    pub fn list_all(&self) -> Result<Vec<DeletionManifest>, ManifestError> {
        let mut all = Vec::new();
        for status in ManifestStatus::ALL {
            all.extend(self.list(status)?);
        }
        Ok(all)
    }

    /// Cancels a manifest by deleting its file from `pending` or
    /// `in_progress` (§4.9: cancellation is a logical state implemented as
    /// file removal, not a persisted `Cancelled` directory).
    pub fn cancel(&self, id: &ManifestId) -> Result<(), ManifestError> {
        for status in [ManifestStatus::Pending, ManifestStatus::InProgress] {
            let path = self.path_for(status, id);
            if path.exists() {
                std::fs::remove_file(path)?;
                return Ok(());
            }
        }
        Err(ManifestError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mailvault_core::domain::{RemoteMessageId, SourceId};

    use super::*;

    fn sample(store: &ManifestStore) -> DeletionManifest {
        let manifest = DeletionManifest::new(
            SourceId::new(),
            "trash-cleanup",
            "cli",
            "Old promotions",
            serde_json::json!({}),
            vec![RemoteMessageId::new("m1").unwrap()],
            Utc::now(),
        );
        store.create(manifest).unwrap()
    }

    #[test]
    fn create_writes_under_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        let manifest = sample(&store);
        let path = dir.path().join("pending").join(format!("{}.json", manifest.id().as_str()));
        assert!(path.exists());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn load_finds_manifest_regardless_of_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        let manifest = sample(&store);
        let loaded = store.load(manifest.id()).unwrap();
        assert_eq!(loaded.id(), manifest.id());
    }

    #[test]
    fn move_status_renames_and_rejects_disallowed_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        let manifest = sample(&store);

        store.move_status(manifest.id(), ManifestStatus::Pending, ManifestStatus::InProgress).unwrap();
        assert!(!dir.path().join("pending").join(format!("{}.json", manifest.id().as_str())).exists());
        assert!(dir.path().join("in_progress").join(format!("{}.json", manifest.id().as_str())).exists());

        let err = store.move_status(manifest.id(), ManifestStatus::Pending, ManifestStatus::Completed);
        assert!(matches!(err, Err(ManifestError::InvalidTransition { .. })));
    }

    #[test]
    fn cancel_removes_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        let manifest = sample(&store);
        store.cancel(manifest.id()).unwrap();
        assert!(matches!(store.load(manifest.id()), Err(ManifestError::NotFound(_))));
    }

    #[test]
    fn list_returns_manifests_for_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path()).unwrap();
        sample(&store);
        sample(&store);
        assert_eq!(store.list(ManifestStatus::Pending).unwrap().len(), 2);
        assert_eq!(store.list(ManifestStatus::Completed).unwrap().len(), 0);
    }
}
