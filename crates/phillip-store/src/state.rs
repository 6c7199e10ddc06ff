//! Watermark and roster snapshots kept across restarts.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use phillip_core::{GroupId, RosterSnapshot, Watermark};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::StoreError;

const WATERMARK_FILE: &str = "watermark.json";
const ROSTERS_FILE: &str = "rosters.json";

/// Last known membership of every polled group.
pub type Rosters = BTreeMap<GroupId, RosterSnapshot>;

/// Directory holding `watermark.json` and `rosters.json`.
///
/// Files are replaced atomically: the new contents go to a temporary file in
/// the same directory which is then renamed over the old one, so a crash
/// leaves either the previous or the new state on disk.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Open the directory, creating it if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StoreError::NotADirectory(root));
        }
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        info!(path = %root.display(), "opened state directory");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// `None` when no watermark was saved yet.
    pub fn load_watermark(&self) -> Result<Option<Watermark>, StoreError> {
        self.read(WATERMARK_FILE)
    }

    pub fn save_watermark(&self, watermark: &Watermark) -> Result<(), StoreError> {
        self.write(WATERMARK_FILE, watermark)
    }

    /// Saved snapshots, empty when none were saved yet.
    pub fn load_rosters(&self) -> Result<Rosters, StoreError> {
        Ok(self.read(ROSTERS_FILE)?.unwrap_or_default())
    }

    pub fn save_rosters(&self, rosters: &Rosters) -> Result<(), StoreError> {
        self.write(ROSTERS_FILE, rosters)
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.root.join(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no saved state");
                return Ok(None);
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Json { path, source })
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.root.join(name);
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let mut file = NamedTempFile::new_in(&self.root).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut file, value).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        file.write_all(b"\n").map_err(io_err)?;
        file.as_file().sync_all().map_err(io_err)?;
        file.persist(&path).map_err(|source| StoreError::Persist {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "saved state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use phillip_core::{RosterEntry, WorkId};

    fn member(id: u64) -> RosterEntry {
        RosterEntry {
            id,
            username: format!("user{id}"),
            default_group: "bng".into(),
            profile_colour: None,
            avatar_url: None,
            country_code: None,
        }
    }

    #[test]
    fn fresh_directory_has_no_state() {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::open(tmp.path().join("state")).unwrap();
        assert!(state.path().is_dir());
        assert_eq!(state.load_watermark().unwrap(), None);
        assert!(state.load_rosters().unwrap().is_empty());
    }

    #[test]
    fn watermark_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let mark = Watermark {
            timestamp: Utc.with_ymd_and_hms(2020, 9, 29, 7, 43, 31).unwrap(),
            work_id: Some(WorkId(1107500)),
        };
        StateDir::open(tmp.path()).unwrap().save_watermark(&mark).unwrap();

        let reopened = StateDir::open(tmp.path()).unwrap();
        assert_eq!(reopened.load_watermark().unwrap(), Some(mark));

        let raw = fs::read_to_string(tmp.path().join("watermark.json")).unwrap();
        assert!(raw.contains("\"2020-09-29T07:43:31Z\""));
    }

    #[test]
    fn rosters_keyed_by_group() {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::open(tmp.path()).unwrap();
        let mut rosters = Rosters::new();
        rosters.insert(28, RosterSnapshot::new(vec![member(1), member(2)]));
        rosters.insert(7, RosterSnapshot::default());
        state.save_rosters(&rosters).unwrap();

        let loaded = state.load_rosters().unwrap();
        assert_eq!(loaded, rosters);
        assert_eq!(loaded[&28].len(), 2);
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let state = StateDir::open(tmp.path()).unwrap();
        for secs in [10, 20, 30] {
            let mark = Watermark::since(Utc.timestamp_opt(secs, 0).unwrap());
            state.save_watermark(&mark).unwrap();
        }
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("watermark.json")]);
        assert_eq!(
            state.load_watermark().unwrap().unwrap().timestamp,
            Utc.timestamp_opt(30, 0).unwrap()
        );
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("watermark.json"), "{not json").unwrap();
        let state = StateDir::open(tmp.path()).unwrap();
        assert!(matches!(
            state.load_watermark(),
            Err(StoreError::Json { .. })
        ));
    }

    #[test]
    fn file_in_place_of_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        fs::write(&file, "").unwrap();
        assert!(matches!(
            StateDir::open(&file),
            Err(StoreError::NotADirectory(_))
        ));
    }
}
