//! Persisted outputs, one JSON file per identity.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::sync::SyncOutput;

/// Blob store for [`SyncOutput`]s keyed by identity.
pub trait OutputStore: Send + Sync {
  fn load(&self, identity: &str) -> Result<Option<SyncOutput>>;
  fn save(&self, identity: &str, output: &SyncOutput) -> Result<()>;
}

/// Stores outputs as pretty JSON under a directory.
#[derive(Debug, Clone)]
pub struct FileOutputStore {
  dir: PathBuf,
}

impl FileOutputStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// File for `identity`. Identities that are not plain file names are hashed.
  pub fn path_for(&self, identity: &str) -> PathBuf {
    let plain = !identity.is_empty()
      && !identity.starts_with('.')
      && identity
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    let stem = if plain {
      identity.to_string()
    } else {
      let digest = hex::encode(Sha256::digest(identity.as_bytes()));
      format!("identity-{}", &digest[..16])
    };
    self.dir.join(format!("{}.json", stem))
  }
}

impl OutputStore for FileOutputStore {
  fn load(&self, identity: &str) -> Result<Option<SyncOutput>> {
    let path = self.path_for(identity);
    let data = match std::fs::read(&path) {
      Ok(data) => data,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), "Loaded prior output");
    SyncOutput::from_json(&data).map(Some)
  }

  /// Write via a temp file in the same directory and rename, so readers never
  /// see a half-written file.
  fn save(&self, identity: &str, output: &SyncOutput) -> Result<()> {
    let path = self.path_for(identity);
    std::fs::create_dir_all(&self.dir)?;

    let json = output.to_json_pretty()?;
    let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)?;
    temp_file.write_all(json.as_bytes())?;
    temp_file.flush()?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(&path).map_err(|e| e.error)?;

    if let Err(e) = sync_dir(&self.dir) {
      debug!(dir = %self.dir.display(), error = %e, "Directory fsync failed");
    }

    info!(
      path = %path.display(),
      resources = output.resources.len(),
      periods = output.period_count(),
      "Saved output"
    );
    Ok(())
  }
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
  std::fs::File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileOutputStore::new(dir.path().join("out"));
    assert!(store.load("alice").unwrap().is_none());

    let mut output = SyncOutput::for_account("ABC");
    output.set_period("steps", "2019", json!({"v": 1}));
    store.save("alice", &output).unwrap();
    assert_eq!(store.load("alice").unwrap(), Some(output.clone()));

    output.set_period("steps", "2020", json!({"v": 2}));
    store.save("alice", &output).unwrap();
    assert_eq!(store.load("alice").unwrap(), Some(output));

    // Only the output file remains; no temp files are left behind.
    let files = std::fs::read_dir(store.dir()).unwrap().count();
    assert_eq!(files, 1);
  }

  #[test]
  fn test_sync_dir_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    assert!(sync_dir(dir.path()).is_ok());
    assert!(sync_dir(&dir.path().join("missing")).is_err());
  }

  #[test]
  fn test_unsafe_identities_are_hashed() {
    let store = FileOutputStore::new("/tmp/out");
    assert_eq!(store.path_for("alice-1"), PathBuf::from("/tmp/out/alice-1.json"));

    let hashed = store.path_for("../etc/passwd");
    assert_eq!(hashed.parent(), Some(Path::new("/tmp/out")));
    assert!(hashed
      .file_name()
      .unwrap()
      .to_string_lossy()
      .starts_with("identity-"));
    assert_ne!(store.path_for("a/b"), store.path_for("a_b"));
  }

  #[test]
  fn test_corrupt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileOutputStore::new(dir.path());
    std::fs::write(store.path_for("alice"), b"{not json").unwrap();
    assert!(store.load("alice").is_err());
  }
}
