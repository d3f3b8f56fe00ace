// backup-database/src/backup/finalize.rs
use chrono::{DateTime, Local};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::errors::{BackupError, Result};

/// Owner/group read-write for finished dumps.
pub const ARTIFACT_MODE: u32 = 0o660;
pub const TIMESTAMP_FORMAT: &str = "%Y.%m.%d-%H.%M";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `<backup_dir>/db-dump-<database_id>-<timestamp>.sql`
pub fn destination_path(backup_dir: &Path, database_id: &str, timestamp: &str) -> PathBuf {
    backup_dir.join(format!("db-dump-{}-{}.sql", database_id, timestamp))
}

pub fn ensure_backup_dir(backup_dir: &Path) -> Result<()> {
    fs::create_dir_all(backup_dir).map_err(|source| BackupError::Destination {
        path: backup_dir.to_path_buf(),
        source,
    })
}

/// Locks a completed dump down to owner and group. Only called after the
/// dump utility exited successfully.
pub fn secure_artifact(artifact: &Path) -> Result<()> {
    fs::set_permissions(artifact, fs::Permissions::from_mode(ARTIFACT_MODE)).map_err(|source| {
        BackupError::Finalize {
            path: artifact.to_path_buf(),
            source,
        }
    })
}
