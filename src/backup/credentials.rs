// backup-database/src/backup/credentials.rs
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::errors::{BackupError, Result};

/// Owner/group read-write, nothing for others.
pub const CREDENTIAL_FILE_MODE: u32 = 0o660;

/// A mysqldump defaults file holding the credentials of one database.
///
/// The file lives at `<home>/.my.<database id>.cnf` and is removed when the
/// value is dropped, whether or not the dump succeeded.
#[derive(Debug)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the defaults file and restricts its permissions before
    /// returning, so no subprocess can start while it is readable by others.
    pub fn provision(home: &Path, db: &DatabaseConfig) -> Result<Self> {
        let path = credential_path(home, &db.id);
        let fail = |reason: String| BackupError::CredentialWrite {
            path: path.clone(),
            reason,
        };
        let body = defaults_file_body(db).map_err(fail)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(CREDENTIAL_FILE_MODE)
            .open(&path)
            .map_err(|e| fail(e.to_string()))?;
        // The mode above is filtered by the umask and ignored for an existing
        // file, so set it explicitly as well.
        fs::set_permissions(&path, fs::Permissions::from_mode(CREDENTIAL_FILE_MODE))
            .map_err(|e| fail(e.to_string()))?;
        file.write_all(body.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| fail(e.to_string()))?;

        debug!("Wrote credential file {}", path.display());
        Ok(CredentialFile { path })
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed credential file {}", self.path.display()),
            Err(e) => warn!(
                "Could not remove credential file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Deterministic per-user, per-database location of the defaults file.
pub fn credential_path(home: &Path, database_id: &str) -> PathBuf {
    home.join(format!(".my.{}.cnf", database_id))
}

fn defaults_file_body(db: &DatabaseConfig) -> std::result::Result<String, String> {
    Ok(format!(
        "[mysqldump]\nuser={}\npassword={}\n",
        option_value("db_user", &db.user)?,
        option_value("db_password", &db.password)?
    ))
}

/// Double-quoted option file value, so `#`, `;` and surrounding spaces are
/// taken literally.
fn option_value(field: &str, value: &str) -> std::result::Result<String, String> {
    if value.contains(['\n', '\r']) {
        return Err(format!("{} contains a line break", field));
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '\\' || c == '"' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Ok(quoted)
}
